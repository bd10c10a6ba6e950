//! Notification dispatch.
//!
//! Events (task created, status changed, claimed, declined, overdue,
//! registration) are turned into [`Reply`] messages and delivered through a
//! [`Notifier`]. Who receives what is decided by the pure functions in
//! [`recipients`]; the texts live in [`messages`]. Delivery failures are
//! logged per recipient and never abort the rest of a broadcast.

pub mod messages;
pub mod recipients;

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::lifecycle::TaskStatus;
use crate::reply::Reply;
use crate::store::{RegistrationRequest, Store, StoreError, Task};

use self::recipients::TaskAudience;

/// Errors from notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The transport refused or failed to deliver the message.
    #[error("delivery to {user_id} failed: {reason}")]
    Delivery {
        /// Intended recipient.
        user_id: i64,
        /// Transport error text.
        reason: String,
    },

    /// Looking up recipients failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Delivers a message to one user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `message` to `user_id`.
    async fn send(&self, user_id: i64, message: &Reply) -> Result<(), NotifyError>;
}

/// In-memory notifier that records every message. Used by tests and by
/// `taskdesk remind --dry-run`.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, Reply)>>,
    failing: Mutex<HashSet<i64>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery to `user_id` fail.
    pub fn fail_for(&self, user_id: i64) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(user_id);
        }
    }

    /// Everything delivered so far, in order.
    pub fn sent(&self) -> Vec<(i64, Reply)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Recipients in delivery order.
    pub fn recipients(&self) -> Vec<i64> {
        self.sent().into_iter().map(|(id, _)| id).collect()
    }

    /// Messages delivered to one user.
    pub fn sent_to(&self, user_id: i64) -> Vec<Reply> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, reply)| reply)
            .collect()
    }

    /// Forget recorded messages.
    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user_id: i64, message: &Reply) -> Result<(), NotifyError> {
        let fails = self
            .failing
            .lock()
            .map(|f| f.contains(&user_id))
            .unwrap_or(false);
        if fails {
            return Err(NotifyError::Delivery {
                user_id,
                reason: "recipient unreachable".to_owned(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((user_id, message.clone()));
        }
        Ok(())
    }
}

/// Send one message to every recipient. Returns how many were delivered.
pub async fn dispatch(notifier: &dyn Notifier, recipients: &[i64], message: &Reply) -> usize {
    let mut delivered: usize = 0;
    for user_id in recipients {
        match notifier.send(*user_id, message).await {
            Ok(()) => delivered = delivered.saturating_add(1),
            Err(e) => warn!(user_id, error = %e, "notification not delivered"),
        }
    }
    debug!(delivered, total = recipients.len(), "notification dispatched");
    delivered
}

/// Collect the people connected to a task.
///
/// Cancelled assignees and banned or deleted users are left out.
pub async fn load_audience(
    store: &Store,
    config: &Config,
    task: &Task,
) -> Result<TaskAudience, StoreError> {
    let mut assignees = Vec::new();
    for assignee in store.task_assignees(task.task_id).await? {
        if assignee.status == TaskStatus::Cancelled {
            continue;
        }
        if active_user(store, assignee.user_id).await? {
            assignees.push(assignee.user_id);
        }
    }

    let mut group_admins = Vec::new();
    if let Some(group_id) = task.group_id {
        for admin in store.group_admins(group_id).await? {
            if active_user(store, admin).await? {
                group_admins.push(admin);
            }
        }
    }

    Ok(TaskAudience {
        creator: task.created_by,
        assignees,
        group_admins,
        super_admins: config.access.super_admin_ids.clone(),
    })
}

async fn active_user(store: &Store, user_id: i64) -> Result<bool, StoreError> {
    Ok(store
        .get_user(user_id)
        .await?
        .is_some_and(|u| u.is_active()))
}

async fn display_name(store: &Store, user_id: i64) -> String {
    match store.get_user(user_id).await {
        Ok(Some(user)) => user.name,
        _ => format!("user {user_id}"),
    }
}

/// Announce a new task.
///
/// Assignees, super admins and group admins each get their variant. A task
/// without assignees is also broadcast as open to the active members of its
/// group, or to every active registered user when it has no group.
pub async fn task_created(
    store: &Store,
    config: &Config,
    notifier: &dyn Notifier,
    task: &Task,
) -> Result<usize, NotifyError> {
    let audience = load_audience(store, config, task).await?;
    let mut notified: HashSet<i64> = HashSet::new();
    let mut delivered: usize = 0;

    for (user_id, role) in recipients::created_recipients(&audience) {
        notified.insert(user_id);
        let message = messages::task_created(task, role);
        delivered = delivered.saturating_add(dispatch(notifier, &[user_id], &message).await);
    }

    let is_open = store.task_assignees(task.task_id).await?.is_empty();
    if is_open {
        let pool: Vec<i64> = match task.group_id {
            Some(group_id) => store
                .group_members(group_id)
                .await?
                .into_iter()
                .map(|u| u.user_id)
                .collect(),
            None => store
                .list_users(false)
                .await?
                .into_iter()
                .filter(|u| u.registered)
                .map(|u| u.user_id)
                .collect(),
        };
        let targets: Vec<i64> = recipients::open_task_recipients(task.created_by, &pool)
            .into_iter()
            .filter(|id| !notified.contains(id))
            .collect();
        delivered = delivered
            .saturating_add(dispatch(notifier, &targets, &messages::task_open(task)).await);
    }

    info!(task_id = task.task_id, delivered, open = is_open, "task creation announced");
    Ok(delivered)
}

/// Announce an aggregate status change made by `actor`.
pub async fn status_changed(
    store: &Store,
    config: &Config,
    notifier: &dyn Notifier,
    task: &Task,
    old: TaskStatus,
    new: TaskStatus,
    actor: i64,
) -> Result<usize, NotifyError> {
    let audience = load_audience(store, config, task).await?;
    let targets = recipients::status_change_recipients(&audience, actor);
    let name = display_name(store, actor).await;
    let message = messages::status_changed(task, old, new, &name);
    Ok(dispatch(notifier, &targets, &message).await)
}

/// Tell the creator and group admins that `claimant` took an open task.
pub async fn task_claimed(
    store: &Store,
    config: &Config,
    notifier: &dyn Notifier,
    task: &Task,
    claimant: i64,
) -> Result<usize, NotifyError> {
    let audience = load_audience(store, config, task).await?;
    let targets = recipients::response_recipients(&audience, claimant);
    let name = display_name(store, claimant).await;
    Ok(dispatch(notifier, &targets, &messages::task_claimed(task, &name)).await)
}

/// Tell the creator and group admins that `user_id` declined a task.
pub async fn task_declined(
    store: &Store,
    config: &Config,
    notifier: &dyn Notifier,
    task: &Task,
    user_id: i64,
) -> Result<usize, NotifyError> {
    let audience = load_audience(store, config, task).await?;
    let targets = recipients::response_recipients(&audience, user_id);
    let name = display_name(store, user_id).await;
    Ok(dispatch(notifier, &targets, &messages::task_declined(task, &name)).await)
}

/// Remind everyone involved that a deadline passed.
pub async fn overdue(
    store: &Store,
    config: &Config,
    notifier: &dyn Notifier,
    task: &Task,
    hours_overdue: i64,
) -> Result<usize, NotifyError> {
    let audience = load_audience(store, config, task).await?;
    let targets = recipients::overdue_recipients(&audience);
    Ok(dispatch(notifier, &targets, &messages::overdue(task, hours_overdue)).await)
}

/// Tell the active creator and assignees of system-cancelled tasks,
/// skipping `actor`.
pub async fn tasks_cancelled(
    store: &Store,
    notifier: &dyn Notifier,
    task_ids: &[i64],
    reason: &str,
    actor: i64,
) -> Result<usize, NotifyError> {
    let mut delivered: usize = 0;
    for task_id in task_ids {
        let Some(task) = store.get_task(*task_id).await? else {
            continue;
        };
        let mut targets = vec![task.created_by];
        for assignee in store.task_assignees(task.task_id).await? {
            if !targets.contains(&assignee.user_id) {
                targets.push(assignee.user_id);
            }
        }
        let mut active = Vec::with_capacity(targets.len());
        for id in targets {
            if id != actor && active_user(store, id).await? {
                active.push(id);
            }
        }
        let targets = active;
        let message = messages::task_cancelled(&task, reason);
        delivered = delivered.saturating_add(dispatch(notifier, &targets, &message).await);
    }
    Ok(delivered)
}

/// Ask every super admin to review a registration request.
pub async fn registration_requested(
    config: &Config,
    notifier: &dyn Notifier,
    request: &RegistrationRequest,
) -> usize {
    let message = messages::registration_requested(request);
    dispatch(notifier, &config.access.super_admin_ids, &message).await
}

/// Tell the requester how their registration was decided.
pub async fn registration_resolved(
    notifier: &dyn Notifier,
    request: &RegistrationRequest,
    approved: bool,
) -> usize {
    dispatch(
        notifier,
        &[request.user_id],
        &messages::registration_resolved(approved),
    )
    .await
}
