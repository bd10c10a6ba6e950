//! Task views and task actions.

use std::collections::BTreeSet;

use tracing::info;

use super::{home_button, notify_failed, HandlerContext, HandlerError, HandlerResult};
use crate::lifecycle::{check_assignee_transition, TaskStatus, Transition, WORKER_CHOICES};
use crate::notify;
use crate::permissions::{self, Actor};
use crate::reply::{escape_html, truncate, Action, Attachment, Button, Reply};
use crate::store::{
    Assignee, ClaimOutcome, DeclineOutcome, Task, TaskEdit, TaskFilter,
};

/// Longest title shown in list buttons.
const LIST_TITLE_CHARS: usize = 40;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "\u{23F3}",
        TaskStatus::InProgress => "\u{1F504}",
        TaskStatus::Completed => "\u{2705}",
        TaskStatus::Cancelled => "\u{274C}",
    }
}

fn view_button(task_id: i64) -> Button {
    Button::new("\u{1F4CB} Back to task", Action::View(task_id))
}

/// Render a list of tasks as one button per task.
pub fn task_list(heading: &str, tasks: &[Task], empty: &str) -> Reply {
    if tasks.is_empty() {
        return Reply::text(format!("<b>{heading}</b>\n\n{empty}")).with_button(home_button());
    }
    let mut reply = Reply::text(format!("<b>{heading}</b> ({})", tasks.len()));
    for task in tasks {
        let label = format!(
            "{} #{} {} \u{00B7} {}",
            status_icon(task.status),
            task.task_id,
            truncate(&task.title, LIST_TITLE_CHARS),
            task.due_date
        );
        reply = reply.with_button(Button::new(label, Action::View(task.task_id)));
    }
    reply.with_button(home_button())
}

async fn creator_groups(ctx: &HandlerContext, task: &Task) -> HandlerResult<Vec<i64>> {
    Ok(ctx
        .store
        .user_groups(task.created_by)
        .await?
        .into_iter()
        .map(|g| g.group_id)
        .collect())
}

async fn can_edit(ctx: &HandlerContext, actor: &Actor, task: &Task) -> HandlerResult<bool> {
    let groups = creator_groups(ctx, task).await?;
    Ok(permissions::can_edit_task(actor, task, &groups))
}

/// Load the task and require edit rights on it.
async fn editable_task(
    ctx: &HandlerContext,
    user_id: i64,
    task_id: i64,
) -> HandlerResult<(Actor, Task)> {
    let actor = ctx.actor(user_id).await?;
    let task = ctx.store.require_task(task_id).await?;
    if !can_edit(ctx, &actor, &task).await? {
        return Err(HandlerError::Denied("Only the creator or an administrator can change this task."));
    }
    Ok((actor, task))
}

fn require_active(actor: &Actor) -> HandlerResult<()> {
    if actor.banned {
        return Err(HandlerError::Denied("Your access has been revoked."));
    }
    if !actor.registered {
        return Err(HandlerError::Denied("You need to register first. Send /register."));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Active tasks assigned to the actor, excluding ones they declined.
pub async fn my_tasks(ctx: &HandlerContext, user_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    require_active(&actor)?;
    let filter = TaskFilter {
        assignee: Some(user_id),
        skip_declined: true,
        ..TaskFilter::active(ctx.list_limit())
    };
    let tasks = ctx.store.list_tasks(&filter).await?;
    Ok(task_list("\u{1F4CC} My tasks", &tasks, "You have no active tasks."))
}

/// Active tasks the actor created.
pub async fn created_tasks(ctx: &HandlerContext, user_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    require_active(&actor)?;
    let filter = TaskFilter {
        created_by: Some(user_id),
        ..TaskFilter::active(ctx.list_limit())
    };
    let tasks = ctx.store.list_tasks(&filter).await?;
    Ok(task_list("\u{1F4DD} Created by me", &tasks, "You have not created any active tasks."))
}

/// Active tasks of one group, or of every group the actor administers.
pub async fn group_tasks(
    ctx: &HandlerContext,
    user_id: i64,
    group_id: Option<i64>,
) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    let groups: Vec<i64> = match group_id {
        Some(g) => {
            ctx.store.require_group(g).await?;
            if !actor.is_super_admin && !permissions::is_group_admin(&actor, g) {
                return Err(HandlerError::Denied("You do not administer this group."));
            }
            vec![g]
        }
        None if actor.is_any_group_admin() => actor.admin_groups.iter().copied().collect(),
        None => return Err(HandlerError::Denied("You do not administer any group.")),
    };

    let limit = ctx.list_limit();
    let mut tasks = Vec::new();
    for g in groups {
        let filter = TaskFilter {
            group_id: Some(g),
            ..TaskFilter::active(limit)
        };
        tasks.extend(ctx.store.list_tasks(&filter).await?);
    }
    tasks.sort_by(|a, b| (&a.due_date, &a.due_time, a.task_id).cmp(&(&b.due_date, &b.due_time, b.task_id)));
    tasks.truncate(limit);
    Ok(task_list("\u{1F465} Group tasks", &tasks, "No active tasks in your groups."))
}

/// Active tasks of one assignee, excluding ones they declined.
///
/// Super admins see all of them. Group admins see the ones in groups they
/// administer that the assignee belongs to, or in `group_id` alone when
/// given. Anyone may look at their own.
pub async fn assignee_tasks(
    ctx: &HandlerContext,
    user_id: i64,
    target: i64,
    group_id: Option<i64>,
) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    let person = ctx.store.require_user(target).await?;

    let scope: Option<Vec<i64>> = match group_id {
        Some(g) => {
            ctx.store.require_group(g).await?;
            if !actor.is_super_admin && !permissions::is_group_admin(&actor, g) {
                return Err(HandlerError::Denied("You do not administer this group."));
            }
            Some(vec![g])
        }
        None if actor.is_super_admin || target == user_id => None,
        None if actor.is_any_group_admin() => {
            let theirs: BTreeSet<i64> = ctx
                .store
                .user_groups(target)
                .await?
                .into_iter()
                .map(|g| g.group_id)
                .collect();
            let shared: Vec<i64> = actor.admin_groups.intersection(&theirs).copied().collect();
            if shared.is_empty() {
                return Err(HandlerError::Denied("This user is not in a group you administer."));
            }
            Some(shared)
        }
        None => return Err(HandlerError::Denied("Only administrators can see other people's tasks.")),
    };

    let limit = ctx.list_limit();
    let base = TaskFilter {
        assignee: Some(target),
        skip_declined: true,
        ..TaskFilter::active(limit)
    };
    let tasks = match scope {
        None => ctx.store.list_tasks(&base).await?,
        Some(groups) => {
            let mut tasks = Vec::new();
            for g in groups {
                let filter = TaskFilter {
                    group_id: Some(g),
                    ..base.clone()
                };
                tasks.extend(ctx.store.list_tasks(&filter).await?);
            }
            tasks.sort_by(|a, b| {
                (&a.due_date, &a.due_time, a.task_id).cmp(&(&b.due_date, &b.due_time, b.task_id))
            });
            tasks.truncate(limit);
            tasks
        }
    };

    let heading = format!("\u{1F464} Tasks of {}", escape_html(&person.name));
    Ok(task_list(&heading, &tasks, "No active tasks for this person."))
}

/// Every active task. Super admins only.
pub async fn all_tasks(ctx: &HandlerContext, user_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    if !permissions::can_manage_system(&actor) {
        return Err(HandlerError::Denied("Only super administrators can see every task."));
    }
    let tasks = ctx
        .store
        .list_tasks(&TaskFilter::active(ctx.list_limit()))
        .await?;
    Ok(task_list("\u{1F4CB} All active tasks", &tasks, "There are no active tasks."))
}

/// Completed and cancelled tasks the actor may see.
pub async fn archive(ctx: &HandlerContext, user_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    require_active(&actor)?;
    let limit = ctx.list_limit();

    let tasks = if actor.is_super_admin {
        ctx.store.list_tasks(&TaskFilter::archived(limit)).await?
    } else {
        let mut filters = vec![
            TaskFilter {
                created_by: Some(user_id),
                ..TaskFilter::archived(limit)
            },
            TaskFilter {
                assignee: Some(user_id),
                ..TaskFilter::archived(limit)
            },
        ];
        filters.extend(actor.admin_groups.iter().map(|g| TaskFilter {
            group_id: Some(*g),
            ..TaskFilter::archived(limit)
        }));

        let mut seen = BTreeSet::new();
        let mut tasks = Vec::new();
        for filter in &filters {
            for task in ctx.store.list_tasks(filter).await? {
                if seen.insert(task.task_id) {
                    tasks.push(task);
                }
            }
        }
        tasks.sort_by(|a, b| (&b.due_date, &b.due_time).cmp(&(&a.due_date, &a.due_time)));
        tasks.truncate(limit);
        tasks
    };
    Ok(task_list("\u{1F4C2} Archive", &tasks, "The archive is empty."))
}

fn render_detail(task: &Task, group: Option<&str>, creator: &str, assignees: &[Assignee], media: usize) -> String {
    let mut text = format!(
        "\u{1F4CB} <b>Task #{}</b>\n<b>{}</b>\n",
        task.task_id,
        escape_html(&task.title)
    );
    if !task.description.is_empty() {
        text.push_str(&format!("\n{}\n", escape_html(&task.description)));
    }
    text.push_str(&format!(
        "\n\u{1F4C5} Due: {} {}\n\u{1F4CD} Group: {}\n\u{1F4CA} Status: {}\n\u{1F464} Created by: {}\n",
        task.due_date,
        task.due_time,
        escape_html(group.unwrap_or("none")),
        task.status.label(),
        escape_html(creator)
    ));
    if assignees.is_empty() {
        text.push_str("\n\u{1F465} Open task: nobody assigned yet\n");
    } else {
        text.push_str(&format!("\n\u{1F465} Assignees ({}):\n", assignees.len()));
        for a in assignees {
            text.push_str(&format!("  \u{2022} {} \u{2014} {}\n", escape_html(&a.name), a.status.label()));
        }
    }
    if media > 0 {
        text.push_str(&format!("\n\u{1F4CE} Media files: {media}\n"));
    }
    text
}

/// Task details with the buttons the actor may use.
pub async fn task_detail(ctx: &HandlerContext, user_id: i64, task_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    let task = ctx.store.require_task(task_id).await?;
    let assignees = ctx.store.task_assignees(task_id).await?;

    let claimable = assignees.is_empty() && permissions::can_claim_task(&actor, &task);
    if !permissions::can_view_task(&actor, &task, &assignees) && !claimable {
        return Err(HandlerError::Denied("You cannot view this task."));
    }

    let group = match task.group_id {
        Some(g) => ctx.store.get_group(g).await?.map(|g| g.name),
        None => None,
    };
    let creator = ctx
        .store
        .get_user(task.created_by)
        .await?
        .map(|u| u.name)
        .unwrap_or_else(|| format!("user {}", task.created_by));
    let media = ctx.store.task_media(task_id).await?.len();

    let mut reply = Reply::text(render_detail(&task, group.as_deref(), &creator, &assignees, media));

    if media > 0 {
        reply = reply.with_button(Button::new("\u{1F5BC} Show media", Action::Media(task_id)));
    }

    if !task.status.is_final() {
        let mine = assignees.iter().find(|a| a.user_id == user_id).map(|a| a.status);
        match mine {
            Some(TaskStatus::Pending) => {
                reply = reply.with_row(vec![
                    Button::new("\u{25B6} Start", Action::Accept(task_id)),
                    Button::new("\u{1F6AB} Decline", Action::Decline(task_id)),
                ]);
            }
            Some(TaskStatus::InProgress) | Some(TaskStatus::Completed) => {
                reply = reply.with_row(vec![
                    Button::new("\u{270F} My status", Action::ChooseMine(task_id)),
                    Button::new("\u{1F6AB} Decline", Action::Decline(task_id)),
                ]);
            }
            Some(TaskStatus::Cancelled) => {}
            None if claimable => {
                reply = reply.with_row(vec![
                    Button::new("\u{2705} Accept", Action::Accept(task_id)),
                    Button::new("\u{1F6AB} Decline", Action::Decline(task_id)),
                ]);
            }
            None => {}
        }
    }

    if can_edit(ctx, &actor, &task).await? {
        reply = reply.with_row(vec![
            Button::new("\u{1F504} Task status", Action::ChooseTask(task_id)),
            Button::new("\u{1F5D1} Delete", Action::DeleteAsk(task_id)),
        ]);
    }

    Ok(reply.with_button(home_button()))
}

/// Resend a task's photos and videos.
pub async fn task_media(ctx: &HandlerContext, user_id: i64, task_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    let task = ctx.store.require_task(task_id).await?;
    let assignees = ctx.store.task_assignees(task_id).await?;
    let claimable = assignees.is_empty() && permissions::can_claim_task(&actor, &task);
    if !permissions::can_view_task(&actor, &task, &assignees) && !claimable {
        return Err(HandlerError::Denied("You cannot view this task."));
    }

    let attachments: Vec<Attachment> = ctx
        .store
        .task_media(task_id)
        .await?
        .into_iter()
        .map(|m| Attachment {
            kind: m.kind,
            file_id: m.file_id,
        })
        .collect();
    if attachments.is_empty() {
        return Ok(Reply::text("This task has no media.").with_button(view_button(task_id)));
    }
    Ok(Reply::text(format!(
        "\u{1F4CE} Media of task #{task_id} ({})",
        attachments.len()
    ))
    .with_attachments(attachments)
    .with_button(view_button(task_id)))
}

// ---------------------------------------------------------------------------
// Assignee actions
// ---------------------------------------------------------------------------

/// Accept a task: claim it if it is open, or start it if assigned.
pub async fn accept(ctx: &HandlerContext, user_id: i64, task_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    require_active(&actor)?;
    let task = ctx.store.require_task(task_id).await?;
    if task.status.is_final() {
        return Err(HandlerError::Invalid(format!("Task #{task_id} is already closed.")));
    }

    match ctx.store.assignee_status(task_id, user_id).await? {
        Some(TaskStatus::Pending) => {
            let change = ctx.store.start_assignment(task_id, user_id).await?;
            if change.task_changed() {
                let task = ctx.store.require_task(task_id).await?;
                notify::status_changed(
                    &ctx.store,
                    &ctx.config,
                    &*ctx.notifier,
                    &task,
                    change.old_task,
                    change.new_task,
                    user_id,
                )
                .await
                .unwrap_or_else(notify_failed);
            }
            Ok(Reply::text(format!("\u{1F504} You started task #{task_id}."))
                .with_button(view_button(task_id)))
        }
        Some(TaskStatus::Cancelled) => Err(HandlerError::Invalid(
            "You declined this task earlier.".to_owned(),
        )),
        Some(status) => Ok(Reply::text(format!(
            "Your status on task #{task_id} is already {}.",
            status.label()
        ))
        .with_button(view_button(task_id))),
        None => {
            if !permissions::can_claim_task(&actor, &task) {
                return Err(HandlerError::Denied("This task is not open to you."));
            }
            match ctx.store.claim_task(task_id, user_id).await? {
                ClaimOutcome::Claimed => {
                    let task = ctx.store.require_task(task_id).await?;
                    notify::task_claimed(&ctx.store, &ctx.config, &*ctx.notifier, &task, user_id)
                        .await
                        .unwrap_or_else(notify_failed);
                    Ok(Reply::text(format!(
                        "\u{1F91D} Task #{task_id} is yours. Good luck!"
                    ))
                    .with_button(view_button(task_id)))
                }
                ClaimOutcome::AlreadyTaken => Ok(Reply::text(
                    "\u{23F1} Someone else already took this task.",
                )
                .with_button(home_button())),
                ClaimOutcome::Closed => Err(HandlerError::Invalid(format!(
                    "Task #{task_id} is already closed."
                ))),
            }
        }
    }
}

/// Decline a task.
pub async fn decline(ctx: &HandlerContext, user_id: i64, task_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    require_active(&actor)?;
    let task = ctx.store.require_task(task_id).await?;
    let assignees = ctx.store.task_assignees(task_id).await?;
    let assigned = assignees.iter().any(|a| a.user_id == user_id);
    if !assigned && !(assignees.is_empty() && permissions::can_claim_task(&actor, &task)) {
        return Err(HandlerError::Denied("This task is not offered to you."));
    }

    match ctx.store.decline_task(task_id, user_id).await? {
        DeclineOutcome::Withdrawn { .. } => {
            let task = ctx.store.require_task(task_id).await?;
            notify::task_declined(&ctx.store, &ctx.config, &*ctx.notifier, &task, user_id)
                .await
                .unwrap_or_else(notify_failed);
            Ok(Reply::text(format!("\u{1F6AB} You declined task #{task_id}.")).with_button(home_button()))
        }
        DeclineOutcome::Noted => {
            Ok(Reply::text(format!("\u{1F44C} Noted, task #{task_id} stays open for others."))
                .with_button(home_button()))
        }
        DeclineOutcome::AlreadyDeclined => Ok(Reply::text(format!(
            "You have already declined task #{task_id}."
        ))
        .with_button(home_button())),
        DeclineOutcome::Closed => Err(HandlerError::Invalid(format!(
            "Task #{task_id} is already closed."
        ))),
    }
}

/// Offer the statuses an assignee may pick.
pub async fn choose_my_status(ctx: &HandlerContext, user_id: i64, task_id: i64) -> HandlerResult {
    let task = ctx.store.require_task(task_id).await?;
    let current = ctx
        .store
        .assignee_status(task_id, user_id)
        .await?
        .ok_or(HandlerError::Denied("You are not assigned to this task."))?;
    if current == TaskStatus::Cancelled || task.status == TaskStatus::Cancelled {
        return Err(HandlerError::Invalid("This assignment was cancelled.".to_owned()));
    }

    let row = WORKER_CHOICES
        .iter()
        .filter(|s| **s != current)
        .map(|s| Button::new(s.label(), Action::SetMine(task_id, *s)))
        .collect();
    Ok(Reply::text(format!(
        "Task #{task_id}: {}\nYour status: {}\nPick a new status:",
        escape_html(&task.title),
        current.label()
    ))
    .with_row(row)
    .with_button(view_button(task_id)))
}

/// Change the actor's own assignment status.
pub async fn set_my_status(
    ctx: &HandlerContext,
    user_id: i64,
    task_id: i64,
    status: TaskStatus,
) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    let assignees = ctx.store.task_assignees(task_id).await?;
    if !permissions::can_change_assignee_status(&actor, &assignees) {
        return Err(HandlerError::Denied("Only an assignee can change their own status."));
    }
    let current = assignees
        .iter()
        .find(|a| a.user_id == user_id)
        .map(|a| a.status)
        .unwrap_or(TaskStatus::Pending);

    match check_assignee_transition(current, status) {
        Transition::Rejected(reason) => return Err(HandlerError::Invalid(reason.to_owned())),
        Transition::Unchanged => {
            return Ok(Reply::text(format!("Your status is already {}.", status.label()))
                .with_button(view_button(task_id)))
        }
        Transition::Allowed => {}
    }

    let change = ctx.store.set_assignee_status(task_id, user_id, status).await?;
    let task = ctx.store.require_task(task_id).await?;
    if change.task_changed() {
        notify::status_changed(
            &ctx.store,
            &ctx.config,
            &*ctx.notifier,
            &task,
            change.old_task,
            change.new_task,
            user_id,
        )
        .await
        .unwrap_or_else(notify_failed);
    }

    Ok(Reply::text(format!(
        "Your status: {}\nTask status: {}",
        status.label(),
        change.new_task.label()
    ))
    .with_button(view_button(task_id)))
}

// ---------------------------------------------------------------------------
// Editor actions
// ---------------------------------------------------------------------------

/// Offer task-level statuses to an editor.
pub async fn choose_task_status(ctx: &HandlerContext, user_id: i64, task_id: i64) -> HandlerResult {
    let (_, task) = editable_task(ctx, user_id, task_id).await?;
    let row = TaskStatus::ALL
        .iter()
        .filter(|s| **s != task.status)
        .map(|s| Button::new(s.label(), Action::SetTask(task_id, *s)))
        .collect();
    Ok(Reply::text(format!(
        "Task #{task_id}: {}\nStatus: {}\nSet the task status:",
        escape_html(&task.title),
        task.status.label()
    ))
    .with_row(row)
    .with_button(view_button(task_id)))
}

/// Override the task status.
pub async fn set_task_status(
    ctx: &HandlerContext,
    user_id: i64,
    task_id: i64,
    status: TaskStatus,
) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    let task = ctx.store.require_task(task_id).await?;
    let groups = creator_groups(ctx, &task).await?;
    if !permissions::can_set_task_status(&actor, &task, &groups) {
        return Err(HandlerError::Denied("Only the creator or an administrator can change this task."));
    }
    if task.status == TaskStatus::Cancelled {
        return Err(HandlerError::Invalid(format!("Task #{task_id} was cancelled.")));
    }

    let old = ctx.store.set_task_status(task_id, status, user_id).await?;
    if old != status {
        let task = ctx.store.require_task(task_id).await?;
        notify::status_changed(&ctx.store, &ctx.config, &*ctx.notifier, &task, old, status, user_id)
            .await
            .unwrap_or_else(notify_failed);
    }
    Ok(Reply::text(format!("Task #{task_id} status: {}", status.label()))
        .with_button(view_button(task_id)))
}

/// Field of a task that can be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    /// Title.
    Title,
    /// Description.
    Description,
    /// Due date.
    Date,
    /// Due time.
    Time,
}

impl EditField {
    /// Parse a field name as typed in `/edit`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(Self::Title),
            "description" | "desc" => Some(Self::Description),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            _ => None,
        }
    }
}

/// Edit one field of a task.
pub async fn edit_task(
    ctx: &HandlerContext,
    user_id: i64,
    task_id: i64,
    field: EditField,
    value: &str,
) -> HandlerResult {
    let (_, task) = editable_task(ctx, user_id, task_id).await?;
    if task.status == TaskStatus::Cancelled {
        return Err(HandlerError::Invalid(format!("Task #{task_id} was cancelled.")));
    }

    let value = value.trim().to_owned();
    let edit = match field {
        EditField::Title => TaskEdit {
            title: Some(value),
            ..TaskEdit::default()
        },
        EditField::Description => TaskEdit {
            description: Some(value),
            ..TaskEdit::default()
        },
        EditField::Date => TaskEdit {
            due_date: Some(value),
            ..TaskEdit::default()
        },
        EditField::Time => TaskEdit {
            due_time: Some(value),
            ..TaskEdit::default()
        },
    };
    let updated = ctx.store.update_task_fields(task_id, &edit, user_id).await?;
    info!(task_id, user_id, ?field, "task edited");

    Ok(Reply::text(format!(
        "\u{270F} Task #{task_id} updated: <b>{}</b>, due {} {}",
        escape_html(&updated.title),
        updated.due_date,
        updated.due_time
    ))
    .with_button(view_button(task_id)))
}

/// Ask for confirmation before deleting.
pub async fn delete_ask(ctx: &HandlerContext, user_id: i64, task_id: i64) -> HandlerResult {
    let (_, task) = editable_task(ctx, user_id, task_id).await?;
    Ok(Reply::text(format!(
        "\u{1F5D1} Delete task #{task_id} <b>{}</b>? This cannot be undone.",
        escape_html(&task.title)
    ))
    .with_row(vec![
        Button::new("\u{2705} Yes, delete", Action::DeleteConfirm(task_id)),
        Button::new("\u{21A9} Keep it", Action::View(task_id)),
    ]))
}

/// Delete a task after confirmation.
pub async fn delete_task(ctx: &HandlerContext, user_id: i64, task_id: i64) -> HandlerResult {
    editable_task(ctx, user_id, task_id).await?;
    ctx.store.delete_task(task_id).await?;
    info!(task_id, user_id, "task deleted by editor");
    Ok(Reply::text(format!("\u{1F5D1} Task #{task_id} deleted.")).with_button(home_button()))
}

/// Add an assignee, within the actor's assign scope.
pub async fn assign(
    ctx: &HandlerContext,
    user_id: i64,
    task_id: i64,
    target: i64,
) -> HandlerResult {
    let (actor, task) = editable_task(ctx, user_id, task_id).await?;
    if task.status.is_final() {
        return Err(HandlerError::Invalid(format!("Task #{task_id} is already closed.")));
    }
    let target_user = ctx.store.require_user(target).await?;
    let allowed = permissions::assignable_users(&ctx.store, &actor)
        .await?
        .iter()
        .any(|u| u.user_id == target);
    if !allowed {
        return Err(HandlerError::Denied("You cannot assign tasks to this user."));
    }

    if !ctx.store.add_assignee(task_id, target, user_id).await? {
        return Ok(Reply::text(format!(
            "{} is already assigned to task #{task_id}.",
            escape_html(&target_user.name)
        ))
        .with_button(view_button(task_id)));
    }

    let task = ctx.store.require_task(task_id).await?;
    notify::dispatch(
        &*ctx.notifier,
        &[target],
        &notify::messages::task_created(&task, notify::recipients::CreatedRole::Assignee),
    )
    .await;
    Ok(Reply::text(format!(
        "\u{2795} {} assigned to task #{task_id}.",
        escape_html(&target_user.name)
    ))
    .with_button(view_button(task_id)))
}

/// Remove an assignee.
pub async fn unassign(
    ctx: &HandlerContext,
    user_id: i64,
    task_id: i64,
    target: i64,
) -> HandlerResult {
    let (_, task) = editable_task(ctx, user_id, task_id).await?;
    if task.status == TaskStatus::Cancelled {
        return Err(HandlerError::Invalid(format!("Task #{task_id} was cancelled.")));
    }
    if !ctx.store.remove_assignee(task_id, target, user_id).await? {
        return Err(HandlerError::Invalid(format!(
            "User {target} is not assigned to task #{task_id}."
        )));
    }
    let task = ctx.store.require_task(task_id).await?;
    Ok(Reply::text(format!(
        "\u{2796} User {target} removed from task #{task_id}. Task status: {}",
        task.status.label()
    ))
    .with_button(view_button(task_id)))
}

