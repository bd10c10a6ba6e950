//! Overdue deadline reminders.
//!
//! A background loop ticks every `reminders.interval_secs`. Each pass loads
//! unfinished tasks, picks those inside the first hour of an overdue day,
//! and notifies everyone involved. A task is reminded at most once per
//! overdue day; the dedupe set lives in memory and is pruned as tasks
//! finish.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::lifecycle::{due_datetime, overdue_reminder};
use crate::notify::{self, Notifier, NotifyError};
use crate::store::{Store, Task};

/// Hours in one overdue day.
const HOURS_PER_DAY: i64 = 24;

/// Reminder bookkeeping carried between passes.
#[derive(Debug, Default)]
pub struct ReminderState {
    /// `(task_id, overdue_day)` pairs already reminded.
    sent: HashSet<(i64, i64)>,
    /// Last time the cron gate let a pass through.
    last_cron_run: Option<DateTime<Utc>>,
}

impl ReminderState {
    /// Create empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this task was already reminded for this overdue day.
    pub fn already_sent(&self, task_id: i64, hours_overdue: i64) -> bool {
        self.sent
            .contains(&(task_id, overdue_day(hours_overdue)))
    }

    /// Remember a reminder.
    pub fn record(&mut self, task_id: i64, hours_overdue: i64) {
        self.sent.insert((task_id, overdue_day(hours_overdue)));
    }

    /// Forget tasks that are no longer candidates.
    pub fn retain_tasks(&mut self, open: &HashSet<i64>) {
        self.sent.retain(|(task_id, _)| open.contains(task_id));
    }

    /// Number of remembered reminders.
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    /// True when nothing has been reminded yet.
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

fn overdue_day(hours_overdue: i64) -> i64 {
    hours_overdue.checked_div(HOURS_PER_DAY).unwrap_or(0)
}

/// A task that should be reminded now.
#[derive(Debug, Clone)]
pub struct DueReminder {
    /// The overdue task.
    pub task: Task,
    /// Whole hours past the deadline.
    pub hours_overdue: i64,
}

/// Pick the tasks to remind at local time `now`.
///
/// Tasks with an unreadable deadline are skipped with a warning.
pub fn select_due(tasks: Vec<Task>, now: NaiveDateTime, state: &ReminderState) -> Vec<DueReminder> {
    tasks
        .into_iter()
        .filter_map(|task| {
            let due = match due_datetime(&task.due_date, &task.due_time) {
                Ok(due) => due,
                Err(e) => {
                    warn!(task_id = task.task_id, error = %e, "unreadable deadline, skipping");
                    return None;
                }
            };
            let hours_overdue = overdue_reminder(task.status, due, now)?;
            if state.already_sent(task.task_id, hours_overdue) {
                return None;
            }
            Some(DueReminder {
                task,
                hours_overdue,
            })
        })
        .collect()
}

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Tasks reminded.
    pub reminded: usize,
    /// Messages delivered.
    pub delivered: usize,
}

/// Run one reminder pass at `now`.
///
/// # Errors
///
/// Returns an error if the candidate tasks cannot be loaded. A failure for
/// one task is logged and the pass moves on.
pub async fn run_pass(
    store: &Store,
    config: &Config,
    notifier: &dyn Notifier,
    state: &mut ReminderState,
    now: DateTime<Utc>,
) -> Result<PassSummary, NotifyError> {
    let candidates = store.overdue_candidates().await?;
    let open: HashSet<i64> = candidates.iter().map(|t| t.task_id).collect();
    state.retain_tasks(&open);

    let local_now = config.reminders.local_naive(now);
    let due = select_due(candidates, local_now, state);

    let mut summary = PassSummary::default();
    for reminder in due {
        let task_id = reminder.task.task_id;
        match notify::overdue(store, config, notifier, &reminder.task, reminder.hours_overdue).await
        {
            Ok(delivered) => {
                state.record(task_id, reminder.hours_overdue);
                summary.reminded = summary.reminded.saturating_add(1);
                summary.delivered = summary.delivered.saturating_add(delivered);
                info!(
                    task_id,
                    hours_overdue = reminder.hours_overdue,
                    delivered,
                    "overdue reminder sent"
                );
            }
            Err(e) => warn!(task_id, error = %e, "overdue reminder failed"),
        }
    }
    debug!(
        reminded = summary.reminded,
        delivered = summary.delivered,
        "reminder pass finished"
    );
    Ok(summary)
}

/// Whether the optional cron gate lets a pass run at `now`.
///
/// Without a schedule every tick runs. With one, a pass runs when a cron
/// trigger falls between the last gated run and now.
pub fn cron_allows(
    schedule: Option<&cron::Schedule>,
    state: &ReminderState,
    now: DateTime<Utc>,
) -> bool {
    let Some(schedule) = schedule else {
        return true;
    };
    // Never-run: use epoch so the first cron match triggers.
    let after = state.last_cron_run.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    schedule.after(&after).take(1).any(|next| next <= now)
}

/// Run the reminder loop until shutdown.
///
/// Exits when the shutdown signal is received or the watch channel closes.
pub async fn run_reminders(
    store: Store,
    config: Arc<Config>,
    notifier: Arc<dyn Notifier>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let interval_secs = config.reminders.interval_secs.max(1);
    info!(interval_secs, "reminders started");

    let schedule = config
        .reminders
        .check_cron
        .as_deref()
        .and_then(|expr| match cron::Schedule::from_str(expr) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(cron = %expr, error = %e, "invalid reminder cron, running every tick");
                None
            }
        });

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    let mut state = ReminderState::new();

    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                if !cron_allows(schedule.as_ref(), &state, now) {
                    continue;
                }
                state.last_cron_run = Some(now);
                if let Err(e) = run_pass(&store, &config, notifier.as_ref(), &mut state, now).await {
                    warn!(error = %e, "reminder pass failed");
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("reminders shutting down");
                    break;
                }
            }
        }
    }

    info!("reminders stopped");
}
