//! Worker and system statistics for `/stats` and the dashboard.

use serde::Serialize;

use super::{count_u64, Store, StoreError};

/// Per-worker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// The worker.
    pub user_id: i64,
    /// Display name.
    pub name: String,
    /// Tasks the worker is assigned to.
    pub assigned: u64,
    /// Assignments still pending.
    pub pending: u64,
    /// Assignments in progress.
    pub in_progress: u64,
    /// Assignments completed.
    pub completed: u64,
    /// Assignments cancelled or declined.
    pub cancelled: u64,
    /// Accept responses given.
    pub accepted: u64,
    /// Decline responses given.
    pub declined: u64,
    /// Completed share of assignments, in percent.
    pub completion_rate: u64,
    /// Accepted share of responses, in percent.
    pub acceptance_rate: u64,
}

/// System-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverallStats {
    /// All tasks.
    pub total_tasks: u64,
    /// Pending tasks.
    pub pending: u64,
    /// In-progress tasks.
    pub in_progress: u64,
    /// Completed tasks.
    pub completed: u64,
    /// Cancelled tasks.
    pub cancelled: u64,
    /// Active users.
    pub users: u64,
    /// Groups.
    pub groups: u64,
}

/// Integer percentage, 0 when the denominator is 0.
pub fn percent(part: u64, whole: u64) -> u64 {
    part.checked_mul(100)
        .and_then(|scaled| scaled.checked_div(whole))
        .unwrap_or(0)
}

impl Store {
    /// Counters for one worker, or `None` for an unknown user.
    pub async fn worker_stats(&self, user_id: i64) -> Result<Option<WorkerStats>, StoreError> {
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(None);
        };

        let (assigned, pending, in_progress, completed, cancelled): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT count(*), \
                        coalesce(sum(status = 'pending'), 0), \
                        coalesce(sum(status = 'in_progress'), 0), \
                        coalesce(sum(status = 'completed'), 0), \
                        coalesce(sum(status = 'cancelled'), 0) \
                 FROM task_assignees WHERE user_id = ?1",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let (accepted, declined): (i64, i64) = sqlx::query_as(
            "SELECT coalesce(sum(response = 'accepted'), 0), \
                    coalesce(sum(response = 'declined'), 0) \
             FROM task_responses WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let assigned = count_u64(assigned);
        let completed = count_u64(completed);
        let accepted = count_u64(accepted);
        let declined = count_u64(declined);

        Ok(Some(WorkerStats {
            user_id,
            name: user.name,
            assigned,
            pending: count_u64(pending),
            in_progress: count_u64(in_progress),
            completed,
            cancelled: count_u64(cancelled),
            accepted,
            declined,
            completion_rate: percent(completed, assigned),
            acceptance_rate: percent(accepted, accepted.saturating_add(declined)),
        }))
    }

    /// Counters across the whole system.
    pub async fn overall_stats(&self) -> Result<OverallStats, StoreError> {
        let (total, pending, in_progress, completed, cancelled): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT count(*), \
                        coalesce(sum(status = 'pending'), 0), \
                        coalesce(sum(status = 'in_progress'), 0), \
                        coalesce(sum(status = 'completed'), 0), \
                        coalesce(sum(status = 'cancelled'), 0) \
                 FROM tasks",
            )
            .fetch_one(&self.pool)
            .await?;

        let (users,): (i64,) =
            sqlx::query_as("SELECT count(*) FROM users WHERE banned = 0 AND deleted = 0")
                .fetch_one(&self.pool)
                .await?;
        let (groups,): (i64,) = sqlx::query_as("SELECT count(*) FROM groups")
            .fetch_one(&self.pool)
            .await?;

        Ok(OverallStats {
            total_tasks: count_u64(total),
            pending: count_u64(pending),
            in_progress: count_u64(in_progress),
            completed: count_u64(completed),
            cancelled: count_u64(cancelled),
            users: count_u64(users),
            groups: count_u64(groups),
        })
    }
}
