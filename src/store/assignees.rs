//! Per-assignee status, claims, and declines.
//!
//! Every write here ends with [`recompute_status`], so the task row always
//! carries the aggregate of its assignees.

use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::tasks::record_history;
use super::{Assignee, Store, StoreError};
use crate::lifecycle::{aggregate_status, TaskStatus};

type AssigneeRow = (i64, i64, String, String, String);

fn row_to_assignee(row: AssigneeRow) -> Result<Assignee, StoreError> {
    let (task_id, user_id, name, status, status_updated_at) = row;
    Ok(Assignee {
        task_id,
        user_id,
        name,
        status: TaskStatus::parse(&status)?,
        status_updated_at,
    })
}

/// Result of an assignee status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Assignee status before the change.
    pub old_assignee: TaskStatus,
    /// Task status before the change.
    pub old_task: TaskStatus,
    /// Task status after aggregation.
    pub new_task: TaskStatus,
}

impl StatusChange {
    /// Whether the aggregate task status moved.
    pub fn task_changed(&self) -> bool {
        self.old_task != self.new_task
    }
}

/// Result of trying to claim an open task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller is now the assignee.
    Claimed,
    /// Someone else responded first.
    AlreadyTaken,
    /// The task is completed or cancelled.
    Closed,
}

/// Result of declining a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineOutcome {
    /// The caller was an assignee and their part is now cancelled.
    Withdrawn {
        /// Task status before the decline.
        old_task: TaskStatus,
        /// Task status after aggregation.
        new_task: TaskStatus,
    },
    /// The caller was not assigned; the decline is only recorded.
    Noted,
    /// The caller had already withdrawn.
    AlreadyDeclined,
    /// The task is completed or cancelled.
    Closed,
}

/// Recompute the aggregate status of a task from its assignees and store it.
pub(crate) async fn recompute_status(
    conn: &mut SqliteConnection,
    task_id: i64,
) -> Result<TaskStatus, StoreError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT status FROM task_assignees WHERE task_id = ?1")
        .bind(task_id)
        .fetch_all(&mut *conn)
        .await?;
    let statuses = rows
        .iter()
        .map(|(s,)| TaskStatus::parse(s))
        .collect::<Result<Vec<_>, _>>()?;

    let aggregate = aggregate_status(&statuses);

    sqlx::query(
        "UPDATE tasks SET status = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
         WHERE task_id = ?2 AND status != ?1",
    )
    .bind(aggregate.as_str())
    .bind(task_id)
    .execute(&mut *conn)
    .await?;

    debug!(task_id, status = %aggregate, "task status recomputed");
    Ok(aggregate)
}

async fn task_status_on(conn: &mut SqliteConnection, task_id: i64) -> Result<TaskStatus, StoreError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM tasks WHERE task_id = ?1")
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some((status,)) => TaskStatus::parse(&status),
        None => Err(StoreError::not_found("task", task_id)),
    }
}

async fn record_response(
    conn: &mut SqliteConnection,
    task_id: i64,
    user_id: i64,
    response: &str,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO task_responses (task_id, user_id, response) VALUES (?1, ?2, ?3)")
        .bind(task_id)
        .bind(user_id)
        .bind(response)
        .execute(conn)
        .await?;
    Ok(())
}

async fn set_assignee_status_on(
    conn: &mut SqliteConnection,
    task_id: i64,
    user_id: i64,
    status: TaskStatus,
) -> Result<StatusChange, StoreError> {
    let old_task = task_status_on(conn, task_id).await?;
    if old_task == TaskStatus::Cancelled {
        return Err(StoreError::Validation(format!("task #{task_id} was cancelled")));
    }

    let old: Option<(String,)> =
        sqlx::query_as("SELECT status FROM task_assignees WHERE task_id = ?1 AND user_id = ?2")
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some((old_assignee,)) = old else {
        return Err(StoreError::not_found("assignee", user_id));
    };
    let old_assignee = TaskStatus::parse(&old_assignee)?;

    sqlx::query(
        "UPDATE task_assignees SET status = ?1, \
           status_updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
         WHERE task_id = ?2 AND user_id = ?3",
    )
    .bind(status.as_str())
    .bind(task_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    record_history(
        conn,
        task_id,
        "assignee_status",
        Some(old_assignee.as_str()),
        Some(status.as_str()),
        user_id,
    )
    .await?;

    let new_task = recompute_status(conn, task_id).await?;
    Ok(StatusChange {
        old_assignee,
        old_task,
        new_task,
    })
}

impl Store {
    /// Assignees of a task with their personal statuses, in assignment order.
    pub async fn task_assignees(&self, task_id: i64) -> Result<Vec<Assignee>, StoreError> {
        let rows: Vec<AssigneeRow> = sqlx::query_as(
            "SELECT a.task_id, a.user_id, COALESCE(u.name, 'user ' || a.user_id), \
                    a.status, a.status_updated_at \
             FROM task_assignees a LEFT JOIN users u ON u.user_id = a.user_id \
             WHERE a.task_id = ?1 \
             ORDER BY a.rowid",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_assignee).collect()
    }

    /// Personal status of one assignee, or `None` if they are not assigned.
    pub async fn assignee_status(
        &self,
        task_id: i64,
        user_id: i64,
    ) -> Result<Option<TaskStatus>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM task_assignees WHERE task_id = ?1 AND user_id = ?2")
                .bind(task_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(s,)| TaskStatus::parse(&s)).transpose()
    }

    /// Set one assignee's status and re-aggregate the task.
    ///
    /// Fails with [`StoreError::NotFound`] when the user is not assigned and
    /// with [`StoreError::Validation`] when the task was cancelled.
    pub async fn set_assignee_status(
        &self,
        task_id: i64,
        user_id: i64,
        status: TaskStatus,
    ) -> Result<StatusChange, StoreError> {
        let mut tx = self.begin_write().await?;
        let change = set_assignee_status_on(&mut tx, task_id, user_id, status).await?;
        tx.commit().await?;

        info!(task_id, user_id, from = %change.old_assignee, to = %status, task = %change.new_task, "assignee status changed");
        Ok(change)
    }

    /// An assigned user accepts their part: their status becomes in progress
    /// and the acceptance is recorded, both in one transaction.
    pub async fn start_assignment(
        &self,
        task_id: i64,
        user_id: i64,
    ) -> Result<StatusChange, StoreError> {
        let mut tx = self.begin_write().await?;
        let change = set_assignee_status_on(&mut tx, task_id, user_id, TaskStatus::InProgress).await?;
        record_response(&mut tx, task_id, user_id, "accepted").await?;
        tx.commit().await?;

        info!(task_id, user_id, task = %change.new_task, "assignment accepted");
        Ok(change)
    }

    /// Attach a user to a task. Returns `false` if they were already assigned.
    pub async fn add_assignee(
        &self,
        task_id: i64,
        user_id: i64,
        changed_by: i64,
    ) -> Result<bool, StoreError> {
        let mut tx = self.begin_write().await?;
        task_status_on(&mut tx, task_id).await?;

        let result =
            sqlx::query("INSERT OR IGNORE INTO task_assignees (task_id, user_id) VALUES (?1, ?2)")
                .bind(task_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        let added = result.rows_affected() > 0;
        if added {
            record_history(&mut tx, task_id, "assign", None, Some(&user_id.to_string()), changed_by)
                .await?;
            recompute_status(&mut tx, task_id).await?;
        }
        tx.commit().await?;
        Ok(added)
    }

    /// Detach a user from a task. Returns `false` if they were not assigned.
    pub async fn remove_assignee(
        &self,
        task_id: i64,
        user_id: i64,
        changed_by: i64,
    ) -> Result<bool, StoreError> {
        let mut tx = self.begin_write().await?;
        let result = sqlx::query("DELETE FROM task_assignees WHERE task_id = ?1 AND user_id = ?2")
            .bind(task_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let removed = result.rows_affected() > 0;
        if removed {
            record_history(&mut tx, task_id, "unassign", Some(&user_id.to_string()), None, changed_by)
                .await?;
            recompute_status(&mut tx, task_id).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// Replace the assignee set. Users who stay keep their personal status.
    pub async fn replace_assignees(
        &self,
        task_id: i64,
        user_ids: &[i64],
        changed_by: i64,
    ) -> Result<TaskStatus, StoreError> {
        let mut tx = self.begin_write().await?;
        task_status_on(&mut tx, task_id).await?;

        let current: Vec<(i64,)> =
            sqlx::query_as("SELECT user_id FROM task_assignees WHERE task_id = ?1")
                .bind(task_id)
                .fetch_all(&mut *tx)
                .await?;

        for (user_id,) in &current {
            if !user_ids.contains(user_id) {
                sqlx::query("DELETE FROM task_assignees WHERE task_id = ?1 AND user_id = ?2")
                    .bind(task_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        for user_id in user_ids {
            sqlx::query("INSERT OR IGNORE INTO task_assignees (task_id, user_id) VALUES (?1, ?2)")
                .bind(task_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let list = serde_json::to_string(user_ids)
            .map_err(|e| StoreError::Database(sqlx::Error::Encode(Box::new(e))))?;
        record_history(&mut tx, task_id, "assignees", None, Some(&list), changed_by).await?;

        let status = recompute_status(&mut tx, task_id).await?;
        tx.commit().await?;
        Ok(status)
    }

    /// Claim an open task. The first responder wins.
    ///
    /// The transaction holds the write lock before it reads, and the claimant
    /// is inserted only while the task has no assignees. Concurrent claimants
    /// queue on the lock and every loser sees [`ClaimOutcome::AlreadyTaken`].
    pub async fn claim_task(&self, task_id: i64, user_id: i64) -> Result<ClaimOutcome, StoreError> {
        let mut tx = self.begin_write().await?;

        let status = task_status_on(&mut tx, task_id).await?;
        if status.is_final() {
            return Ok(ClaimOutcome::Closed);
        }

        let result = sqlx::query(
            "INSERT INTO task_assignees (task_id, user_id, status) \
             SELECT ?1, ?2, 'in_progress' \
             WHERE NOT EXISTS (SELECT 1 FROM task_assignees WHERE task_id = ?1)",
        )
        .bind(task_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            debug!(task_id, user_id, "claim lost");
            return Ok(ClaimOutcome::AlreadyTaken);
        }

        record_response(&mut tx, task_id, user_id, "accepted").await?;
        record_history(&mut tx, task_id, "claimed", None, Some(&user_id.to_string()), user_id)
            .await?;
        recompute_status(&mut tx, task_id).await?;
        tx.commit().await?;

        info!(task_id, user_id, "task claimed");
        Ok(ClaimOutcome::Claimed)
    }

    /// Decline a task. An assignee's part becomes cancelled; anyone else's
    /// decline of an open task is only recorded.
    pub async fn decline_task(
        &self,
        task_id: i64,
        user_id: i64,
    ) -> Result<DeclineOutcome, StoreError> {
        let mut tx = self.begin_write().await?;

        let old_task = task_status_on(&mut tx, task_id).await?;
        if old_task.is_final() {
            return Ok(DeclineOutcome::Closed);
        }

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM task_assignees WHERE task_id = ?1 AND user_id = ?2")
                .bind(task_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match current {
            None => {
                record_response(&mut tx, task_id, user_id, "declined").await?;
                DeclineOutcome::Noted
            }
            Some((status,)) if TaskStatus::parse(&status)? == TaskStatus::Cancelled => {
                DeclineOutcome::AlreadyDeclined
            }
            Some((status,)) => {
                sqlx::query(
                    "UPDATE task_assignees SET status = 'cancelled', \
                       status_updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
                     WHERE task_id = ?1 AND user_id = ?2",
                )
                .bind(task_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
                record_response(&mut tx, task_id, user_id, "declined").await?;
                record_history(
                    &mut tx,
                    task_id,
                    "declined",
                    Some(&status),
                    Some(TaskStatus::Cancelled.as_str()),
                    user_id,
                )
                .await?;
                let new_task = recompute_status(&mut tx, task_id).await?;
                DeclineOutcome::Withdrawn { old_task, new_task }
            }
        };

        tx.commit().await?;
        info!(task_id, user_id, ?outcome, "task declined");
        Ok(outcome)
    }
}
