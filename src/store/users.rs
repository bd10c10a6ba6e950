//! User accessors: upsert, lookup, naming, ban and soft delete.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

use super::assignees::recompute_status;
use super::{Store, StoreError, User};
use crate::lifecycle::TaskStatus;

pub(crate) type UserRow = (i64, String, Option<String>, bool, bool, bool, String);

const USER_COLUMNS: &str = "user_id, name, username, registered, banned, deleted, created_at";

pub(crate) fn row_to_user(row: UserRow) -> User {
    let (user_id, name, username, registered, banned, deleted, created_at) = row;
    User {
        user_id,
        name,
        username,
        registered,
        banned,
        deleted,
        created_at,
    }
}

/// Tasks touched when a user's work is withdrawn by a ban or deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CancelSummary {
    /// Tasks cancelled outright (created by the user or solely assigned to them).
    pub cancelled: Vec<i64>,
    /// Tasks the user was removed from while co-assignees remain.
    pub unassigned: Vec<i64>,
}

impl Store {
    /// Record a user seen on the chat, creating an unregistered row if needed.
    ///
    /// An existing row keeps its name (admins may have set it) and only the
    /// @username is refreshed.
    pub async fn ensure_user(
        &self,
        user_id: i64,
        name: &str,
        username: Option<&str>,
    ) -> Result<User, StoreError> {
        sqlx::query(
            "INSERT INTO users (user_id, name, username) VALUES (?1, ?2, ?3) \
             ON CONFLICT(user_id) DO UPDATE SET username = excluded.username",
        )
        .bind(user_id)
        .bind(name)
        .bind(username)
        .execute(&self.pool)
        .await?;

        self.require_user(user_id).await
    }

    /// Insert or update a user as registered, e.g. when a super admin adds them.
    pub async fn register_user(
        &self,
        user_id: i64,
        name: &str,
        username: Option<&str>,
    ) -> Result<User, StoreError> {
        register_user_on(&mut *self.pool.acquire().await?, user_id, name, username).await?;
        self.require_user(user_id).await
    }

    /// Look up a user by id.
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_user))
    }

    /// Look up a user by id, failing with [`StoreError::NotFound`].
    pub async fn require_user(&self, user_id: i64) -> Result<User, StoreError> {
        self.get_user(user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    /// List users ordered by name. Banned and deleted users are skipped
    /// unless `include_inactive` is set.
    pub async fn list_users(&self, include_inactive: bool) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ?1 OR (banned = 0 AND deleted = 0) \
             ORDER BY name COLLATE NOCASE, user_id"
        );
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_user).collect())
    }

    /// Registered, active users that belong to no group.
    pub async fn users_without_group(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u \
             WHERE u.registered = 1 AND u.banned = 0 AND u.deleted = 0 \
               AND NOT EXISTS (SELECT 1 FROM user_groups g WHERE g.user_id = u.user_id) \
             ORDER BY name COLLATE NOCASE, user_id"
        );
        let rows: Vec<UserRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(row_to_user).collect())
    }

    /// Rename a user.
    pub async fn set_user_name(&self, user_id: i64, name: &str) -> Result<(), StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name must not be empty".to_owned()));
        }
        let result = sqlx::query("UPDATE users SET name = ?1 WHERE user_id = ?2")
            .bind(name)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user_id));
        }
        Ok(())
    }

    /// Ban a user: strip admin roles and withdraw their open work.
    pub async fn ban_user(&self, user_id: i64) -> Result<CancelSummary, StoreError> {
        let mut tx = self.begin_write().await?;

        let result = sqlx::query("UPDATE users SET banned = 1 WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user_id));
        }

        sqlx::query("DELETE FROM group_admins WHERE admin_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let summary = cancel_user_tasks(&mut *tx, user_id).await?;
        tx.commit().await?;

        info!(
            user_id,
            cancelled = summary.cancelled.len(),
            unassigned = summary.unassigned.len(),
            "user banned"
        );
        Ok(summary)
    }

    /// Lift a ban. Deleted users stay deleted.
    pub async fn unban_user(&self, user_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET banned = 0 WHERE user_id = ?1 AND deleted = 0")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user_id));
        }
        Ok(())
    }

    /// Soft-delete a user: mark banned and deleted, drop memberships and
    /// admin roles, and withdraw their open work.
    pub async fn delete_user(&self, user_id: i64) -> Result<CancelSummary, StoreError> {
        let mut tx = self.begin_write().await?;

        let result = sqlx::query(
            "UPDATE users SET banned = 1, deleted = 1, registered = 0 WHERE user_id = ?1",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user_id));
        }

        sqlx::query("DELETE FROM group_admins WHERE admin_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_groups WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let summary = cancel_user_tasks(&mut *tx, user_id).await?;
        tx.commit().await?;

        info!(user_id, cancelled = summary.cancelled.len(), "user deleted");
        Ok(summary)
    }
}

pub(crate) async fn register_user_on(
    conn: &mut SqliteConnection,
    user_id: i64,
    name: &str,
    username: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO users (user_id, name, username, registered) VALUES (?1, ?2, ?3, 1) \
         ON CONFLICT(user_id) DO UPDATE SET \
           name = excluded.name, \
           username = COALESCE(excluded.username, users.username), \
           registered = 1, banned = 0, deleted = 0",
    )
    .bind(user_id)
    .bind(name)
    .bind(username)
    .execute(conn)
    .await?;
    Ok(())
}

/// Withdraw a user's open work.
///
/// Open tasks the user created, or is the only assignee of, are cancelled.
/// From open tasks with other assignees the user is removed and the task
/// status is recomputed.
pub(crate) async fn cancel_user_tasks(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<CancelSummary, StoreError> {
    let open = [TaskStatus::Pending.as_str(), TaskStatus::InProgress.as_str()];

    let created: Vec<(i64,)> =
        sqlx::query_as("SELECT task_id FROM tasks WHERE created_by = ?1 AND status IN (?2, ?3)")
            .bind(user_id)
            .bind(open[0])
            .bind(open[1])
            .fetch_all(&mut *conn)
            .await?;

    let assigned: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT t.task_id, \
                (SELECT count(*) FROM task_assignees o WHERE o.task_id = t.task_id) \
         FROM tasks t \
         JOIN task_assignees a ON a.task_id = t.task_id \
         WHERE a.user_id = ?1 AND t.status IN (?2, ?3) AND t.created_by != ?1",
    )
    .bind(user_id)
    .bind(open[0])
    .bind(open[1])
    .fetch_all(&mut *conn)
    .await?;

    let mut summary = CancelSummary::default();

    for (task_id,) in created {
        cancel_task_on(conn, task_id, user_id).await?;
        summary.cancelled.push(task_id);
    }

    for (task_id, assignee_count) in assigned {
        if assignee_count <= 1 {
            cancel_task_on(conn, task_id, user_id).await?;
            summary.cancelled.push(task_id);
        } else {
            sqlx::query("DELETE FROM task_assignees WHERE task_id = ?1 AND user_id = ?2")
                .bind(task_id)
                .bind(user_id)
                .execute(&mut *conn)
                .await?;
            recompute_status(conn, task_id).await?;
            summary.unassigned.push(task_id);
        }
    }

    Ok(summary)
}

/// Cancel a task and every assignment on it, recording history.
pub(crate) async fn cancel_task_on(
    conn: &mut SqliteConnection,
    task_id: i64,
    changed_by: i64,
) -> Result<(), StoreError> {
    let old: Option<(String,)> = sqlx::query_as("SELECT status FROM tasks WHERE task_id = ?1")
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some((old_status,)) = old else {
        return Err(StoreError::not_found("task", task_id));
    };

    sqlx::query(
        "UPDATE task_assignees SET status = 'cancelled', \
           status_updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
         WHERE task_id = ?1 AND status != 'completed'",
    )
    .bind(task_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE tasks SET status = 'cancelled', \
           updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
         WHERE task_id = ?1",
    )
    .bind(task_id)
    .execute(&mut *conn)
    .await?;

    super::tasks::record_history(
        conn,
        task_id,
        "status",
        Some(&old_status),
        Some(TaskStatus::Cancelled.as_str()),
        changed_by,
    )
    .await
}
