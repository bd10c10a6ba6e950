//! Task rows, media, history, and filtered listings.

use sqlx::SqliteConnection;
use tracing::info;

use super::users::cancel_task_on;
use super::{
    HistoryEntry, Media, MediaKind, Store, StoreError, Task, MAX_DESCRIPTION_CHARS,
    MAX_MEDIA_PER_TASK, MAX_TITLE_CHARS,
};
use crate::lifecycle::{self, TaskStatus};

type TaskRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<i64>,
    String,
    i64,
    bool,
    String,
    String,
);

const TASK_COLUMNS: &str = "t.task_id, t.title, t.description, t.due_date, t.due_time, \
     t.group_id, t.status, t.created_by, t.has_media, t.created_at, t.updated_at";

fn row_to_task(row: TaskRow) -> Result<Task, StoreError> {
    let (
        task_id,
        title,
        description,
        due_date,
        due_time,
        group_id,
        status,
        created_by,
        has_media,
        created_at,
        updated_at,
    ) = row;
    Ok(Task {
        task_id,
        title,
        description,
        due_date,
        due_time,
        group_id,
        status: TaskStatus::parse(&status)?,
        created_by,
        has_media,
        created_at,
        updated_at,
    })
}

/// A media file to attach when creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedia {
    /// Photo or video.
    pub kind: MediaKind,
    /// Telegram file id.
    pub file_id: String,
}

/// Input for [`Store::create_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Short title (required).
    pub title: String,
    /// Description, may be empty.
    pub description: String,
    /// Due date, `YYYY-MM-DD`.
    pub due_date: String,
    /// Due time, `H:MM` or `HH:MM`.
    pub due_time: String,
    /// Owning group, if any.
    pub group_id: Option<i64>,
    /// Creator's user id.
    pub created_by: i64,
    /// Initial assignees. Empty makes an open task.
    pub assignees: Vec<i64>,
    /// Attached media.
    pub media: Vec<NewMedia>,
}

/// Field changes for [`Store::update_task_fields`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New due date.
    pub due_date: Option<String>,
    /// New due time.
    pub due_time: Option<String>,
}

/// Filter for [`Store::list_tasks`]. Unset fields do not restrict.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    /// Only tasks created by this user.
    pub created_by: Option<i64>,
    /// Only tasks assigned to this user.
    pub assignee: Option<i64>,
    /// With `assignee`, skip assignments that user declined.
    pub skip_declined: bool,
    /// Only tasks of this group.
    pub group_id: Option<i64>,
    /// Only tasks in one of these statuses. Empty means any.
    pub statuses: Vec<TaskStatus>,
    /// Maximum number of rows.
    pub limit: usize,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            created_by: None,
            assignee: None,
            skip_declined: false,
            group_id: None,
            statuses: Vec::new(),
            limit: 20,
        }
    }
}

impl TaskFilter {
    /// Pending and in-progress tasks.
    pub fn active(limit: usize) -> Self {
        Self {
            statuses: vec![TaskStatus::Pending, TaskStatus::InProgress],
            limit,
            ..Self::default()
        }
    }

    /// Completed and cancelled tasks.
    pub fn archived(limit: usize) -> Self {
        Self {
            statuses: vec![TaskStatus::Completed, TaskStatus::Cancelled],
            limit,
            ..Self::default()
        }
    }
}

fn validate_title(title: &str) -> Result<&str, StoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::Validation("title must not be empty".to_owned()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(StoreError::Validation(format!(
            "title is limited to {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title)
}

fn validate_description(description: &str) -> Result<&str, StoreError> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(StoreError::Validation(format!(
            "description is limited to {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(description)
}

/// Append an entry to a task's audit trail.
pub(crate) async fn record_history(
    conn: &mut SqliteConnection,
    task_id: i64,
    action: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    changed_by: i64,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO task_history (task_id, action, old_value, new_value, changed_by) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(task_id)
    .bind(action)
    .bind(old_value)
    .bind(new_value)
    .bind(changed_by)
    .execute(conn)
    .await?;
    Ok(())
}

impl Store {
    /// Create a task with its assignees and media in one transaction.
    ///
    /// The title must be non-empty, title and description must fit their
    /// length caps, the due date and time must parse, and at most
    /// [`MAX_MEDIA_PER_TASK`] media files may be attached. Duplicate
    /// assignees are collapsed. Returns the new task id.
    pub async fn create_task(&self, new: &NewTask) -> Result<i64, StoreError> {
        let title = validate_title(&new.title)?;
        let description = validate_description(&new.description)?;
        let due_date = lifecycle::parse_due_date(&new.due_date)?
            .format("%Y-%m-%d")
            .to_string();
        let due_time = lifecycle::parse_due_time(&new.due_time)?;
        if new.media.len() > MAX_MEDIA_PER_TASK {
            return Err(StoreError::MediaLimit);
        }

        let mut tx = self.begin_write().await?;

        let result = sqlx::query(
            "INSERT INTO tasks (title, description, due_date, due_time, group_id, created_by, has_media) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(title)
        .bind(description)
        .bind(&due_date)
        .bind(&due_time)
        .bind(new.group_id)
        .bind(new.created_by)
        .bind(!new.media.is_empty())
        .execute(&mut *tx)
        .await?;
        let task_id = result.last_insert_rowid();

        for user_id in &new.assignees {
            sqlx::query("INSERT OR IGNORE INTO task_assignees (task_id, user_id) VALUES (?1, ?2)")
                .bind(task_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        for (position, media) in new.media.iter().enumerate() {
            sqlx::query(
                "INSERT INTO task_media (task_id, kind, file_id, position) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(task_id)
            .bind(media.kind.as_str())
            .bind(&media.file_id)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await?;
        }

        record_history(&mut tx, task_id, "created", None, Some(title), new.created_by).await?;
        tx.commit().await?;

        info!(
            task_id,
            created_by = new.created_by,
            assignees = new.assignees.len(),
            media = new.media.len(),
            "task created"
        );
        Ok(task_id)
    }

    /// Look up a task by id.
    pub async fn get_task(&self, task_id: i64) -> Result<Option<Task>, StoreError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.task_id = ?1");
        let row: Option<TaskRow> = sqlx::query_as(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_task).transpose()
    }

    /// Look up a task by id, failing with [`StoreError::NotFound`].
    pub async fn require_task(&self, task_id: i64) -> Result<Task, StoreError> {
        self.get_task(task_id)
            .await?
            .ok_or_else(|| StoreError::not_found("task", task_id))
    }

    /// Delete a task together with its assignees, media, and history.
    pub async fn delete_task(&self, task_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = ?1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", task_id));
        }
        info!(task_id, "task deleted");
        Ok(())
    }

    /// Apply field edits, recording one history entry per changed field.
    pub async fn update_task_fields(
        &self,
        task_id: i64,
        edit: &TaskEdit,
        changed_by: i64,
    ) -> Result<Task, StoreError> {
        let current = self.require_task(task_id).await?;

        let mut changes: Vec<(&'static str, &'static str, String, String)> = Vec::new();
        if let Some(ref title) = edit.title {
            let title = validate_title(title)?;
            changes.push(("title", "edit_title", current.title.clone(), title.to_owned()));
        }
        if let Some(ref description) = edit.description {
            let description = validate_description(description)?;
            changes.push((
                "description",
                "edit_description",
                current.description.clone(),
                description.to_owned(),
            ));
        }
        if let Some(ref date) = edit.due_date {
            let date = lifecycle::parse_due_date(date)?.format("%Y-%m-%d").to_string();
            changes.push(("due_date", "edit_date", current.due_date.clone(), date));
        }
        if let Some(ref time) = edit.due_time {
            let time = lifecycle::parse_due_time(time)?;
            changes.push(("due_time", "edit_time", current.due_time.clone(), time));
        }

        let mut tx = self.begin_write().await?;
        for (column, action, old, new) in &changes {
            if old == new {
                continue;
            }
            // Column names come from the fixed list above.
            let sql = format!(
                "UPDATE tasks SET {column} = ?1, \
                   updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
                 WHERE task_id = ?2"
            );
            sqlx::query(&sql)
                .bind(new)
                .bind(task_id)
                .execute(&mut *tx)
                .await?;
            record_history(&mut tx, task_id, action, Some(old), Some(new), changed_by).await?;
        }
        tx.commit().await?;

        self.require_task(task_id).await
    }

    /// Set the task status directly, as an editor override.
    ///
    /// Cancelling also cancels every unfinished assignment. Returns the
    /// previous status.
    pub async fn set_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        changed_by: i64,
    ) -> Result<TaskStatus, StoreError> {
        let current = self.require_task(task_id).await?;
        if current.status == status {
            return Ok(current.status);
        }

        let mut tx = self.begin_write().await?;
        if status == TaskStatus::Cancelled {
            cancel_task_on(&mut tx, task_id, changed_by).await?;
        } else {
            sqlx::query(
                "UPDATE tasks SET status = ?1, \
                   updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
                 WHERE task_id = ?2",
            )
            .bind(status.as_str())
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
            record_history(
                &mut tx,
                task_id,
                "status",
                Some(current.status.as_str()),
                Some(status.as_str()),
                changed_by,
            )
            .await?;
        }
        tx.commit().await?;

        info!(task_id, from = %current.status, to = %status, changed_by, "task status overridden");
        Ok(current.status)
    }

    /// List tasks matching a filter, ordered by deadline.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let statuses: Vec<&str> = filter.statuses.iter().map(TaskStatus::as_str).collect();
        let statuses_json = if statuses.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&statuses)
                    .map_err(|e| StoreError::Database(sqlx::Error::Encode(Box::new(e))))?,
            )
        };
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             WHERE (?1 IS NULL OR t.created_by = ?1) \
               AND (?2 IS NULL OR EXISTS (SELECT 1 FROM task_assignees a \
                                          WHERE a.task_id = t.task_id AND a.user_id = ?2 \
                                            AND (?6 = 0 OR a.status != 'cancelled'))) \
               AND (?3 IS NULL OR t.group_id = ?3) \
               AND (?4 IS NULL OR t.status IN (SELECT value FROM json_each(?4))) \
             ORDER BY t.due_date, t.due_time, t.task_id \
             LIMIT ?5"
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&sql)
            .bind(filter.created_by)
            .bind(filter.assignee)
            .bind(filter.group_id)
            .bind(statuses_json)
            .bind(limit)
            .bind(filter.skip_declined)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_task).collect()
    }

    /// Tasks that can still become overdue: every pending or in-progress task.
    pub async fn overdue_candidates(&self) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             WHERE t.status IN ('pending', 'in_progress') \
             ORDER BY t.due_date, t.due_time, t.task_id"
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_task).collect()
    }

    /// Audit trail of a task, oldest first.
    pub async fn task_history(&self, task_id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows: Vec<(i64, i64, String, Option<String>, Option<String>, i64, String)> =
            sqlx::query_as(
                "SELECT history_id, task_id, action, old_value, new_value, changed_by, changed_at \
                 FROM task_history WHERE task_id = ?1 ORDER BY history_id",
            )
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(
                |(history_id, task_id, action, old_value, new_value, changed_by, changed_at)| {
                    HistoryEntry {
                        history_id,
                        task_id,
                        action,
                        old_value,
                        new_value,
                        changed_by,
                        changed_at,
                    }
                },
            )
            .collect())
    }

    /// Attach a media file to an existing task.
    pub async fn add_media(
        &self,
        task_id: i64,
        kind: MediaKind,
        file_id: &str,
    ) -> Result<i64, StoreError> {
        let mut tx = self.begin_write().await?;

        let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM task_media WHERE task_id = ?1")
            .bind(task_id)
            .fetch_one(&mut *tx)
            .await?;
        if usize::try_from(count).unwrap_or(usize::MAX) >= MAX_MEDIA_PER_TASK {
            return Err(StoreError::MediaLimit);
        }

        let result = sqlx::query(
            "INSERT INTO task_media (task_id, kind, file_id, position) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(task_id)
        .bind(kind.as_str())
        .bind(file_id)
        .bind(count)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE tasks SET has_media = 1 WHERE task_id = ?1")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    /// Media attached to a task, in upload order.
    pub async fn task_media(&self, task_id: i64) -> Result<Vec<Media>, StoreError> {
        let rows: Vec<(i64, i64, String, String, i64)> = sqlx::query_as(
            "SELECT media_id, task_id, kind, file_id, position FROM task_media \
             WHERE task_id = ?1 ORDER BY position, media_id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(media_id, task_id, kind, file_id, position)| {
                Ok(Media {
                    media_id,
                    task_id,
                    kind: MediaKind::parse(&kind)?,
                    file_id,
                    position,
                })
            })
            .collect()
    }
}
