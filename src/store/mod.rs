//! SQLite persistence for users, groups, tasks, and their assignments.
//!
//! [`Store`] is the only gateway to the database. The schema lives in
//! `migrations/001_schema.sql` and is applied inline on open, the same way
//! for file-backed and in-memory pools. Accessors are grouped by entity in
//! the submodules; each adds an `impl Store` block.

pub mod assignees;
pub mod groups;
pub mod registration;
pub mod stats;
pub mod tasks;
pub mod users;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::lifecycle::TaskStatus;

pub use self::assignees::{ClaimOutcome, DeclineOutcome, StatusChange};
pub use self::groups::GroupOverview;
pub use self::registration::{RegistrationRequest, RegistrationStatus};
pub use self::stats::{OverallStats, WorkerStats};
pub use self::tasks::{NewMedia, NewTask, TaskEdit, TaskFilter};
pub use self::users::CancelSummary;

/// Schema applied on every open. Statements are idempotent.
const SCHEMA_SQL: &str = include_str!("../../migrations/001_schema.sql");

/// How long a writer waits for the database lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest task title, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Longest task description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Maximum number of photos and videos attached to one task.
pub const MAX_MEDIA_PER_TASK: usize = 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity looked up.
        entity: &'static str,
        /// Identifier that was not found.
        id: i64,
    },

    /// A uniqueness rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An invalid enum value was read from the database or supplied by a caller.
    #[error("invalid {field} value: {value:?}")]
    InvalidEnum {
        /// Which field contained the bad value.
        field: &'static str,
        /// The unexpected value.
        value: String,
    },

    /// Caller input failed validation.
    #[error("{0}")]
    Validation(String),

    /// The task already holds the maximum number of media files.
    #[error("a task holds at most {MAX_MEDIA_PER_TASK} media files")]
    MediaLimit,
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Map a unique-constraint failure to [`StoreError::Conflict`].
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: impl Into<String>) -> StoreError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Conflict(what.into())
        }
        other => StoreError::Database(other),
    }
}

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

/// A person known to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Telegram user id.
    pub user_id: i64,
    /// Display name.
    pub name: String,
    /// Telegram @username, if any.
    pub username: Option<String>,
    /// Approved by a super admin.
    pub registered: bool,
    /// Banned users cannot act and receive no notifications.
    pub banned: bool,
    /// Soft-deleted.
    pub deleted: bool,
    /// When the user was first seen (ISO 8601).
    pub created_at: String,
}

impl User {
    /// Neither banned nor deleted.
    pub fn is_active(&self) -> bool {
        !self.banned && !self.deleted
    }
}

/// An organisational group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Row id.
    pub group_id: i64,
    /// Unique name.
    pub name: String,
    /// Creation time (ISO 8601).
    pub created_at: String,
}

/// A task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Row id.
    pub task_id: i64,
    /// Short title.
    pub title: String,
    /// Free-form description, possibly empty.
    pub description: String,
    /// Due date, `YYYY-MM-DD`.
    pub due_date: String,
    /// Due time, `HH:MM`.
    pub due_time: String,
    /// Group the task belongs to, if any.
    pub group_id: Option<i64>,
    /// Aggregate status.
    pub status: TaskStatus,
    /// Creator's user id.
    pub created_by: i64,
    /// Whether media files are attached.
    pub has_media: bool,
    /// Creation time (ISO 8601).
    pub created_at: String,
    /// Last modification time (ISO 8601).
    pub updated_at: String,
}

/// One assignee's part in a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    /// Task id.
    pub task_id: i64,
    /// Assignee's user id.
    pub user_id: i64,
    /// Assignee's display name (falls back to the id for unknown users).
    pub name: String,
    /// Personal status.
    pub status: TaskStatus,
    /// When the personal status last changed (ISO 8601).
    pub status_updated_at: String,
}

/// Kind of an attached media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A photo.
    Photo,
    /// A video.
    Video,
}

impl MediaKind {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised media kind.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            other => Err(StoreError::InvalidEnum {
                field: "kind",
                value: other.to_owned(),
            }),
        }
    }
}

/// A media file attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    /// Row id.
    pub media_id: i64,
    /// Owning task.
    pub task_id: i64,
    /// Photo or video.
    pub kind: MediaKind,
    /// Telegram file id.
    pub file_id: String,
    /// Order within the task.
    pub position: i64,
}

/// One entry of a task's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Row id.
    pub history_id: i64,
    /// Task id.
    pub task_id: i64,
    /// What happened (`created`, `status`, `edit_title`, ...).
    pub action: String,
    /// Previous value, if meaningful.
    pub old_value: Option<String>,
    /// New value, if meaningful.
    pub new_value: Option<String>,
    /// Who made the change.
    pub changed_by: i64,
    /// When (ISO 8601).
    pub changed_at: String,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the taskdesk database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or the migration fails.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Validation(format!(
                        "failed to create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("trusted_schema", "OFF")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "database opened");
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the migration fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction that holds the write lock from its first statement.
    ///
    /// Read-then-write sequences start here, so concurrent writers queue on
    /// the busy timeout.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Convert a count returned by SQLite into `u64`.
pub(crate) fn count_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}
