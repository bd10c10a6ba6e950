//! Groups, memberships, and group admin roles.

use serde::Serialize;
use tracing::info;

use super::users::{cancel_task_on, register_user_on, row_to_user, UserRow};
use super::{conflict_on_unique, Group, Store, StoreError, User};

type GroupRow = (i64, String, String);

fn row_to_group((group_id, name, created_at): GroupRow) -> Group {
    Group {
        group_id,
        name,
        created_at,
    }
}

/// A group with its members and admins, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOverview {
    /// The group.
    pub group: Group,
    /// Active members.
    pub members: Vec<User>,
    /// Admin user ids.
    pub admins: Vec<i64>,
}

fn validate_group_name(name: &str) -> Result<&str, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("group name must not be empty".to_owned()));
    }
    Ok(name)
}

impl Store {
    /// Create a group. Names are unique.
    pub async fn create_group(&self, name: &str) -> Result<Group, StoreError> {
        let name = validate_group_name(name)?;
        let result = sqlx::query("INSERT INTO groups (name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, format!("group '{name}' already exists")))?;

        let group_id = result.last_insert_rowid();
        info!(group_id, name, "group created");
        self.require_group(group_id).await
    }

    /// Rename a group.
    pub async fn rename_group(&self, group_id: i64, name: &str) -> Result<(), StoreError> {
        let name = validate_group_name(name)?;
        let result = sqlx::query("UPDATE groups SET name = ?1 WHERE group_id = ?2")
            .bind(name)
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, format!("group '{name}' already exists")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("group", group_id));
        }
        Ok(())
    }

    /// Delete a group. Its open tasks are cancelled first; memberships and
    /// admin roles go with the group. Returns the cancelled task ids.
    pub async fn delete_group(&self, group_id: i64, changed_by: i64) -> Result<Vec<i64>, StoreError> {
        let mut tx = self.begin_write().await?;

        let open: Vec<(i64,)> = sqlx::query_as(
            "SELECT task_id FROM tasks WHERE group_id = ?1 AND status IN ('pending', 'in_progress')",
        )
        .bind(group_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut cancelled = Vec::with_capacity(open.len());
        for (task_id,) in open {
            cancel_task_on(&mut tx, task_id, changed_by).await?;
            cancelled.push(task_id);
        }

        let result = sqlx::query("DELETE FROM groups WHERE group_id = ?1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("group", group_id));
        }
        tx.commit().await?;

        info!(group_id, cancelled = cancelled.len(), "group deleted");
        Ok(cancelled)
    }

    /// Look up a group by id.
    pub async fn get_group(&self, group_id: i64) -> Result<Option<Group>, StoreError> {
        let row: Option<GroupRow> =
            sqlx::query_as("SELECT group_id, name, created_at FROM groups WHERE group_id = ?1")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(row_to_group))
    }

    /// Look up a group by id, failing with [`StoreError::NotFound`].
    pub async fn require_group(&self, group_id: i64) -> Result<Group, StoreError> {
        self.get_group(group_id)
            .await?
            .ok_or_else(|| StoreError::not_found("group", group_id))
    }

    /// All groups ordered by name.
    pub async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT group_id, name, created_at FROM groups ORDER BY name COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_group).collect())
    }

    /// All groups with members and admins.
    pub async fn group_overviews(&self) -> Result<Vec<GroupOverview>, StoreError> {
        let groups = self.list_groups().await?;
        let mut overviews = Vec::with_capacity(groups.len());
        for group in groups {
            let members = self.group_members(group.group_id).await?;
            let admins = self.group_admins(group.group_id).await?;
            overviews.push(GroupOverview {
                group,
                members,
                admins,
            });
        }
        Ok(overviews)
    }

    /// Add a user to a group. Returns `false` if they already belonged.
    pub async fn add_member(&self, group_id: i64, user_id: i64) -> Result<bool, StoreError> {
        self.require_group(group_id).await?;
        self.require_user(user_id).await?;
        let result = sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Add a person by Telegram id and name straight into a group.
    ///
    /// Unknown ids become registered users; known ones are registered and
    /// renamed. Banned or deleted users are refused. Returns the user and
    /// whether the membership is new.
    pub async fn add_user_to_group(
        &self,
        group_id: i64,
        user_id: i64,
        name: &str,
    ) -> Result<(User, bool), StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("user name must not be empty".to_owned()));
        }
        self.require_group(group_id).await?;

        let mut tx = self.begin_write().await?;
        let state: Option<(bool, bool)> =
            sqlx::query_as("SELECT banned, deleted FROM users WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some((banned, deleted)) = state {
            if banned || deleted {
                return Err(StoreError::Validation(format!(
                    "user {user_id} is banned or deleted"
                )));
            }
        }

        register_user_on(&mut tx, user_id, name, None).await?;
        let result = sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let added = result.rows_affected() > 0;
        info!(group_id, user_id, added, "user added to group");
        Ok((self.require_user(user_id).await?, added))
    }

    /// Remove a user from a group, including any admin role there.
    pub async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<bool, StoreError> {
        let mut tx = self.begin_write().await?;
        sqlx::query("DELETE FROM group_admins WHERE group_id = ?1 AND admin_id = ?2")
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM user_groups WHERE group_id = ?1 AND user_id = ?2")
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Make a user an admin of a group. Admins are members too.
    pub async fn add_group_admin(&self, group_id: i64, user_id: i64) -> Result<bool, StoreError> {
        self.require_group(group_id).await?;
        self.require_user(user_id).await?;

        let mut tx = self.begin_write().await?;
        let result =
            sqlx::query("INSERT OR IGNORE INTO group_admins (group_id, admin_id) VALUES (?1, ?2)")
                .bind(group_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(group_id, user_id, "group admin added");
        Ok(result.rows_affected() > 0)
    }

    /// Revoke a group admin role. Membership is kept.
    pub async fn remove_group_admin(&self, group_id: i64, user_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM group_admins WHERE group_id = ?1 AND admin_id = ?2")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Active members of a group ordered by name.
    pub async fn group_members(&self, group_id: i64) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT u.user_id, u.name, u.username, u.registered, u.banned, u.deleted, u.created_at \
             FROM users u JOIN user_groups g ON g.user_id = u.user_id \
             WHERE g.group_id = ?1 AND u.banned = 0 AND u.deleted = 0 \
             ORDER BY u.name COLLATE NOCASE, u.user_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_user).collect())
    }

    /// Admin user ids of a group.
    pub async fn group_admins(&self, group_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT admin_id FROM group_admins WHERE group_id = ?1 ORDER BY rowid")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Groups a user belongs to.
    pub async fn user_groups(&self, user_id: i64) -> Result<Vec<Group>, StoreError> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT g.group_id, g.name, g.created_at FROM groups g \
             JOIN user_groups m ON m.group_id = g.group_id \
             WHERE m.user_id = ?1 ORDER BY g.name COLLATE NOCASE",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_group).collect())
    }

    /// Groups a user administers.
    pub async fn admin_groups(&self, user_id: i64) -> Result<Vec<Group>, StoreError> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT g.group_id, g.name, g.created_at FROM groups g \
             JOIN group_admins a ON a.group_id = g.group_id \
             WHERE a.admin_id = ?1 ORDER BY g.name COLLATE NOCASE",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_group).collect())
    }
}
