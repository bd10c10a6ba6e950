//! Permission checks.
//!
//! Pure functions over an [`Actor`] snapshot. The handler layer loads the
//! snapshot from the store and config once per request, so nothing here
//! touches the database.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::store::{Assignee, Store, StoreError, Task, User};

/// Who is acting, with the role facts the checks need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    /// Telegram user id.
    pub user_id: i64,
    /// Listed in config as super admin.
    pub is_super_admin: bool,
    /// Approved by a super admin.
    pub registered: bool,
    /// Banned or deleted.
    pub banned: bool,
    /// Groups the actor administers.
    pub admin_groups: BTreeSet<i64>,
    /// Groups the actor belongs to.
    pub member_groups: BTreeSet<i64>,
}

impl Actor {
    /// Build the snapshot for `user_id` from the store and config.
    ///
    /// Unknown users get an unregistered snapshot.
    pub async fn load(store: &Store, config: &Config, user_id: i64) -> Result<Self, StoreError> {
        let user = store.get_user(user_id).await?;
        let admin_groups = store
            .admin_groups(user_id)
            .await?
            .into_iter()
            .map(|g| g.group_id)
            .collect();
        let member_groups = store
            .user_groups(user_id)
            .await?
            .into_iter()
            .map(|g| g.group_id)
            .collect();
        let is_super_admin = config.is_super_admin(user_id);

        Ok(Self {
            user_id,
            is_super_admin,
            registered: is_super_admin || user.as_ref().is_some_and(|u| u.registered),
            banned: user.as_ref().is_some_and(|u| !u.is_active()),
            admin_groups,
            member_groups,
        })
    }

    /// Administers at least one group.
    pub fn is_any_group_admin(&self) -> bool {
        !self.admin_groups.is_empty()
    }

    /// Role name for menus and logs.
    pub fn role(&self) -> Role {
        if self.is_super_admin {
            Role::SuperAdmin
        } else if self.banned {
            Role::Banned
        } else if !self.registered {
            Role::Unregistered
        } else if self.is_any_group_admin() {
            Role::GroupAdmin
        } else if self.member_groups.is_empty() {
            Role::Ungrouped
        } else {
            Role::Worker
        }
    }
}

/// Coarse role used to pick menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Configured super admin.
    SuperAdmin,
    /// Admin of one or more groups.
    GroupAdmin,
    /// Registered member of a group.
    Worker,
    /// Registered, but not yet placed in a group.
    Ungrouped,
    /// Not registered yet.
    Unregistered,
    /// Banned or deleted.
    Banned,
}

/// Whether `user_id` is a configured super admin.
pub fn is_super_admin(user_id: i64, config: &Config) -> bool {
    config.is_super_admin(user_id)
}

/// Whether the actor administers `group_id`.
pub fn is_group_admin(actor: &Actor, group_id: i64) -> bool {
    actor.admin_groups.contains(&group_id)
}

/// Managing groups, users, and registrations is reserved to super admins.
pub fn can_manage_system(actor: &Actor) -> bool {
    actor.is_super_admin
}

/// Any registered, non-banned user may create tasks.
pub fn can_create_task(actor: &Actor) -> bool {
    actor.is_super_admin || (actor.registered && !actor.banned)
}

/// Super admins, the creator, assignees, and admins of the task's group see a task.
pub fn can_view_task(actor: &Actor, task: &Task, assignees: &[Assignee]) -> bool {
    if actor.is_super_admin || task.created_by == actor.user_id {
        return true;
    }
    if actor.banned {
        return false;
    }
    if assignees.iter().any(|a| a.user_id == actor.user_id) {
        return true;
    }
    task.group_id.is_some_and(|g| is_group_admin(actor, g))
}

/// Super admins, the creator, and admins of any group the creator belongs
/// to may edit a task.
pub fn can_edit_task(actor: &Actor, task: &Task, creator_groups: &[i64]) -> bool {
    if actor.is_super_admin {
        return true;
    }
    if actor.banned {
        return false;
    }
    if task.created_by == actor.user_id {
        return true;
    }
    creator_groups.iter().any(|g| is_group_admin(actor, *g))
}

/// Only an assignee changes their own status.
pub fn can_change_assignee_status(actor: &Actor, assignees: &[Assignee]) -> bool {
    !actor.banned && assignees.iter().any(|a| a.user_id == actor.user_id)
}

/// Overriding the task status is an edit.
pub fn can_set_task_status(actor: &Actor, task: &Task, creator_groups: &[i64]) -> bool {
    can_edit_task(actor, task, creator_groups)
}

/// Open tasks can be claimed by registered users who could see the task's group.
pub fn can_claim_task(actor: &Actor, task: &Task) -> bool {
    if actor.banned || !actor.registered {
        return false;
    }
    match task.group_id {
        Some(g) => actor.is_super_admin || actor.member_groups.contains(&g),
        None => true,
    }
}

/// Which users an actor may assign tasks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignScope {
    /// Any active user.
    Everyone,
    /// Members of these groups, optionally their admins, and the actor.
    Groups {
        /// Groups whose members are assignable.
        groups: BTreeSet<i64>,
        /// Whether those groups' admins are assignable too.
        include_admins: bool,
    },
    /// Only the actor.
    SelfOnly,
}

/// Compute an actor's assign scope.
///
/// Super admins may assign anyone. Group admins may assign members of the
/// groups they administer or belong to. Workers may assign members of their
/// own groups and those groups' admins. A worker without a group may only
/// assign themselves. Everyone may assign themselves.
pub fn assignable_scope(actor: &Actor) -> AssignScope {
    if actor.is_super_admin {
        return AssignScope::Everyone;
    }
    if actor.is_any_group_admin() {
        let groups = actor
            .admin_groups
            .union(&actor.member_groups)
            .copied()
            .collect();
        return AssignScope::Groups {
            groups,
            include_admins: false,
        };
    }
    if actor.member_groups.is_empty() {
        return AssignScope::SelfOnly;
    }
    AssignScope::Groups {
        groups: actor.member_groups.clone(),
        include_admins: true,
    }
}

/// A user together with the group facts needed to test assignability.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The user.
    pub user: User,
    /// Groups the user belongs to.
    pub member_of: BTreeSet<i64>,
    /// Groups the user administers.
    pub admin_of: BTreeSet<i64>,
}

/// Whether one candidate falls inside an actor's scope.
pub fn is_assignable(actor: &Actor, scope: &AssignScope, candidate: &Candidate) -> bool {
    if !candidate.user.is_active() {
        return false;
    }
    if candidate.user.user_id == actor.user_id {
        return true;
    }
    if !candidate.user.registered {
        return false;
    }
    match scope {
        AssignScope::Everyone => true,
        AssignScope::SelfOnly => false,
        AssignScope::Groups {
            groups,
            include_admins,
        } => {
            !candidate.member_of.is_disjoint(groups)
                || (*include_admins && !candidate.admin_of.is_disjoint(groups))
        }
    }
}

/// Keep the candidates an actor may assign, preserving order.
pub fn filter_assignable(actor: &Actor, candidates: Vec<Candidate>) -> Vec<User> {
    let scope = assignable_scope(actor);
    candidates
        .into_iter()
        .filter(|c| is_assignable(actor, &scope, c))
        .map(|c| c.user)
        .collect()
}

/// Load candidates for every active user and filter them for `actor`.
pub async fn assignable_users(store: &Store, actor: &Actor) -> Result<Vec<User>, StoreError> {
    let users = store.list_users(false).await?;
    let mut candidates = Vec::with_capacity(users.len());
    for user in users {
        let member_of = store
            .user_groups(user.user_id)
            .await?
            .into_iter()
            .map(|g| g.group_id)
            .collect();
        let admin_of = store
            .admin_groups(user.user_id)
            .await?
            .into_iter()
            .map(|g| g.group_id)
            .collect();
        candidates.push(Candidate {
            user,
            member_of,
            admin_of,
        });
    }
    Ok(filter_assignable(actor, candidates))
}
