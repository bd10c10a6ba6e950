//! Who hears about what. Pure, ordered, and deduplicated.

use std::collections::HashSet;

/// The people connected to one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskAudience {
    /// Task creator.
    pub creator: i64,
    /// Active assignees (declined assignees excluded).
    pub assignees: Vec<i64>,
    /// Admins of the task's group.
    pub group_admins: Vec<i64>,
    /// Configured super admins.
    pub super_admins: Vec<i64>,
}

/// How a recipient relates to a newly created task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedRole {
    /// The task is assigned to them.
    Assignee,
    /// They administer the task's group.
    GroupAdmin,
    /// They oversee the whole system.
    SuperAdmin,
}

/// Ordered recipient list that ignores repeats and excluded ids.
#[derive(Debug, Default)]
struct RecipientList<T> {
    seen: HashSet<i64>,
    out: Vec<T>,
}

impl<T> RecipientList<T> {
    fn excluding(ids: &[i64]) -> Self {
        Self {
            seen: ids.iter().copied().collect(),
            out: Vec::new(),
        }
    }

    fn push_with(&mut self, user_id: i64, item: T) {
        if self.seen.insert(user_id) {
            self.out.push(item);
        }
    }
}

impl RecipientList<i64> {
    fn push(&mut self, user_id: i64) {
        self.push_with(user_id, user_id);
    }

    fn extend(&mut self, ids: &[i64]) {
        for id in ids {
            self.push(*id);
        }
    }
}

/// Recipients of a new-task notice, each with the variant they should get.
///
/// Assignees first, then super admins, then group admins. The creator is
/// never told about their own task.
pub fn created_recipients(audience: &TaskAudience) -> Vec<(i64, CreatedRole)> {
    let mut list = RecipientList::excluding(&[audience.creator]);
    for id in &audience.assignees {
        list.push_with(*id, (*id, CreatedRole::Assignee));
    }
    for id in &audience.super_admins {
        list.push_with(*id, (*id, CreatedRole::SuperAdmin));
    }
    for id in &audience.group_admins {
        list.push_with(*id, (*id, CreatedRole::GroupAdmin));
    }
    list.out
}

/// Recipients of a status-change notice.
///
/// The creator first (unless they already receive it as an admin), then
/// super admins, then group admins. The user who made the change is left out.
pub fn status_change_recipients(audience: &TaskAudience, actor: i64) -> Vec<i64> {
    let mut list = RecipientList::excluding(&[actor]);
    let creator_is_admin = audience.super_admins.contains(&audience.creator)
        || audience.group_admins.contains(&audience.creator);
    if !creator_is_admin {
        list.push(audience.creator);
    }
    list.extend(&audience.super_admins);
    list.extend(&audience.group_admins);
    list.out
}

/// Recipients of a claim or decline notice: the creator and group admins.
pub fn response_recipients(audience: &TaskAudience, actor: i64) -> Vec<i64> {
    let mut list = RecipientList::excluding(&[actor]);
    list.push(audience.creator);
    list.extend(&audience.group_admins);
    list.out
}

/// Recipients of an overdue reminder: assignees, creator, super admins,
/// then group admins.
pub fn overdue_recipients(audience: &TaskAudience) -> Vec<i64> {
    let mut list = RecipientList::excluding(&[]);
    list.extend(&audience.assignees);
    list.push(audience.creator);
    list.extend(&audience.super_admins);
    list.extend(&audience.group_admins);
    list.out
}

/// Recipients of an open-task broadcast: the candidate pool minus the creator.
pub fn open_task_recipients(creator: i64, pool: &[i64]) -> Vec<i64> {
    let mut list = RecipientList::excluding(&[creator]);
    list.extend(pool);
    list.out
}
