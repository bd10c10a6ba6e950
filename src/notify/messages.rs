//! Notification texts.

use crate::lifecycle::TaskStatus;
use crate::reply::{escape_html, truncate, Action, Button, MenuItem, Reply};
use crate::store::{RegistrationRequest, Task};

use super::recipients::CreatedRole;

fn view_button(task_id: i64) -> Button {
    Button::new("\u{1F4CB} View task", Action::View(task_id))
}

fn task_line(task: &Task) -> String {
    format!(
        "\u{1F4DD} <b>#{}</b> {}\n\u{1F4C5} Due: {} {}",
        task.task_id,
        escape_html(&truncate(&task.title, 100)),
        task.due_date,
        task.due_time
    )
}

/// New task notice, worded for the recipient's role.
pub fn task_created(task: &Task, role: CreatedRole) -> Reply {
    let heading = match role {
        CreatedRole::Assignee => "\u{1F4CB} <b>New task assigned to you</b>",
        CreatedRole::GroupAdmin => "\u{1F4CB} <b>New task in your group</b>",
        CreatedRole::SuperAdmin => "\u{1F4CB} <b>New task in the system</b>",
    };
    let mut reply = Reply::text(format!("{heading}\n\n{}", task_line(task)));
    if role == CreatedRole::Assignee {
        reply = reply.with_row(vec![
            Button::new("\u{25B6} Start", Action::Accept(task.task_id)),
            Button::new("\u{1F6AB} Decline", Action::Decline(task.task_id)),
        ]);
    }
    reply.with_button(view_button(task.task_id))
}

/// Broadcast for a task nobody is assigned to yet.
pub fn task_open(task: &Task) -> Reply {
    Reply::text(format!(
        "\u{1F4E2} <b>Open task</b>\n\n{}\n\nThe first to accept takes it.",
        task_line(task)
    ))
    .with_row(vec![
        Button::new("\u{2705} Accept", Action::Accept(task.task_id)),
        Button::new("\u{1F6AB} Decline", Action::Decline(task.task_id)),
    ])
}

/// Task status moved.
pub fn status_changed(task: &Task, old: TaskStatus, new: TaskStatus, changed_by: &str) -> Reply {
    Reply::text(format!(
        "\u{1F514} <b>Task status updated</b>\n\n{}\n\nStatus: {} \u{2192} {}\n\u{1F464} Changed by: {}",
        task_line(task),
        old.label(),
        new.label(),
        escape_html(changed_by)
    ))
    .with_button(view_button(task.task_id))
}

/// Someone claimed an open task.
pub fn task_claimed(task: &Task, by: &str) -> Reply {
    Reply::text(format!(
        "\u{1F91D} <b>Task taken</b>\n\n{}\n\nAccepted by {}.",
        task_line(task),
        escape_html(by)
    ))
    .with_button(view_button(task.task_id))
}

/// Someone declined a task.
pub fn task_declined(task: &Task, by: &str) -> Reply {
    Reply::text(format!(
        "\u{1F6AB} <b>Task declined</b>\n\n{}\n\nDeclined by {}.",
        task_line(task),
        escape_html(by)
    ))
    .with_button(view_button(task.task_id))
}

/// Deadline passed without completion.
pub fn overdue(task: &Task, hours_overdue: i64) -> Reply {
    Reply::text(format!(
        "\u{1F6A8} <b>Deadline missed</b>\n\n{}\n\u{23F0} Overdue by {hours_overdue} h\n\u{1F4CA} Status: {}\n\nThis task needs attention.",
        task_line(task),
        task.status.label()
    ))
    .with_button(view_button(task.task_id))
}

/// A user asked to join.
pub fn registration_requested(request: &RegistrationRequest) -> Reply {
    let username = request
        .username
        .as_deref()
        .map(|u| format!(" (@{})", escape_html(u)))
        .unwrap_or_default();
    Reply::text(format!(
        "\u{1F195} <b>Registration request #{}</b>\n\n{}{username}\nTelegram id: <code>{}</code>",
        request.request_id,
        escape_html(&request.name),
        request.user_id
    ))
    .with_row(vec![
        Button::new("\u{2705} Approve", Action::Approve(request.request_id)),
        Button::new("\u{274C} Reject", Action::Reject(request.request_id)),
    ])
}

/// Outcome of a user's own registration request.
pub fn registration_resolved(approved: bool) -> Reply {
    if approved {
        Reply::text(
            "\u{2705} Your registration was approved. An administrator will add you to a group.",
        )
        .with_button(Button::new("\u{1F3E0} Menu", Action::Menu(MenuItem::Home)))
    } else {
        Reply::text("\u{274C} Your registration was rejected. You may ask again with /register.")
    }
}

/// A task the user was on has been cancelled by the system.
pub fn task_cancelled(task: &Task, reason: &str) -> Reply {
    Reply::text(format!(
        "\u{274C} <b>Task cancelled</b>\n\n{}\n\nReason: {}",
        task_line(task),
        escape_html(reason)
    ))
}
