//! Super-admin actions: registration review, groups, and users.

use std::collections::BTreeSet;

use tracing::info;

use super::{home_button, notify_failed, HandlerContext, HandlerError, HandlerResult};
use crate::notify;
use crate::permissions;
use crate::reply::{escape_html, paginate, Action, Button, MenuItem, Reply};
use crate::store::{CancelSummary, RegistrationStatus, StoreError, User};

async fn require_super_admin(ctx: &HandlerContext, user_id: i64) -> HandlerResult<()> {
    let actor = ctx.actor(user_id).await?;
    if !permissions::can_manage_system(&actor) {
        return Err(HandlerError::Denied("Only super administrators can do that."));
    }
    Ok(())
}

fn user_label(user: &User) -> String {
    let mut label = format!("{} (<code>{}</code>)", escape_html(&user.name), user.user_id);
    if let Some(ref username) = user.username {
        label.push_str(&format!(" @{}", escape_html(username)));
    }
    label
}

/// Ensure a user exists, is active, and is registered.
async fn require_member_candidate(ctx: &HandlerContext, user_id: i64) -> HandlerResult<User> {
    let user = ctx.store.require_user(user_id).await?;
    if !user.is_active() {
        return Err(HandlerError::Invalid(format!("User {user_id} is banned or deleted.")));
    }
    if !user.registered {
        return Err(HandlerError::Invalid(format!("User {user_id} is not registered.")));
    }
    Ok(user)
}

// ---------------------------------------------------------------------------
// Registration review
// ---------------------------------------------------------------------------

/// Pending registration requests with approve and reject buttons.
pub async fn requests(ctx: &HandlerContext, user_id: i64) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    let pending = ctx.store.pending_registration_requests().await?;
    if pending.is_empty() {
        return Ok(Reply::text("\u{1F4E5} No pending registration requests.").with_button(home_button()));
    }

    let mut reply = Reply::text(format!("\u{1F4E5} <b>Pending requests</b> ({})", pending.len()));
    for request in &pending {
        let who = match request.username {
            Some(ref u) => format!("{} @{}", request.name, u),
            None => request.name.clone(),
        };
        reply = reply.with_row(vec![
            Button::new(format!("\u{2705} #{} {who}", request.request_id), Action::Approve(request.request_id)),
            Button::new("\u{274C} Reject", Action::Reject(request.request_id)),
        ]);
    }
    Ok(reply.with_button(home_button()))
}

/// Approve a registration request and tell the requester.
pub async fn approve(ctx: &HandlerContext, user_id: i64, request_id: i64) -> HandlerResult {
    review(ctx, user_id, request_id, true).await
}

/// Reject a registration request and tell the requester.
pub async fn reject(ctx: &HandlerContext, user_id: i64, request_id: i64) -> HandlerResult {
    review(ctx, user_id, request_id, false).await
}

async fn review(ctx: &HandlerContext, user_id: i64, request_id: i64, approved: bool) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;

    let request = ctx
        .store
        .get_registration_request(request_id)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "registration request",
            id: request_id,
        })?;
    if request.status != RegistrationStatus::Pending {
        return Err(HandlerError::Invalid(format!(
            "Request #{request_id} was already {}.",
            request.status.as_str()
        )));
    }

    let request = if approved {
        ctx.store.approve_registration(request_id, user_id).await?
    } else {
        ctx.store.reject_registration(request_id, user_id).await?
    };
    notify::registration_resolved(&*ctx.notifier, &request, approved).await;

    let verdict = if approved { "approved" } else { "rejected" };
    Ok(Reply::text(format!(
        "Request #{request_id} from {} {verdict}.",
        escape_html(&request.name)
    ))
    .with_button(Button::new("\u{1F4E5} Requests", Action::Menu(MenuItem::Requests))))
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// One page of groups with their members and admins.
pub async fn groups(ctx: &HandlerContext, user_id: i64, page: usize) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    let overviews = ctx.store.group_overviews().await?;
    if overviews.is_empty() {
        return Ok(Reply::text("No groups yet. Create one with /group_add &lt;name&gt;.")
            .with_button(home_button()));
    }

    let page = paginate(&overviews, page);
    let mut text = format!("\u{1F465} <b>Groups</b> ({})", overviews.len());
    if page.count > 1 {
        text.push_str(&format!(" \u{00B7} {}", page.label()));
    }
    text.push('\n');
    for o in page.items {
        text.push_str(&format!(
            "\n<b>#{} {}</b> \u{00B7} {} member(s)\n",
            o.group.group_id,
            escape_html(&o.group.name),
            o.members.len()
        ));
        for member in &o.members {
            let marker = if o.admins.contains(&member.user_id) { "\u{2B50}" } else { "\u{2022}" };
            text.push_str(&format!("  {marker} {}\n", user_label(member)));
        }
    }
    Ok(Reply::text(text)
        .with_row(page.nav_row(Action::GroupsPage))
        .with_button(home_button()))
}

/// Create a group.
pub async fn group_add(ctx: &HandlerContext, user_id: i64, name: &str) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    let group = ctx.store.create_group(name).await?;
    Ok(Reply::text(format!(
        "\u{2705} Group #{} <b>{}</b> created.",
        group.group_id,
        escape_html(&group.name)
    )))
}

/// Rename a group.
pub async fn group_rename(
    ctx: &HandlerContext,
    user_id: i64,
    group_id: i64,
    name: &str,
) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    ctx.store.rename_group(group_id, name).await?;
    Ok(Reply::text(format!(
        "\u{270F} Group #{group_id} renamed to <b>{}</b>.",
        escape_html(name.trim())
    )))
}

/// Delete a group, cancelling its unfinished tasks.
pub async fn group_delete(ctx: &HandlerContext, user_id: i64, group_id: i64) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    let group = ctx.store.require_group(group_id).await?;
    let cancelled = ctx.store.delete_group(group_id, user_id).await?;
    notify::tasks_cancelled(
        &ctx.store,
        &*ctx.notifier,
        &cancelled,
        &format!("group {} was deleted", group.name),
        user_id,
    )
    .await
    .unwrap_or_else(notify_failed);

    Ok(Reply::text(format!(
        "\u{1F5D1} Group <b>{}</b> deleted. Cancelled tasks: {}.",
        escape_html(&group.name),
        cancelled.len()
    )))
}

/// Make a user admin of a group (and a member of it).
pub async fn group_admin_add(
    ctx: &HandlerContext,
    user_id: i64,
    group_id: i64,
    target: i64,
) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    let user = require_member_candidate(ctx, target).await?;
    let group = ctx.store.require_group(group_id).await?;
    let added = ctx.store.add_group_admin(group_id, target).await?;
    let text = if added {
        format!(
            "\u{2B50} {} now administers <b>{}</b>.",
            escape_html(&user.name),
            escape_html(&group.name)
        )
    } else {
        format!("{} already administers this group.", escape_html(&user.name))
    };
    Ok(Reply::text(text))
}

/// Revoke a group admin role. Membership stays.
pub async fn group_admin_remove(
    ctx: &HandlerContext,
    user_id: i64,
    group_id: i64,
    target: i64,
) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    if !ctx.store.remove_group_admin(group_id, target).await? {
        return Err(HandlerError::Invalid(format!(
            "User {target} does not administer group #{group_id}."
        )));
    }
    Ok(Reply::text(format!(
        "User {target} no longer administers group #{group_id}."
    )))
}

/// Add a user to a group.
pub async fn member_add(
    ctx: &HandlerContext,
    user_id: i64,
    group_id: i64,
    target: i64,
) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    let user = require_member_candidate(ctx, target).await?;
    let group = ctx.store.require_group(group_id).await?;
    let added = ctx.store.add_member(group_id, target).await?;
    let text = if added {
        format!(
            "\u{2795} {} joined <b>{}</b>.",
            escape_html(&user.name),
            escape_html(&group.name)
        )
    } else {
        format!("{} is already in this group.", escape_html(&user.name))
    };
    Ok(Reply::text(text))
}

/// Add a person by Telegram id and name into a group, registering them.
pub async fn user_add(
    ctx: &HandlerContext,
    user_id: i64,
    group_id: i64,
    target: i64,
    name: &str,
) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    let group = ctx.store.require_group(group_id).await?;
    let (user, added) = ctx.store.add_user_to_group(group_id, target, name).await?;
    info!(group_id, target, by = user_id, added, "user added by super admin");

    let text = if added {
        format!(
            "\u{2705} {} added to <b>{}</b>.",
            user_label(&user),
            escape_html(&group.name)
        )
    } else {
        format!(
            "{} is already in <b>{}</b>.",
            user_label(&user),
            escape_html(&group.name)
        )
    };
    Ok(Reply::text(text))
}

/// Remove a user from a group, and from its admins.
pub async fn member_remove(
    ctx: &HandlerContext,
    user_id: i64,
    group_id: i64,
    target: i64,
) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    if !ctx.store.remove_member(group_id, target).await? {
        return Err(HandlerError::Invalid(format!(
            "User {target} is not in group #{group_id}."
        )));
    }
    Ok(Reply::text(format!("\u{2796} User {target} left group #{group_id}.")))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// One page of known users with state markers. Registered users without
/// a group are flagged, and active ones get a button to their tasks.
pub async fn users(ctx: &HandlerContext, user_id: i64, page: usize) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    let all = ctx.store.list_users(true).await?;
    let ungrouped: BTreeSet<i64> = ctx
        .store
        .users_without_group()
        .await?
        .into_iter()
        .map(|u| u.user_id)
        .collect();

    let page = paginate(&all, page);
    let mut text = format!("\u{1F464} <b>Users</b> ({})", all.len());
    if page.count > 1 {
        text.push_str(&format!(" \u{00B7} {}", page.label()));
    }
    text.push('\n');
    for user in page.items {
        let state = if user.deleted {
            "\u{1F5D1}"
        } else if user.banned {
            "\u{26D4}"
        } else if user.registered {
            "\u{2705}"
        } else {
            "\u{23F3}"
        };
        text.push_str(&format!("{state} {}", user_label(user)));
        if ungrouped.contains(&user.user_id) {
            text.push_str(" \u{00B7} <i>registered without a group</i>");
        }
        text.push('\n');
    }

    let buttons: Vec<Button> = page
        .items
        .iter()
        .filter(|u| u.is_active() && u.registered)
        .map(|u| Button::new(format!("\u{1F4CB} {}", u.name), Action::UserTasks(u.user_id)))
        .collect();
    let mut reply = Reply::text(text);
    for pair in buttons.chunks(2) {
        reply = reply.with_row(pair.to_vec());
    }
    Ok(reply
        .with_row(page.nav_row(Action::UsersPage))
        .with_button(home_button()))
}

/// Rename a user.
pub async fn user_name(ctx: &HandlerContext, user_id: i64, target: i64, name: &str) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    ctx.store.set_user_name(target, name).await?;
    Ok(Reply::text(format!(
        "\u{270F} User {target} is now called <b>{}</b>.",
        escape_html(name.trim())
    )))
}

fn summary_text(summary: &CancelSummary) -> String {
    format!(
        "Cancelled tasks: {}. Removed from tasks: {}.",
        summary.cancelled.len(),
        summary.unassigned.len()
    )
}

fn guard_target(ctx: &HandlerContext, user_id: i64, target: i64) -> HandlerResult<()> {
    if target == user_id {
        return Err(HandlerError::Invalid("You cannot do that to yourself.".to_owned()));
    }
    if ctx.config.is_super_admin(target) {
        return Err(HandlerError::Denied("Super administrators cannot be banned or deleted."));
    }
    Ok(())
}

/// Ban a user and withdraw their open work.
pub async fn ban(ctx: &HandlerContext, user_id: i64, target: i64) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    guard_target(ctx, user_id, target)?;
    let summary = ctx.store.ban_user(target).await?;
    notify::tasks_cancelled(&ctx.store, &*ctx.notifier, &summary.cancelled, "a participant was banned", user_id)
        .await
        .unwrap_or_else(notify_failed);
    info!(target, by = user_id, cancelled = summary.cancelled.len(), "user banned");
    Ok(Reply::text(format!("\u{26D4} User {target} banned. {}", summary_text(&summary))))
}

/// Lift a ban.
pub async fn unban(ctx: &HandlerContext, user_id: i64, target: i64) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    ctx.store.unban_user(target).await?;
    Ok(Reply::text(format!("\u{2705} User {target} unbanned.")))
}

/// Soft-delete a user and withdraw their open work.
pub async fn user_delete(ctx: &HandlerContext, user_id: i64, target: i64) -> HandlerResult {
    require_super_admin(ctx, user_id).await?;
    guard_target(ctx, user_id, target)?;
    let summary = ctx.store.delete_user(target).await?;
    notify::tasks_cancelled(&ctx.store, &*ctx.notifier, &summary.cancelled, "a participant was removed", user_id)
        .await
        .unwrap_or_else(notify_failed);
    info!(target, by = user_id, cancelled = summary.cancelled.len(), "user deleted");
    Ok(Reply::text(format!("\u{1F5D1} User {target} deleted. {}", summary_text(&summary))))
}
