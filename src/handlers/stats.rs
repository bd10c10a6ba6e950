//! `/stats`: worker and system statistics.

use super::{home_button, HandlerContext, HandlerError, HandlerResult};
use crate::reply::{escape_html, Reply};
use crate::store::{OverallStats, StoreError, WorkerStats};

/// Render one worker's counters.
pub fn render_worker(stats: &WorkerStats) -> String {
    format!(
        "\u{1F4CA} <b>Statistics: {}</b>\n\n\
         Assigned: {}\n\
         \u{23F3} Pending: {}\n\
         \u{1F504} In progress: {}\n\
         \u{2705} Completed: {}\n\
         \u{274C} Cancelled: {}\n\n\
         Accepted: {} \u{00B7} Declined: {}\n\
         Completion rate: {}%\n\
         Acceptance rate: {}%",
        escape_html(&stats.name),
        stats.assigned,
        stats.pending,
        stats.in_progress,
        stats.completed,
        stats.cancelled,
        stats.accepted,
        stats.declined,
        stats.completion_rate,
        stats.acceptance_rate
    )
}

/// Render system-wide counters.
pub fn render_overall(stats: &OverallStats) -> String {
    format!(
        "\u{1F4C8} <b>System statistics</b>\n\n\
         Tasks: {}\n\
         \u{23F3} Pending: {}\n\
         \u{1F504} In progress: {}\n\
         \u{2705} Completed: {}\n\
         \u{274C} Cancelled: {}\n\n\
         Active users: {}\n\
         Groups: {}",
        stats.total_tasks,
        stats.pending,
        stats.in_progress,
        stats.completed,
        stats.cancelled,
        stats.users,
        stats.groups
    )
}

/// Statistics for the actor, or for `target` when the actor may see them.
///
/// Workers only see their own numbers. Group admins also see members of the
/// groups they administer; super admins see anyone, and the system totals
/// when no target is given.
pub async fn stats(ctx: &HandlerContext, user_id: i64, target: Option<i64>) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    if actor.banned || !actor.registered {
        return Err(HandlerError::Denied("You need to register first. Send /register."));
    }

    let target = match target {
        None if actor.is_super_admin => {
            let overall = ctx.store.overall_stats().await?;
            return Ok(Reply::text(render_overall(&overall)).with_button(home_button()));
        }
        None => user_id,
        Some(t) => t,
    };

    if target != user_id && !actor.is_super_admin {
        let shares_admin_group = ctx
            .store
            .user_groups(target)
            .await?
            .iter()
            .any(|g| actor.admin_groups.contains(&g.group_id));
        if !shares_admin_group {
            return Err(HandlerError::Denied("You can only see your own statistics."));
        }
    }

    let stats = ctx
        .store
        .worker_stats(target)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "user",
            id: target,
        })?;
    Ok(Reply::text(render_worker(&stats)).with_button(home_button()))
}
