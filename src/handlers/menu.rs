//! Entry points: `/start`, `/help`, `/register`.

use tracing::info;

use super::{ChatUser, HandlerContext, HandlerResult};
use crate::notify;
use crate::permissions::{Actor, Role};
use crate::reply::{escape_html, Action, Button, MenuItem, Reply};

fn menu_button(label: &str, item: MenuItem) -> Button {
    Button::new(label, Action::Menu(item))
}

/// The role-specific main menu.
pub fn main_menu(actor: &Actor, name: &str) -> Reply {
    let name = escape_html(name);
    match actor.role() {
        Role::SuperAdmin => Reply::text(format!(
            "\u{1F451} <b>Welcome, {name}!</b>\nYou are a super administrator."
        ))
        .with_row(vec![
            menu_button("\u{2795} New task", MenuItem::NewTask),
            menu_button("\u{1F4CB} All tasks", MenuItem::AllTasks),
        ])
        .with_row(vec![
            menu_button("\u{1F4DD} Created by me", MenuItem::Created),
            menu_button("\u{1F4C2} Archive", MenuItem::Archive),
        ])
        .with_row(vec![
            menu_button("\u{1F4E5} Requests", MenuItem::Requests),
            menu_button("\u{1F465} Groups", MenuItem::Groups),
            menu_button("\u{1F464} Users", MenuItem::Users),
        ])
        .with_row(vec![
            menu_button("\u{1F4CA} Statistics", MenuItem::Stats),
            menu_button("\u{2753} Help", MenuItem::Help),
        ]),
        Role::GroupAdmin => Reply::text(format!(
            "\u{1F44B} <b>Welcome, {name}!</b>\nYou administer {} group(s).",
            actor.admin_groups.len()
        ))
        .with_row(vec![
            menu_button("\u{2795} New task", MenuItem::NewTask),
            menu_button("\u{1F465} Group tasks", MenuItem::GroupTasks),
        ])
        .with_row(vec![
            menu_button("\u{1F4CC} My tasks", MenuItem::MyTasks),
            menu_button("\u{1F4DD} Created by me", MenuItem::Created),
        ])
        .with_row(vec![
            menu_button("\u{1F4C2} Archive", MenuItem::Archive),
            menu_button("\u{1F4CA} Statistics", MenuItem::Stats),
            menu_button("\u{2753} Help", MenuItem::Help),
        ]),
        Role::Worker => Reply::text(format!("\u{1F44B} <b>Welcome, {name}!</b>"))
            .with_row(vec![
                menu_button("\u{1F4CC} My tasks", MenuItem::MyTasks),
                menu_button("\u{2795} New task", MenuItem::NewTask),
            ])
            .with_row(vec![
                menu_button("\u{1F4DD} Created by me", MenuItem::Created),
                menu_button("\u{1F4C2} Archive", MenuItem::Archive),
            ])
            .with_row(vec![
                menu_button("\u{1F4CA} Statistics", MenuItem::Stats),
                menu_button("\u{2753} Help", MenuItem::Help),
            ]),
        Role::Ungrouped => Reply::text(format!(
            "\u{1F44B} <b>Welcome, {name}!</b>\n\
             You are registered, but not in a group yet. An administrator will add you soon."
        ))
        .with_row(vec![
            menu_button("\u{1F4CC} My tasks", MenuItem::MyTasks),
            menu_button("\u{2795} New task", MenuItem::NewTask),
        ])
        .with_button(menu_button("\u{2753} Help", MenuItem::Help)),
        Role::Unregistered => Reply::text(format!(
            "\u{1F44B} <b>Hello, {name}!</b>\n\
             You are not registered yet. Send a request and an administrator will review it."
        ))
        .with_button(menu_button("\u{1F4DD} Register", MenuItem::Register)),
        Role::Banned => Reply::text("\u{26D4} Your access has been revoked."),
    }
}

/// `/start`: record the user and show their menu.
pub async fn start(ctx: &HandlerContext, user: &ChatUser) -> HandlerResult {
    let record = ctx
        .store
        .ensure_user(user.id, &user.name, user.username.as_deref())
        .await?;
    let actor = ctx.actor(user.id).await?;

    if actor.role() == Role::Unregistered {
        let pending = ctx
            .store
            .pending_registration_requests()
            .await?
            .into_iter()
            .any(|r| r.user_id == user.id);
        if pending {
            return Ok(Reply::text(
                "\u{23F3} Your registration request is waiting for review.",
            ));
        }
    }
    Ok(main_menu(&actor, &record.name))
}

/// `/help`: commands available to the actor's role.
pub async fn help(ctx: &HandlerContext, user_id: i64) -> HandlerResult {
    let actor = ctx.actor(user_id).await?;
    let mut lines = vec!["<b>Commands</b>", "", "/start \u{2014} main menu"];

    match actor.role() {
        Role::Banned => return Ok(Reply::text("\u{26D4} Your access has been revoked.")),
        Role::Unregistered => {
            lines.push("/register \u{2014} ask for access");
            return Ok(Reply::text(lines.join("\n")));
        }
        _ => {}
    }

    lines.extend([
        "/my_tasks \u{2014} tasks assigned to you",
        "/created \u{2014} tasks you created",
        "/archive \u{2014} finished tasks",
        "/task &lt;id&gt; \u{2014} task details",
        "/new \u{2014} create a task (/cancel aborts)",
        "/accept &lt;id&gt;, /decline &lt;id&gt; \u{2014} respond to a task",
        "/status &lt;id&gt; &lt;pending|in_progress|completed&gt; \u{2014} your progress",
        "/stats \u{2014} your statistics",
    ]);

    if actor.is_any_group_admin() || actor.is_super_admin {
        lines.extend([
            "",
            "<b>Editing</b>",
            "/group_tasks [group id] \u{2014} tasks of your groups",
            "/user_tasks &lt;user id&gt; [group id] \u{2014} active tasks of one assignee",
            "/edit &lt;id&gt; &lt;title|description|date|time&gt; &lt;value&gt;",
            "/task_status &lt;id&gt; &lt;status&gt; \u{2014} override the task status",
            "/assign &lt;id&gt; &lt;user id&gt;, /unassign &lt;id&gt; &lt;user id&gt;",
            "/delete &lt;id&gt;",
            "/stats &lt;user id&gt; \u{2014} a member's statistics",
        ]);
    }

    if actor.is_super_admin {
        lines.extend([
            "",
            "<b>Administration</b>",
            "/all_tasks \u{2014} every active task",
            "/requests, /approve &lt;id&gt;, /reject &lt;id&gt;",
            "/groups, /group_add &lt;name&gt;, /group_rename &lt;id&gt; &lt;name&gt;, /group_delete &lt;id&gt;",
            "/group_admin_add &lt;group&gt; &lt;user&gt;, /group_admin_remove &lt;group&gt; &lt;user&gt;",
            "/member_add &lt;group&gt; &lt;user&gt;, /member_remove &lt;group&gt; &lt;user&gt;",
            "/user_add &lt;group&gt; &lt;telegram id&gt; &lt;name&gt; \u{2014} add a new person to a group",
            "/users, /user_name &lt;user&gt; &lt;name&gt;",
            "/ban &lt;user&gt;, /unban &lt;user&gt;, /user_delete &lt;user&gt;",
        ]);
    }

    Ok(Reply::text(lines.join("\n")).with_button(super::home_button()))
}

/// `/register`: file a registration request and alert the super admins.
pub async fn register(ctx: &HandlerContext, user: &ChatUser) -> HandlerResult {
    ctx.store
        .ensure_user(user.id, &user.name, user.username.as_deref())
        .await?;
    let actor = ctx.actor(user.id).await?;

    match actor.role() {
        Role::Banned => return Ok(Reply::text("\u{26D4} Your access has been revoked.")),
        Role::Unregistered => {}
        _ => {
            return Ok(Reply::text("\u{2705} You are already registered.")
                .with_button(super::home_button()))
        }
    }

    let already_pending = ctx
        .store
        .pending_registration_requests()
        .await?
        .into_iter()
        .any(|r| r.user_id == user.id);
    if already_pending {
        return Ok(Reply::text(
            "\u{23F3} Your registration request is already waiting for review.",
        ));
    }

    let request = ctx
        .store
        .create_registration_request(user.id, &user.name, user.username.as_deref())
        .await?;
    let delivered = notify::registration_requested(&ctx.config, &*ctx.notifier, &request).await;
    info!(user_id = user.id, request_id = request.request_id, delivered, "registration requested");

    Ok(Reply::text(
        "\u{1F4E8} Your registration request was sent. You will be notified when it is reviewed.",
    ))
}
