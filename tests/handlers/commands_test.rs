//! Tests for `src/handlers/commands.rs` routing.

use taskdesk::handlers::run_command;

use crate::common::{chat_user, fixture, group_task, GINA, ROOT, WES};

#[tokio::test]
async fn unknown_commands_are_named() {
    let fx = fixture().await;
    let reply = run_command(&fx.ctx, &chat_user(WES), "/frobnicate now").await;
    assert_eq!(reply.text, "Unknown command: /frobnicate. Send /help for the list.");
}

#[tokio::test]
async fn bad_arguments_show_usage() {
    let fx = fixture().await;
    let reply = run_command(&fx.ctx, &chat_user(WES), "/accept soon").await;
    assert!(reply.text.starts_with("Usage: <code>"), "{}", reply.text);
    assert!(reply.text.contains("/accept"));
}

#[tokio::test]
async fn list_tasks_picks_the_widest_view() {
    let fx = fixture().await;
    group_task(&fx, WES, vec![]).await;

    let root = run_command(&fx.ctx, &chat_user(ROOT), "/list_tasks").await;
    assert!(root.text.contains("All active tasks"), "{}", root.text);
    assert!(root.text.contains("(1)"));

    let gina = run_command(&fx.ctx, &chat_user(GINA), "/list_tasks").await;
    assert!(gina.text.contains("Group tasks"), "{}", gina.text);

    let wes = run_command(&fx.ctx, &chat_user(WES), "/list_tasks").await;
    assert!(wes.text.contains("Created by me"), "{}", wes.text);
}

#[tokio::test]
async fn bot_name_suffix_is_accepted() {
    let fx = fixture().await;
    let reply = run_command(&fx.ctx, &chat_user(WES), "/start@taskdesk_bot").await;
    assert!(reply.text.contains("Welcome, Wes!"));
}

#[tokio::test]
async fn worker_commands_are_gated() {
    let fx = fixture().await;
    let reply = run_command(&fx.ctx, &chat_user(WES), "/all_tasks").await;
    assert!(reply.text.starts_with('\u{26D4}'), "{}", reply.text);
}
