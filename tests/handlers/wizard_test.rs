//! Tests for `src/handlers/wizard.rs`: the step-by-step creation flow.

use taskdesk::handlers::{run_action, run_command, run_media, run_text};
use taskdesk::lifecycle::TaskStatus;
use taskdesk::reply::Action;
use taskdesk::store::{MediaKind, TaskFilter};

use crate::common::{chat_user, fixture, Fixture, GINA, LONE, NEWBIE, ROOT, VAL, WES};

/// Walk a user through title, description, date and time.
async fn fill_basics(fx: &Fixture, user_id: i64) {
    let user = chat_user(user_id);
    let start = run_command(&fx.ctx, &user, "/new").await;
    assert!(start.text.contains("Step 1/6"), "{}", start.text);

    let title = run_text(&fx.ctx, &user, "Fix the door").await;
    assert!(title.text.contains("Step 2/6"), "{}", title.text);

    let skip = run_action(&fx.ctx, &user, Action::WizardSkip).await;
    assert!(skip.text.contains("Step 3/6"), "{}", skip.text);

    let date = run_text(&fx.ctx, &user, "2099-01-15").await;
    assert!(date.text.contains("Step 4/6"), "{}", date.text);

    let time = run_text(&fx.ctx, &user, "18:00").await;
    assert!(time.text.contains("Step 5/6"), "{}", time.text);
}

#[tokio::test]
async fn admin_creates_an_assigned_task() {
    let fx = fixture().await;
    fill_basics(&fx, GINA).await;
    let gina = chat_user(GINA);

    let toggled = run_action(&fx.ctx, &gina, Action::WizardToggle(WES)).await;
    assert!(toggled.text.contains("Step 5/6"));
    assert!(toggled.keyboard.iter().flatten().any(|b| b.label.contains("\u{2705} Wes")));
    assert!(!toggled.actions().any(|a| *a == Action::WizardToggle(LONE)));

    let media = run_action(&fx.ctx, &gina, Action::WizardNext).await;
    assert!(media.text.contains("Step 6/6"), "{}", media.text);

    let confirm = run_action(&fx.ctx, &gina, Action::WizardSkip).await;
    assert!(confirm.text.contains("Check the new task"), "{}", confirm.text);
    assert!(confirm.text.contains("Wes"));

    let created = run_action(&fx.ctx, &gina, Action::WizardConfirm).await;
    assert!(created.text.contains("<b>Fix the door</b> created."), "{}", created.text);
    assert!(!fx.ctx.wizards.is_active(GINA));

    let tasks = fx
        .store()
        .list_tasks(&TaskFilter::active(10))
        .await
        .expect("tasks");
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.group_id, Some(fx.group_id));
    assert_eq!(task.due_time, "18:00");
    assert_eq!(task.status, TaskStatus::Pending);

    assert_eq!(fx.notifier.recipients(), vec![WES, ROOT]);
    assert!(fx.notifier.sent_to(WES)[0]
        .text
        .contains("New task assigned to you"));
}

#[tokio::test]
async fn task_without_assignees_is_broadcast_as_open() {
    let fx = fixture().await;
    fill_basics(&fx, WES).await;
    let wes = chat_user(WES);

    run_action(&fx.ctx, &wes, Action::WizardNext).await;
    run_action(&fx.ctx, &wes, Action::WizardNext).await;
    let created = run_action(&fx.ctx, &wes, Action::WizardConfirm).await;
    assert!(created.text.contains("created."), "{}", created.text);

    assert_eq!(fx.notifier.recipients(), vec![ROOT, GINA, VAL]);
    let open = &fx.notifier.sent_to(VAL)[0];
    assert!(open.text.contains("Open task"));
    assert!(open.actions().any(|a| matches!(a, Action::Accept(_))));
}

#[tokio::test]
async fn invalid_input_repeats_the_step() {
    let fx = fixture().await;
    let user = chat_user(WES);
    run_command(&fx.ctx, &user, "/new").await;
    run_text(&fx.ctx, &user, "Title").await;
    run_text(&fx.ctx, &user, "Some description").await;

    let past = run_text(&fx.ctx, &user, "2000-01-01").await;
    assert!(past.text.contains("The due date is in the past."), "{}", past.text);
    assert!(past.text.contains("Step 3/6"));

    let malformed = run_text(&fx.ctx, &user, "next friday").await;
    assert!(malformed.text.contains("Step 3/6"));

    let quick = run_action(&fx.ctx, &user, Action::WizardDate(1)).await;
    assert!(quick.text.contains("Step 4/6"), "{}", quick.text);

    let bad_time = run_text(&fx.ctx, &user, "24:30").await;
    assert!(bad_time.text.contains("Step 4/6"));

    let end_of_day = run_text(&fx.ctx, &user, "24:00").await;
    assert!(end_of_day.text.contains("Step 5/6"));
    let draft = fx.ctx.wizards.get(WES).expect("draft");
    assert_eq!(draft.due_time, "24:00");
    assert_eq!(draft.description, "Some description");
}

#[tokio::test]
async fn buttons_from_another_step_are_refused() {
    let fx = fixture().await;
    let user = chat_user(WES);
    run_command(&fx.ctx, &user, "/new").await;

    let reply = run_action(&fx.ctx, &user, Action::WizardConfirm).await;
    assert!(reply.text.contains("another step"), "{}", reply.text);
    assert!(reply.text.contains("Step 1/6"));
}

#[tokio::test]
async fn media_is_collected_at_the_last_step_only() {
    let fx = fixture().await;
    let user = chat_user(WES);

    let outside = run_media(&fx.ctx, &user, MediaKind::Photo, "file-0").await;
    assert!(outside.text.contains("only be attached while creating a task"));

    run_command(&fx.ctx, &user, "/new").await;
    let early = run_media(&fx.ctx, &user, MediaKind::Photo, "file-0").await;
    assert!(early.text.contains("last step"), "{}", early.text);

    fx.ctx.wizards.remove(WES);
    fill_basics(&fx, WES).await;
    run_action(&fx.ctx, &user, Action::WizardNext).await;

    let one = run_media(&fx.ctx, &user, MediaKind::Photo, "file-1").await;
    assert!(one.text.contains("Attached: 1."), "{}", one.text);
    let two = run_media(&fx.ctx, &user, MediaKind::Video, "file-2").await;
    assert!(two.text.contains("Attached: 2."));

    run_command(&fx.ctx, &user, "/done").await;
    run_action(&fx.ctx, &user, Action::WizardConfirm).await;

    let task = fx
        .store()
        .list_tasks(&TaskFilter::active(10))
        .await
        .expect("tasks")
        .remove(0);
    assert!(task.has_media);
    assert_eq!(fx.store().task_media(task.task_id).await.expect("media").len(), 2);
}

#[tokio::test]
async fn cancel_drops_the_draft() {
    let fx = fixture().await;
    let user = chat_user(WES);
    run_command(&fx.ctx, &user, "/new").await;

    let cancelled = run_command(&fx.ctx, &user, "/cancel").await;
    assert!(cancelled.text.contains("Task creation cancelled."));
    let nothing = run_command(&fx.ctx, &user, "/cancel").await;
    assert!(nothing.text.contains("Nothing to cancel."));

    let stray = run_text(&fx.ctx, &user, "hello").await;
    assert!(stray.text.contains("/help"), "{}", stray.text);
}

#[tokio::test]
async fn unregistered_users_cannot_start_a_draft() {
    let fx = fixture().await;
    let reply = run_command(&fx.ctx, &chat_user(NEWBIE), "/new").await;
    assert!(reply.text.starts_with('\u{26D4}'), "{}", reply.text);
    assert!(!fx.ctx.wizards.is_active(NEWBIE));
}

#[tokio::test]
async fn ungrouped_user_can_only_assign_themselves() {
    let fx = fixture().await;
    fill_basics(&fx, LONE).await;
    let lone = chat_user(LONE);

    let draft_reply = run_action(&fx.ctx, &lone, Action::WizardToggle(WES)).await;
    assert!(draft_reply.text.contains("cannot assign"), "{}", draft_reply.text);

    run_action(&fx.ctx, &lone, Action::WizardToggle(LONE)).await;
    run_action(&fx.ctx, &lone, Action::WizardNext).await;
    run_action(&fx.ctx, &lone, Action::WizardSkip).await;
    run_action(&fx.ctx, &lone, Action::WizardConfirm).await;

    let task = fx
        .store()
        .list_tasks(&TaskFilter::active(10))
        .await
        .expect("tasks")
        .remove(0);
    assert_eq!(task.group_id, None);
    let assignees = fx.store().task_assignees(task.task_id).await.expect("assignees");
    assert_eq!(assignees.len(), 1);
    assert_eq!(assignees[0].user_id, LONE);
}

/// Bring a fresh draft to the time step with today's date.
async fn due_today(fx: &Fixture, user_id: i64) {
    let user = chat_user(user_id);
    run_command(&fx.ctx, &user, "/new").await;
    run_text(&fx.ctx, &user, "Close the till").await;
    run_action(&fx.ctx, &user, Action::WizardSkip).await;
    let time = run_action(&fx.ctx, &user, Action::WizardDate(0)).await;
    assert!(time.text.contains("Step 4/6"), "{}", time.text);
}

#[tokio::test]
async fn a_time_already_past_today_is_refused() {
    let fx = fixture().await;
    due_today(&fx, WES).await;
    let user = chat_user(WES);

    let past = run_text(&fx.ctx, &user, "00:00").await;
    assert!(past.text.contains("already passed"), "{}", past.text);
    assert!(past.text.contains("Step 4/6"));
    assert_eq!(fx.ctx.wizards.get(WES).expect("draft").due_time, "");

    let end_of_day = run_action(&fx.ctx, &user, Action::WizardTime(24)).await;
    assert!(end_of_day.text.contains("Step 5/6"), "{}", end_of_day.text);
    assert_eq!(fx.ctx.wizards.get(WES).expect("draft").due_time, "24:00");
}

#[tokio::test]
async fn time_step_offers_hour_buttons() {
    let fx = fixture().await;
    fill_basics(&fx, WES).await;
    let user = chat_user(WES);

    let back = run_action(&fx.ctx, &user, Action::WizardBack).await;
    assert!(back.text.contains("Step 4/6"), "{}", back.text);
    let hours = back
        .actions()
        .filter(|a| matches!(a, Action::WizardTime(_)))
        .count();
    assert_eq!(hours, 24, "a future date offers every hour");

    let picked = run_action(&fx.ctx, &user, Action::WizardTime(9)).await;
    assert!(picked.text.contains("Step 5/6"), "{}", picked.text);
    assert_eq!(fx.ctx.wizards.get(WES).expect("draft").due_time, "09:00");

    let out_of_range = {
        run_action(&fx.ctx, &user, Action::WizardBack).await;
        run_action(&fx.ctx, &user, Action::WizardTime(25)).await
    };
    assert!(out_of_range.text.contains("another step"), "{}", out_of_range.text);
}

#[tokio::test]
async fn back_and_forward_keep_what_was_entered() {
    let fx = fixture().await;
    fill_basics(&fx, GINA).await;
    let gina = chat_user(GINA);
    run_action(&fx.ctx, &gina, Action::WizardToggle(WES)).await;

    let title_step = {
        for _ in 0..3 {
            run_action(&fx.ctx, &gina, Action::WizardBack).await;
        }
        run_action(&fx.ctx, &gina, Action::WizardBack).await
    };
    assert!(title_step.text.contains("Step 1/6"), "{}", title_step.text);
    assert!(!title_step.actions().any(|a| *a == Action::WizardBack));
    assert!(title_step.actions().any(|a| *a == Action::WizardForward));

    let first = run_action(&fx.ctx, &gina, Action::WizardBack).await;
    assert!(first.text.contains("This is the first step."), "{}", first.text);

    run_text(&fx.ctx, &gina, "Fix both doors").await;
    let mut reply = run_action(&fx.ctx, &gina, Action::WizardForward).await;
    assert!(reply.text.contains("Step 3/6"), "{}", reply.text);
    for _ in 0..2 {
        reply = run_action(&fx.ctx, &gina, Action::WizardForward).await;
    }
    assert!(reply.text.contains("Step 5/6"), "{}", reply.text);
    assert!(!reply.actions().any(|a| *a == Action::WizardForward));

    let beyond = run_action(&fx.ctx, &gina, Action::WizardForward).await;
    assert!(beyond.text.contains("no later step"), "{}", beyond.text);

    let draft = fx.ctx.wizards.get(GINA).expect("draft");
    assert_eq!(draft.title, "Fix both doors");
    assert_eq!(draft.due_date, "2099-01-15");
    assert_eq!(draft.due_time, "18:00");
    assert_eq!(draft.assignees, vec![WES]);
}

#[tokio::test]
async fn forward_past_the_time_step_rechecks_the_due_moment() {
    let fx = fixture().await;
    fill_basics(&fx, WES).await;
    let user = chat_user(WES);

    run_action(&fx.ctx, &user, Action::WizardBack).await;
    run_action(&fx.ctx, &user, Action::WizardBack).await;
    run_text(&fx.ctx, &user, "2099-01-15").await;
    let draft = fx.ctx.wizards.get(WES).expect("draft");
    assert_eq!(draft.due_time, "18:00", "time kept after changing the date");

    let moved = run_action(&fx.ctx, &user, Action::WizardForward).await;
    assert!(moved.text.contains("Step 5/6"), "{}", moved.text);

    run_action(&fx.ctx, &user, Action::WizardBack).await;
    run_action(&fx.ctx, &user, Action::WizardBack).await;
    run_action(&fx.ctx, &user, Action::WizardDate(0)).await;
    let mut draft = fx.ctx.wizards.get(WES).expect("draft");
    draft.due_time = "00:00".to_owned();
    fx.ctx.wizards.put(WES, draft);

    let refused = run_action(&fx.ctx, &user, Action::WizardForward).await;
    assert!(refused.text.contains("already passed"), "{}", refused.text);
    assert!(refused.text.contains("Step 4/6"));
}

#[tokio::test]
async fn long_assignee_lists_are_paged() {
    let fx = fixture().await;
    for id in 100..108 {
        fx.store()
            .register_user(id, &format!("Temp {id}"), None)
            .await
            .expect("register");
    }
    fill_basics(&fx, ROOT).await;
    let root = chat_user(ROOT);

    let toggles = |reply: &taskdesk::reply::Reply| {
        reply
            .actions()
            .filter(|a| matches!(a, Action::WizardToggle(_)))
            .count()
    };

    let first = run_action(&fx.ctx, &root, Action::WizardPage(0)).await;
    assert_eq!(toggles(&first), 10, "{}", first.text);
    assert!(first.text.contains("Page 1/2"));
    assert!(first.actions().any(|a| *a == Action::WizardPage(1)));

    let second = run_action(&fx.ctx, &root, Action::WizardPage(1)).await;
    assert_eq!(toggles(&second), 3);
    assert!(second.actions().any(|a| *a == Action::WizardPage(0)));
    assert!(second.keyboard.iter().flatten().count() <= taskdesk::reply::MAX_BUTTONS);
}

#[tokio::test]
async fn overlong_descriptions_are_refused() {
    let fx = fixture().await;
    let user = chat_user(WES);
    run_command(&fx.ctx, &user, "/new").await;
    run_text(&fx.ctx, &user, "Inventory").await;

    let long = "x".repeat(taskdesk::store::MAX_DESCRIPTION_CHARS + 1);
    let reply = run_text(&fx.ctx, &user, &long).await;
    assert!(reply.text.contains("limited to"), "{}", reply.text);
    assert!(reply.text.contains("Step 2/6"));
}
