//! Tests for `src/handlers/admin.rs` and `src/handlers/stats.rs`.

use taskdesk::handlers::{run_action, run_command};
use taskdesk::lifecycle::TaskStatus;
use taskdesk::reply::Action;

use crate::common::{chat_user, fixture, group_task, GINA, LONE, NEWBIE, ROOT, VAL, WES};

#[tokio::test]
async fn registration_round_trip() {
    let fx = fixture().await;
    let newbie = chat_user(NEWBIE);

    let sent = run_command(&fx.ctx, &newbie, "/register").await;
    assert!(sent.text.contains("Your registration request was sent."));
    assert_eq!(fx.notifier.recipients(), vec![ROOT]);
    let alert = &fx.notifier.sent_to(ROOT)[0];
    assert!(alert.text.contains("Registration request #"));
    let approve = alert
        .actions()
        .find(|a| matches!(a, Action::Approve(_)))
        .cloned()
        .expect("approve button");

    let again = run_command(&fx.ctx, &newbie, "/register").await;
    assert!(again.text.contains("already waiting for review"));
    assert_eq!(fx.notifier.sent().len(), 1);

    fx.notifier.clear();
    let reviewed = run_action(&fx.ctx, &chat_user(ROOT), approve.clone()).await;
    assert!(reviewed.text.contains("from Newbie approved."), "{}", reviewed.text);
    assert_eq!(fx.notifier.recipients(), vec![NEWBIE]);
    assert!(fx.notifier.sent_to(NEWBIE)[0].text.contains("approved"));

    let twice = run_action(&fx.ctx, &chat_user(ROOT), approve).await;
    assert!(twice.text.contains("was already approved"), "{}", twice.text);

    let registered = run_command(&fx.ctx, &newbie, "/register").await;
    assert!(registered.text.contains("You are already registered."));
}

#[tokio::test]
async fn rejection_lets_the_visitor_ask_again() {
    let fx = fixture().await;
    run_command(&fx.ctx, &chat_user(NEWBIE), "/register").await;
    let request = fx
        .store()
        .pending_registration_requests()
        .await
        .expect("pending")
        .remove(0);

    let reply = run_command(
        &fx.ctx,
        &chat_user(ROOT),
        &format!("/reject {}", request.request_id),
    )
    .await;
    assert!(reply.text.contains("rejected."));
    assert!(fx.notifier.sent_to(NEWBIE)[0].text.contains("rejected"));

    let again = run_command(&fx.ctx, &chat_user(NEWBIE), "/register").await;
    assert!(again.text.contains("was sent"));
}

#[tokio::test]
async fn only_super_admins_review_requests() {
    let fx = fixture().await;
    run_command(&fx.ctx, &chat_user(NEWBIE), "/register").await;

    let reply = run_command(&fx.ctx, &chat_user(GINA), "/requests").await;
    assert!(reply.text.starts_with('\u{26D4}'), "{}", reply.text);

    let list = run_command(&fx.ctx, &chat_user(ROOT), "/requests").await;
    assert!(list.text.contains("Pending requests"));
    assert!(list.actions().any(|a| matches!(a, Action::Reject(_))));
}

#[tokio::test]
async fn members_must_be_registered_and_active() {
    let fx = fixture().await;
    let root = chat_user(ROOT);
    let gid = fx.group_id;

    let visitor = run_command(&fx.ctx, &root, &format!("/member_add {gid} {NEWBIE}")).await;
    assert!(visitor.text.contains("is not registered"), "{}", visitor.text);

    let added = run_command(&fx.ctx, &root, &format!("/member_add {gid} {LONE}")).await;
    assert!(added.text.contains("Lone joined <b>Ops</b>."), "{}", added.text);
    let repeat = run_command(&fx.ctx, &root, &format!("/member_add {gid} {LONE}")).await;
    assert!(repeat.text.contains("already in this group"));

    let promoted = run_command(&fx.ctx, &root, &format!("/group_admin_add {gid} {WES}")).await;
    assert!(promoted.text.contains("now administers"));

    let removed = run_command(&fx.ctx, &root, &format!("/member_remove {gid} {WES}")).await;
    assert!(removed.text.contains("left group"));
    let admins = fx.store().group_admins(gid).await.expect("admins");
    assert!(!admins.contains(&WES));

    let missing = run_command(&fx.ctx, &root, &format!("/member_remove {gid} {WES}")).await;
    assert!(missing.text.starts_with('\u{26A0}'));
}

#[tokio::test]
async fn ban_withdraws_work_and_tells_the_creator() {
    let fx = fixture().await;
    let task_id = group_task(&fx, GINA, vec![WES]).await;

    let reply = run_command(&fx.ctx, &chat_user(ROOT), &format!("/ban {WES}")).await;
    assert!(reply.text.contains("Cancelled tasks: 1."), "{}", reply.text);
    assert!(reply.text.contains("Removed from tasks: 0."));

    let task = fx.store().require_task(task_id).await.expect("task");
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(fx.notifier.recipients(), vec![GINA]);
    assert!(fx.notifier.sent_to(GINA)[0].text.contains("Task cancelled"));

    let unban = run_command(&fx.ctx, &chat_user(ROOT), &format!("/unban {WES}")).await;
    assert!(unban.text.contains("unbanned"));
}

#[tokio::test]
async fn super_admins_are_protected() {
    let fx = fixture().await;
    let own = run_command(&fx.ctx, &chat_user(ROOT), &format!("/ban {ROOT}")).await;
    assert!(own.text.contains("You cannot do that to yourself."));

    let worker = run_command(&fx.ctx, &chat_user(GINA), &format!("/ban {WES}")).await;
    assert!(worker.text.starts_with('\u{26D4}'));
    let still = fx.store().require_user(WES).await.expect("user");
    assert!(!still.banned);
}

#[tokio::test]
async fn group_lifecycle() {
    let fx = fixture().await;
    let root = chat_user(ROOT);

    let added = run_command(&fx.ctx, &root, "/group_add Night shift").await;
    assert!(added.text.contains("<b>Night shift</b> created."), "{}", added.text);
    let duplicate = run_command(&fx.ctx, &root, "/group_add Night shift").await;
    assert!(duplicate.text.starts_with('\u{26A0}'), "{}", duplicate.text);

    group_task(&fx, GINA, vec![WES]).await;
    let deleted = run_command(&fx.ctx, &root, &format!("/group_delete {}", fx.group_id)).await;
    assert!(deleted.text.contains("Group <b>Ops</b> deleted. Cancelled tasks: 1."), "{}", deleted.text);
    assert_eq!(fx.notifier.recipients(), vec![GINA, WES]);

    let groups = run_command(&fx.ctx, &root, "/groups").await;
    assert!(groups.text.contains("Night shift"));
    assert!(!groups.text.contains("Ops"));
}

#[tokio::test]
async fn stats_visibility() {
    let fx = fixture().await;
    group_task(&fx, GINA, vec![WES]).await;

    let own = run_command(&fx.ctx, &chat_user(WES), "/stats").await;
    assert!(own.text.contains("Statistics: Wes"), "{}", own.text);
    assert!(own.text.contains("Assigned: 1"));

    let other = run_command(&fx.ctx, &chat_user(WES), &format!("/stats {VAL}")).await;
    assert!(other.text.contains("You can only see your own statistics."));

    let admin = run_command(&fx.ctx, &chat_user(GINA), &format!("/stats {WES}")).await;
    assert!(admin.text.contains("Statistics: Wes"));

    let outside = run_command(&fx.ctx, &chat_user(GINA), &format!("/stats {LONE}")).await;
    assert!(outside.text.starts_with('\u{26D4}'));

    let system = run_command(&fx.ctx, &chat_user(ROOT), "/stats").await;
    assert!(system.text.contains("System statistics"));
    assert!(system.text.contains("Tasks: 1"));

    let visitor = run_command(&fx.ctx, &chat_user(NEWBIE), "/stats").await;
    assert!(visitor.text.starts_with('\u{26D4}'));
}

#[tokio::test]
async fn users_lists_everyone_with_state() {
    let fx = fixture().await;
    fx.store().ban_user(VAL).await.expect("ban");

    let reply = run_command(&fx.ctx, &chat_user(ROOT), "/users").await;
    assert!(reply.text.contains("\u{26D4} Val"), "{}", reply.text);
    assert!(reply.text.contains("registered without a group"));
    assert!(reply.text.contains("Lone"));

    let renamed = run_command(&fx.ctx, &chat_user(ROOT), &format!("/user_name {WES} Wesley")).await;
    assert!(renamed.text.contains("<b>Wesley</b>"));
    assert_eq!(fx.store().require_user(WES).await.expect("user").name, "Wesley");
}

#[tokio::test]
async fn super_admin_adds_people_to_a_group_by_id() {
    let fx = fixture().await;
    let root = chat_user(ROOT);

    let added = run_command(
        &fx.ctx,
        &root,
        &format!("/user_add {} 4242 Olga Petrenko", fx.group_id),
    )
    .await;
    assert!(added.text.contains("added to <b>Ops</b>"), "{}", added.text);
    let olga = fx.store().require_user(4242).await.expect("user");
    assert!(olga.registered);
    assert_eq!(olga.name, "Olga Petrenko");
    let groups = fx.store().user_groups(4242).await.expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].group_id, fx.group_id);

    let again = run_command(&fx.ctx, &root, &format!("/user_add {} {WES} Wes", fx.group_id)).await;
    assert!(again.text.contains("already in <b>Ops</b>"), "{}", again.text);

    let denied = run_command(
        &fx.ctx,
        &chat_user(GINA),
        &format!("/user_add {} 4343 Someone", fx.group_id),
    )
    .await;
    assert!(denied.text.starts_with('\u{26D4}'));
    assert!(fx.store().get_user(4343).await.expect("lookup").is_none());

    fx.store().ban_user(VAL).await.expect("ban");
    let banned = run_command(&fx.ctx, &root, &format!("/user_add {} {VAL} Val", fx.group_id)).await;
    assert!(banned.text.starts_with('\u{26A0}'), "{}", banned.text);

    let missing = run_command(&fx.ctx, &root, "/user_add 999 4444 Nobody").await;
    assert!(missing.text.starts_with('\u{2753}'), "{}", missing.text);
}

#[tokio::test]
async fn users_are_listed_ten_per_page() {
    let fx = fixture().await;
    for id in 100..106 {
        fx.store()
            .register_user(id, &format!("Temp {id}"), None)
            .await
            .expect("register");
    }
    let root = chat_user(ROOT);

    let first = run_command(&fx.ctx, &root, "/users").await;
    assert!(first.text.contains("(12)"), "{}", first.text);
    assert!(first.text.contains("Page 1/2"));
    assert!(first.actions().any(|a| *a == Action::UsersPage(1)));
    assert!(first.actions().any(|a| *a == Action::UserTasks(GINA)));
    assert!(!first.actions().any(|a| *a == Action::UserTasks(WES)));

    let second = run_action(&fx.ctx, &root, Action::UsersPage(1)).await;
    assert!(second.text.contains("Page 2/2"), "{}", second.text);
    assert!(second.text.contains("Wes"));
    assert!(!second.text.contains("Temp"));
    assert!(second.actions().any(|a| *a == Action::UserTasks(WES)));
    assert!(second.actions().any(|a| *a == Action::UsersPage(0)));
    assert!(!second.actions().any(|a| *a == Action::UsersPage(2)));

    let worker = run_action(&fx.ctx, &chat_user(WES), Action::UsersPage(0)).await;
    assert!(worker.text.starts_with('\u{26D4}'));
}

#[tokio::test]
async fn groups_are_listed_ten_per_page() {
    let fx = fixture().await;
    for n in 0..10 {
        fx.store().create_group(&format!("Shift {n}")).await.expect("group");
    }
    let root = chat_user(ROOT);

    let first = run_command(&fx.ctx, &root, "/groups").await;
    assert!(first.text.contains("(11)"), "{}", first.text);
    assert!(first.actions().any(|a| *a == Action::GroupsPage(1)));

    let second = run_action(&fx.ctx, &root, Action::GroupsPage(1)).await;
    assert!(second.text.contains("Page 2/2"), "{}", second.text);
    assert!(second.actions().any(|a| *a == Action::GroupsPage(0)));
}
