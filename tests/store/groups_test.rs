//! Tests for `src/store/groups.rs`: groups, memberships, admin roles.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use taskdesk::lifecycle::TaskStatus;
use taskdesk::store::{NewTask, Store, StoreError};

async fn setup_store() -> Store {
    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("pool should connect");
    Store::from_pool(pool).await.expect("schema should apply")
}

#[tokio::test]
async fn create_group_trims_and_rejects_duplicates() {
    let store = setup_store().await;
    let group = store.create_group("  Warehouse ").await.expect("create");
    assert_eq!(group.name, "Warehouse");

    assert!(matches!(
        store.create_group("Warehouse").await,
        Err(StoreError::Conflict(_))
    ));
    assert!(matches!(
        store.create_group("   ").await,
        Err(StoreError::Validation(_))
    ));
}

#[tokio::test]
async fn rename_group_checks_uniqueness_and_existence() {
    let store = setup_store().await;
    let a = store.create_group("Alpha").await.expect("create");
    store.create_group("Beta").await.expect("create");

    assert!(matches!(
        store.rename_group(a.group_id, "Beta").await,
        Err(StoreError::Conflict(_))
    ));
    assert!(matches!(
        store.rename_group(999, "Gamma").await,
        Err(StoreError::NotFound { entity: "group", .. })
    ));

    store.rename_group(a.group_id, "Gamma").await.expect("rename");
    let renamed = store.require_group(a.group_id).await.expect("group");
    assert_eq!(renamed.name, "Gamma");
}

#[tokio::test]
async fn membership_is_idempotent_and_requires_known_user() {
    let store = setup_store().await;
    let group = store.create_group("Ops").await.expect("group");
    store.register_user(1, "Bob", None).await.expect("register");

    assert!(store.add_member(group.group_id, 1).await.expect("add"));
    assert!(!store.add_member(group.group_id, 1).await.expect("add again"));
    assert!(matches!(
        store.add_member(group.group_id, 2).await,
        Err(StoreError::NotFound { entity: "user", .. })
    ));

    let members = store.group_members(group.group_id).await.expect("members");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, 1);
}

#[tokio::test]
async fn group_admins_are_members_and_lose_role_on_removal() {
    let store = setup_store().await;
    let group = store.create_group("Ops").await.expect("group");
    store.register_user(1, "Lead", None).await.expect("register");

    assert!(store.add_group_admin(group.group_id, 1).await.expect("admin"));
    assert_eq!(store.group_admins(group.group_id).await.expect("admins"), vec![1]);
    assert_eq!(store.user_groups(1).await.expect("groups").len(), 1);
    assert_eq!(store.admin_groups(1).await.expect("admin groups").len(), 1);

    assert!(store.remove_member(group.group_id, 1).await.expect("remove"));
    assert!(store.group_admins(group.group_id).await.expect("admins").is_empty());
    assert!(store.user_groups(1).await.expect("groups").is_empty());
}

#[tokio::test]
async fn remove_group_admin_keeps_membership() {
    let store = setup_store().await;
    let group = store.create_group("Ops").await.expect("group");
    store.register_user(1, "Lead", None).await.expect("register");
    store.add_group_admin(group.group_id, 1).await.expect("admin");

    assert!(store.remove_group_admin(group.group_id, 1).await.expect("demote"));
    assert!(!store.remove_group_admin(group.group_id, 1).await.expect("demote again"));
    assert_eq!(store.user_groups(1).await.expect("groups").len(), 1);
}

#[tokio::test]
async fn group_members_skip_banned_users() {
    let store = setup_store().await;
    let group = store.create_group("Ops").await.expect("group");
    store.register_user(1, "Bob", None).await.expect("register");
    store.register_user(2, "Eve", None).await.expect("register");
    store.add_member(group.group_id, 1).await.expect("add");
    store.add_member(group.group_id, 2).await.expect("add");
    store.ban_user(2).await.expect("ban");

    let ids: Vec<i64> = store
        .group_members(group.group_id)
        .await
        .expect("members")
        .iter()
        .map(|u| u.user_id)
        .collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn delete_group_cancels_open_tasks_and_detaches_finished_ones() {
    let store = setup_store().await;
    store.register_user(1, "Lead", None).await.expect("register");
    store.register_user(2, "Worker", None).await.expect("register");
    let group = store.create_group("Ops").await.expect("group");
    store.add_member(group.group_id, 2).await.expect("member");

    let new = |title: &str| NewTask {
        title: title.to_owned(),
        due_date: "2030-01-01".to_owned(),
        due_time: "10:00".to_owned(),
        group_id: Some(group.group_id),
        created_by: 1,
        assignees: vec![2],
        ..NewTask::default()
    };
    let open = store.create_task(&new("Open")).await.expect("task");
    let done = store.create_task(&new("Done")).await.expect("task");
    store
        .set_assignee_status(done, 2, TaskStatus::Completed)
        .await
        .expect("complete");

    let cancelled = store.delete_group(group.group_id, 1).await.expect("delete");
    assert_eq!(cancelled, vec![open]);

    let open_task = store.require_task(open).await.expect("task");
    assert_eq!(open_task.status, TaskStatus::Cancelled);
    assert_eq!(open_task.group_id, None);

    let done_task = store.require_task(done).await.expect("task");
    assert_eq!(done_task.status, TaskStatus::Completed);
    assert_eq!(done_task.group_id, None);

    assert!(store.get_group(group.group_id).await.expect("lookup").is_none());
    assert!(store.user_groups(2).await.expect("groups").is_empty());
}

#[tokio::test]
async fn delete_unknown_group_is_not_found() {
    let store = setup_store().await;
    assert!(matches!(
        store.delete_group(77, 1).await,
        Err(StoreError::NotFound { entity: "group", id: 77 })
    ));
}

#[tokio::test]
async fn group_overviews_bundle_members_and_admins() {
    let store = setup_store().await;
    let ops = store.create_group("Ops").await.expect("group");
    store.create_group("Admin").await.expect("group");
    store.register_user(1, "Lead", None).await.expect("register");
    store.register_user(2, "Worker", None).await.expect("register");
    store.add_group_admin(ops.group_id, 1).await.expect("admin");
    store.add_member(ops.group_id, 2).await.expect("member");

    let overviews = store.group_overviews().await.expect("overviews");
    let names: Vec<&str> = overviews.iter().map(|o| o.group.name.as_str()).collect();
    assert_eq!(names, vec!["Admin", "Ops"]);

    let ops_view = &overviews[1];
    assert_eq!(ops_view.admins, vec![1]);
    assert_eq!(ops_view.members.len(), 2);
}

#[tokio::test]
async fn add_user_to_group_registers_new_people() {
    let store = setup_store().await;
    let group = store.create_group("Kitchen").await.expect("create");

    let (user, added) = store
        .add_user_to_group(group.group_id, 77, " Olga ")
        .await
        .expect("add new user");
    assert!(added);
    assert_eq!(user.name, "Olga");
    assert!(user.registered);
    let members = store.group_members(group.group_id).await.expect("members");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, 77);

    let (_, again) = store
        .add_user_to_group(group.group_id, 77, "Olga")
        .await
        .expect("add twice");
    assert!(!again, "membership already existed");

    assert!(matches!(
        store.add_user_to_group(group.group_id, 78, "  ").await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        store.add_user_to_group(999, 78, "Pat").await,
        Err(StoreError::NotFound { entity: "group", .. })
    ));
    assert!(store.get_user(78).await.expect("lookup").is_none());
}

#[tokio::test]
async fn add_user_to_group_refuses_banned_users() {
    let store = setup_store().await;
    let group = store.create_group("Kitchen").await.expect("create");
    store.register_user(5, "Max", None).await.expect("register");
    store.ban_user(5).await.expect("ban");

    assert!(matches!(
        store.add_user_to_group(group.group_id, 5, "Max").await,
        Err(StoreError::Validation(_))
    ));
    let user = store.require_user(5).await.expect("user");
    assert!(user.banned, "ban stays in place");
    assert!(store.group_members(group.group_id).await.expect("members").is_empty());
}
