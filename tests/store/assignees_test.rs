//! Tests for `src/store/assignees.rs`: personal status, aggregation, claims.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use taskdesk::lifecycle::TaskStatus;
use taskdesk::store::{ClaimOutcome, DeclineOutcome, NewTask, Store, StoreError};

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
    let store = Store::from_pool(pool).await.expect("schema should apply");
    for (id, name) in [(1, "Boss"), (2, "Ann"), (3, "Ben")] {
        store.register_user(id, name, None).await.expect("register");
    }
    store
}

async fn task_with(store: &Store, assignees: Vec<i64>) -> i64 {
    store
        .create_task(&NewTask {
            title: "Restock".to_owned(),
            due_date: "2030-06-01".to_owned(),
            due_time: "12:00".to_owned(),
            created_by: 1,
            assignees,
            ..NewTask::default()
        })
        .await
        .expect("create task")
}

async fn status_of(store: &Store, task_id: i64) -> TaskStatus {
    store.require_task(task_id).await.expect("task").status
}

#[tokio::test]
async fn task_status_follows_its_assignees() {
    let store = setup_store().await;
    let id = task_with(&store, vec![2, 3]).await;

    let change = store
        .set_assignee_status(id, 2, TaskStatus::InProgress)
        .await
        .expect("start");
    assert_eq!(change.old_assignee, TaskStatus::Pending);
    assert_eq!(change.new_task, TaskStatus::InProgress);
    assert!(change.task_changed());

    store
        .set_assignee_status(id, 2, TaskStatus::Completed)
        .await
        .expect("finish ann");
    assert_eq!(status_of(&store, id).await, TaskStatus::Pending, "ben still pending");

    let change = store
        .set_assignee_status(id, 3, TaskStatus::Completed)
        .await
        .expect("finish ben");
    assert_eq!(change.old_task, TaskStatus::Pending);
    assert_eq!(change.new_task, TaskStatus::Completed);
}

#[tokio::test]
async fn set_assignee_status_requires_assignment_and_open_task() {
    let store = setup_store().await;
    let id = task_with(&store, vec![2]).await;

    assert!(matches!(
        store.set_assignee_status(id, 3, TaskStatus::InProgress).await,
        Err(StoreError::NotFound { entity: "assignee", id: 3 })
    ));

    store
        .set_task_status(id, TaskStatus::Cancelled, 1)
        .await
        .expect("cancel");
    assert!(matches!(
        store.set_assignee_status(id, 2, TaskStatus::InProgress).await,
        Err(StoreError::Validation(_))
    ));
}

#[tokio::test]
async fn add_and_remove_assignee_recompute_status() {
    let store = setup_store().await;
    let id = task_with(&store, vec![2]).await;
    store
        .set_assignee_status(id, 2, TaskStatus::Completed)
        .await
        .expect("finish");
    assert_eq!(status_of(&store, id).await, TaskStatus::Completed);

    assert!(store.add_assignee(id, 3, 1).await.expect("add"));
    assert!(!store.add_assignee(id, 3, 1).await.expect("add again"));
    assert_eq!(status_of(&store, id).await, TaskStatus::Pending);

    assert!(store.remove_assignee(id, 3, 1).await.expect("remove"));
    assert!(!store.remove_assignee(id, 3, 1).await.expect("remove again"));
    assert_eq!(status_of(&store, id).await, TaskStatus::Completed);
}

#[tokio::test]
async fn replace_assignees_keeps_status_of_those_who_stay() {
    let store = setup_store().await;
    let id = task_with(&store, vec![2]).await;
    store
        .set_assignee_status(id, 2, TaskStatus::InProgress)
        .await
        .expect("start");

    let status = store.replace_assignees(id, &[2, 3], 1).await.expect("replace");
    assert_eq!(status, TaskStatus::InProgress);
    assert_eq!(store.assignee_status(id, 2).await.expect("ann"), Some(TaskStatus::InProgress));
    assert_eq!(store.assignee_status(id, 3).await.expect("ben"), Some(TaskStatus::Pending));

    let status = store.replace_assignees(id, &[3], 1).await.expect("replace");
    assert_eq!(status, TaskStatus::Pending);
    assert_eq!(store.assignee_status(id, 2).await.expect("ann"), None);
}

#[tokio::test]
async fn first_claim_wins_an_open_task() {
    let store = setup_store().await;
    let id = task_with(&store, vec![]).await;

    assert_eq!(store.claim_task(id, 2).await.expect("claim"), ClaimOutcome::Claimed);
    assert_eq!(
        store.claim_task(id, 3).await.expect("claim"),
        ClaimOutcome::AlreadyTaken
    );

    let assignees = store.task_assignees(id).await.expect("assignees");
    assert_eq!(assignees.len(), 1);
    assert_eq!(assignees[0].user_id, 2);
    assert_eq!(assignees[0].status, TaskStatus::InProgress);
    assert_eq!(status_of(&store, id).await, TaskStatus::InProgress);
}

#[tokio::test]
async fn claiming_a_closed_task_is_refused() {
    let store = setup_store().await;
    let id = task_with(&store, vec![]).await;
    store
        .set_task_status(id, TaskStatus::Cancelled, 1)
        .await
        .expect("cancel");
    assert_eq!(store.claim_task(id, 2).await.expect("claim"), ClaimOutcome::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_produce_one_winner_and_clean_losers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(&dir.path().join("claims.sqlite"), 8)
        .await
        .expect("open file-backed store");
    store.register_user(1, "Boss", None).await.expect("register boss");
    let claimants: Vec<i64> = (10..18).collect();
    for id in &claimants {
        store
            .register_user(*id, &format!("Worker {id}"), None)
            .await
            .expect("register worker");
    }

    for round in 0..10 {
        let id = task_with(&store, vec![]).await;
        let handles: Vec<_> = claimants
            .iter()
            .map(|user| {
                let store = store.clone();
                let user = *user;
                tokio::spawn(async move { store.claim_task(id, user).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            let outcome = handle
                .await
                .expect("claim task joins")
                .unwrap_or_else(|e| panic!("round {round}: claim failed: {e}"));
            outcomes.push(outcome);
        }

        let won = outcomes.iter().filter(|o| **o == ClaimOutcome::Claimed).count();
        let lost = outcomes
            .iter()
            .filter(|o| **o == ClaimOutcome::AlreadyTaken)
            .count();
        assert_eq!(won, 1, "round {round}");
        assert_eq!(lost, claimants.len() - 1, "round {round}");
        assert_eq!(store.task_assignees(id).await.expect("assignees").len(), 1);
    }
    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_declines_and_starts_do_not_fail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(&dir.path().join("declines.sqlite"), 8)
        .await
        .expect("open file-backed store");
    store.register_user(1, "Boss", None).await.expect("register boss");
    let workers: Vec<i64> = (20..28).collect();
    for id in &workers {
        store
            .register_user(*id, &format!("Worker {id}"), None)
            .await
            .expect("register worker");
    }
    let id = task_with(&store, workers.clone()).await;

    let handles: Vec<_> = workers
        .iter()
        .enumerate()
        .map(|(i, user)| {
            let store = store.clone();
            let user = *user;
            tokio::spawn(async move {
                if i % 2 == 0 {
                    store.decline_task(id, user).await.map(|_| ())
                } else {
                    store.start_assignment(id, user).await.map(|_| ())
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.expect("joins").expect("no lock errors");
    }

    let assignees = store.task_assignees(id).await.expect("assignees");
    let declined = assignees
        .iter()
        .filter(|a| a.status == TaskStatus::Cancelled)
        .count();
    assert_eq!(declined, 4);
    assert_eq!(status_of(&store, id).await, TaskStatus::InProgress);
    store.close().await;
}

#[tokio::test]
async fn starting_an_assignment_records_the_acceptance() {
    let store = setup_store().await;
    let id = task_with(&store, vec![2]).await;

    let change = store.start_assignment(id, 2).await.expect("start");
    assert_eq!(change.old_assignee, TaskStatus::Pending);
    assert_eq!(change.new_task, TaskStatus::InProgress);

    let stats = store.worker_stats(2).await.expect("stats").expect("known user");
    assert_eq!(stats.accepted, 1);

    assert!(matches!(
        store.start_assignment(id, 3).await,
        Err(StoreError::NotFound { .. })
    ));
    let stats = store.worker_stats(3).await.expect("stats").expect("known user");
    assert_eq!(stats.accepted, 0, "failed start records nothing");
}

#[tokio::test]
async fn decline_by_sole_assignee_cancels_the_task() {
    let store = setup_store().await;
    let id = task_with(&store, vec![2]).await;

    let outcome = store.decline_task(id, 2).await.expect("decline");
    assert_eq!(
        outcome,
        DeclineOutcome::Withdrawn {
            old_task: TaskStatus::Pending,
            new_task: TaskStatus::Cancelled,
        }
    );
    assert_eq!(store.decline_task(id, 2).await.expect("again"), DeclineOutcome::Closed);
}

#[tokio::test]
async fn decline_by_one_of_many_leaves_the_task_open() {
    let store = setup_store().await;
    let id = task_with(&store, vec![2, 3]).await;

    let outcome = store.decline_task(id, 2).await.expect("decline");
    assert_eq!(
        outcome,
        DeclineOutcome::Withdrawn {
            old_task: TaskStatus::Pending,
            new_task: TaskStatus::Pending,
        }
    );
    assert_eq!(
        store.decline_task(id, 2).await.expect("again"),
        DeclineOutcome::AlreadyDeclined
    );
}

#[tokio::test]
async fn decline_of_open_task_is_only_noted() {
    let store = setup_store().await;
    let id = task_with(&store, vec![]).await;
    assert_eq!(store.decline_task(id, 3).await.expect("decline"), DeclineOutcome::Noted);
    assert!(store.task_assignees(id).await.expect("assignees").is_empty());

    let stats = store.worker_stats(3).await.expect("stats").expect("known user");
    assert_eq!(stats.declined, 1);
}
