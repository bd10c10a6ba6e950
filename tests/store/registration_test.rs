//! Tests for `src/store/registration.rs`: request lifecycle.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use taskdesk::store::{RegistrationStatus, Store, StoreError};

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
async fn repeated_requests_return_the_pending_one() {
    let store = setup_store().await;
    let first = store
        .create_registration_request(20, "Dana", Some("dana"))
        .await
        .expect("request");
    let second = store
        .create_registration_request(20, "Dana D.", None)
        .await
        .expect("request again");

    assert_eq!(first.request_id, second.request_id);
    assert_eq!(second.name, "Dana", "pending request is left unchanged");
    assert_eq!(second.status, RegistrationStatus::Pending);
    assert_eq!(store.pending_registration_requests().await.expect("pending").len(), 1);
}

#[tokio::test]
async fn approval_registers_the_user() {
    let store = setup_store().await;
    store.ensure_user(20, "Dana", Some("dana")).await.expect("seen");
    let request = store
        .create_registration_request(20, "Dana", Some("dana"))
        .await
        .expect("request");

    let approved = store
        .approve_registration(request.request_id, 1)
        .await
        .expect("approve");
    assert_eq!(approved.status, RegistrationStatus::Approved);
    assert_eq!(approved.reviewed_by, Some(1));
    assert!(approved.reviewed_at.is_some());

    let user = store.require_user(20).await.expect("user");
    assert!(user.registered);
    assert!(store.pending_registration_requests().await.expect("pending").is_empty());
}

#[tokio::test]
async fn approval_creates_a_user_never_seen_before() {
    let store = setup_store().await;
    let request = store
        .create_registration_request(21, "Eli", None)
        .await
        .expect("request");
    store
        .approve_registration(request.request_id, 1)
        .await
        .expect("approve");
    assert!(store.require_user(21).await.expect("user").registered);
}

#[tokio::test]
async fn reviewed_requests_cannot_be_reviewed_again() {
    let store = setup_store().await;
    let request = store
        .create_registration_request(20, "Dana", None)
        .await
        .expect("request");
    store
        .reject_registration(request.request_id, 1)
        .await
        .expect("reject");

    assert!(matches!(
        store.approve_registration(request.request_id, 1).await,
        Err(StoreError::Conflict(_))
    ));
    assert!(matches!(
        store.reject_registration(9999, 1).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn rejected_request_reopens_on_new_request() {
    let store = setup_store().await;
    let request = store
        .create_registration_request(20, "Dana", None)
        .await
        .expect("request");
    store
        .reject_registration(request.request_id, 1)
        .await
        .expect("reject");
    assert!(store.get_user(20).await.expect("lookup").is_none());

    let reopened = store
        .create_registration_request(20, "Dana Smith", None)
        .await
        .expect("request again");
    assert_eq!(reopened.request_id, request.request_id);
    assert_eq!(reopened.status, RegistrationStatus::Pending);
    assert_eq!(reopened.name, "Dana Smith");
    assert_eq!(reopened.reviewed_by, None);
}

#[tokio::test]
async fn approved_request_is_returned_as_is() {
    let store = setup_store().await;
    let request = store
        .create_registration_request(20, "Dana", None)
        .await
        .expect("request");
    store
        .approve_registration(request.request_id, 1)
        .await
        .expect("approve");

    let again = store
        .create_registration_request(20, "Dana", None)
        .await
        .expect("request again");
    assert_eq!(again.status, RegistrationStatus::Approved);
}
