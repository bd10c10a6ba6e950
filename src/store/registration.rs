//! Registration requests reviewed by super admins.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::users::register_user_on;
use super::{Store, StoreError};

/// Review state of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Awaiting review.
    Pending,
    /// Approved; the user is registered.
    Approved,
    /// Rejected; the user may ask again.
    Rejected,
}

impl RegistrationStatus {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(StoreError::InvalidEnum {
                field: "registration status",
                value: other.to_owned(),
            }),
        }
    }
}

/// A request to join, created by `/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Row id.
    pub request_id: i64,
    /// Requesting user.
    pub user_id: i64,
    /// Name supplied with the request.
    pub name: String,
    /// Telegram @username, if any.
    pub username: Option<String>,
    /// Review state.
    pub status: RegistrationStatus,
    /// When the request was made (ISO 8601).
    pub created_at: String,
    /// Reviewer's user id.
    pub reviewed_by: Option<i64>,
    /// When the request was reviewed (ISO 8601).
    pub reviewed_at: Option<String>,
}

type RequestRow = (
    i64,
    i64,
    String,
    Option<String>,
    String,
    String,
    Option<i64>,
    Option<String>,
);

const REQUEST_COLUMNS: &str =
    "request_id, user_id, name, username, status, created_at, reviewed_by, reviewed_at";

fn row_to_request(row: RequestRow) -> Result<RegistrationRequest, StoreError> {
    let (request_id, user_id, name, username, status, created_at, reviewed_by, reviewed_at) = row;
    Ok(RegistrationRequest {
        request_id,
        user_id,
        name,
        username,
        status: RegistrationStatus::parse(&status)?,
        created_at,
        reviewed_by,
        reviewed_at,
    })
}

impl Store {
    /// File a registration request, or return the user's existing one.
    ///
    /// A pending or approved request is returned unchanged. A rejected one is
    /// reopened as pending.
    pub async fn create_registration_request(
        &self,
        user_id: i64,
        name: &str,
        username: Option<&str>,
    ) -> Result<RegistrationRequest, StoreError> {
        sqlx::query(
            "INSERT INTO registration_requests (user_id, name, username) VALUES (?1, ?2, ?3) \
             ON CONFLICT(user_id) DO UPDATE SET \
               status = 'pending', name = excluded.name, username = excluded.username, \
               created_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now'), \
               reviewed_by = NULL, reviewed_at = NULL \
             WHERE registration_requests.status = 'rejected'",
        )
        .bind(user_id)
        .bind(name)
        .bind(username)
        .execute(&self.pool)
        .await?;

        let sql = format!("SELECT {REQUEST_COLUMNS} FROM registration_requests WHERE user_id = ?1");
        let row: RequestRow = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        row_to_request(row)
    }

    /// Look up a registration request by id.
    pub async fn get_registration_request(
        &self,
        request_id: i64,
    ) -> Result<Option<RegistrationRequest>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM registration_requests WHERE request_id = ?1");
        let row: Option<RequestRow> = sqlx::query_as(&sql)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_request).transpose()
    }

    /// Requests awaiting review, oldest first.
    pub async fn pending_registration_requests(
        &self,
    ) -> Result<Vec<RegistrationRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM registration_requests \
             WHERE status = 'pending' ORDER BY request_id"
        );
        let rows: Vec<RequestRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_request).collect()
    }

    /// Approve a pending request and register the user.
    pub async fn approve_registration(
        &self,
        request_id: i64,
        reviewer: i64,
    ) -> Result<RegistrationRequest, StoreError> {
        let request = self.review(request_id, reviewer, RegistrationStatus::Approved).await?;
        info!(request_id, user_id = request.user_id, reviewer, "registration approved");
        Ok(request)
    }

    /// Reject a pending request.
    pub async fn reject_registration(
        &self,
        request_id: i64,
        reviewer: i64,
    ) -> Result<RegistrationRequest, StoreError> {
        let request = self.review(request_id, reviewer, RegistrationStatus::Rejected).await?;
        info!(request_id, user_id = request.user_id, reviewer, "registration rejected");
        Ok(request)
    }

    async fn review(
        &self,
        request_id: i64,
        reviewer: i64,
        outcome: RegistrationStatus,
    ) -> Result<RegistrationRequest, StoreError> {
        let mut tx = self.begin_write().await?;

        let sql = format!("SELECT {REQUEST_COLUMNS} FROM registration_requests WHERE request_id = ?1");
        let row: Option<RequestRow> = sqlx::query_as(&sql)
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await?;
        let request = row
            .map(row_to_request)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("registration request", request_id))?;
        if request.status != RegistrationStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "request #{request_id} is already {}",
                request.status.as_str()
            )));
        }

        sqlx::query(
            "UPDATE registration_requests SET status = ?1, reviewed_by = ?2, \
               reviewed_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
             WHERE request_id = ?3",
        )
        .bind(outcome.as_str())
        .bind(reviewer)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        if outcome == RegistrationStatus::Approved {
            register_user_on(
                &mut tx,
                request.user_id,
                &request.name,
                request.username.as_deref(),
            )
            .await?;
        }

        let row: RequestRow = sqlx::query_as(&sql)
            .bind(request_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row_to_request(row)
    }
}
