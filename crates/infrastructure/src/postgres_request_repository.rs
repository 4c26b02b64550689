//! PostgreSQL-backed request and reviewer repositories.

use async_trait::async_trait;
use keygate_application::{RequestRepository, RequestStatusUpdate, ReviewerRepository};
use keygate_core::{AppError, AppResult};
use keygate_domain::{Request, RequestStatus, RequestedTiming, Reviewer};
use sqlx::{FromRow, PgPool};

/// Upper bound on rows returned by request listings.
const MAX_LISTED_REQUESTS: i64 = 200;

/// PostgreSQL repository for access requests and their reviewers.
#[derive(Clone)]
pub struct PostgresRequestRepository {
    pool: PgPool,
}

impl PostgresRequestRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id: String,
    requested_by: String,
    rule_id: String,
    rule_version: String,
    status: String,
    duration_seconds: i32,
    grant_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, FromRow)]
struct ReviewerRow {
    request_id: String,
    reviewer_id: String,
}

const REQUEST_COLUMNS: &str = r#"
    id,
    requested_by,
    rule_id,
    rule_version,
    status,
    duration_seconds,
    grant_id,
    created_at,
    updated_at
"#;

#[async_trait]
impl RequestRepository for PostgresRequestRepository {
    async fn create_request(&self, request: Request) -> AppResult<()> {
        let duration_seconds =
            i32::try_from(request.requested_timing.duration_seconds).map_err(|_| {
                AppError::Validation(
                    "requested duration_seconds exceeds supported range".to_owned(),
                )
            })?;

        sqlx::query(
            r#"
            INSERT INTO access_requests (
                id,
                requested_by,
                rule_id,
                rule_version,
                status,
                duration_seconds,
                grant_id,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id.as_str())
        .bind(request.requested_by.as_str())
        .bind(request.rule_id.as_str())
        .bind(request.rule_version.as_str())
        .bind(request.status.as_str())
        .bind(duration_seconds)
        .bind(request.grant_id.as_deref())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to create access request '{}': {error}",
                request.id
            ))
        })?;

        Ok(())
    }

    async fn get_request(&self, request_id: &str) -> AppResult<Request> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM access_requests WHERE id = $1"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to fetch access request '{request_id}': {error}"))
        })?;

        match row {
            Some(row) => request_from_row(row),
            None => Err(AppError::NotFound(format!(
                "request '{request_id}' not found"
            ))),
        }
    }

    async fn update_status(&self, update: RequestStatusUpdate) -> AppResult<Request> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            UPDATE access_requests
            SET status = $2,
                grant_id = COALESCE($3, grant_id),
                updated_at = now()
            WHERE id = $1
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(update.request_id.as_str())
        .bind(update.status.as_str())
        .bind(update.grant_id.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update access request '{}': {error}",
                update.request_id
            ))
        })?;

        match row {
            Some(row) => request_from_row(row),
            None => Err(AppError::NotFound(format!(
                "request '{}' not found",
                update.request_id
            ))),
        }
    }

    async fn list_for_user(
        &self,
        subject: &str,
        status: Option<RequestStatus>,
    ) -> AppResult<Vec<Request>> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM access_requests
            WHERE requested_by = $1
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#
        ))
        .bind(subject)
        .bind(status.map(|status| status.as_str()))
        .bind(MAX_LISTED_REQUESTS)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list access requests for '{subject}': {error}"
            ))
        })?;

        rows.into_iter().map(request_from_row).collect()
    }

    async fn list_for_reviewer(
        &self,
        reviewer_id: &str,
        status: Option<RequestStatus>,
    ) -> AppResult<Vec<Request>> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            SELECT
                requests.id,
                requests.requested_by,
                requests.rule_id,
                requests.rule_version,
                requests.status,
                requests.duration_seconds,
                requests.grant_id,
                requests.created_at,
                requests.updated_at
            FROM access_requests AS requests
            INNER JOIN access_request_reviewers AS reviewers
                ON reviewers.request_id = requests.id
            WHERE reviewers.reviewer_id = $1
              AND ($2::TEXT IS NULL OR requests.status = $2)
            ORDER BY requests.created_at DESC
            LIMIT $3
            "#
        ))
        .bind(reviewer_id)
        .bind(status.map(|status| status.as_str()))
        .bind(MAX_LISTED_REQUESTS)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list reviewable requests for '{reviewer_id}': {error}"
            ))
        })?;

        rows.into_iter().map(request_from_row).collect()
    }
}

#[async_trait]
impl ReviewerRepository for PostgresRequestRepository {
    async fn create_reviewers(&self, reviewers: Vec<Reviewer>) -> AppResult<()> {
        if reviewers.is_empty() {
            return Ok(());
        }

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        for reviewer in &reviewers {
            sqlx::query(
                r#"
                INSERT INTO access_request_reviewers (request_id, reviewer_id)
                VALUES ($1, $2)
                ON CONFLICT (request_id, reviewer_id) DO NOTHING
                "#,
            )
            .bind(reviewer.request_id.as_str())
            .bind(reviewer.reviewer_id.as_str())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to persist reviewer '{}' for request '{}': {error}",
                    reviewer.reviewer_id, reviewer.request_id
                ))
            })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })
    }

    async fn get_reviewer(
        &self,
        request_id: &str,
        reviewer_id: &str,
    ) -> AppResult<Option<Reviewer>> {
        let row = sqlx::query_as::<_, ReviewerRow>(
            r#"
            SELECT request_id, reviewer_id
            FROM access_request_reviewers
            WHERE request_id = $1 AND reviewer_id = $2
            "#,
        )
        .bind(request_id)
        .bind(reviewer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to fetch reviewer '{reviewer_id}' for request '{request_id}': {error}"
            ))
        })?;

        Ok(row.map(|row| Reviewer {
            request_id: row.request_id,
            reviewer_id: row.reviewer_id,
        }))
    }
}

fn request_from_row(row: RequestRow) -> AppResult<Request> {
    let duration_seconds = u32::try_from(row.duration_seconds).map_err(|_| {
        AppError::Internal(format!(
            "request '{}' carries a negative duration",
            row.id
        ))
    })?;

    Ok(Request {
        id: row.id,
        requested_by: row.requested_by,
        rule_id: row.rule_id,
        rule_version: row.rule_version,
        status: RequestStatus::parse(row.status.as_str())?,
        requested_timing: RequestedTiming { duration_seconds },
        grant_id: row.grant_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
