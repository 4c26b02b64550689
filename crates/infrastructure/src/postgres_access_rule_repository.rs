//! PostgreSQL-backed access rule repository.

use async_trait::async_trait;
use keygate_application::AccessRuleRepository;
use keygate_core::{AppError, AppResult};
use keygate_domain::{AccessRule, RuleTarget, TimeConstraints};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// PostgreSQL repository for versioned access rules.
#[derive(Clone)]
pub struct PostgresAccessRuleRepository {
    pool: PgPool,
}

impl PostgresAccessRuleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AccessRuleRow {
    id: String,
    version: String,
    name: String,
    provider_id: String,
    target_args: Value,
    max_duration_seconds: i32,
    groups: Vec<String>,
    approvers: Vec<String>,
}

const RULE_COLUMNS: &str = r#"
    id,
    version,
    name,
    provider_id,
    target_args,
    max_duration_seconds,
    groups,
    approvers
"#;

#[async_trait]
impl AccessRuleRepository for PostgresAccessRuleRepository {
    async fn get_current_rule(&self, rule_id: &str) -> AppResult<AccessRule> {
        let row = sqlx::query_as::<_, AccessRuleRow>(&format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM access_rules
            WHERE id = $1 AND is_current = true
            "#
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to fetch access rule '{rule_id}': {error}"))
        })?;

        match row {
            Some(row) => rule_from_row(row),
            None => Err(AppError::NotFound(format!(
                "access rule '{rule_id}' not found"
            ))),
        }
    }

    async fn get_rule_version(&self, rule_id: &str, version: &str) -> AppResult<AccessRule> {
        let row = sqlx::query_as::<_, AccessRuleRow>(&format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM access_rules
            WHERE id = $1 AND version = $2
            "#
        ))
        .bind(rule_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to fetch access rule '{rule_id}' version '{version}': {error}"
            ))
        })?;

        match row {
            Some(row) => rule_from_row(row),
            None => Err(AppError::NotFound(format!(
                "access rule '{rule_id}' version '{version}' not found"
            ))),
        }
    }
}

fn rule_from_row(row: AccessRuleRow) -> AppResult<AccessRule> {
    let max_duration_seconds = u32::try_from(row.max_duration_seconds).map_err(|_| {
        AppError::Internal(format!(
            "access rule '{}' carries a negative max duration",
            row.id
        ))
    })?;

    Ok(AccessRule {
        id: row.id,
        version: row.version,
        name: row.name,
        target: RuleTarget {
            provider_id: row.provider_id,
            args: row.target_args,
        },
        time_constraints: TimeConstraints {
            max_duration_seconds,
        },
        groups: row.groups,
        approvers: row.approvers,
    })
}
