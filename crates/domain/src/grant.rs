use chrono::{DateTime, Utc};
use keygate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status of one provider grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantStatus {
    /// Requested; the permission artifact has not been created yet.
    Pending,
    /// The access window is open and the provider assignment exists.
    Active,
    /// The window elapsed naturally and access was removed.
    Expired,
    /// An operator revoked access before the window closed.
    Revoked,
    /// A provider call failed and the lifecycle halted.
    Error,
}

impl GrantStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
            Self::Error => "ERROR",
        }
    }

    /// Parses a storage value into a status.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "REVOKED" => Ok(Self::Revoked),
            "ERROR" => Ok(Self::Error),
            _ => Err(AppError::Validation(format!(
                "unknown grant status '{value}'"
            ))),
        }
    }

    /// Returns whether this status ends the lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked | Self::Error)
    }

    /// Returns whether a transition to `next` preserves monotonic ordering.
    ///
    /// Transitions never move backwards: PENDING may become ACTIVE or any
    /// terminal status, ACTIVE may become any terminal status, and terminal
    /// statuses absorb.
    #[must_use]
    pub fn can_transition_to(&self, next: GrantStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Active => next.is_terminal(),
            Self::Expired | Self::Revoked | Self::Error => false,
        }
    }
}

/// A time-bounded, provider-specific permission assignment for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    /// Globally unique grant identifier.
    pub id: String,
    /// Registry identifier of the provider that fulfils the grant.
    pub provider: String,
    /// Principal identifier, typically an email address.
    pub subject: String,
    /// Opaque provider-defined argument bag.
    pub with: Value,
    /// Current lifecycle status.
    pub status: GrantStatus,
    /// Window open timestamp.
    pub start: DateTime<Utc>,
    /// Window close timestamp.
    pub end: DateTime<Utc>,
}

impl Grant {
    /// Validates the structural invariants of a grant.
    pub fn validate(&self) -> AppResult<()> {
        if self.subject.trim().is_empty() {
            return Err(AppError::Validation(
                "grant subject must not be empty".to_owned(),
            ));
        }

        if self.end <= self.start {
            return Err(AppError::Validation(format!(
                "grant window end '{}' must be after start '{}'",
                self.end, self.start
            )));
        }

        Ok(())
    }
}

/// The grant snapshot serialized as a workflow execution's durable input.
///
/// The execution input is the single source of truth for an in-flight grant;
/// no separate grant store exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    /// The grant driven by the execution.
    pub grant: Grant,
}

/// Generates a new globally unique grant identifier.
#[must_use]
pub fn new_grant_id() -> String {
    format!("gra_{}", Uuid::new_v4().simple())
}
