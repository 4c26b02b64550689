use chrono::{DateTime, Utc};
use keygate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review status of one access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Awaiting a reviewer decision.
    Pending,
    /// A reviewer approved the request and a grant was created.
    Approved,
    /// A reviewer declined the request.
    Declined,
    /// The requester withdrew the request before review.
    Cancelled,
    /// An operator revoked the approved grant.
    Revoked,
}

impl RequestStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Declined => "DECLINED",
            Self::Cancelled => "CANCELLED",
            Self::Revoked => "REVOKED",
        }
    }

    /// Parses a storage value into a status.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "DECLINED" => Ok(Self::Declined),
            "CANCELLED" => Ok(Self::Cancelled),
            "REVOKED" => Ok(Self::Revoked),
            _ => Err(AppError::Validation(format!(
                "unknown request status '{value}'"
            ))),
        }
    }

    /// Returns whether this status permits no further mutation.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Declined | Self::Cancelled | Self::Revoked)
    }
}

/// Timing the requester asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedTiming {
    /// Requested access window length in seconds.
    pub duration_seconds: u32,
}

/// The approval-workflow record created when a user asks for a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Stable request identifier.
    pub id: String,
    /// Subject that created the request.
    pub requested_by: String,
    /// Access rule the request was validated against.
    pub rule_id: String,
    /// Rule version pinning the request to a policy snapshot.
    pub rule_version: String,
    /// Review status.
    pub status: RequestStatus,
    /// Timing the requester asked for.
    pub requested_timing: RequestedTiming,
    /// Grant created when approval materialized, when present.
    pub grant_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Association record granting one user the right to decide on one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    /// Request the reviewer may decide on.
    pub request_id: String,
    /// Reviewing subject.
    pub reviewer_id: String,
}

/// Generates a new request identifier.
#[must_use]
pub fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::{RequestStatus, new_request_id};

    #[test]
    fn status_roundtrip_storage_value() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Declined,
            RequestStatus::Cancelled,
            RequestStatus::Revoked,
        ] {
            let restored = RequestStatus::parse(status.as_str());
            assert!(restored.is_ok());
            assert_eq!(restored.unwrap_or(RequestStatus::Pending), status);
        }
    }

    #[test]
    fn approved_is_not_terminal() {
        assert!(!RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Revoked.is_terminal());
    }

    #[test]
    fn request_id_carries_type_prefix() {
        assert!(new_request_id().starts_with("req_"));
    }
}
