use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Typed access lifecycle events emitted by application services.
///
/// Publishing is fire-and-forget: implementations absorb delivery failures so
/// an event sink outage never fails the originating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccessEvent {
    /// A request was created.
    RequestCreated {
        /// Request identifier.
        request_id: String,
        /// Requesting subject.
        requested_by: String,
        /// Rule the request was made under.
        rule_id: String,
    },
    /// A request was approved and a grant created.
    RequestApproved {
        /// Request identifier.
        request_id: String,
        /// Approving subject, or the requester for auto-approved rules.
        approved_by: String,
        /// Grant created by the approval.
        grant_id: String,
    },
    /// A reviewer declined a request.
    RequestDeclined {
        /// Request identifier.
        request_id: String,
        /// Declining subject.
        declined_by: String,
    },
    /// The requester withdrew a pending request.
    RequestCancelled {
        /// Request identifier.
        request_id: String,
    },
    /// An operator revoked an approved request's grant.
    RequestRevoked {
        /// Request identifier.
        request_id: String,
        /// Revoking subject.
        revoked_by: String,
        /// Grant that was revoked.
        grant_id: String,
    },
    /// A grant workflow execution was started.
    GrantCreated {
        /// Grant identifier.
        grant_id: String,
        /// Fulfilling provider.
        provider: String,
        /// Granted subject.
        subject: String,
    },
    /// A grant was revoked and its execution stopped.
    GrantRevoked {
        /// Grant identifier.
        grant_id: String,
        /// Revoking subject.
        revoker: String,
    },
}

impl AccessEvent {
    /// Returns a stable event type identifier.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RequestCreated { .. } => "request.created",
            Self::RequestApproved { .. } => "request.approved",
            Self::RequestDeclined { .. } => "request.declined",
            Self::RequestCancelled { .. } => "request.cancelled",
            Self::RequestRevoked { .. } => "request.revoked",
            Self::GrantCreated { .. } => "grant.created",
            Self::GrantRevoked { .. } => "grant.revoked",
        }
    }
}

/// Port for publishing typed access events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event. Delivery failures are absorbed by the
    /// implementation.
    async fn publish(&self, event: AccessEvent);
}
