use async_trait::async_trait;
use keygate_core::AppResult;
use keygate_domain::{AccessRule, Request, RequestStatus, Reviewer};

/// Input payload for creating an access request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequestInput {
    /// Access rule the request is made under.
    pub rule_id: String,
    /// Requested access window length in seconds.
    pub duration_seconds: u32,
}

/// Request projection returned to callers, with the review affordance flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDetail {
    /// The request record.
    pub request: Request,
    /// Whether the caller may review the request. Computed only for the
    /// reviewer/administrator view; drives UI affordances and nothing else.
    pub can_review: bool,
}

/// Listing query for access requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestListQuery {
    /// List requests awaiting the caller's review instead of their own.
    pub as_reviewer: bool,
    /// Optional status filter.
    pub status: Option<RequestStatus>,
}

/// Status mutation applied to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStatusUpdate {
    /// Request identifier.
    pub request_id: String,
    /// New review status.
    pub status: RequestStatus,
    /// Grant recorded on the request when approval materialized one.
    pub grant_id: Option<String>,
}

/// Repository port for access request records.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Persists a new request.
    async fn create_request(&self, request: Request) -> AppResult<()>;

    /// Fetches one request by identifier.
    async fn get_request(&self, request_id: &str) -> AppResult<Request>;

    /// Applies a status mutation and bumps the update timestamp.
    async fn update_status(&self, update: RequestStatusUpdate) -> AppResult<Request>;

    /// Lists requests created by a subject, newest first.
    async fn list_for_user(
        &self,
        subject: &str,
        status: Option<RequestStatus>,
    ) -> AppResult<Vec<Request>>;

    /// Lists requests a subject is entitled to review, newest first.
    async fn list_for_reviewer(
        &self,
        reviewer_id: &str,
        status: Option<RequestStatus>,
    ) -> AppResult<Vec<Request>>;
}

/// Repository port for reviewer association records.
#[async_trait]
pub trait ReviewerRepository: Send + Sync {
    /// Persists reviewer associations for a request entering review.
    async fn create_reviewers(&self, reviewers: Vec<Reviewer>) -> AppResult<()>;

    /// Fetches the reviewer association for one request and subject.
    async fn get_reviewer(
        &self,
        request_id: &str,
        reviewer_id: &str,
    ) -> AppResult<Option<Reviewer>>;
}

/// Repository port for versioned access rules.
#[async_trait]
pub trait AccessRuleRepository: Send + Sync {
    /// Fetches the current version of a rule.
    async fn get_current_rule(&self, rule_id: &str) -> AppResult<AccessRule>;

    /// Fetches a pinned policy snapshot.
    async fn get_rule_version(&self, rule_id: &str, version: &str) -> AppResult<AccessRule>;
}
