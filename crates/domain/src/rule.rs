use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider target an access rule grants into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTarget {
    /// Registry identifier of the provider.
    pub provider_id: String,
    /// Provider-defined argument bag copied onto grants created from the rule.
    pub args: Value,
}

/// Time constraints an access rule places on requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConstraints {
    /// Longest access window a request may ask for, in seconds.
    pub max_duration_seconds: u32,
}

/// Policy template a request is validated against.
///
/// Rules are versioned; a request records the version it was validated
/// against so later policy edits never change an in-flight request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Stable rule identifier.
    pub id: String,
    /// Version of this policy snapshot.
    pub version: String,
    /// Human-readable rule name.
    pub name: String,
    /// Provider target.
    pub target: RuleTarget,
    /// Request timing policy.
    pub time_constraints: TimeConstraints,
    /// Directory groups whose members may request under this rule.
    pub groups: Vec<String>,
    /// Subjects entitled to review requests under this rule. An empty list
    /// means requests are approved automatically.
    pub approvers: Vec<String>,
}

impl AccessRule {
    /// Returns whether requests under this rule skip review.
    #[must_use]
    pub fn auto_approves(&self) -> bool {
        self.approvers.is_empty()
    }
}
