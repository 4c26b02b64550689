//! Domain types for the Keygate access lifecycle.

#![forbid(unsafe_code)]

mod execution;
mod grant;
mod request;
mod rule;

pub use execution::{WAIT_FOR_WINDOW_END_STATE, execution_identifier};
pub use grant::{Grant, GrantStatus, WorkflowInput, new_grant_id};
pub use request::{Request, RequestStatus, RequestedTiming, Reviewer, new_request_id};
pub use rule::{AccessRule, RuleTarget, TimeConstraints};
