//! Application services and ports for the Keygate access lifecycle.

#![forbid(unsafe_code)]

mod access_ports;
mod access_service;
mod event_ports;
mod granter_service;
mod provider_ports;
mod workflow_ports;

pub use access_ports::{
    AccessRuleRepository, CreateRequestInput, RequestDetail, RequestListQuery, RequestRepository,
    RequestStatusUpdate, ReviewerRepository,
};
pub use access_service::{AccessRequestService, ReviewDecision};
pub use event_ports::{AccessEvent, EventPublisher};
pub use granter_service::{CreateGrantInput, Granter, GranterService};
pub use provider_ports::{
    AccessProvider, ProviderOption, ProviderOptionCache, ProviderRegistry,
};
pub use workflow_ports::{
    ExecutionDescription, ExecutionEvent, ExecutionStatus, TransitionTask, TransitionTaskKind,
    TransitionTaskOutcome, TransitionTaskQueue, WorkflowEngine,
};
