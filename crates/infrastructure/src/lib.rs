//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_event_publisher;
mod http_workflow_engine;
mod postgres_access_rule_repository;
mod postgres_request_repository;
mod redis_provider_option_cache;
pub mod retry;
mod sso_access_provider;
mod vault_access_provider;

pub use http_event_publisher::HttpEventPublisher;
pub use http_workflow_engine::HttpWorkflowEngine;
pub use postgres_access_rule_repository::PostgresAccessRuleRepository;
pub use postgres_request_repository::PostgresRequestRepository;
pub use redis_provider_option_cache::RedisProviderOptionCache;
pub use sso_access_provider::{
    Assignment, AssignmentOperation, AssignmentOperationReport, AssignmentOperationStatus,
    AssignmentPage, DirectoryClient, DirectoryUser, HttpSsoAdminClient, HttpWorkloadClient,
    PermissionSet, PermissionSetPage, ScimDirectoryClient, SsoAccessProvider, SsoAdminClient,
    SsoProviderConfig, WorkloadClient, WorkloadTask, WorkloadTaskPage,
};
pub use vault_access_provider::VaultAccessProvider;
