//! SSO permission-set access provider.
//!
//! The reference provider: grants shell access to a running workload by
//! creating a permission set named from the grant id, attaching an inline
//! policy scoped to the workload's task definition family, and assigning the
//! set to the directory principal resolved from the subject email. The SSO
//! control plane applies mutations asynchronously, so every mutation is
//! followed by a bounded status poll.

mod client;
mod http;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keygate_application::{AccessProvider, ProviderOption};
use keygate_core::{AppError, AppResult};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::retry::{RetryPolicy, retry_with_backoff};

pub use client::{
    Assignment, AssignmentOperation, AssignmentOperationReport, AssignmentOperationStatus,
    AssignmentPage, DirectoryClient, DirectoryUser, PermissionSet, PermissionSetPage,
    SsoAdminClient, WorkloadClient, WorkloadTask, WorkloadTaskPage,
};
pub use http::{HttpSsoAdminClient, HttpWorkloadClient, ScimDirectoryClient};

/// Control-plane limit on permission set name length.
const PERMISSION_SET_NAME_MAX_LEN: usize = 32;

/// Elapsed budget for polling a mutation's status until it settles.
const STATUS_POLL_BUDGET: Duration = Duration::from_secs(120);

/// Elapsed budget for tolerating delete conflicts shortly after creation.
const DELETE_CONFLICT_BUDGET: Duration = Duration::from_secs(60);

/// Static configuration for one SSO provider instance.
#[derive(Debug, Clone)]
pub struct SsoProviderConfig {
    /// Target account the permission sets are assigned on.
    pub account_id: String,
    /// Workload cluster the granted role gives shell access to.
    pub cluster: String,
    /// Control-plane region used in policy resource names.
    pub region: String,
    /// Sign-in portal URL surfaced in access instructions.
    pub portal_url: String,
}

/// Provider arguments carried in the grant's opaque argument bag.
#[derive(Debug, Deserialize)]
struct SsoArgs {
    #[serde(rename = "taskDefinitionFamily")]
    task_definition_family: String,
}

/// Access provider backed by an SSO control plane, a directory, and a
/// workload cluster.
pub struct SsoAccessProvider {
    admin: Arc<dyn SsoAdminClient>,
    directory: Arc<dyn DirectoryClient>,
    workloads: Arc<dyn WorkloadClient>,
    config: SsoProviderConfig,
}

impl SsoAccessProvider {
    /// Creates a provider from its client seams and configuration.
    #[must_use]
    pub fn new(
        admin: Arc<dyn SsoAdminClient>,
        directory: Arc<dyn DirectoryClient>,
        workloads: Arc<dyn WorkloadClient>,
        config: SsoProviderConfig,
    ) -> Self {
        Self {
            admin,
            directory,
            workloads,
            config,
        }
    }

    /// Scans the permission set listing for one set by name.
    async fn find_permission_set(&self, name: &str) -> AppResult<PermissionSet> {
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .admin
                .list_permission_sets(page_token.as_deref())
                .await?;

            if let Some(found) = page
                .permission_sets
                .into_iter()
                .find(|permission_set| permission_set.name == name)
            {
                return Ok(found);
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => {
                    return Err(AppError::NotFound(format!(
                        "permission set '{name}' not found"
                    )));
                }
            }
        }
    }

    /// Polls a settling mutation until it reports a terminal status.
    async fn await_settled<F, Fut>(&self, describe: F) -> AppResult<AssignmentOperationReport>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<AssignmentOperationReport>>,
    {
        retry_with_backoff(
            RetryPolicy::fibonacci(STATUS_POLL_BUDGET),
            is_transient,
            || async {
                let report = describe().await?;
                if report.status == AssignmentOperationStatus::InProgress {
                    return Err(AppError::Conflict(
                        "assignment operation still in progress".to_owned(),
                    ));
                }
                Ok(report)
            },
        )
        .await
    }

    /// Finds the newest running task for a definition family, when any.
    async fn newest_running_task(&self, family: &str) -> AppResult<Option<WorkloadTask>> {
        let mut newest: Option<WorkloadTask> = None;
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .workloads
                .list_tasks(
                    self.config.cluster.as_str(),
                    Some(family),
                    page_token.as_deref(),
                )
                .await?;

            for task in page.tasks {
                if !task.is_running {
                    continue;
                }
                let is_newer = newest
                    .as_ref()
                    .is_none_or(|current| task.definition_revision > current.definition_revision);
                if is_newer {
                    newest = Some(task);
                }
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => return Ok(newest),
            }
        }
    }

    /// Builds the inline policy allowing shell access to the task family.
    fn exec_policy_document(&self, family: &str) -> Value {
        let cluster_resource = format!(
            "wrn:{}:{}:cluster/{}",
            self.config.region, self.config.account_id, self.config.cluster
        );
        let task_wildcard = format!(
            "wrn:{}:{}:task/{}/*",
            self.config.region, self.config.account_id, self.config.cluster
        );
        let family_wildcard = format!(
            "wrn:{}:{}:task-definition/{family}:*",
            self.config.region, self.config.account_id
        );

        json!({
            "statements": [{
                "effect": "allow",
                "actions": ["workload:ExecuteCommand", "workload:DescribeTasks"],
                "resources": [task_wildcard, cluster_resource, family_wildcard],
            }]
        })
    }
}

#[async_trait]
impl AccessProvider for SsoAccessProvider {
    async fn grant(&self, subject: &str, args: &Value, grant_id: &str) -> AppResult<()> {
        let args = parse_args(args)?;
        info!(grant_id, subject, family = %args.task_definition_family, "granting sso access");

        // Assignment APIs silently no-op on missing accounts, so the target
        // must be checked explicitly first.
        self.admin
            .describe_account(self.config.account_id.as_str())
            .await?;

        let user = self.directory.find_user_by_email(subject).await?;

        let name = permission_set_name(grant_id);
        let permission_set = match self
            .admin
            .create_permission_set(name.as_str(), "Keygate temporary workload shell access")
            .await
        {
            Ok(permission_set) => permission_set,
            // A duplicate grant call finds the set it created earlier.
            Err(error) if error.is_conflict() => self.find_permission_set(name.as_str()).await?,
            Err(error) => return Err(error),
        };

        self.admin
            .put_inline_policy(
                permission_set.permission_set_id.as_str(),
                &self.exec_policy_document(args.task_definition_family.as_str()),
            )
            .await?;

        let operation = self
            .admin
            .create_assignment(
                self.config.account_id.as_str(),
                permission_set.permission_set_id.as_str(),
                user.user_id.as_str(),
            )
            .await?;

        let report = self
            .await_settled(|| {
                self.admin
                    .describe_assignment_creation(operation.request_id.as_str())
            })
            .await?;
        if let Some(reason) = report.failure_reason {
            return Err(AppError::Internal(format!(
                "failed creating account assignment: {reason}"
            )));
        }

        Ok(())
    }

    async fn revoke(&self, subject: &str, args: &Value, grant_id: &str) -> AppResult<()> {
        parse_args(args)?;
        info!(grant_id, subject, "revoking sso access");

        self.admin
            .describe_account(self.config.account_id.as_str())
            .await?;

        let user = self.directory.find_user_by_email(subject).await?;

        let name = permission_set_name(grant_id);
        let permission_set = match self.find_permission_set(name.as_str()).await {
            Ok(permission_set) => permission_set,
            // Already removed, possibly by a concurrent revoke.
            Err(error) if error.is_not_found() => {
                info!(grant_id, "permission set already absent, nothing to revoke");
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        // The control plane is eventually consistent shortly after creation
        // and reports a conflict until the assignment settles.
        let operation = match retry_with_backoff(
            RetryPolicy::fibonacci(DELETE_CONFLICT_BUDGET),
            AppError::is_conflict,
            || {
                self.admin.delete_assignment(
                    self.config.account_id.as_str(),
                    permission_set.permission_set_id.as_str(),
                    user.user_id.as_str(),
                )
            },
        )
        .await
        {
            Ok(operation) => Some(operation),
            Err(error) if error.is_not_found() => None,
            Err(error) => return Err(error),
        };

        if let Some(operation) = operation {
            let report = self
                .await_settled(|| {
                    self.admin
                        .describe_assignment_deletion(operation.request_id.as_str())
                })
                .await?;
            if let Some(reason) = report.failure_reason {
                return Err(AppError::Internal(format!(
                    "failed deleting account assignment: {reason}"
                )));
            }
        }

        // Deleting the set immediately after the assignment can transiently
        // fail while the unassignment propagates.
        match retry_with_backoff(
            RetryPolicy::fibonacci(STATUS_POLL_BUDGET),
            AppError::is_conflict,
            || {
                self.admin
                    .delete_permission_set(permission_set.permission_set_id.as_str())
            },
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn is_active(&self, subject: &str, args: &Value, grant_id: &str) -> AppResult<bool> {
        parse_args(args)?;

        let user = self.directory.find_user_by_email(subject).await?;

        let name = permission_set_name(grant_id);
        let permission_set = match self.find_permission_set(name.as_str()).await {
            Ok(permission_set) => permission_set,
            Err(error) if error.is_not_found() => return Ok(false),
            Err(error) => return Err(error),
        };

        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .admin
                .list_assignments(
                    self.config.account_id.as_str(),
                    permission_set.permission_set_id.as_str(),
                    page_token.as_deref(),
                )
                .await?;

            let assigned = page.assignments.iter().any(|assignment| {
                assignment.principal_id == user.user_id
                    && assignment.permission_set_id == permission_set.permission_set_id
            });
            if assigned {
                return Ok(true);
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => return Ok(false),
            }
        }
    }

    async fn instructions(
        &self,
        _subject: &str,
        args: &Value,
        grant_id: &str,
    ) -> AppResult<String> {
        let args = parse_args(args)?;
        let family = args.task_definition_family.as_str();

        let task = match self.newest_running_task(family).await? {
            Some(task) => task,
            // A missing workload is guidance, not an error.
            None => {
                return Ok(format!(
                    "We couldn't find a running task for the task family {family}.\n\n\
                     Start a new task in your cluster, then refresh this page to get access.\n"
                ));
            }
        };

        if !task.exec_enabled {
            return Ok(format!(
                "The task {} does not have command execution enabled, so access \
                 instructions cannot be generated.\nEnable command execution on the task \
                 definition and request the role again.\n",
                task.task_id
            ));
        }

        let mut text = String::from("# Browser\n");
        text.push_str(&format!(
            "You can assume this role from your [sign-in portal]({})\n\n",
            self.config.portal_url
        ));
        text.push_str("# CLI\n");
        text.push_str("Run the following with the workload CLI installed:\n\n");
        text.push_str("```\n");
        text.push_str(&format!(
            "assume --portal-url {} --region {} --account-id {} --role-name {grant_id}\n",
            self.config.portal_url, self.config.region, self.config.account_id
        ));
        text.push_str(&format!(
            "workload exec --cluster {} --task {} --interactive --command 'sh'\n",
            self.config.cluster, task.task_id
        ));
        text.push_str("```\n");

        Ok(text)
    }

    async fn options(&self, arg_id: &str) -> AppResult<Vec<ProviderOption>> {
        if arg_id != "taskDefinitionFamily" {
            return Err(AppError::Validation(format!(
                "provider does not support options for argument '{arg_id}'"
            )));
        }

        let mut families = BTreeSet::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .workloads
                .list_tasks(self.config.cluster.as_str(), None, page_token.as_deref())
                .await?;

            for task in page.tasks {
                families.insert(task.definition_family);
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(families
            .into_iter()
            .map(|family| ProviderOption {
                label: family.clone(),
                value: family,
            })
            .collect())
    }
}

fn parse_args(args: &Value) -> AppResult<SsoArgs> {
    serde_json::from_value(args.clone()).map_err(|error| {
        AppError::Validation(format!("invalid sso provider arguments: {error}"))
    })
}

/// Errors worth retrying while polling a settling mutation.
fn is_transient(error: &AppError) -> bool {
    matches!(error, AppError::Conflict(_) | AppError::Internal(_))
}

/// Derives the permission set name from a grant identifier.
///
/// Names are capped at 32 characters by the control plane; longer grant ids
/// are truncated, so distinct ids sharing a 32-character prefix would collide.
fn permission_set_name(grant_id: &str) -> String {
    grant_id.chars().take(PERMISSION_SET_NAME_MAX_LEN).collect()
}
