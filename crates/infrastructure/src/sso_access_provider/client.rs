use async_trait::async_trait;
use keygate_core::AppResult;
use serde::Deserialize;
use serde_json::Value;

/// One directory principal resolved from a subject email.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryUser {
    /// Stable directory identifier.
    pub user_id: String,
    /// Login name, matching the subject email.
    pub user_name: String,
}

/// Directory lookup seam used to resolve subjects to principals.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Resolves a principal by exact email match.
    ///
    /// Zero matches is a not-found error; more than one match is an
    /// ambiguity error, since assignment must target exactly one principal.
    async fn find_user_by_email(&self, email: &str) -> AppResult<DirectoryUser>;
}

/// One permission set known to the SSO control plane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermissionSet {
    /// Control-plane identifier.
    pub permission_set_id: String,
    /// Unique permission set name.
    pub name: String,
}

/// One page of the permission set listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermissionSetPage {
    /// Permission sets on this page.
    pub permission_sets: Vec<PermissionSet>,
    /// Continuation token; absent on the final page.
    pub next_token: Option<String>,
}

/// Handle for one asynchronous assignment mutation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssignmentOperation {
    /// Identifier used to poll the mutation's status.
    pub request_id: String,
}

/// Progress state of one asynchronous assignment mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOperationStatus {
    /// The control plane is still applying the mutation.
    InProgress,
    /// The mutation settled successfully.
    Succeeded,
    /// The mutation settled with a failure.
    Failed,
}

/// Status report for one asynchronous assignment mutation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssignmentOperationReport {
    /// Progress state.
    pub status: AssignmentOperationStatus,
    /// Provider-supplied failure reason for failed mutations.
    pub failure_reason: Option<String>,
}

/// One active account assignment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Assignment {
    /// Assigned principal.
    pub principal_id: String,
    /// Assigned permission set.
    pub permission_set_id: String,
}

/// One page of the account assignment listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssignmentPage {
    /// Assignments on this page.
    pub assignments: Vec<Assignment>,
    /// Continuation token; absent on the final page.
    pub next_token: Option<String>,
}

/// SSO control-plane seam for permission sets and account assignments.
///
/// Every mutation is asynchronous on the provider side; callers poll the
/// returned operation until it settles.
#[async_trait]
pub trait SsoAdminClient: Send + Sync {
    /// Confirms the target account exists. Assignment APIs silently no-op on
    /// missing accounts, so callers check explicitly before mutating.
    async fn describe_account(&self, account_id: &str) -> AppResult<()>;

    /// Creates a named permission set. An existing name is a conflict.
    async fn create_permission_set(
        &self,
        name: &str,
        description: &str,
    ) -> AppResult<PermissionSet>;

    /// Attaches an inline policy document to a permission set.
    async fn put_inline_policy(
        &self,
        permission_set_id: &str,
        policy_document: &Value,
    ) -> AppResult<()>;

    /// Lists permission sets, one page per call.
    async fn list_permission_sets(&self, page_token: Option<&str>)
    -> AppResult<PermissionSetPage>;

    /// Deletes a permission set. Deletion shortly after unassignment can
    /// transiently conflict; an absent set is a not-found error.
    async fn delete_permission_set(&self, permission_set_id: &str) -> AppResult<()>;

    /// Starts assigning a permission set to a principal on an account.
    async fn create_assignment(
        &self,
        account_id: &str,
        permission_set_id: &str,
        principal_id: &str,
    ) -> AppResult<AssignmentOperation>;

    /// Reports the status of an assignment creation.
    async fn describe_assignment_creation(
        &self,
        request_id: &str,
    ) -> AppResult<AssignmentOperationReport>;

    /// Starts deleting an assignment. Deletion shortly after creation can
    /// transiently conflict; an absent assignment is a not-found error.
    async fn delete_assignment(
        &self,
        account_id: &str,
        permission_set_id: &str,
        principal_id: &str,
    ) -> AppResult<AssignmentOperation>;

    /// Reports the status of an assignment deletion.
    async fn describe_assignment_deletion(
        &self,
        request_id: &str,
    ) -> AppResult<AssignmentOperationReport>;

    /// Lists active assignments of a permission set on an account.
    async fn list_assignments(
        &self,
        account_id: &str,
        permission_set_id: &str,
        page_token: Option<&str>,
    ) -> AppResult<AssignmentPage>;
}

/// One workload task known to the cluster control plane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkloadTask {
    /// Task identifier.
    pub task_id: String,
    /// Task definition family the task was launched from.
    pub definition_family: String,
    /// Task definition revision.
    pub definition_revision: u32,
    /// Whether the task is currently running.
    pub is_running: bool,
    /// Whether remote command execution is enabled on the task.
    pub exec_enabled: bool,
}

/// One page of the workload task listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkloadTaskPage {
    /// Tasks on this page.
    pub tasks: Vec<WorkloadTask>,
    /// Continuation token; absent on the final page.
    pub next_token: Option<String>,
}

/// Workload cluster seam used for guidance and argument options.
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Lists cluster tasks, optionally scoped to a definition family.
    async fn list_tasks(
        &self,
        cluster: &str,
        family: Option<&str>,
        page_token: Option<&str>,
    ) -> AppResult<WorkloadTaskPage>;
}
