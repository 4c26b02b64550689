use async_trait::async_trait;
use keygate_core::{AppError, AppResult};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::{
    AssignmentOperation, AssignmentOperationReport, AssignmentPage, DirectoryClient,
    DirectoryUser, PermissionSet, PermissionSetPage, SsoAdminClient, WorkloadClient,
    WorkloadTaskPage,
};

/// HTTP client for the SSO control plane's administration API.
#[derive(Clone)]
pub struct HttpSsoAdminClient {
    http_client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpSsoAdminClient {
    /// Creates a client for one control-plane endpoint.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: trim_base_url(base_url.into()),
            api_token: api_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        context: &str,
    ) -> AppResult<T> {
        let response = builder
            .bearer_auth(self.api_token.as_str())
            .send()
            .await
            .map_err(|error| transport_error(context, &error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(status_error(context, status, body));
        }

        response.json::<T>().await.map_err(|error| {
            AppError::Internal(format!("{context} returned a malformed body: {error}"))
        })
    }

    async fn send_unit(&self, builder: reqwest::RequestBuilder, context: &str) -> AppResult<()> {
        let response = builder
            .bearer_auth(self.api_token.as_str())
            .send()
            .await
            .map_err(|error| transport_error(context, &error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(status_error(context, status, body));
        }

        Ok(())
    }
}

#[async_trait]
impl SsoAdminClient for HttpSsoAdminClient {
    async fn describe_account(&self, account_id: &str) -> AppResult<()> {
        self.send_unit(
            self.http_client
                .get(self.url(&format!("/v1/accounts/{account_id}"))),
            "describe account",
        )
        .await
    }

    async fn create_permission_set(
        &self,
        name: &str,
        description: &str,
    ) -> AppResult<PermissionSet> {
        self.send(
            self.http_client
                .post(self.url("/v1/permission-sets"))
                .json(&serde_json::json!({
                    "name": name,
                    "description": description,
                })),
            "create permission set",
        )
        .await
    }

    async fn put_inline_policy(
        &self,
        permission_set_id: &str,
        policy_document: &Value,
    ) -> AppResult<()> {
        self.send_unit(
            self.http_client
                .put(self.url(&format!(
                    "/v1/permission-sets/{permission_set_id}/inline-policy"
                )))
                .json(&serde_json::json!({ "policy": policy_document })),
            "put inline policy",
        )
        .await
    }

    async fn list_permission_sets(
        &self,
        page_token: Option<&str>,
    ) -> AppResult<PermissionSetPage> {
        let mut builder = self.http_client.get(self.url("/v1/permission-sets"));
        if let Some(token) = page_token {
            builder = builder.query(&[("page_token", token)]);
        }
        self.send(builder, "list permission sets").await
    }

    async fn delete_permission_set(&self, permission_set_id: &str) -> AppResult<()> {
        self.send_unit(
            self.http_client
                .delete(self.url(&format!("/v1/permission-sets/{permission_set_id}"))),
            "delete permission set",
        )
        .await
    }

    async fn create_assignment(
        &self,
        account_id: &str,
        permission_set_id: &str,
        principal_id: &str,
    ) -> AppResult<AssignmentOperation> {
        self.send(
            self.http_client
                .post(self.url(&format!("/v1/accounts/{account_id}/assignments")))
                .json(&serde_json::json!({
                    "permission_set_id": permission_set_id,
                    "principal_id": principal_id,
                })),
            "create assignment",
        )
        .await
    }

    async fn describe_assignment_creation(
        &self,
        request_id: &str,
    ) -> AppResult<AssignmentOperationReport> {
        self.send(
            self.http_client.get(self.url(&format!(
                "/v1/assignment-operations/creations/{request_id}"
            ))),
            "describe assignment creation",
        )
        .await
    }

    async fn delete_assignment(
        &self,
        account_id: &str,
        permission_set_id: &str,
        principal_id: &str,
    ) -> AppResult<AssignmentOperation> {
        self.send(
            self.http_client
                .post(self.url(&format!("/v1/accounts/{account_id}/assignments/delete")))
                .json(&serde_json::json!({
                    "permission_set_id": permission_set_id,
                    "principal_id": principal_id,
                })),
            "delete assignment",
        )
        .await
    }

    async fn describe_assignment_deletion(
        &self,
        request_id: &str,
    ) -> AppResult<AssignmentOperationReport> {
        self.send(
            self.http_client.get(self.url(&format!(
                "/v1/assignment-operations/deletions/{request_id}"
            ))),
            "describe assignment deletion",
        )
        .await
    }

    async fn list_assignments(
        &self,
        account_id: &str,
        permission_set_id: &str,
        page_token: Option<&str>,
    ) -> AppResult<AssignmentPage> {
        let mut builder = self
            .http_client
            .get(self.url(&format!("/v1/accounts/{account_id}/assignments")))
            .query(&[("permission_set_id", permission_set_id)]);
        if let Some(token) = page_token {
            builder = builder.query(&[("page_token", token)]);
        }
        self.send(builder, "list assignments").await
    }
}

/// SCIM directory client resolving subjects by exact login-name match.
#[derive(Clone)]
pub struct ScimDirectoryClient {
    http_client: reqwest::Client,
    base_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct ScimUser {
    id: String,
    #[serde(rename = "userName")]
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct ScimListResponse {
    #[serde(rename = "totalResults")]
    total_results: u32,
    #[serde(rename = "Resources", default)]
    resources: Vec<ScimUser>,
}

impl ScimDirectoryClient {
    /// Creates a client for one SCIM endpoint.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: trim_base_url(base_url.into()),
            api_token: api_token.into(),
        }
    }
}

#[async_trait]
impl DirectoryClient for ScimDirectoryClient {
    async fn find_user_by_email(&self, email: &str) -> AppResult<DirectoryUser> {
        let context = "directory user lookup";
        let response = self
            .http_client
            .get(format!("{}/scim/v2/Users", self.base_url))
            .query(&[("filter", format!("userName eq \"{email}\""))])
            .bearer_auth(self.api_token.as_str())
            .send()
            .await
            .map_err(|error| transport_error(context, &error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(status_error(context, status, body));
        }

        let listing = response.json::<ScimListResponse>().await.map_err(|error| {
            AppError::Internal(format!("{context} returned a malformed body: {error}"))
        })?;

        if listing.total_results == 0 || listing.resources.is_empty() {
            return Err(AppError::NotFound(format!(
                "directory user '{email}' not found"
            )));
        }
        if listing.resources.len() > 1 {
            return Err(AppError::Internal(format!(
                "expected exactly one directory user for '{email}' but found {}",
                listing.resources.len()
            )));
        }

        let user = listing.resources.into_iter().next().ok_or_else(|| {
            AppError::Internal(format!("{context} returned an empty resource list"))
        })?;

        Ok(DirectoryUser {
            user_id: user.id,
            user_name: user.user_name,
        })
    }
}

/// HTTP client for the workload cluster's task listing API.
#[derive(Clone)]
pub struct HttpWorkloadClient {
    http_client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpWorkloadClient {
    /// Creates a client for one cluster API endpoint.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: trim_base_url(base_url.into()),
            api_token: api_token.into(),
        }
    }
}

#[async_trait]
impl WorkloadClient for HttpWorkloadClient {
    async fn list_tasks(
        &self,
        cluster: &str,
        family: Option<&str>,
        page_token: Option<&str>,
    ) -> AppResult<WorkloadTaskPage> {
        let context = "list workload tasks";
        let mut builder = self
            .http_client
            .get(format!("{}/v1/clusters/{cluster}/tasks", self.base_url));
        if let Some(family) = family {
            builder = builder.query(&[("family", family)]);
        }
        if let Some(token) = page_token {
            builder = builder.query(&[("page_token", token)]);
        }

        let response = builder
            .bearer_auth(self.api_token.as_str())
            .send()
            .await
            .map_err(|error| transport_error(context, &error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(status_error(context, status, body));
        }

        response.json::<WorkloadTaskPage>().await.map_err(|error| {
            AppError::Internal(format!("{context} returned a malformed body: {error}"))
        })
    }
}

fn trim_base_url(base_url: String) -> String {
    base_url.trim_end_matches('/').to_owned()
}

fn transport_error(context: &str, error: &reqwest::Error) -> AppError {
    AppError::Internal(format!("{context} transport error: {error}"))
}

fn status_error(context: &str, status: reqwest::StatusCode, body: String) -> AppError {
    match status {
        reqwest::StatusCode::NOT_FOUND => {
            AppError::NotFound(format!("{context} target does not exist: {body}"))
        }
        reqwest::StatusCode::CONFLICT => AppError::Conflict(format!("{context}: {body}")),
        _ => AppError::Internal(format!(
            "{context} returned status {}: {body}",
            status.as_u16()
        )),
    }
}
