//! Vault membership access provider.
//!
//! A minimal REST-backed provider used for demonstrations and smoke tests:
//! grants add the subject as a vault member, revokes remove it, and an
//! absent membership counts as already revoked.

use async_trait::async_trait;
use keygate_application::AccessProvider;
use keygate_core::{AppError, AppResult};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Provider arguments carried in the grant's opaque argument bag.
#[derive(Debug, Deserialize)]
struct VaultArgs {
    vault: String,
}

/// Access provider backed by a vault membership REST API.
pub struct VaultAccessProvider {
    http_client: reqwest::Client,
    api_url: String,
    unique_id: Option<String>,
}

impl VaultAccessProvider {
    /// Creates a provider for one vault API endpoint.
    ///
    /// When a unique id is configured it prefixes every vault name, keeping
    /// deployments sharing one vault service apart.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        api_url: impl Into<String>,
        unique_id: Option<String>,
    ) -> Self {
        Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            unique_id,
        }
    }

    fn prefixed_vault(&self, vault: &str) -> String {
        match self.unique_id.as_deref() {
            Some(unique_id) if !unique_id.is_empty() => format!("{unique_id}_{vault}"),
            _ => vault.to_owned(),
        }
    }

    fn member_url(&self, vault: &str, subject: &str) -> String {
        format!(
            "{}/vaults/{vault}/members/{}",
            self.api_url,
            escape_email_for_url(subject)
        )
    }
}

#[async_trait]
impl AccessProvider for VaultAccessProvider {
    async fn grant(&self, subject: &str, args: &Value, grant_id: &str) -> AppResult<()> {
        let args = parse_args(args)?;
        let vault = self.prefixed_vault(args.vault.as_str());
        info!(grant_id, subject, vault = %vault, "assigning vault membership");

        let response = self
            .http_client
            .post(format!("{}/vaults/{vault}/members", self.api_url))
            .json(&serde_json::json!({ "user": subject }))
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("vault membership request failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "vault membership request returned status {}",
                status.as_u16()
            )));
        }

        Ok(())
    }

    async fn revoke(&self, subject: &str, args: &Value, grant_id: &str) -> AppResult<()> {
        let args = parse_args(args)?;
        let vault = self.prefixed_vault(args.vault.as_str());
        info!(grant_id, subject, vault = %vault, "removing vault membership");

        let response = self
            .http_client
            .delete(self.member_url(vault.as_str(), subject))
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("vault membership removal failed: {error}"))
            })?;

        let status = response.status();
        // An absent membership means access is already gone.
        if status == reqwest::StatusCode::NOT_FOUND || status.is_success() {
            return Ok(());
        }

        Err(AppError::Internal(format!(
            "vault membership removal returned status {}",
            status.as_u16()
        )))
    }

    async fn is_active(&self, subject: &str, args: &Value, _grant_id: &str) -> AppResult<bool> {
        let args = parse_args(args)?;
        let vault = self.prefixed_vault(args.vault.as_str());

        let response = self
            .http_client
            .get(self.member_url(vault.as_str(), subject))
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("vault membership check failed: {error}"))
            })?;

        Ok(response.status() == reqwest::StatusCode::OK)
    }

    async fn instructions(
        &self,
        subject: &str,
        args: &Value,
        _grant_id: &str,
    ) -> AppResult<String> {
        let args = parse_args(args)?;
        let vault = self.prefixed_vault(args.vault.as_str());
        let url = self.member_url(vault.as_str(), subject);

        Ok(format!(
            "This is a demonstration resource showing how Keygate provisions access.\n\
             Visit the [vault membership URL]({url}) to check that your access has \
             been provisioned."
        ))
    }
}

fn parse_args(args: &Value) -> AppResult<VaultArgs> {
    serde_json::from_value(args.clone()).map_err(|error| {
        AppError::Validation(format!("invalid vault provider arguments: {error}"))
    })
}

/// Percent-escapes an email address for use in a URL path segment.
fn escape_email_for_url(email: &str) -> String {
    email
        .replace('+', "%2B")
        .replace('@', "%40")
        .replace('.', "%2E")
        .replace('-', "%2D")
        .replace('_', "%5F")
}

#[cfg(test)]
mod tests {
    use super::{VaultAccessProvider, escape_email_for_url};

    #[test]
    fn email_escaping_covers_reserved_characters() {
        assert_eq!(
            escape_email_for_url("first.last+test@example-mail.com"),
            "first%2Elast%2Btest%40example%2Dmail%2Ecom"
        );
    }

    #[test]
    fn vault_names_are_prefixed_with_the_unique_id() {
        let provider = VaultAccessProvider::new(
            reqwest::Client::new(),
            "https://vault.example.com",
            Some("dep1".to_owned()),
        );
        assert_eq!(provider.prefixed_vault("demo"), "dep1_demo");

        let unprefixed = VaultAccessProvider::new(
            reqwest::Client::new(),
            "https://vault.example.com",
            None,
        );
        assert_eq!(unprefixed.prefixed_vault("demo"), "demo");
    }

    #[test]
    fn member_urls_escape_the_subject() {
        let provider = VaultAccessProvider::new(
            reqwest::Client::new(),
            "https://vault.example.com/",
            None,
        );
        assert_eq!(
            provider.member_url("demo", "a@b.com"),
            "https://vault.example.com/vaults/demo/members/a%40b%2Ecom"
        );
    }
}
