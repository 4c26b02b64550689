use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use keygate_core::{AppError, AppResult};
use serde_json::Value;

/// One selectable value for a dynamic provider argument.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProviderOption {
    /// Human-readable label.
    pub label: String,
    /// Stable value submitted back to the provider.
    pub value: String,
}

/// Uniform capability contract every provider adapter implements.
///
/// Adapters compose asynchronous, eventually-consistent control planes into
/// idempotent operations: duplicate `grant` calls tolerate "already exists"
/// and duplicate `revoke` calls tolerate "already deleted".
#[async_trait]
pub trait AccessProvider: Send + Sync {
    /// Provisions access for the subject and confirms it took effect.
    async fn grant(&self, subject: &str, args: &Value, grant_id: &str) -> AppResult<()>;

    /// Removes access for the subject, treating absent resources as success.
    async fn revoke(&self, subject: &str, args: &Value, grant_id: &str) -> AppResult<()>;

    /// Returns whether the grant's assignment currently exists.
    async fn is_active(&self, subject: &str, args: &Value, grant_id: &str) -> AppResult<bool>;

    /// Returns human-readable guidance for using the granted access.
    ///
    /// An unresolvable target resource is a successful result carrying
    /// explanatory text, never an error.
    async fn instructions(&self, subject: &str, args: &Value, grant_id: &str)
    -> AppResult<String>;

    /// Enumerates legal values for a dynamic argument.
    async fn options(&self, arg_id: &str) -> AppResult<Vec<ProviderOption>> {
        Err(AppError::Validation(format!(
            "provider does not support options for argument '{arg_id}'"
        )))
    }
}

/// Immutable registry mapping provider identifiers to adapters.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn AccessProvider>>,
}

impl ProviderRegistry {
    /// Creates a registry from configured adapters.
    #[must_use]
    pub fn new(providers: HashMap<String, Arc<dyn AccessProvider>>) -> Self {
        Self { providers }
    }

    /// Resolves a provider adapter by identifier.
    pub fn get(&self, provider_id: &str) -> AppResult<Arc<dyn AccessProvider>> {
        self.providers
            .get(provider_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("provider '{provider_id}' is not registered")))
    }
}

/// Read-through cache port for provider argument options.
#[async_trait]
pub trait ProviderOptionCache: Send + Sync {
    /// Returns the cached options for one provider argument, when present.
    async fn get_options(
        &self,
        provider_id: &str,
        arg_id: &str,
    ) -> AppResult<Option<Vec<ProviderOption>>>;

    /// Stores options for one provider argument with a bounded lifetime.
    async fn set_options(
        &self,
        provider_id: &str,
        arg_id: &str,
        options: &[ProviderOption],
        ttl_seconds: u32,
    ) -> AppResult<()>;
}
