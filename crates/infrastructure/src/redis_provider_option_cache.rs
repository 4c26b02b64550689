//! Redis-backed provider option cache.

use async_trait::async_trait;
use keygate_application::{ProviderOption, ProviderOptionCache};
use keygate_core::{AppError, AppResult};
use redis::AsyncCommands;

/// Redis implementation of the provider option cache port.
#[derive(Clone)]
pub struct RedisProviderOptionCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisProviderOptionCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, provider_id: &str, arg_id: &str) -> String {
        format!("{}:{provider_id}:{arg_id}", self.key_prefix)
    }
}

#[async_trait]
impl ProviderOptionCache for RedisProviderOptionCache {
    async fn get_options(
        &self,
        provider_id: &str,
        arg_id: &str,
    ) -> AppResult<Option<Vec<ProviderOption>>> {
        let key = self.key_for(provider_id, arg_id);
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let encoded: Option<String> = connection.get(key).await.map_err(|error| {
            AppError::Internal(format!("failed to read provider option cache entry: {error}"))
        })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str::<Vec<ProviderOption>>(value).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid provider option cache value for '{provider_id}:{arg_id}': {error}"
                    ))
                })
            })
            .transpose()
    }

    async fn set_options(
        &self,
        provider_id: &str,
        arg_id: &str,
        options: &[ProviderOption],
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let key = self.key_for(provider_id, arg_id);
        let value = serde_json::to_string(options).map_err(|error| {
            AppError::Internal(format!("failed to encode provider options: {error}"))
        })?;
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        connection
            .set_ex(key, value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to write provider option cache entry: {error}"
                ))
            })
    }
}
