//! Keygate granter runtime.
//!
//! The execution entry points of the grant lifecycle: the durable engine's
//! scheduler queues a transition task when a grant window opens or closes,
//! and this worker delegates it into the provider capability contract and
//! reports the outcome back to the engine.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use keygate_application::{
    AccessProvider, ProviderRegistry, TransitionTask, TransitionTaskKind, TransitionTaskOutcome,
    TransitionTaskQueue,
};
use keygate_core::{AppError, AppResult};
use keygate_infrastructure::{
    HttpSsoAdminClient, HttpWorkflowEngine, HttpWorkloadClient, ScimDirectoryClient,
    SsoAccessProvider, SsoProviderConfig, VaultAccessProvider,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct GranterConfig {
    engine_base_url: String,
    engine_shared_secret: String,
    worker_id: String,
    poll_interval_ms: u64,
    sso: SsoConfig,
    vault: Option<VaultConfig>,
}

#[derive(Debug, Clone)]
struct SsoConfig {
    admin_api_url: String,
    admin_api_token: String,
    directory_api_url: String,
    directory_api_token: String,
    workload_api_url: String,
    workload_api_token: String,
    account_id: String,
    cluster: String,
    region: String,
    portal_url: String,
}

#[derive(Debug, Clone)]
struct VaultConfig {
    api_url: String,
    unique_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = GranterConfig::load()?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let engine = HttpWorkflowEngine::new(
        http_client.clone(),
        config.engine_base_url.as_str(),
        config.engine_shared_secret.as_str(),
    );
    let providers = build_provider_registry(&config, &http_client);

    info!(
        worker_id = %config.worker_id,
        engine_base_url = %config.engine_base_url,
        poll_interval_ms = config.poll_interval_ms,
        "keygate-granter started"
    );

    loop {
        match engine.poll_task(config.worker_id.as_str()).await {
            Ok(Some(task)) => {
                handle_transition_task(&engine, &providers, &config.worker_id, task).await;
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "failed to poll transition tasks"
                );
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
        }
    }
}

/// Delegates one window transition into the provider contract and reports
/// the outcome. A provider failure fails the execution through the engine's
/// native semantics, which transitions the grant to its error state.
async fn handle_transition_task(
    engine: &HttpWorkflowEngine,
    providers: &ProviderRegistry,
    worker_id: &str,
    task: TransitionTask,
) {
    let grant = &task.input.grant;
    info!(
        worker_id,
        task_id = %task.task_id,
        kind = task.kind.as_str(),
        grant_id = %grant.id,
        provider = %grant.provider,
        "handling grant transition"
    );

    let outcome = match dispatch_transition(providers, &task).await {
        Ok(()) => TransitionTaskOutcome::Succeeded,
        Err(error) => {
            warn!(
                worker_id,
                task_id = %task.task_id,
                grant_id = %grant.id,
                error = %error,
                "grant transition failed"
            );
            TransitionTaskOutcome::Failed {
                reason: error.to_string(),
            }
        }
    };

    if let Err(error) = engine.complete_task(task.task_id.as_str(), outcome).await {
        warn!(
            worker_id,
            task_id = %task.task_id,
            error = %error,
            "failed to report transition outcome"
        );
    }
}

async fn dispatch_transition(providers: &ProviderRegistry, task: &TransitionTask) -> AppResult<()> {
    let grant = &task.input.grant;
    let provider = providers.get(grant.provider.as_str())?;

    match task.kind {
        TransitionTaskKind::WindowStart => {
            provider
                .grant(grant.subject.as_str(), &grant.with, grant.id.as_str())
                .await
        }
        TransitionTaskKind::WindowEnd => {
            provider
                .revoke(grant.subject.as_str(), &grant.with, grant.id.as_str())
                .await
        }
    }
}

fn build_provider_registry(
    config: &GranterConfig,
    http_client: &reqwest::Client,
) -> ProviderRegistry {
    let mut providers: HashMap<String, Arc<dyn AccessProvider>> = HashMap::new();

    let sso = &config.sso;
    providers.insert(
        "sso".to_owned(),
        Arc::new(SsoAccessProvider::new(
            Arc::new(HttpSsoAdminClient::new(
                http_client.clone(),
                sso.admin_api_url.as_str(),
                sso.admin_api_token.as_str(),
            )),
            Arc::new(ScimDirectoryClient::new(
                http_client.clone(),
                sso.directory_api_url.as_str(),
                sso.directory_api_token.as_str(),
            )),
            Arc::new(HttpWorkloadClient::new(
                http_client.clone(),
                sso.workload_api_url.as_str(),
                sso.workload_api_token.as_str(),
            )),
            SsoProviderConfig {
                account_id: sso.account_id.clone(),
                cluster: sso.cluster.clone(),
                region: sso.region.clone(),
                portal_url: sso.portal_url.clone(),
            },
        )),
    );

    if let Some(vault) = &config.vault {
        providers.insert(
            "vault".to_owned(),
            Arc::new(VaultAccessProvider::new(
                http_client.clone(),
                vault.api_url.as_str(),
                vault.unique_id.clone(),
            )),
        );
    }

    ProviderRegistry::new(providers)
}

impl GranterConfig {
    fn load() -> AppResult<Self> {
        let engine_base_url = required_env("ENGINE_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let engine_shared_secret = required_env("ENGINE_SHARED_SECRET")?;
        let worker_id = env::var("GRANTER_WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("granter-{}", std::process::id()));
        let poll_interval_ms = parse_env_u64("GRANTER_POLL_INTERVAL_MS", 1500)?;

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "GRANTER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        let sso = SsoConfig {
            admin_api_url: required_env("SSO_ADMIN_API_URL")?,
            admin_api_token: required_env("SSO_ADMIN_API_TOKEN")?,
            directory_api_url: required_env("SSO_DIRECTORY_API_URL")?,
            directory_api_token: required_env("SSO_DIRECTORY_API_TOKEN")?,
            workload_api_url: required_env("SSO_WORKLOAD_API_URL")?,
            workload_api_token: required_env("SSO_WORKLOAD_API_TOKEN")?,
            account_id: required_env("SSO_ACCOUNT_ID")?,
            cluster: required_env("SSO_CLUSTER")?,
            region: required_env("SSO_REGION")?,
            portal_url: required_env("SSO_PORTAL_URL")?,
        };

        let vault = env::var("VAULT_API_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|api_url| VaultConfig {
                api_url,
                unique_id: env::var("VAULT_UNIQUE_ID")
                    .ok()
                    .filter(|value| !value.trim().is_empty()),
            });

        Ok(Self {
            engine_base_url,
            engine_shared_secret,
            worker_id,
            poll_interval_ms,
            sso,
            vault,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
