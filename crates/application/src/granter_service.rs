use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_core::{AppError, AppResult};
use keygate_domain::{
    Grant, GrantStatus, WAIT_FOR_WINDOW_END_STATE, WorkflowInput, execution_identifier,
    new_grant_id,
};
use serde_json::Value;

use crate::event_ports::{AccessEvent, EventPublisher};
use crate::provider_ports::{AccessProvider, ProviderRegistry};
use crate::workflow_ports::WorkflowEngine;

/// Input payload for creating a grant.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateGrantInput {
    /// Registry identifier of the fulfilling provider.
    pub provider: String,
    /// Principal identifier, typically an email address.
    pub subject: String,
    /// Opaque provider-defined argument bag.
    pub with: Value,
    /// Window open timestamp.
    pub start: DateTime<Utc>,
    /// Window close timestamp.
    pub end: DateTime<Utc>,
}

/// Mutating operations of the grant workflow state machine.
#[async_trait]
pub trait Granter: Send + Sync {
    /// Creates a grant and starts its workflow execution.
    async fn create_grant(&self, input: CreateGrantInput) -> AppResult<Grant>;

    /// Revokes a grant, stopping its workflow execution.
    async fn revoke_grant(&self, grant_id: &str, revoker: &str) -> AppResult<Grant>;

    /// Recovers a grant from its execution's durable input.
    async fn get_grant(&self, grant_id: &str) -> AppResult<Grant>;
}

/// Drives one grant through its lifecycle atop the durable execution engine.
///
/// The execution's input is the canonical grant snapshot; the service never
/// persists grant state anywhere else.
#[derive(Clone)]
pub struct GranterService {
    engine: Arc<dyn WorkflowEngine>,
    providers: ProviderRegistry,
    events: Arc<dyn EventPublisher>,
    workflow_identifier: String,
}

impl GranterService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        providers: ProviderRegistry,
        events: Arc<dyn EventPublisher>,
        workflow_identifier: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            providers,
            events,
            workflow_identifier: workflow_identifier.into(),
        }
    }

    async fn recover_grant(&self, execution_id: &str) -> AppResult<Grant> {
        let description = self.engine.describe_execution(execution_id).await?;
        let input: WorkflowInput =
            serde_json::from_value(description.input).map_err(|error| {
                AppError::Internal(format!(
                    "execution '{execution_id}' carries a malformed grant input: {error}"
                ))
            })?;

        Ok(input.grant)
    }
}

#[async_trait]
impl Granter for GranterService {
    async fn create_grant(&self, input: CreateGrantInput) -> AppResult<Grant> {
        // Fail on unknown providers before the engine learns about the grant.
        self.providers.get(input.provider.as_str())?;

        let grant = Grant {
            id: new_grant_id(),
            provider: input.provider,
            subject: input.subject,
            with: input.with,
            status: GrantStatus::Pending,
            start: input.start,
            end: input.end,
        };
        grant.validate()?;

        let execution_id =
            execution_identifier(self.workflow_identifier.as_str(), grant.id.as_str())?;
        let workflow_input = serde_json::to_value(WorkflowInput {
            grant: grant.clone(),
        })
        .map_err(|error| {
            AppError::Internal(format!("failed to serialize workflow input: {error}"))
        })?;

        self.engine
            .start_execution(execution_id.as_str(), &workflow_input)
            .await?;

        self.events
            .publish(AccessEvent::GrantCreated {
                grant_id: grant.id.clone(),
                provider: grant.provider.clone(),
                subject: grant.subject.clone(),
            })
            .await;

        Ok(grant)
    }

    async fn revoke_grant(&self, grant_id: &str, revoker: &str) -> AppResult<Grant> {
        let execution_id = execution_identifier(self.workflow_identifier.as_str(), grant_id)?;
        let mut grant = self.recover_grant(execution_id.as_str()).await?;
        let provider = self.providers.get(grant.provider.as_str())?;

        // The grant is ACTIVE exactly while the execution sits in the
        // wait-for-window-end state. Pre-ACTIVE executions have no live
        // provider assignment, so stopping the execution alone suffices.
        let history = self.engine.execution_history(execution_id.as_str()).await?;
        let window_open = history
            .last()
            .is_some_and(|event| event.entered_wait_state(WAIT_FOR_WINDOW_END_STATE));

        if window_open {
            match provider
                .revoke(grant.subject.as_str(), &grant.with, grant.id.as_str())
                .await
            {
                Ok(()) => {}
                Err(error) if error.is_not_found() => {}
                // Leave the execution running so the caller can retry the
                // whole revoke from the beginning.
                Err(error) => return Err(error),
            }
        }

        match self.engine.stop_execution(execution_id.as_str()).await {
            Ok(()) => {}
            Err(error) if error.is_not_found() => {}
            Err(error) => return Err(error),
        }

        grant.status = GrantStatus::Revoked;

        self.events
            .publish(AccessEvent::GrantRevoked {
                grant_id: grant.id.clone(),
                revoker: revoker.to_owned(),
            })
            .await;

        Ok(grant)
    }

    async fn get_grant(&self, grant_id: &str) -> AppResult<Grant> {
        let execution_id = execution_identifier(self.workflow_identifier.as_str(), grant_id)?;
        self.recover_grant(execution_id.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use keygate_core::{AppError, AppResult};
    use keygate_domain::{Grant, GrantStatus, WorkflowInput, new_grant_id};
    use serde_json::{Value, json};
    use tokio::sync::Mutex;

    use crate::event_ports::{AccessEvent, EventPublisher};
    use crate::provider_ports::{AccessProvider, ProviderRegistry};
    use crate::workflow_ports::{
        ExecutionDescription, ExecutionEvent, ExecutionStatus, WorkflowEngine,
    };

    use super::{CreateGrantInput, Granter, GranterService};

    const WORKFLOW_ID: &str = "wf:states:prod:acct-1:template:grant-lifecycle";

    #[derive(Default)]
    struct FakeEngine {
        started: Mutex<Vec<(String, Value)>>,
        stopped: Mutex<Vec<String>>,
        input: Option<Value>,
        history: Vec<ExecutionEvent>,
        stop_error: Option<fn() -> AppError>,
    }

    #[async_trait]
    impl WorkflowEngine for FakeEngine {
        async fn start_execution(&self, execution_id: &str, input: &Value) -> AppResult<()> {
            self.started
                .lock()
                .await
                .push((execution_id.to_owned(), input.clone()));
            Ok(())
        }

        async fn describe_execution(&self, execution_id: &str) -> AppResult<ExecutionDescription> {
            match &self.input {
                Some(input) => Ok(ExecutionDescription {
                    execution_id: execution_id.to_owned(),
                    status: ExecutionStatus::Running,
                    input: input.clone(),
                }),
                None => Err(AppError::NotFound(format!(
                    "execution '{execution_id}' not found"
                ))),
            }
        }

        async fn execution_history(&self, _execution_id: &str) -> AppResult<Vec<ExecutionEvent>> {
            Ok(self.history.clone())
        }

        async fn stop_execution(&self, execution_id: &str) -> AppResult<()> {
            if let Some(make_error) = self.stop_error {
                return Err(make_error());
            }
            self.stopped.lock().await.push(execution_id.to_owned());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        revoked: Mutex<Vec<String>>,
        revoke_error: Option<fn() -> AppError>,
    }

    #[async_trait]
    impl AccessProvider for FakeProvider {
        async fn grant(&self, _subject: &str, _args: &Value, _grant_id: &str) -> AppResult<()> {
            Ok(())
        }

        async fn revoke(&self, _subject: &str, _args: &Value, grant_id: &str) -> AppResult<()> {
            if let Some(make_error) = self.revoke_error {
                return Err(make_error());
            }
            self.revoked.lock().await.push(grant_id.to_owned());
            Ok(())
        }

        async fn is_active(
            &self,
            _subject: &str,
            _args: &Value,
            _grant_id: &str,
        ) -> AppResult<bool> {
            Ok(false)
        }

        async fn instructions(
            &self,
            _subject: &str,
            _args: &Value,
            _grant_id: &str,
        ) -> AppResult<String> {
            Ok(String::new())
        }
    }

    #[derive(Default)]
    struct FakeEventPublisher {
        events: Mutex<Vec<AccessEvent>>,
    }

    #[async_trait]
    impl EventPublisher for FakeEventPublisher {
        async fn publish(&self, event: AccessEvent) {
            self.events.lock().await.push(event);
        }
    }

    fn active_history() -> Vec<ExecutionEvent> {
        vec![
            ExecutionEvent {
                event_type: "TaskStateEntered".to_owned(),
                state_name: Some("Provision Access".to_owned()),
            },
            ExecutionEvent {
                event_type: "WaitStateEntered".to_owned(),
                state_name: Some("Wait for Window End".to_owned()),
            },
        ]
    }

    fn pending_history() -> Vec<ExecutionEvent> {
        vec![ExecutionEvent {
            event_type: "TaskStateEntered".to_owned(),
            state_name: Some("Provision Access".to_owned()),
        }]
    }

    fn stored_grant() -> Grant {
        let start = Utc::now();
        Grant {
            id: new_grant_id(),
            provider: "sso".to_owned(),
            subject: "a@b.com".to_owned(),
            with: json!({"taskDefinitionFamily": "svc"}),
            status: GrantStatus::Active,
            start,
            end: start + Duration::hours(1),
        }
    }

    fn workflow_input(grant: &Grant) -> Value {
        serde_json::to_value(WorkflowInput {
            grant: grant.clone(),
        })
        .unwrap_or_default()
    }

    fn service(
        engine: Arc<FakeEngine>,
        provider: Arc<FakeProvider>,
    ) -> (GranterService, Arc<FakeEventPublisher>) {
        let mut providers: HashMap<String, Arc<dyn AccessProvider>> = HashMap::new();
        providers.insert("sso".to_owned(), provider);
        let events = Arc::new(FakeEventPublisher::default());
        let granter = GranterService::new(
            engine,
            ProviderRegistry::new(providers),
            events.clone(),
            WORKFLOW_ID,
        );
        (granter, events)
    }

    fn create_input() -> CreateGrantInput {
        let start = Utc::now();
        CreateGrantInput {
            provider: "sso".to_owned(),
            subject: "a@b.com".to_owned(),
            with: json!({"taskDefinitionFamily": "svc"}),
            start,
            end: start + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn create_grant_starts_execution_under_derived_identifier() {
        let engine = Arc::new(FakeEngine::default());
        let (granter, events) = service(engine.clone(), Arc::new(FakeProvider::default()));

        let grant = granter.create_grant(create_input()).await;
        assert!(grant.is_ok());
        let grant = grant.unwrap_or_else(|_| stored_grant());
        assert_eq!(grant.status, GrantStatus::Pending);

        let started = engine.started.lock().await;
        assert_eq!(started.len(), 1);
        assert!(started[0].0.contains(":execution:"));
        assert!(started[0].0.ends_with(grant.id.as_str()));
        assert_eq!(started[0].1["grant"]["id"], grant.id.as_str());
        assert_eq!(events.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn create_grant_rejects_unknown_provider_before_starting() {
        let engine = Arc::new(FakeEngine::default());
        let (granter, _) = service(engine.clone(), Arc::new(FakeProvider::default()));

        let mut input = create_input();
        input.provider = "unknown".to_owned();
        let result = granter.create_grant(input).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(engine.started.lock().await.is_empty());
    }

    #[tokio::test]
    async fn revoke_active_grant_calls_provider_then_stops_execution() {
        let grant = stored_grant();
        let engine = Arc::new(FakeEngine {
            input: Some(workflow_input(&grant)),
            history: active_history(),
            ..FakeEngine::default()
        });
        let provider = Arc::new(FakeProvider::default());
        let (granter, events) = service(engine.clone(), provider.clone());

        let revoked = granter.revoke_grant(grant.id.as_str(), "admin@b.com").await;
        assert!(revoked.is_ok());
        let revoked = revoked.unwrap_or_else(|_| stored_grant());
        assert_eq!(revoked.status, GrantStatus::Revoked);

        assert_eq!(provider.revoked.lock().await.as_slice(), [grant.id.clone()]);
        assert_eq!(engine.stopped.lock().await.len(), 1);
        assert_eq!(events.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn revoke_pending_grant_skips_provider_and_stops_execution() {
        let grant = stored_grant();
        let engine = Arc::new(FakeEngine {
            input: Some(workflow_input(&grant)),
            history: pending_history(),
            ..FakeEngine::default()
        });
        let provider = Arc::new(FakeProvider::default());
        let (granter, _) = service(engine.clone(), provider.clone());

        let revoked = granter.revoke_grant(grant.id.as_str(), "admin@b.com").await;
        assert!(revoked.is_ok());

        assert!(provider.revoked.lock().await.is_empty());
        assert_eq!(engine.stopped.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_provider_revoke_leaves_execution_running() {
        let grant = stored_grant();
        let engine = Arc::new(FakeEngine {
            input: Some(workflow_input(&grant)),
            history: active_history(),
            ..FakeEngine::default()
        });
        let provider = Arc::new(FakeProvider {
            revoke_error: Some(|| AppError::Timeout("deletion still in progress".to_owned())),
            ..FakeProvider::default()
        });
        let (granter, events) = service(engine.clone(), provider);

        let result = granter.revoke_grant(grant.id.as_str(), "admin@b.com").await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert!(engine.stopped.lock().await.is_empty());
        assert!(events.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn provider_not_found_counts_as_revoked() {
        let grant = stored_grant();
        let engine = Arc::new(FakeEngine {
            input: Some(workflow_input(&grant)),
            history: active_history(),
            ..FakeEngine::default()
        });
        let provider = Arc::new(FakeProvider {
            revoke_error: Some(|| AppError::NotFound("assignment already deleted".to_owned())),
            ..FakeProvider::default()
        });
        let (granter, _) = service(engine.clone(), provider);

        let result = granter.revoke_grant(grant.id.as_str(), "admin@b.com").await;
        assert!(result.is_ok());
        assert_eq!(engine.stopped.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn stopping_already_stopped_execution_is_not_an_error() {
        let grant = stored_grant();
        let engine = Arc::new(FakeEngine {
            input: Some(workflow_input(&grant)),
            history: pending_history(),
            stop_error: Some(|| AppError::NotFound("execution already stopped".to_owned())),
            ..FakeEngine::default()
        });
        let (granter, _) = service(engine, Arc::new(FakeProvider::default()));

        let result = granter.revoke_grant(grant.id.as_str(), "admin@b.com").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failed_stop_after_revoke_aborts_without_status_change() {
        let grant = stored_grant();
        let engine = Arc::new(FakeEngine {
            input: Some(workflow_input(&grant)),
            history: active_history(),
            stop_error: Some(|| AppError::Internal("engine unavailable".to_owned())),
            ..FakeEngine::default()
        });
        let provider = Arc::new(FakeProvider::default());
        let (granter, events) = service(engine, provider.clone());

        let result = granter.revoke_grant(grant.id.as_str(), "admin@b.com").await;
        assert!(matches!(result, Err(AppError::Internal(_))));
        // Access is already revoked out-of-band; no status event is emitted.
        assert_eq!(provider.revoked.lock().await.len(), 1);
        assert!(events.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn get_grant_recovers_snapshot_from_execution_input() {
        let grant = stored_grant();
        let engine = Arc::new(FakeEngine {
            input: Some(workflow_input(&grant)),
            ..FakeEngine::default()
        });
        let (granter, _) = service(engine, Arc::new(FakeProvider::default()));

        let recovered = granter.get_grant(grant.id.as_str()).await;
        assert!(recovered.is_ok());
        let recovered = recovered.unwrap_or_else(|_| stored_grant());
        assert_eq!(recovered.id, grant.id);
    }
}
