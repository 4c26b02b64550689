use std::sync::Arc;

use chrono::{Duration, Utc};
use keygate_core::{AppError, AppResult, UserIdentity};
use keygate_domain::{
    AccessRule, Request, RequestStatus, RequestedTiming, Reviewer, new_request_id,
};

use crate::access_ports::{
    AccessRuleRepository, CreateRequestInput, RequestDetail, RequestListQuery, RequestRepository,
    RequestStatusUpdate, ReviewerRepository,
};
use crate::event_ports::{AccessEvent, EventPublisher};
use crate::granter_service::{CreateGrantInput, Granter};
use crate::provider_ports::{
    AccessProvider, ProviderOption, ProviderOptionCache, ProviderRegistry,
};


/// Lifetime of cached provider argument options.
const PROVIDER_OPTION_TTL_SECONDS: u32 = 300;

/// Reviewer decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Approve the request and create its grant.
    Approve,
    /// Decline the request.
    Decline,
}

/// Application service owning request and reviewer records.
///
/// This service is the only caller of the grant state machine's mutating
/// operations; it translates every lower-level failure into the application
/// error taxonomy before it reaches a caller.
#[derive(Clone)]
pub struct AccessRequestService {
    rules: Arc<dyn AccessRuleRepository>,
    requests: Arc<dyn RequestRepository>,
    reviewers: Arc<dyn ReviewerRepository>,
    granter: Arc<dyn Granter>,
    providers: ProviderRegistry,
    option_cache: Arc<dyn ProviderOptionCache>,
    events: Arc<dyn EventPublisher>,
}

impl AccessRequestService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        rules: Arc<dyn AccessRuleRepository>,
        requests: Arc<dyn RequestRepository>,
        reviewers: Arc<dyn ReviewerRepository>,
        granter: Arc<dyn Granter>,
        providers: ProviderRegistry,
        option_cache: Arc<dyn ProviderOptionCache>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            rules,
            requests,
            reviewers,
            granter,
            providers,
            option_cache,
            events,
        }
    }

    /// Creates an access request under a rule, auto-approving when the rule
    /// has no reviewers.
    pub async fn create_request(
        &self,
        actor: &UserIdentity,
        input: CreateRequestInput,
    ) -> AppResult<Request> {
        let rule = self.rules.get_current_rule(input.rule_id.as_str()).await?;

        if input.duration_seconds == 0 {
            return Err(AppError::Validation(
                "requested duration must be greater than zero".to_owned(),
            ));
        }

        if input.duration_seconds > rule.time_constraints.max_duration_seconds {
            return Err(AppError::Validation(format!(
                "requested duration {}s exceeds the rule maximum of {}s",
                input.duration_seconds, rule.time_constraints.max_duration_seconds
            )));
        }

        if !actor.in_any_group(&rule.groups) {
            return Err(AppError::Forbidden(
                "user is not in a matching group for the access rule".to_owned(),
            ));
        }

        let now = Utc::now();
        let request = Request {
            id: new_request_id(),
            requested_by: actor.subject().to_owned(),
            rule_id: rule.id.clone(),
            rule_version: rule.version.clone(),
            status: RequestStatus::Pending,
            requested_timing: RequestedTiming {
                duration_seconds: input.duration_seconds,
            },
            grant_id: None,
            created_at: now,
            updated_at: now,
        };
        self.requests.create_request(request.clone()).await?;

        self.events
            .publish(AccessEvent::RequestCreated {
                request_id: request.id.clone(),
                requested_by: request.requested_by.clone(),
                rule_id: request.rule_id.clone(),
            })
            .await;

        if rule.auto_approves() {
            return self
                .approve_request(&rule, request, actor.subject())
                .await;
        }

        // The requester never reviews their own request, even when the rule
        // lists them as an approver.
        let reviewers: Vec<Reviewer> = rule
            .approvers
            .iter()
            .filter(|approver| approver.as_str() != actor.subject())
            .map(|approver| Reviewer {
                request_id: request.id.clone(),
                reviewer_id: approver.clone(),
            })
            .collect();
        self.reviewers.create_reviewers(reviewers).await?;

        Ok(request)
    }

    /// Decides a pending request on behalf of a reviewer or administrator.
    pub async fn review_request(
        &self,
        actor: &UserIdentity,
        request_id: &str,
        decision: ReviewDecision,
    ) -> AppResult<Request> {
        let request = self.requests.get_request(request_id).await?;

        if request.requested_by == actor.subject() {
            return Err(AppError::Forbidden(
                "requesters cannot review their own request".to_owned(),
            ));
        }
        self.require_reviewer(actor, request_id).await?;

        if request.status != RequestStatus::Pending {
            return Err(AppError::Validation(
                "only pending requests can be reviewed".to_owned(),
            ));
        }

        match decision {
            ReviewDecision::Approve => {
                let rule = self
                    .rules
                    .get_rule_version(request.rule_id.as_str(), request.rule_version.as_str())
                    .await?;
                self.approve_request(&rule, request, actor.subject()).await
            }
            ReviewDecision::Decline => {
                let updated = self
                    .requests
                    .update_status(RequestStatusUpdate {
                        request_id: request.id.clone(),
                        status: RequestStatus::Declined,
                        grant_id: None,
                    })
                    .await?;

                self.events
                    .publish(AccessEvent::RequestDeclined {
                        request_id: updated.id.clone(),
                        declined_by: actor.subject().to_owned(),
                    })
                    .await;

                Ok(updated)
            }
        }
    }

    /// Withdraws a pending request on behalf of its requester.
    pub async fn cancel_request(
        &self,
        actor: &UserIdentity,
        request_id: &str,
    ) -> AppResult<Request> {
        let request = self.requests.get_request(request_id).await?;

        if request.requested_by != actor.subject() {
            return Err(AppError::Forbidden(
                "user is not authorized to perform this action".to_owned(),
            ));
        }

        if request.status != RequestStatus::Pending {
            return Err(AppError::Validation(
                "only pending requests can be cancelled".to_owned(),
            ));
        }

        let updated = self
            .requests
            .update_status(RequestStatusUpdate {
                request_id: request.id.clone(),
                status: RequestStatus::Cancelled,
                grant_id: None,
            })
            .await?;

        self.events
            .publish(AccessEvent::RequestCancelled {
                request_id: updated.id.clone(),
            })
            .await;

        Ok(updated)
    }

    /// Revokes an approved request's grant on behalf of a reviewer or
    /// administrator.
    pub async fn revoke_request(
        &self,
        actor: &UserIdentity,
        request_id: &str,
    ) -> AppResult<Request> {
        let request = self.requests.get_request(request_id).await?;
        self.require_reviewer(actor, request_id).await?;

        if request.status != RequestStatus::Approved {
            return Err(AppError::Validation(
                "only approved requests can be revoked".to_owned(),
            ));
        }
        let grant_id = request.grant_id.clone().ok_or_else(|| {
            AppError::Internal(format!(
                "approved request '{}' carries no grant identifier",
                request.id
            ))
        })?;

        // A granter failure leaves the request untouched so the operation is
        // safe to retry from the beginning.
        self.granter
            .revoke_grant(grant_id.as_str(), actor.subject())
            .await?;

        let updated = self
            .requests
            .update_status(RequestStatusUpdate {
                request_id: request.id.clone(),
                status: RequestStatus::Revoked,
                grant_id: Some(grant_id.clone()),
            })
            .await?;

        self.events
            .publish(AccessEvent::RequestRevoked {
                request_id: updated.id.clone(),
                revoked_by: actor.subject().to_owned(),
                grant_id,
            })
            .await;

        Ok(updated)
    }

    /// Returns one request for a caller entitled to view it.
    ///
    /// Non-viewers receive a not-found error so request existence is never
    /// revealed to them.
    pub async fn get_request(
        &self,
        actor: &UserIdentity,
        request_id: &str,
    ) -> AppResult<RequestDetail> {
        let request = self.requests.get_request(request_id).await?;

        if request.requested_by == actor.subject() {
            return Ok(RequestDetail {
                request,
                can_review: false,
            });
        }

        let is_reviewer = self
            .reviewers
            .get_reviewer(request_id, actor.subject())
            .await?
            .is_some();
        if is_reviewer || actor.is_admin() {
            return Ok(RequestDetail {
                request,
                can_review: true,
            });
        }

        Err(AppError::NotFound(format!(
            "request '{request_id}' not found"
        )))
    }

    /// Lists requests the caller created, or requests awaiting their review.
    pub async fn list_requests(
        &self,
        actor: &UserIdentity,
        query: RequestListQuery,
    ) -> AppResult<Vec<Request>> {
        if query.as_reviewer {
            self.requests
                .list_for_reviewer(actor.subject(), query.status)
                .await
        } else {
            self.requests
                .list_for_user(actor.subject(), query.status)
                .await
        }
    }

    /// Returns the provider's guidance text for an approved request's grant.
    pub async fn request_instructions(
        &self,
        actor: &UserIdentity,
        request_id: &str,
    ) -> AppResult<String> {
        let request = self.requests.get_request(request_id).await?;

        if request.requested_by != actor.subject() {
            return Err(AppError::Forbidden(
                "only the requester can fetch access instructions".to_owned(),
            ));
        }
        let grant_id = request.grant_id.as_deref().ok_or_else(|| {
            AppError::Validation("request has no grant to describe".to_owned())
        })?;

        let grant = self.granter.get_grant(grant_id).await?;
        let provider = self.providers.get(grant.provider.as_str())?;
        provider
            .instructions(grant.subject.as_str(), &grant.with, grant.id.as_str())
            .await
    }

    /// Returns argument options for a provider through the read-through cache.
    pub async fn provider_options(
        &self,
        provider_id: &str,
        arg_id: &str,
    ) -> AppResult<Vec<ProviderOption>> {
        if let Some(options) = self.option_cache.get_options(provider_id, arg_id).await? {
            return Ok(options);
        }

        self.fetch_and_cache_options(provider_id, arg_id).await
    }

    /// Re-fetches argument options from the provider, overwriting the cache.
    pub async fn refresh_provider_options(
        &self,
        provider_id: &str,
        arg_id: &str,
    ) -> AppResult<Vec<ProviderOption>> {
        self.fetch_and_cache_options(provider_id, arg_id).await
    }

    async fn fetch_and_cache_options(
        &self,
        provider_id: &str,
        arg_id: &str,
    ) -> AppResult<Vec<ProviderOption>> {
        let provider = self.providers.get(provider_id)?;
        let options = provider.options(arg_id).await?;
        self.option_cache
            .set_options(provider_id, arg_id, &options, PROVIDER_OPTION_TTL_SECONDS)
            .await?;

        Ok(options)
    }

    async fn approve_request(
        &self,
        rule: &AccessRule,
        request: Request,
        approved_by: &str,
    ) -> AppResult<Request> {
        let start = Utc::now();
        let end = start + Duration::seconds(i64::from(request.requested_timing.duration_seconds));

        let grant = self
            .granter
            .create_grant(CreateGrantInput {
                provider: rule.target.provider_id.clone(),
                subject: request.requested_by.clone(),
                with: rule.target.args.clone(),
                start,
                end,
            })
            .await?;

        let updated = self
            .requests
            .update_status(RequestStatusUpdate {
                request_id: request.id.clone(),
                status: RequestStatus::Approved,
                grant_id: Some(grant.id.clone()),
            })
            .await?;

        self.events
            .publish(AccessEvent::RequestApproved {
                request_id: updated.id.clone(),
                approved_by: approved_by.to_owned(),
                grant_id: grant.id,
            })
            .await;

        Ok(updated)
    }

    async fn require_reviewer(&self, actor: &UserIdentity, request_id: &str) -> AppResult<()> {
        if actor.is_admin() {
            return Ok(());
        }

        let reviewer = self
            .reviewers
            .get_reviewer(request_id, actor.subject())
            .await?;
        if reviewer.is_some() {
            return Ok(());
        }

        Err(AppError::Forbidden(
            "user is not a reviewer of this request".to_owned(),
        ))
    }
}
