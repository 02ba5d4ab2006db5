//! Agent lifecycle state machine.
//!
//! `draft -> active` (promote), `active -> draft` (demote) and
//! `{draft, active} -> archived` (archive). Promotion is gated by validation,
//! policy checks and, for some agents, a human approval.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentRecord, AgentStatus, ApprovalRecord, ApprovalStatus, NewApproval, PromotionOptions,
    PromotionResult, TransitionResult, TransportKind, AGENT_PROMOTION_MODE,
    ORCHESTRATE_CAPABILITY,
};
use crate::domain::ports::{AgentStore, ApprovalStore, PolicyService, ValidationService};
use crate::services::registry_cache::RegistryCache;

/// Whether promoting `record` needs a human decision.
pub fn requires_approval(record: &AgentRecord) -> bool {
    matches!(
        TransportKind::for_agent_type(&record.agent_type),
        TransportKind::Api | TransportKind::External
    ) || record.has_capability(ORCHESTRATE_CAPABILITY)
}

/// Drives agents through draft, active and archived.
pub struct PromotionService {
    agents: Arc<dyn AgentStore>,
    approvals: Arc<dyn ApprovalStore>,
    validation: Arc<dyn ValidationService>,
    policy: Arc<dyn PolicyService>,
    cache: Option<Arc<RegistryCache>>,
}

impl PromotionService {
    /// Service without a registry cache to invalidate.
    pub fn new(
        agents: Arc<dyn AgentStore>,
        approvals: Arc<dyn ApprovalStore>,
        validation: Arc<dyn ValidationService>,
        policy: Arc<dyn PolicyService>,
    ) -> Self {
        Self {
            agents,
            approvals,
            validation,
            policy,
            cache: None,
        }
    }

    /// Invalidate `cache` after every persisted transition.
    pub fn with_cache(mut self, cache: Arc<RegistryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn load(&self, agent_id: Uuid) -> DomainResult<AgentRecord> {
        self.agents
            .find_by_id(agent_id)
            .await?
            .ok_or_else(|| DomainError::AgentNotFound(agent_id.to_string()))
    }

    /// Persist `record.status -> status`; fails if the stored status moved on.
    async fn persist_status(&self, record: &AgentRecord, status: AgentStatus) -> DomainResult<()> {
        self.agents
            .update_status(record.id, record.status, status)
            .await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_agent(&record.slug).await;
        }
        info!(
            agent = %record.slug,
            from = %record.status,
            to = %status,
            "Agent status changed"
        );
        Ok(())
    }

    /// Validation and policy issues for `record`; empty when it may be promoted.
    async fn collect_issues(&self, record: &AgentRecord) -> DomainResult<Vec<String>> {
        let payload = record.validation_payload();
        let outcome = self.validation.validate(&record.agent_type, &payload).await?;

        let mut issues = outcome.issues;
        if !outcome.ok && issues.is_empty() {
            issues.push("descriptor failed validation".to_string());
        }
        issues.extend(self.policy.check_policy(&payload).await?);
        Ok(issues)
    }

    /// Promote a draft agent to active.
    ///
    /// Validation and policy issues reject the request. Agents that need a
    /// human decision get a pending approval and stay draft.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` for an unknown id and `InvalidStateTransition`
    /// for archived agents or when the status changed while the request ran.
    #[instrument(skip(self, opts), err)]
    pub async fn request_promotion(
        &self,
        agent_id: Uuid,
        opts: PromotionOptions,
    ) -> DomainResult<PromotionResult> {
        let record = self.load(agent_id).await?;

        match record.status {
            AgentStatus::Draft => {}
            AgentStatus::Active => {
                return Ok(PromotionResult::rejected(
                    AgentStatus::Active,
                    Vec::new(),
                    "agent is already active",
                ));
            }
            AgentStatus::Archived => {
                return Err(DomainError::InvalidStateTransition {
                    from: AgentStatus::Archived.to_string(),
                    to: AgentStatus::Active.to_string(),
                    reason: "archived agents cannot be promoted".to_string(),
                });
            }
        }

        if !opts.skip_validation {
            let issues = self.collect_issues(&record).await?;
            if !issues.is_empty() {
                warn!(agent = %record.slug, issues = issues.len(), "Promotion blocked");
                return Ok(PromotionResult::rejected(
                    record.status,
                    issues,
                    "promotion blocked by validation",
                ));
            }
        }

        let needs_approval = opts
            .require_approval
            .unwrap_or_else(|| requires_approval(&record));

        if needs_approval {
            let approval = self
                .approvals
                .create(NewApproval {
                    organization_scope: record.organization_scopes.first().cloned(),
                    agent_id: record.id,
                    agent_slug: record.slug.clone(),
                    mode: AGENT_PROMOTION_MODE.to_string(),
                    requested_by: opts.requested_by.clone(),
                    metadata: json!({
                        "agentType": record.agent_type,
                        "fromStatus": AgentStatus::Draft,
                        "toStatus": AgentStatus::Active,
                    }),
                })
                .await?;
            self.agents
                .update_metadata(record.id, json!({ "pendingApprovalId": approval.id }))
                .await?;
            info!(agent = %record.slug, approval_id = %approval.id, "Promotion awaits approval");
            return Ok(PromotionResult::pending_approval(approval.id, record.status));
        }

        self.activate(&record).await?;
        Ok(PromotionResult::promoted())
    }

    async fn activate(&self, record: &AgentRecord) -> DomainResult<()> {
        self.persist_status(record, AgentStatus::Active).await?;
        self.agents
            .update_metadata(
                record.id,
                json!({ "pendingApprovalId": null, "promotedAt": Utc::now().to_rfc3339() }),
            )
            .await
    }

    /// Decide a pending approval.
    #[instrument(skip(self), err)]
    pub async fn resolve_approval(
        &self,
        approval_id: Uuid,
        approved: bool,
        decided_by: Option<&str>,
    ) -> DomainResult<ApprovalRecord> {
        let approval = self
            .approvals
            .get(approval_id)
            .await?
            .ok_or(DomainError::ApprovalNotFound(approval_id))?;

        let target = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        if approval.status != ApprovalStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: approval.status.to_string(),
                to: target.to_string(),
                reason: "approval has already been decided".to_string(),
            });
        }

        let decided = self
            .approvals
            .set_status(approval_id, ApprovalStatus::Pending, target, decided_by)
            .await?;
        info!(approval_id = %approval_id, status = %target, "Approval resolved");
        Ok(decided)
    }

    /// Promote the agent behind an approved request.
    #[instrument(skip(self), err)]
    pub async fn complete_promotion_after_approval(
        &self,
        approval_id: Uuid,
    ) -> DomainResult<PromotionResult> {
        let approval = self
            .approvals
            .get(approval_id)
            .await?
            .ok_or(DomainError::ApprovalNotFound(approval_id))?;

        if approval.status != ApprovalStatus::Approved {
            return Err(DomainError::ApprovalNotGranted {
                id: approval_id,
                status: approval.status.to_string(),
            });
        }

        let record = self.load(approval.agent_id).await?;
        if record.status != AgentStatus::Draft {
            return Err(DomainError::InvalidStateTransition {
                from: record.status.to_string(),
                to: AgentStatus::Active.to_string(),
                reason: "agent is no longer a draft".to_string(),
            });
        }

        self.activate(&record).await?;
        let mut result = PromotionResult::promoted();
        result.approval_id = Some(approval_id);
        Ok(result)
    }

    /// Return an active agent to draft.
    #[instrument(skip(self), err)]
    pub async fn demote(&self, agent_id: Uuid) -> DomainResult<TransitionResult> {
        let record = self.load(agent_id).await?;
        if record.status != AgentStatus::Active {
            return Ok(TransitionResult {
                success: false,
                previous_status: record.status,
                new_status: record.status,
                reason: Some("only active agents can be demoted".to_string()),
            });
        }

        self.persist_status(&record, AgentStatus::Draft).await?;
        Ok(TransitionResult {
            success: true,
            previous_status: AgentStatus::Active,
            new_status: AgentStatus::Draft,
            reason: None,
        })
    }

    /// Archive an agent; archived agents cannot be promoted again.
    #[instrument(skip(self), err)]
    pub async fn archive(&self, agent_id: Uuid) -> DomainResult<TransitionResult> {
        let record = self.load(agent_id).await?;
        if record.status == AgentStatus::Archived {
            return Ok(TransitionResult {
                success: false,
                previous_status: AgentStatus::Archived,
                new_status: AgentStatus::Archived,
                reason: Some("agent is already archived".to_string()),
            });
        }

        self.persist_status(&record, AgentStatus::Archived).await?;
        Ok(TransitionResult {
            success: true,
            previous_status: record.status,
            new_status: AgentStatus::Archived,
            reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryAgentStore, InMemoryApprovalStore};
    use crate::adapters::validation::{AllowAllPolicy, DescriptorValidator};
    use crate::domain::ports::ValidationOutcome;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    struct Fixture {
        agents: Arc<InMemoryAgentStore>,
        approvals: Arc<InMemoryApprovalStore>,
        cache: Arc<RegistryCache>,
        service: PromotionService,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(DescriptorValidator::new()), Arc::new(AllowAllPolicy))
    }

    fn fixture_with(
        validation: Arc<dyn ValidationService>,
        policy: Arc<dyn PolicyService>,
    ) -> Fixture {
        let agents = Arc::new(InMemoryAgentStore::new());
        let approvals = Arc::new(InMemoryApprovalStore::new());
        let cache = Arc::new(RegistryCache::with_ttl(agents.clone(), Duration::from_secs(60)));
        let service = PromotionService::new(agents.clone(), approvals.clone(), validation, policy)
            .with_cache(cache.clone());
        Fixture {
            agents,
            approvals,
            cache,
            service,
        }
    }

    async fn seed(f: &Fixture, record: AgentRecord) -> Uuid {
        let id = record.id;
        f.agents.insert(&record).await.unwrap();
        id
    }

    fn api_record() -> AgentRecord {
        AgentRecord::new("weather", "api").with_endpoint(json!({"url": "https://api.test/run"}))
    }

    #[tokio::test]
    async fn test_context_agent_promotes_directly() {
        let f = fixture();
        let id = seed(&f, AgentRecord::new("helper", "context")).await;

        let result = f.service.request_promotion(id, PromotionOptions::default()).await.unwrap();

        assert!(result.success);
        assert!(!result.requires_approval);
        assert_eq!(result.status, AgentStatus::Active);
        assert_eq!(f.agents.status_of(id).await, Some(AgentStatus::Active));
    }

    #[tokio::test]
    async fn test_api_agent_requires_approval() {
        let f = fixture();
        let id = seed(&f, api_record()).await;

        let result = f.service.request_promotion(id, PromotionOptions::default()).await.unwrap();

        assert!(result.requires_approval);
        assert_eq!(result.status, AgentStatus::Draft);
        assert_eq!(f.agents.status_of(id).await, Some(AgentStatus::Draft));

        let approval = f.approvals.get(result.approval_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert_eq!(approval.mode, AGENT_PROMOTION_MODE);
        assert_eq!(approval.agent_slug, "weather");
    }

    #[tokio::test]
    async fn test_orchestrate_capability_requires_approval() {
        let f = fixture();
        let id = seed(&f, AgentRecord::new("boss", "context").with_capability("Orchestrate")).await;
        let result = f.service.request_promotion(id, PromotionOptions::default()).await.unwrap();
        assert!(result.requires_approval);
    }

    #[tokio::test]
    async fn test_require_approval_override() {
        let f = fixture();
        let id = seed(&f, api_record()).await;
        let opts = PromotionOptions {
            require_approval: Some(false),
            ..Default::default()
        };
        let result = f.service.request_promotion(id, opts).await.unwrap();
        assert_eq!(result.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_already_active_is_soft_failure() {
        let f = fixture();
        let id = seed(&f, AgentRecord::new("helper", "context").with_status(AgentStatus::Active)).await;
        let result = f.service.request_promotion(id, PromotionOptions::default()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_archived_and_missing_are_errors() {
        let f = fixture();
        let id = seed(&f, AgentRecord::new("old", "context").with_status(AgentStatus::Archived)).await;

        let err = f.service.request_promotion(id, PromotionOptions::default()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

        let err = f
            .service
            .request_promotion(Uuid::new_v4(), PromotionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AgentNotFound(_)));
    }

    struct Rejecting;

    #[async_trait]
    impl ValidationService for Rejecting {
        async fn validate(&self, _agent_type: &str, _payload: &Value) -> DomainResult<ValidationOutcome> {
            Ok(ValidationOutcome::invalid(vec!["missing prompts".into()]))
        }
    }

    struct Forbidding;

    #[async_trait]
    impl PolicyService for Forbidding {
        async fn check_policy(&self, _payload: &Value) -> DomainResult<Vec<String>> {
            Ok(vec!["external egress not allowed".into()])
        }
    }

    #[tokio::test]
    async fn test_validation_and_policy_issues_block() {
        let f = fixture_with(Arc::new(Rejecting), Arc::new(Forbidding));
        let id = seed(&f, AgentRecord::new("helper", "context")).await;

        let result = f.service.request_promotion(id, PromotionOptions::default()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.issues, vec!["missing prompts", "external egress not allowed"]);
        assert_eq!(f.agents.status_of(id).await, Some(AgentStatus::Draft));

        let skip = PromotionOptions {
            skip_validation: true,
            ..Default::default()
        };
        let result = f.service.request_promotion(id, skip).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let f = fixture();
        let id = seed(&f, api_record()).await;
        let requested = f.service.request_promotion(id, PromotionOptions::default()).await.unwrap();
        let approval_id = requested.approval_id.unwrap();

        let err = f.service.complete_promotion_after_approval(approval_id).await.unwrap_err();
        assert!(matches!(err, DomainError::ApprovalNotGranted { .. }));

        let decided = f.service.resolve_approval(approval_id, true, Some("ops")).await.unwrap();
        assert_eq!(decided.status, ApprovalStatus::Approved);
        assert_eq!(decided.decided_by.as_deref(), Some("ops"));
        assert!(decided.decided_at.is_some());

        let err = f.service.resolve_approval(approval_id, false, None).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

        let done = f.service.complete_promotion_after_approval(approval_id).await.unwrap();
        assert_eq!(done.status, AgentStatus::Active);
        assert_eq!(f.agents.status_of(id).await, Some(AgentStatus::Active));

        let err = f.service.complete_promotion_after_approval(approval_id).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

        let err = f
            .service
            .complete_promotion_after_approval(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ApprovalNotFound(_)));
    }

    #[tokio::test]
    async fn test_rejected_approval_is_not_granted() {
        let f = fixture();
        let id = seed(&f, api_record()).await;
        let approval_id = f
            .service
            .request_promotion(id, PromotionOptions::default())
            .await
            .unwrap()
            .approval_id
            .unwrap();

        f.service.resolve_approval(approval_id, false, Some("ops")).await.unwrap();
        let err = f.service.complete_promotion_after_approval(approval_id).await.unwrap_err();
        assert!(matches!(err, DomainError::ApprovalNotGranted { ref status, .. } if status == "rejected"));
    }

    #[tokio::test]
    async fn test_demote_and_archive() {
        let f = fixture();
        let id = seed(&f, AgentRecord::new("helper", "context")).await;

        let soft = f.service.demote(id).await.unwrap();
        assert!(!soft.success);
        assert_eq!(soft.previous_status, AgentStatus::Draft);

        f.service.request_promotion(id, PromotionOptions::default()).await.unwrap();
        let demoted = f.service.demote(id).await.unwrap();
        assert!(demoted.success);
        assert_eq!(demoted.new_status, AgentStatus::Draft);

        let archived = f.service.archive(id).await.unwrap();
        assert!(archived.success);
        assert_eq!(archived.previous_status, AgentStatus::Draft);

        let again = f.service.archive(id).await.unwrap();
        assert!(!again.success);
    }

    /// Serves agents as drafts regardless of their stored status.
    struct StaleReads(Arc<InMemoryAgentStore>);

    #[async_trait]
    impl AgentStore for StaleReads {
        async fn find_by_slug(&self, org: Option<&str>, slug: &str) -> DomainResult<Option<AgentRecord>> {
            self.0.find_by_slug(org, slug).await
        }

        async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<AgentRecord>> {
            Ok(self
                .0
                .find_by_id(id)
                .await?
                .map(|record| record.with_status(AgentStatus::Draft)))
        }

        async fn list_by_organization(&self, org: Option<&str>) -> DomainResult<Vec<AgentRecord>> {
            self.0.list_by_organization(org).await
        }

        async fn latest_modified_at(&self) -> DomainResult<Option<chrono::DateTime<Utc>>> {
            self.0.latest_modified_at().await
        }

        async fn update_status(&self, id: Uuid, from: AgentStatus, to: AgentStatus) -> DomainResult<()> {
            self.0.update_status(id, from, to).await
        }

        async fn update_metadata(&self, id: Uuid, patch: Value) -> DomainResult<()> {
            self.0.update_metadata(id, patch).await
        }

        async fn insert(&self, record: &AgentRecord) -> DomainResult<()> {
            self.0.insert(record).await
        }
    }

    #[tokio::test]
    async fn test_archive_after_load_is_not_reactivated() {
        let inner = Arc::new(InMemoryAgentStore::new());
        let record = AgentRecord::new("helper", "context").with_status(AgentStatus::Archived);
        let id = record.id;
        inner.insert(&record).await.unwrap();

        let service = PromotionService::new(
            Arc::new(StaleReads(inner.clone())),
            Arc::new(InMemoryApprovalStore::new()),
            Arc::new(DescriptorValidator::new()),
            Arc::new(AllowAllPolicy),
        );

        let err = service.request_promotion(id, PromotionOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidStateTransition { ref from, .. } if from == "archived"
        ));
        assert_eq!(inner.status_of(id).await, Some(AgentStatus::Archived));
    }

    #[tokio::test]
    async fn test_decided_approval_not_overwritten() {
        let f = fixture();
        let id = seed(&f, api_record()).await;
        let approval_id = f
            .service
            .request_promotion(id, PromotionOptions::default())
            .await
            .unwrap()
            .approval_id
            .unwrap();
        f.approvals
            .set_status(approval_id, ApprovalStatus::Pending, ApprovalStatus::Rejected, Some("ops"))
            .await
            .unwrap();

        let err = f
            .approvals
            .set_status(approval_id, ApprovalStatus::Pending, ApprovalStatus::Approved, Some("dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        let stored = f.approvals.get(approval_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ApprovalStatus::Rejected);
        assert_eq!(stored.decided_by.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn test_transition_invalidates_cache() {
        let f = fixture();
        let id = seed(&f, AgentRecord::new("helper", "context")).await;

        let cached = f.cache.get(None, "helper").await.unwrap().unwrap();
        assert_eq!(cached.status, AgentStatus::Draft);

        f.service.request_promotion(id, PromotionOptions::default()).await.unwrap();

        let fresh = f.cache.get(None, "helper").await.unwrap().unwrap();
        assert_eq!(fresh.status, AgentStatus::Active);
    }
}
