//! Common test utilities for integration tests
//!
//! Provides shared fixtures used across multiple integration test files.

#![allow(dead_code)]

use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;

use agentry::adapters::generation::MockGenerator;
use agentry::adapters::http::ReqwestHttpClient;
use agentry::adapters::sqlite::{
    create_migrated_test_pool, SqliteAgentStore, SqliteApprovalStore, SqliteRedactionRuleSource,
};
use agentry::adapters::validation::{AllowAllPolicy, DescriptorValidator};
use agentry::domain::models::{
    AgentRecord, AgentStatus, DispatcherConfig, RegistryConfig, RetryConfig,
};
use agentry::domain::ports::{AgentStore, GenerationService, HttpClient};
use agentry::services::{
    AgentRuntime, MetricsRecorder, PromotionService, RedactionPipeline, RegistryCache,
    TransportDispatcher,
};

/// Stores and services over one in-memory SQLite database.
pub struct Harness {
    pub pool: SqlitePool,
    pub agents: Arc<SqliteAgentStore>,
    pub approvals: Arc<SqliteApprovalStore>,
    pub rules: Arc<SqliteRedactionRuleSource>,
    pub cache: Arc<RegistryCache>,
    pub promotion: PromotionService,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = create_migrated_test_pool()
            .await
            .expect("Failed to create test database");
        let agents = Arc::new(SqliteAgentStore::new(pool.clone()));
        let approvals = Arc::new(SqliteApprovalStore::new(pool.clone()));
        let rules = Arc::new(SqliteRedactionRuleSource::new(pool.clone()));
        let cache = Arc::new(RegistryCache::new(agents.clone(), &RegistryConfig::default()));
        let promotion = PromotionService::new(
            agents.clone(),
            approvals.clone(),
            Arc::new(DescriptorValidator::new()),
            Arc::new(AllowAllPolicy),
        )
        .with_cache(cache.clone());

        Self {
            pool,
            agents,
            approvals,
            rules,
            cache,
            promotion,
        }
    }

    /// Insert `record` as an active agent.
    pub async fn active(&self, record: AgentRecord) -> AgentRecord {
        let record = record.with_status(AgentStatus::Active);
        self.agents.insert(&record).await.expect("insert agent");
        record
    }

    pub fn runtime(&self, http: Arc<dyn HttpClient>, generator: Arc<dyn GenerationService>) -> AgentRuntime {
        let dispatcher = Arc::new(TransportDispatcher::new(
            http,
            generator,
            RedactionPipeline::new(self.rules.clone()),
            Arc::new(MetricsRecorder::new(32)),
            fast_dispatch_config(),
        ));
        AgentRuntime::new(self.cache.clone(), dispatcher, 16)
    }

    /// Runtime with a real reqwest client and a scripted generator.
    pub fn http_runtime(&self) -> AgentRuntime {
        self.runtime(
            Arc::new(ReqwestHttpClient::new().expect("reqwest client")),
            Arc::new(MockGenerator::new()),
        )
    }
}

/// Default dispatch settings with near-zero backoff.
pub fn fast_dispatch_config() -> DispatcherConfig {
    DispatcherConfig {
        api_timeout_ms: 5_000,
        external_timeout_ms: 5_000,
        extra_allowed_headers: vec!["x-trace-id".to_string()],
        retry: RetryConfig {
            max_retries: 2,
            backoff_base_ms: 1,
        },
        ..Default::default()
    }
}

pub fn api_agent(slug: &str, org: &str, endpoint: Value) -> AgentRecord {
    AgentRecord::new(slug, "api")
        .with_organization(org)
        .with_endpoint(endpoint)
}

pub fn external_agent(slug: &str, org: &str, url: &str) -> AgentRecord {
    AgentRecord::new(slug, "external")
        .with_organization(org)
        .with_endpoint(serde_json::json!({ "url": url }))
}
