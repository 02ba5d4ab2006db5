//! Wiring of stores and services for one CLI invocation.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::generation::AnthropicGenerator;
use crate::adapters::http::ReqwestHttpClient;
use crate::adapters::sqlite::{
    initialize_database, SqliteAgentStore, SqliteApprovalStore, SqliteRedactionRuleSource,
};
use crate::adapters::validation::{AllowAllPolicy, DescriptorValidator};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    AgentRuntime, MetricsRecorder, PromotionService, RedactionPipeline, RegistryCache,
    TransportDispatcher,
};

/// Load configuration from `--config` when given, else the project hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Stores and services shared by CLI commands.
pub struct CliContext {
    /// Effective configuration.
    pub config: Config,
    /// Agent store.
    pub agents: Arc<SqliteAgentStore>,
    /// Approval store.
    pub approvals: Arc<SqliteApprovalStore>,
    /// Registry cache over the agent store.
    pub cache: Arc<RegistryCache>,
    /// Promotion service wired to the cache.
    pub promotion: PromotionService,
}

impl CliContext {
    /// Open the database and wire services.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = initialize_database(&config.database)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;

        let agents = Arc::new(SqliteAgentStore::new(pool.clone()));
        let approvals = Arc::new(SqliteApprovalStore::new(pool));
        let cache = Arc::new(RegistryCache::new(agents.clone(), &config.registry));

        let promotion = PromotionService::new(
            agents.clone(),
            approvals.clone(),
            Arc::new(DescriptorValidator::new()),
            Arc::new(AllowAllPolicy),
        )
        .with_cache(cache.clone());

        Ok(Self {
            config,
            agents,
            approvals,
            cache,
            promotion,
        })
    }

    /// Build the invocation runtime over this context's registry.
    pub fn runtime(&self) -> Result<AgentRuntime> {
        let rules = Arc::new(SqliteRedactionRuleSource::new(self.agents.pool().clone()));
        let generator = AnthropicGenerator::new(self.config.anthropic.clone())
            .context("Failed to create Anthropic generator")?;
        let dispatcher = Arc::new(TransportDispatcher::new(
            Arc::new(ReqwestHttpClient::new()?),
            Arc::new(generator),
            RedactionPipeline::new(rules),
            Arc::new(MetricsRecorder::new(self.config.metrics.ring_capacity)),
            self.config.dispatch.clone(),
        ));

        Ok(AgentRuntime::new(
            self.cache.clone(),
            dispatcher,
            self.config.stream.channel_capacity,
        ))
    }
}
