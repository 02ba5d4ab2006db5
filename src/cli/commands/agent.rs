//! Agent CLI commands.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::cli::context::CliContext;
use crate::cli::output::{output, status_cell, success_mark, table, truncate, CommandOutput};
use crate::domain::models::{
    AgentDescriptor, AgentRecord, PromotionOptions, PromotionResult, TransitionResult,
    TransportKind,
};
use crate::domain::ports::{AgentStore, ApprovalStore};
use crate::services::promotion::requires_approval;

/// Manage registered agents
#[derive(Args, Debug)]
pub struct AgentArgs {
    /// Subcommand
    #[command(subcommand)]
    pub command: AgentCommands,
}

/// Agent subcommands
#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// Load an authored agent manifest (YAML or JSON) as a draft
    Register {
        /// Manifest file
        file: PathBuf,
        /// Add an organization scope on top of the manifest's
        /// Organization scope
        #[arg(short, long)]
        org: Option<String>,
    },
    /// List agents visible to an organization, or global agents
    List {
        /// Organization scope
        #[arg(short, long)]
        org: Option<String>,
    },
    /// Show agent details
    Show {
        /// Agent id or slug
        agent: String,
        /// Organization scope
        #[arg(short, long)]
        org: Option<String>,
    },
    /// Request promotion of a draft agent to active
    Promote {
        /// Agent id or slug
        agent: String,
        /// Organization scope
        #[arg(short, long)]
        org: Option<String>,
        /// Skip descriptor and policy validation
        #[arg(long)]
        skip_validation: bool,
        /// Force (true) or waive (false) the approval step
        #[arg(long, value_name = "BOOL")]
        require_approval: Option<bool>,
        /// Recorded on the approval request
        #[arg(long)]
        requested_by: Option<String>,
    },
    /// Return an active agent to draft
    Demote {
        /// Agent id or slug
        agent: String,
        /// Organization scope
        #[arg(short, long)]
        org: Option<String>,
    },
    /// Archive an agent
    Archive {
        /// Agent id or slug
        agent: String,
        /// Organization scope
        #[arg(short, long)]
        org: Option<String>,
    },
    /// Activate the agent behind an approved promotion request
    CompletePromotion {
        /// Approval id
        approval_id: Uuid,
    },
}

/// Authored agent as loaded by `agent register`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentManifest {
    /// Unique routing name.
    pub slug: String,
    /// Display name; defaults to the slug.
    #[serde(default)]
    pub name: Option<String>,
    /// Agent kind, e.g. `context`, `api`, `external`.
    pub agent_type: String,
    /// Organizations allowed to call the agent.
    #[serde(default)]
    pub organization_scopes: Vec<String>,
    /// Descriptor blocks.
    #[serde(default)]
    pub descriptor: AgentDescriptor,
    /// Initial metadata object.
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl AgentManifest {
    /// Parse a manifest; JSON is accepted as a YAML subset.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    /// Draft record for the manifest.
    pub fn into_record(self) -> AgentRecord {
        let mut record = AgentRecord::new(self.slug, self.agent_type).with_descriptor(self.descriptor);
        if let Some(name) = self.name {
            record.name = name;
        }
        for scope in self.organization_scopes {
            record = record.with_organization(scope);
        }
        if let Some(metadata) = self.metadata.filter(Value::is_object) {
            record.metadata = metadata;
        }
        record
    }
}

/// Agent summary row.
#[derive(Debug, Serialize)]
pub struct AgentOutput {
    /// Agent id.
    pub id: String,
    /// Slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Agent kind.
    pub agent_type: String,
    /// Resolved transport kind.
    pub transport: String,
    /// Lifecycle status.
    pub status: String,
    /// Organization scopes.
    pub organizations: Vec<String>,
    /// Whether promotion needs an approval.
    pub requires_approval: bool,
}

impl From<&AgentRecord> for AgentOutput {
    fn from(agent: &AgentRecord) -> Self {
        Self {
            id: agent.id.to_string(),
            slug: agent.slug.clone(),
            name: agent.name.clone(),
            agent_type: agent.agent_type.clone(),
            transport: TransportKind::for_agent_type(&agent.agent_type).to_string(),
            status: agent.status.to_string(),
            organizations: agent.organization_scopes.clone(),
            requires_approval: requires_approval(agent),
        }
    }
}

/// Output of `agent list`.
#[derive(Debug, Serialize)]
pub struct AgentListOutput {
    /// Agents found.
    pub agents: Vec<AgentOutput>,
    /// Number of agents.
    pub total: usize,
    #[serde(skip)]
    records: Vec<AgentRecord>,
}

impl CommandOutput for AgentListOutput {
    fn to_human(&self) -> String {
        if self.records.is_empty() {
            return "No agents found.".to_string();
        }

        let mut t = table(&["ID", "SLUG", "TYPE", "TRANSPORT", "STATUS", "ORGS"]);
        for (agent, record) in self.agents.iter().zip(&self.records) {
            t.add_row(vec![
                Cell::new(&agent.id[..8]),
                Cell::new(truncate(&agent.slug, 24)),
                Cell::new(&agent.agent_type),
                Cell::new(&agent.transport),
                status_cell(record.status),
                Cell::new(if agent.organizations.is_empty() {
                    "(global)".to_string()
                } else {
                    agent.organizations.join(",")
                }),
            ]);
        }
        format!("Found {} agent(s):\n{t}", self.total)
    }
}

/// Output of `agent show`.
#[derive(Debug, Serialize)]
pub struct AgentDetailOutput {
    /// Summary.
    pub agent: AgentOutput,
    /// Declared capabilities.
    pub capabilities: Vec<String>,
    /// Metadata.
    pub metadata: Value,
    /// Full descriptor.
    pub descriptor: AgentDescriptor,
    /// Creation time, RFC 3339.
    pub created_at: String,
    /// Last modification time, RFC 3339.
    pub updated_at: String,
}

impl CommandOutput for AgentDetailOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Agent: {} ({})", self.agent.name, self.agent.slug),
            format!("ID: {}", self.agent.id),
            format!("Type: {} via {}", self.agent.agent_type, self.agent.transport),
            format!("Status: {}", self.agent.status),
            format!("Approval required: {}", self.agent.requires_approval),
            format!("Created: {}", self.created_at),
            format!("Updated: {}", self.updated_at),
        ];

        if !self.agent.organizations.is_empty() {
            lines.push(format!("Organizations: {}", self.agent.organizations.join(", ")));
        }
        if !self.capabilities.is_empty() {
            lines.push(format!("Capabilities: {}", self.capabilities.join(", ")));
        }
        if let Some(system) = &self.descriptor.prompts.system {
            lines.push(format!("\nSystem prompt:\n{}", truncate(system, 500)));
        }
        if let Some(pending) = self.metadata.get("pendingApprovalId").filter(|v| !v.is_null()) {
            lines.push(format!("\nPending approval: {pending}"));
        }

        lines.join("\n")
    }
}

/// Output of a simple agent action.
#[derive(Debug, Serialize)]
pub struct AgentActionOutput {
    /// Whether the action succeeded.
    pub success: bool,
    /// Summary line.
    pub message: String,
    /// Affected agent.
    pub agent: Option<AgentOutput>,
}

impl CommandOutput for AgentActionOutput {
    fn to_human(&self) -> String {
        format!("{} {}", success_mark(self.success), self.message)
    }
}

/// Output of `agent promote` and `agent complete-promotion`.
#[derive(Debug, Serialize)]
pub struct PromotionOutput {
    /// Agent id.
    pub agent_id: Uuid,
    /// Promotion outcome.
    #[serde(flatten)]
    pub result: PromotionResult,
}

impl CommandOutput for PromotionOutput {
    fn to_human(&self) -> String {
        let r = &self.result;
        let headline = match (r.success, r.approval_id) {
            (true, Some(id)) => format!("Promotion awaits approval {id}"),
            (true, None) => format!("Agent {} is now {}", self.agent_id, r.status),
            (false, _) => format!(
                "Promotion not performed: {}",
                r.message.as_deref().unwrap_or("unknown reason")
            ),
        };

        let mut lines = vec![format!("{} {headline}", success_mark(r.success))];
        for issue in &r.issues {
            lines.push(format!("  - {issue}"));
        }
        lines.join("\n")
    }
}

/// Output of `agent demote` and `agent archive`.
#[derive(Debug, Serialize)]
pub struct TransitionOutput {
    /// Agent id.
    pub agent_id: Uuid,
    /// Transition outcome.
    #[serde(flatten)]
    pub result: TransitionResult,
}

impl CommandOutput for TransitionOutput {
    fn to_human(&self) -> String {
        let r = &self.result;
        if r.success {
            format!(
                "{} Agent {}: {} -> {}",
                success_mark(true),
                self.agent_id,
                r.previous_status,
                r.new_status
            )
        } else {
            format!(
                "{} Agent {} stays {}: {}",
                success_mark(false),
                self.agent_id,
                r.previous_status,
                r.reason.as_deref().unwrap_or("transition not allowed")
            )
        }
    }
}

/// Accept either a full id or a slug visible to `org`.
pub async fn resolve_agent(ctx: &CliContext, org: Option<&str>, ident: &str) -> Result<AgentRecord> {
    let found = match Uuid::parse_str(ident) {
        Ok(id) => ctx.agents.find_by_id(id).await?,
        Err(_) => ctx.agents.find_by_slug(org, ident).await?,
    };
    found.ok_or_else(|| anyhow!("Agent not found: {ident}"))
}

/// Run an agent subcommand.
pub async fn execute(args: AgentArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    match args.command {
        AgentCommands::Register { file, org } => {
            let mut record = AgentManifest::from_path(&file)?.into_record();
            if let Some(org) = org {
                if !record.organization_scopes.contains(&org) {
                    record = record.with_organization(org);
                }
            }
            ctx.agents
                .insert(&record)
                .await
                .with_context(|| format!("Failed to register agent '{}'", record.slug))?;
            ctx.cache.invalidate_agent(&record.slug).await;

            output(
                &AgentActionOutput {
                    success: true,
                    message: format!("Agent registered as draft: {} ({})", record.slug, record.id),
                    agent: Some(AgentOutput::from(&record)),
                },
                json_mode,
            );
        }

        AgentCommands::List { org } => {
            let records = ctx.agents.list_by_organization(org.as_deref()).await?;
            output(
                &AgentListOutput {
                    total: records.len(),
                    agents: records.iter().map(AgentOutput::from).collect(),
                    records,
                },
                json_mode,
            );
        }

        AgentCommands::Show { agent, org } => {
            let record = resolve_agent(ctx, org.as_deref(), &agent).await?;
            output(
                &AgentDetailOutput {
                    agent: AgentOutput::from(&record),
                    capabilities: record.descriptor.capabilities.clone(),
                    metadata: record.metadata.clone(),
                    created_at: record.created_at.to_rfc3339(),
                    updated_at: record.updated_at.to_rfc3339(),
                    descriptor: record.descriptor,
                },
                json_mode,
            );
        }

        AgentCommands::Promote {
            agent,
            org,
            skip_validation,
            require_approval,
            requested_by,
        } => {
            let record = resolve_agent(ctx, org.as_deref(), &agent).await?;
            let result = ctx
                .promotion
                .request_promotion(
                    record.id,
                    PromotionOptions {
                        skip_validation,
                        require_approval,
                        requested_by,
                    },
                )
                .await?;
            output(
                &PromotionOutput {
                    agent_id: record.id,
                    result,
                },
                json_mode,
            );
        }

        AgentCommands::Demote { agent, org } => {
            let record = resolve_agent(ctx, org.as_deref(), &agent).await?;
            let result = ctx.promotion.demote(record.id).await?;
            output(
                &TransitionOutput {
                    agent_id: record.id,
                    result,
                },
                json_mode,
            );
        }

        AgentCommands::Archive { agent, org } => {
            let record = resolve_agent(ctx, org.as_deref(), &agent).await?;
            let result = ctx.promotion.archive(record.id).await?;
            output(
                &TransitionOutput {
                    agent_id: record.id,
                    result,
                },
                json_mode,
            );
        }

        AgentCommands::CompletePromotion { approval_id } => {
            let approval = ctx
                .approvals
                .get(approval_id)
                .await?
                .ok_or_else(|| anyhow!("Approval not found: {approval_id}"))?;
            let result = ctx
                .promotion
                .complete_promotion_after_approval(approval_id)
                .await?;
            output(
                &PromotionOutput {
                    agent_id: approval.agent_id,
                    result,
                },
                json_mode,
            );
        }
    }

    Ok(())
}
