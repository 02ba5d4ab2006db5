//! Approval CLI commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::context::CliContext;
use crate::cli::output::{output, success_mark, CommandOutput};
use crate::domain::models::{ApprovalRecord, ApprovalStatus, PromotionResult};
use crate::domain::ports::ApprovalStore;

/// Decide promotion approvals
#[derive(Args, Debug)]
pub struct ApprovalArgs {
    /// Subcommand
    #[command(subcommand)]
    pub command: ApprovalCommands,
}

/// Approval subcommands
#[derive(Subcommand, Debug)]
pub enum ApprovalCommands {
    /// Approve a pending request
    Approve {
        /// Approval id
        approval_id: Uuid,
        /// Who made the decision
        #[arg(long)]
        by: Option<String>,
        /// Also activate the agent once approved
        #[arg(long)]
        complete: bool,
    },
    /// Reject a pending request
    Reject {
        /// Approval id
        approval_id: Uuid,
        /// Who made the decision
        #[arg(long)]
        by: Option<String>,
    },
    /// Show an approval request
    Show {
        /// Approval id
        approval_id: Uuid,
    },
}

/// Output of approval subcommands.
#[derive(Debug, Serialize)]
pub struct ApprovalOutput {
    /// Approval after the command.
    pub approval: ApprovalRecord,
    /// Promotion outcome when `--complete` was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionResult>,
}

impl CommandOutput for ApprovalOutput {
    fn to_human(&self) -> String {
        let a = &self.approval;
        let mut lines = vec![
            format!("Approval: {}", a.id),
            format!("Agent: {} ({})", a.agent_slug, a.agent_id),
            format!("Mode: {}", a.mode),
            format!("Status: {}", a.status.as_str()),
        ];
        if let Some(by) = &a.requested_by {
            lines.push(format!("Requested by: {by}"));
        }
        if let Some(by) = &a.decided_by {
            lines.push(format!("Decided by: {by}"));
        }
        if let Some(at) = a.decided_at {
            lines.push(format!("Decided at: {}", at.to_rfc3339()));
        }
        if let Some(p) = &self.promotion {
            lines.push(format!(
                "{} Agent is now {}",
                success_mark(p.success),
                p.status
            ));
        }
        lines.join("\n")
    }
}

/// Run an approval subcommand.
pub async fn execute(args: ApprovalArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    let out = match args.command {
        ApprovalCommands::Approve {
            approval_id,
            by,
            complete,
        } => {
            let approval = ctx
                .promotion
                .resolve_approval(approval_id, true, by.as_deref())
                .await?;
            let promotion = if complete && approval.status == ApprovalStatus::Approved {
                Some(
                    ctx.promotion
                        .complete_promotion_after_approval(approval_id)
                        .await?,
                )
            } else {
                None
            };
            ApprovalOutput {
                approval,
                promotion,
            }
        }

        ApprovalCommands::Reject { approval_id, by } => ApprovalOutput {
            approval: ctx
                .promotion
                .resolve_approval(approval_id, false, by.as_deref())
                .await?,
            promotion: None,
        },

        ApprovalCommands::Show { approval_id } => ApprovalOutput {
            approval: ctx
                .approvals
                .get(approval_id)
                .await?
                .ok_or_else(|| anyhow!("Approval not found: {approval_id}"))?,
            promotion: None,
        },
    };

    output(&out, json_mode);
    Ok(())
}
