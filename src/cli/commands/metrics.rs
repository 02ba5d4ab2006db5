//! Transport metrics sampling.
//!
//! Metrics live in process memory, so this command drives a short series of
//! invocations and reports what the recorder saw.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::context::CliContext;
use crate::cli::output::{output, table, CommandOutput};
use crate::services::{Invocation, MetricsSnapshot};

/// Invoke agents and report metrics
#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Agent slugs to invoke
    #[arg(required = true)]
    pub slugs: Vec<String>,

    /// Message sent on every run
    #[arg(short, long, default_value = "ping")]
    pub message: String,

    /// Invocations per agent
    #[arg(short, long, default_value_t = 3)]
    pub runs: u32,

    /// Organization scope
    #[arg(short, long)]
    pub org: Option<String>,
}

/// Output of `metrics`.
#[derive(Debug, Serialize)]
pub struct MetricsOutput {
    /// One snapshot per series.
    pub series: Vec<MetricsSnapshot>,
    /// Invocations that returned an error instead of a result.
    pub failed_invocations: Vec<String>,
}

impl CommandOutput for MetricsOutput {
    fn to_human(&self) -> String {
        if self.series.is_empty() {
            return "No samples recorded.".to_string();
        }

        let mut t = table(&[
            "TRANSPORT", "AGENT", "COUNT", "SUCCESS", "AVG MS", "P50", "P95", "MAX", "LAST HTTP",
        ]);
        for s in &self.series {
            t.add_row(vec![
                Cell::new(s.transport_kind.as_str()),
                Cell::new(&s.agent_slug),
                Cell::new(s.count),
                Cell::new(format!("{:.0}%", s.success_rate * 100.0)),
                Cell::new(format!("{:.1}", s.avg_ms)),
                Cell::new(s.p50_ms),
                Cell::new(s.p95_ms),
                Cell::new(s.max_ms),
                Cell::new(s.last_status_code.map_or_else(|| "-".to_string(), |c| c.to_string())),
            ]);
        }

        let mut out = t.to_string();
        for failure in &self.failed_invocations {
            out.push_str("\n  ! ");
            out.push_str(failure);
        }
        out
    }
}

/// Run `metrics`.
pub async fn execute(args: MetricsArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    let runtime = ctx.runtime()?;
    let mut failed_invocations = Vec::new();

    for slug in &args.slugs {
        for _ in 0..args.runs {
            let mut invocation = Invocation::new(slug, &args.message);
            if let Some(org) = &args.org {
                invocation = invocation.with_organization(org);
            }
            if let Err(e) = runtime.invoke(invocation).await {
                failed_invocations.push(format!("{slug}: {e}"));
            }
        }
    }

    let series = runtime.dispatcher().metrics().snapshots().await;
    output(
        &MetricsOutput {
            series,
            failed_invocations,
        },
        json_mode,
    );
    Ok(())
}
