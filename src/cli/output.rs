//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::style;
use serde::Serialize;

use crate::domain::models::{AgentStatus, DispatchStatus};

/// Command result printable as text or JSON.
pub trait CommandOutput: Serialize {
    /// Human-readable rendering.
    fn to_human(&self) -> String;

    /// JSON rendering.
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Print `result` in the selected mode.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Table with bold headers, sized to the terminal.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

/// Colored table cell for an agent status.
pub fn status_cell(status: AgentStatus) -> Cell {
    let color = match status {
        AgentStatus::Draft => Color::Yellow,
        AgentStatus::Active => Color::Green,
        AgentStatus::Archived => Color::DarkGrey,
    };
    Cell::new(status.as_str()).fg(color)
}

/// Colored dispatch status.
pub fn dispatch_status(status: DispatchStatus) -> String {
    match status {
        DispatchStatus::Completed => style(status.as_str()).green().to_string(),
        DispatchStatus::Error => style(status.as_str()).red().bold().to_string(),
    }
}

/// Check or cross mark.
pub fn success_mark(success: bool) -> String {
    if success {
        style("✓").green().to_string()
    } else {
        style("✗").red().to_string()
    }
}

/// Print a failed command and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", style("error:").red().bold());
    }
    std::process::exit(1);
}
