//! Agent invocation command.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use std::io::Write;

use crate::cli::context::CliContext;
use crate::cli::output::{dispatch_status, output, CommandOutput};
use crate::domain::models::{
    ChunkKind, ContentType, DispatchResult, RoutingDecision, StreamEvent, TaskMode,
};
use crate::services::{AgentRuntime, Invocation};

/// Send a message to an agent
#[derive(Args, Debug)]
pub struct InvokeArgs {
    /// Agent slug
    pub slug: String,

    /// User message
    pub message: String,

    /// Organization the caller acts for
    #[arg(short, long)]
    pub org: Option<String>,

    /// Task mode: converse, plan or build
    #[arg(short, long, default_value = "converse")]
    pub mode: TaskMode,

    /// Structured payload as JSON
    #[arg(long)]
    pub payload: Option<String>,

    /// Content type of the message or payload
    #[arg(long)]
    pub content_type: Option<ContentType>,

    /// Forwarded header, `name=value`; repeatable
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Provider override
    #[arg(long)]
    pub provider: Option<String>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,

    /// Route managed generation to a local provider
    #[arg(long)]
    pub local: bool,

    /// Session id
    #[arg(long)]
    pub session: Option<String>,

    /// Conversation id
    #[arg(long)]
    pub conversation: Option<String>,

    /// Calling user id
    #[arg(long)]
    pub user: Option<String>,

    /// Print output as it is produced
    #[arg(short, long)]
    pub stream: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl InvokeArgs {
    /// Build the runtime invocation, parsing `--payload` as JSON.
    pub fn to_invocation(&self) -> Result<Invocation> {
        let routing = RoutingDecision {
            provider: self.provider.clone(),
            model: self.model.clone(),
            is_local: self.local,
        };

        let mut invocation = Invocation::new(&self.slug, &self.message)
            .with_mode(self.mode)
            .with_routing(routing);
        if let Some(org) = &self.org {
            invocation = invocation.with_organization(org);
        }
        if let Some(payload) = &self.payload {
            let value = serde_json::from_str(payload).context("--payload is not valid JSON")?;
            invocation = invocation.with_payload(value);
        }
        if let Some(content_type) = self.content_type {
            invocation = invocation.with_content_type(content_type);
        }
        invocation.headers = self.headers.iter().cloned().collect();
        invocation.session_id.clone_from(&self.session);
        invocation.conversation_id.clone_from(&self.conversation);
        invocation.user_id.clone_from(&self.user);
        Ok(invocation)
    }
}

/// Output of `invoke`.
#[derive(Debug, Serialize)]
pub struct InvokeOutput {
    /// Dispatch result.
    #[serde(flatten)]
    pub result: DispatchResult,
}

impl CommandOutput for InvokeOutput {
    fn to_human(&self) -> String {
        let r = &self.result;
        let mut lines = Vec::new();
        if r.is_success() {
            lines.push(r.content.clone());
        } else if let Some(message) = &r.error_message {
            lines.push(format!("{} {message}", style("error:").red().bold()));
        }
        lines.push(summary(r));
        lines.join("\n")
    }
}

fn summary(r: &DispatchResult) -> String {
    let mut line = format!(
        "[{}] {}/{} in {}ms, tokens {}/{}",
        dispatch_status(r.status),
        r.provider,
        r.model,
        r.timing.duration_ms,
        r.usage.input,
        r.usage.output
    );
    if let Some(code) = r.status_code {
        line.push_str(&format!(", HTTP {code}"));
    }
    style(line).dim().to_string()
}

async fn stream(runtime: &AgentRuntime, invocation: Invocation, json_mode: bool) -> Result<()> {
    let mut receiver = runtime.invoke_streaming(invocation).await?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut streamed_partials = false;
    let mut failure = None;

    loop {
        let event = tokio::select! {
            event = receiver.next() => event,
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                receiver.cancel();
                continue;
            }
        };
        let Some(event) = event else { break };

        if json_mode {
            println!("{}", serde_json::to_string(&event)?);
            if let StreamEvent::Error { message } = &event {
                failure = Some(message.clone());
            }
            continue;
        }

        match event {
            StreamEvent::Start { stream_id } => {
                tracing::debug!(%stream_id, "stream started");
            }
            StreamEvent::Chunk(chunk) => match chunk.kind {
                ChunkKind::Partial => {
                    streamed_partials = true;
                    print!("{}", chunk.content);
                    std::io::stdout().flush()?;
                }
                // The final chunk repeats the partials as one aggregate.
                ChunkKind::Final if !streamed_partials => print!("{}", chunk.content),
                ChunkKind::Final => {}
                ChunkKind::Progress => eprintln!("{}", style(chunk.content).dim()),
            },
            StreamEvent::Complete { result, cancelled } => {
                println!();
                if cancelled {
                    eprintln!("{}", style("cancelled").yellow());
                } else if let Some(result) = result {
                    if let Some(message) = &result.error_message {
                        eprintln!("{} {message}", style("error:").red().bold());
                    }
                    eprintln!("{}", summary(&result));
                }
            }
            StreamEvent::Error { message } => {
                println!();
                failure = Some(message);
            }
        }
    }

    match failure {
        Some(message) => Err(anyhow!("stream failed: {message}")),
        None => Ok(()),
    }
}

/// Run `invoke`, aggregated or streamed.
pub async fn execute(args: InvokeArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    let runtime = ctx.runtime()?;
    let invocation = args.to_invocation()?;

    if args.stream {
        return stream(&runtime, invocation, json_mode).await;
    }

    let result = runtime.invoke(invocation).await?;
    output(&InvokeOutput { result }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("x-trace-id = abc").unwrap(),
            ("x-trace-id".to_string(), "abc".to_string())
        );
        assert_eq!(
            parse_header("authorization=Bearer a=b").unwrap().1,
            "Bearer a=b"
        );
        assert!(parse_header("novalue").is_err());
        assert!(parse_header("=x").is_err());
    }

    #[test]
    fn test_to_invocation() {
        let args = InvokeArgs {
            slug: "weather".into(),
            message: "forecast?".into(),
            org: Some("acme".into()),
            mode: TaskMode::Plan,
            payload: Some(r#"{"city": "Oslo"}"#.into()),
            content_type: Some(ContentType::Json),
            headers: vec![("x-trace-id".into(), "t1".into())],
            provider: None,
            model: Some("small".into()),
            local: true,
            session: Some("s1".into()),
            conversation: None,
            user: None,
            stream: false,
        };

        let inv = args.to_invocation().unwrap();
        assert_eq!(inv.organization.as_deref(), Some("acme"));
        assert_eq!(inv.mode, TaskMode::Plan);
        assert_eq!(inv.payload.unwrap()["city"], "Oslo");
        assert_eq!(inv.headers["x-trace-id"], "t1");
        assert!(inv.routing.is_local);
        assert_eq!(inv.routing.model.as_deref(), Some("small"));
        assert_eq!(inv.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_invalid_payload_rejected() {
        let args = InvokeArgs {
            slug: "weather".into(),
            message: "hi".into(),
            org: None,
            mode: TaskMode::Converse,
            payload: Some("{not json".into()),
            content_type: None,
            headers: vec![],
            provider: None,
            model: None,
            local: false,
            session: None,
            conversation: None,
            user: None,
            stream: false,
        };
        assert!(args.to_invocation().is_err());
    }
}
