//! Argument parsing for the `agentry` binary.

use clap::Parser;

use agentry::cli::commands::agent::AgentCommands;
use agentry::cli::commands::approval::ApprovalCommands;
use agentry::cli::{Cli, Commands};
use agentry::domain::models::{ContentType, TaskMode};

fn parse(args: &[&str]) -> Cli {
    temp_env::with_var_unset("AGENTRY_CONFIG", || {
        Cli::try_parse_from(args).expect("arguments should parse")
    })
}

#[test]
fn test_agent_promote_flags() {
    let cli = parse(&[
        "agentry",
        "agent",
        "promote",
        "weather",
        "--org",
        "acme",
        "--require-approval",
        "false",
        "--skip-validation",
        "--requested-by",
        "dev",
    ]);

    let Commands::Agent(args) = cli.command else {
        panic!("expected agent command");
    };
    match args.command {
        AgentCommands::Promote {
            agent,
            org,
            skip_validation,
            require_approval,
            requested_by,
        } => {
            assert_eq!(agent, "weather");
            assert_eq!(org.as_deref(), Some("acme"));
            assert!(skip_validation);
            assert_eq!(require_approval, Some(false));
            assert_eq!(requested_by.as_deref(), Some("dev"));
        }
        other => panic!("unexpected subcommand {other:?}"),
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&["agentry", "agent", "list", "--json", "-c", "custom.yaml"]);
    assert!(cli.json);
    assert_eq!(
        cli.config.as_deref(),
        Some(std::path::Path::new("custom.yaml"))
    );
}

#[test]
fn test_invoke_arguments() {
    let cli = parse(&[
        "agentry",
        "invoke",
        "planner",
        "draft a plan",
        "--mode",
        "plan",
        "--content-type",
        "markdown",
        "-H",
        "x-trace-id=abc",
        "-H",
        "Authorization=Bearer t",
        "--stream",
        "--local",
    ]);

    let Commands::Invoke(args) = cli.command else {
        panic!("expected invoke command");
    };
    assert_eq!(args.slug, "planner");
    assert_eq!(args.message, "draft a plan");
    assert_eq!(args.mode, TaskMode::Plan);
    assert_eq!(args.content_type, Some(ContentType::Markdown));
    assert_eq!(
        args.headers,
        vec![
            ("x-trace-id".to_string(), "abc".to_string()),
            ("Authorization".to_string(), "Bearer t".to_string()),
        ]
    );
    assert!(args.stream);
    assert!(args.local);
}

#[test]
fn test_invoke_defaults_to_converse() {
    let cli = parse(&["agentry", "invoke", "helper", "hi"]);
    let Commands::Invoke(args) = cli.command else {
        panic!("expected invoke command");
    };
    assert_eq!(args.mode, TaskMode::Converse);
    assert!(!args.stream);
    assert!(args.headers.is_empty());
}

#[test]
fn test_approval_approve_and_complete() {
    let id = uuid::Uuid::new_v4();
    let id_arg = id.to_string();
    let cli = parse(&[
        "agentry", "approval", "approve", &id_arg, "--by", "ops", "--complete",
    ]);

    let Commands::Approval(args) = cli.command else {
        panic!("expected approval command");
    };
    match args.command {
        ApprovalCommands::Approve {
            approval_id,
            by,
            complete,
        } => {
            assert_eq!(approval_id, id);
            assert_eq!(by.as_deref(), Some("ops"));
            assert!(complete);
        }
        other => panic!("unexpected subcommand {other:?}"),
    }
}

#[test]
fn test_metrics_defaults() {
    let cli = parse(&["agentry", "metrics", "weather", "planner"]);
    let Commands::Metrics(args) = cli.command else {
        panic!("expected metrics command");
    };
    assert_eq!(args.slugs, vec!["weather", "planner"]);
    assert_eq!(args.runs, 3);
    assert_eq!(args.message, "ping");
}

#[test]
fn test_rejects_invalid_input() {
    temp_env::with_var_unset("AGENTRY_CONFIG", || {
        assert!(Cli::try_parse_from(["agentry", "invoke", "a", "b", "--mode", "chat"]).is_err());
        assert!(Cli::try_parse_from(["agentry", "invoke", "a", "b", "-H", "no-equals"]).is_err());
        assert!(Cli::try_parse_from(["agentry", "approval", "show", "not-a-uuid"]).is_err());
        assert!(Cli::try_parse_from(["agentry", "metrics"]).is_err());
    });
}
