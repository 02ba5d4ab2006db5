//! Built-in validation and policy services.
//!
//! The validator performs structural checks on the serialized agent record.
//! Deployments with real schema or policy engines plug them in through the
//! same ports.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FieldPath, TransportKind};
use crate::domain::ports::{PolicyService, ValidationOutcome, ValidationService};

/// Structural checks on an agent's validation payload.
#[derive(Debug, Clone, Default)]
pub struct DescriptorValidator;

impl DescriptorValidator {
    /// Stateless validator.
    pub fn new() -> Self {
        Self
    }

    fn check_identity(payload: &Value, issues: &mut Vec<String>) {
        match payload.get("slug").and_then(Value::as_str) {
            Some(slug) if is_valid_slug(slug) => {}
            Some(slug) => issues.push(format!(
                "slug '{slug}' must be lowercase letters, digits, '-' or '_'"
            )),
            None => issues.push("slug is required".to_string()),
        }
        if payload
            .get("name")
            .and_then(Value::as_str)
            .is_none_or(|name| name.trim().is_empty())
        {
            issues.push("name is required".to_string());
        }
    }

    fn check_endpoint(descriptor: &Value, issues: &mut Vec<String>) {
        let url = descriptor
            .get("endpoint")
            .and_then(|e| e.get("url"))
            .and_then(Value::as_str)
            .map(str::trim);
        match url {
            None | Some("") => issues.push("endpoint.url is required".to_string()),
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                issues.push(format!("endpoint.url '{url}' must be an http(s) URL"));
            }
            Some(_) => {}
        }
    }

    fn check_redaction(descriptor: &Value, issues: &mut Vec<String>) {
        let paths = descriptor
            .get("redaction")
            .and_then(|r| r.get("fieldPaths"))
            .and_then(Value::as_array);
        for path in paths.into_iter().flatten() {
            let raw = path.as_str().unwrap_or_default();
            if FieldPath::parse(raw).is_err() {
                issues.push(format!("redaction field path '{raw}' is invalid"));
            }
        }
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

#[async_trait]
impl ValidationService for DescriptorValidator {
    async fn validate(&self, agent_type: &str, payload: &Value) -> DomainResult<ValidationOutcome> {
        let mut issues = Vec::new();
        Self::check_identity(payload, &mut issues);

        let descriptor = payload.get("descriptor").cloned().unwrap_or(Value::Null);
        if TransportKind::for_agent_type(agent_type) != TransportKind::Llm {
            Self::check_endpoint(&descriptor, &mut issues);
        }
        Self::check_redaction(&descriptor, &mut issues);

        Ok(if issues.is_empty() {
            ValidationOutcome::valid()
        } else {
            ValidationOutcome::invalid(issues)
        })
    }
}

/// Policy service that approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

#[async_trait]
impl PolicyService for AllowAllPolicy {
    async fn check_policy(&self, _payload: &Value) -> DomainResult<Vec<String>> {
        Ok(Vec::new())
    }
}
