//! Request templating and response extraction for HTTP and JSON-RPC agents.

use regex::{Captures, Regex};
use serde_json::{json, Value};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, TransportError};
use crate::domain::models::{DispatchRequest, FieldPath, ResponseTransform};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder pattern")
});

/// Rendered body of an API request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Parsed JSON body.
    Json(Value),
    /// Plain text body.
    Text(String),
}

impl RequestBody {
    /// `content-type` header value for the body.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => "application/json",
            Self::Text(_) => "text/plain; charset=utf-8",
        }
    }

    /// Serialized body.
    pub fn into_string(self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text,
        }
    }
}

/// Value substituted for a template variable. Unknown names render empty.
fn variable(request: &DispatchRequest, name: &str) -> String {
    let value = match name {
        "userMessage" => Some(request.user_message.as_str()),
        "systemPrompt" => request.system_prompt.as_deref(),
        "sessionId" => request.session_id.as_deref(),
        "conversationId" => request.conversation_id.as_deref(),
        "agentSlug" => Some(request.agent.slug.as_str()),
        "organizationSlug" => request.organization_slug.as_deref(),
        "userId" => request.user_id.as_deref(),
        "mode" => Some(request.mode.as_str()),
        _ => None,
    };
    value.unwrap_or_default().to_string()
}

/// Escape `s` for embedding inside a JSON string literal.
fn json_escape(s: &str) -> String {
    let quoted = Value::String(s.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

fn is_json_shaped(template: &str) -> bool {
    let trimmed = template.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Substitute `{{placeholder}}` names from `request`; unknown names render empty.
/// JSON-escape values when `escape_json` is set.
pub fn render_template(template: &str, request: &DispatchRequest, escape_json: bool) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let value = variable(request, &caps[1]);
            if escape_json {
                json_escape(&value)
            } else {
                value
            }
        })
        .into_owned()
}

/// Build the API request body from the agent's template, or `{"prompt": ...}`.
pub fn render_request_body(
    template: Option<&str>,
    request: &DispatchRequest,
) -> DomainResult<RequestBody> {
    let Some(template) = template.filter(|t| !t.trim().is_empty()) else {
        return Ok(RequestBody::Json(json!({ "prompt": request.user_message })));
    };

    if !is_json_shaped(template) {
        return Ok(RequestBody::Text(render_template(template, request, false)));
    }

    let rendered = render_template(template, request, true);
    serde_json::from_str(&rendered)
        .map(RequestBody::Json)
        .map_err(|e| {
            DomainError::Configuration(format!(
                "request template for agent '{}' does not render valid JSON: {e}",
                request.agent.slug
            ))
        })
}

fn value_to_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Look up the transform field on the root, then under `result`.
fn extract_field<'a>(body: &'a Value, transform: Option<&ResponseTransform>) -> Option<&'a Value> {
    let raw = transform?.field.as_deref()?;
    let path = FieldPath::parse(raw).ok()?;
    path.get(body)
        .or_else(|| body.get("result").and_then(|result| path.get(result)))
}

/// Content of an API response body.
pub fn extract_api_content(body: &str, transform: Option<&ResponseTransform>) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => extract_field(&json, transform)
            .map(value_to_content)
            .unwrap_or_else(|| value_to_content(&json)),
        Err(_) => body.to_string(),
    }
}

/// JSON-RPC 2.0 envelope for a remote agent call. The method is the task mode.
pub fn build_rpc_request(request: &DispatchRequest) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": Uuid::new_v4().to_string(),
        "method": request.mode.as_str(),
        "params": {
            "mode": request.mode.as_str(),
            "agentSlug": request.agent.slug,
            "organizationSlug": request.organization_slug,
            "conversationId": request.conversation_id,
            "sessionId": request.session_id,
            "userId": request.user_id,
            "systemPrompt": request.system_prompt,
            "userMessage": request.user_message,
            "payload": request.raw_payload,
        }
    })
}

/// Parse a JSON-RPC response. An `error` envelope becomes `TransportError::Rpc`;
/// a non-JSON body is returned as a JSON string.
pub fn parse_rpc_response(body: &str) -> Result<Value, TransportError> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Ok(Value::String(body.to_string()));
    };

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32603);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(TransportError::Rpc { code, message });
    }
    Ok(value)
}

/// Content of a successful JSON-RPC response.
pub fn extract_external_content(response: &Value, transform: Option<&ResponseTransform>) -> String {
    if let Some(field) = extract_field(response, transform) {
        return value_to_content(field);
    }
    match response.get("result") {
        Some(Value::String(s)) => s.clone(),
        Some(result) => match result.get("content") {
            Some(Value::String(content)) => content.clone(),
            _ => result.to_string(),
        },
        None => value_to_content(response),
    }
}
