//! Content type reconciliation between callers and agents.
//!
//! JSON payloads are rendered into text for textual agents. Free text is
//! parsed into structure for structured agents, trying a fenced JSON block,
//! then YAML, then CSV.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

use crate::domain::models::{AgentDefinition, ContentType, DispatchRequest, TaskMode};

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)```").expect("valid fenced JSON pattern")
});

static YAML_MAPPING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*["']?[\w\- ]+["']?:(\s+\S|\s*$)"#).expect("valid YAML mapping pattern")
});

/// Outcome of a normalization pass.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    /// False only when a strict agent received content that could not be adapted.
    pub ok: bool,
    /// Whether the agent declared strict input.
    pub strict: bool,
    /// Request to dispatch, possibly rewritten.
    pub request: DispatchRequest,
    /// Declared input type that was enforced, if any.
    pub expected: Option<ContentType>,
    /// Type detected on the incoming request.
    pub provided: Option<ContentType>,
    /// Name of the adapter that rewrote the request.
    pub adapter: Option<&'static str>,
}

/// Reconciles request content with an agent's declared input type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentNormalizer;

impl ContentNormalizer {
    /// Stateless normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Type the request carries: explicit hint, then free text, then payload.
    pub fn detect_provided(request: &DispatchRequest) -> Option<ContentType> {
        if let Some(hint) = request.content_type_hint {
            return Some(hint);
        }
        if !request.user_message.trim().is_empty() {
            return Some(ContentType::Markdown);
        }
        if request.has_payload() {
            return Some(ContentType::Json);
        }
        None
    }

    /// Adapt `request` to the input type `definition` expects in the request's mode.
    ///
    /// Textual agents receive JSON payloads rendered as text. Structured agents
    /// receive text parsed into a payload under `normalized`, or a JSON payload
    /// as is. Content that cannot be adapted sets `ok` to false for strict agents
    /// and passes through untouched otherwise.
    pub fn normalize(
        &self,
        definition: &AgentDefinition,
        request: DispatchRequest,
        mode: TaskMode,
    ) -> NormalizedRequest {
        let strict = definition.io.strict;
        let expected = definition.io.expected_input(mode);
        let provided = Self::detect_provided(&request);

        let pass = |request, adapter| NormalizedRequest {
            ok: true,
            strict,
            request,
            expected,
            provided,
            adapter,
        };

        let (Some(expected), Some(provided)) = (expected, provided) else {
            return pass(request, None);
        };
        if expected.same_family(provided) {
            return pass(request, None);
        }

        if expected.is_textual() {
            // YAML and CSV arrive as text already.
            if provided != ContentType::Json {
                return pass(request, None);
            }
            return match json_to_text(definition, request) {
                Ok(adapted) => pass(adapted, Some("json_to_text")),
                Err(original) => self.unadapted(strict, original, Some(expected), Some(provided)),
            };
        }

        match parse_as(provided, &request.user_message) {
            Some((adapter, parsed)) => {
                debug!(agent = %definition.slug, adapter, "Normalized text input into structure");
                let mut adapted = request;
                attach_normalized(&mut adapted.raw_payload, parsed);
                adapted.content_type_hint = Some(ContentType::Json);
                pass(adapted, Some(adapter))
            }
            // A JSON payload is the parsed form of every structured type.
            None if provided == ContentType::Json && request.has_payload() => pass(request, None),
            None => self.unadapted(strict, request, Some(expected), Some(provided)),
        }
    }

    fn unadapted(
        &self,
        strict: bool,
        request: DispatchRequest,
        expected: Option<ContentType>,
        provided: Option<ContentType>,
    ) -> NormalizedRequest {
        NormalizedRequest {
            ok: !strict,
            strict,
            request,
            expected,
            provided,
            adapter: None,
        }
    }
}

/// Render the JSON payload into the user message.
fn json_to_text(
    definition: &AgentDefinition,
    mut request: DispatchRequest,
) -> Result<DispatchRequest, DispatchRequest> {
    if !request.has_payload() {
        return Err(request);
    }
    let pretty = match serde_json::to_string_pretty(&request.raw_payload) {
        Ok(pretty) => pretty,
        Err(_) => return Err(request),
    };

    request.user_message = match &definition.io.json_template {
        Some(template) => template
            .replace("{{message}}", &request.user_message)
            .replace("{{payload}}", &pretty),
        None => render_fenced_json(&request.user_message, &pretty),
    };
    request.content_type_hint = Some(ContentType::Markdown);
    Ok(request)
}

/// Append `pretty_json` to `message` as a fenced `json` block.
pub fn render_fenced_json(message: &str, pretty_json: &str) -> String {
    let block = format!("```json\n{pretty_json}\n```");
    if message.trim().is_empty() {
        block
    } else {
        format!("{message}\n\n{block}")
    }
}

/// Parse free text into structure. First adapter to succeed wins.
pub fn text_to_structured(text: &str) -> Option<(&'static str, Value)> {
    extract_fenced_json(text)
        .map(|v| ("fenced_json", v))
        .or_else(|| parse_yaml(text).map(|v| ("yaml", v)))
        .or_else(|| parse_csv(text).map(|v| ("csv", v)))
}

/// Parse with the parser for the declared type first, then the usual order.
fn parse_as(provided: ContentType, text: &str) -> Option<(&'static str, Value)> {
    let hinted = match provided {
        ContentType::Csv => parse_csv(text).map(|v| ("csv", v)),
        ContentType::Yaml => parse_yaml(text).map(|v| ("yaml", v)),
        _ => None,
    };
    hinted.or_else(|| text_to_structured(text))
}

/// First fenced `json` block in `text` that parses.
pub fn extract_fenced_json(text: &str) -> Option<Value> {
    FENCED_JSON
        .captures_iter(text)
        .find_map(|caps| serde_json::from_str(caps.get(1)?.as_str().trim()).ok())
}

/// Parse text that looks like a YAML mapping or sequence.
pub fn parse_yaml(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let looks_like_yaml = trimmed.starts_with("- ") || YAML_MAPPING_LINE.is_match(trimmed);
    if !looks_like_yaml {
        return None;
    }
    let value: serde_yaml::Value = serde_yaml::from_str(trimmed).ok()?;
    let json = serde_json::to_value(value).ok()?;
    matches!(json, Value::Object(_) | Value::Array(_)).then_some(json)
}

/// Comma-delimited, quote-aware, header row plus at least one data row.
pub fn parse_csv(text: &str) -> Option<Value> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 2 {
        return None;
    }

    let header = split_csv_line(lines[0])?;
    if header.len() < 2 || header.iter().any(String::is_empty) {
        return None;
    }

    let mut rows = Vec::with_capacity(lines.len() - 1);
    for line in &lines[1..] {
        let fields = split_csv_line(line)?;
        if fields.len() != header.len() {
            return None;
        }
        let row: Map<String, Value> = header
            .iter()
            .cloned()
            .zip(fields.into_iter().map(Value::String))
            .collect();
        rows.push(Value::Object(row));
    }
    Some(Value::Array(rows))
}

fn split_csv_line(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field).trim().to_string()),
            c => field.push(c),
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(field.trim().to_string());
    Some(fields)
}

fn attach_normalized(payload: &mut Value, parsed: Value) {
    match payload {
        Value::Object(map) => {
            map.insert("normalized".to_string(), parsed);
        }
        Value::Null => {
            let mut map = Map::new();
            map.insert("normalized".to_string(), parsed);
            *payload = Value::Object(map);
        }
        _ => {
            let mut map = Map::new();
            map.insert("value".to_string(), payload.take());
            map.insert("normalized".to_string(), parsed);
            *payload = Value::Object(map);
        }
    }
}
