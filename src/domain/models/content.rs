//! Declared content types and their families.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Content types an agent can declare for its input and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON document.
    Json,
    /// Markdown text.
    Markdown,
    /// Plain text.
    Text,
    /// YAML document.
    Yaml,
    /// Comma-separated rows with a header line.
    Csv,
}

impl ContentType {
    /// Short name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Yaml => "yaml",
            Self::Csv => "csv",
        }
    }

    /// Accepts short names and the common MIME spellings.
    pub fn parse_str(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let s = s.split(';').next().unwrap_or_default().trim();
        match s {
            "json" | "application/json" => Some(Self::Json),
            "markdown" | "md" | "text/markdown" => Some(Self::Markdown),
            "text" | "plain" | "text/plain" => Some(Self::Text),
            "yaml" | "yml" | "application/yaml" | "application/x-yaml" | "text/yaml" => {
                Some(Self::Yaml)
            }
            "csv" | "text/csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Markdown and plain text are interchangeable.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Markdown | Self::Text)
    }

    /// Structured types that parse into a JSON value.
    pub fn is_structured(&self) -> bool {
        !self.is_textual()
    }

    /// Whether `other` can be passed through without adaptation.
    pub fn same_family(&self, other: Self) -> bool {
        *self == other || (self.is_textual() && other.is_textual())
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| anyhow::anyhow!("Unknown content type: {s}"))
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown content type '{s}'")))
    }
}
