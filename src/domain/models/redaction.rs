//! Redaction rule model.

use serde::{Deserialize, Serialize};

/// Organization-scoped redaction rule, applied in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionRule {
    /// Organization the rule applies to.
    pub organization_scope: String,
    /// Regular expression to match.
    pub pattern: String,
    /// Regex flags: `i`, `m`, `s`, `x`. Others are ignored.
    #[serde(default)]
    pub flags: String,
    /// Replacement text, `[REDACTED]` by default.
    #[serde(default = "default_replacement")]
    pub replacement: String,
}

fn default_replacement() -> String {
    "[REDACTED]".to_string()
}

impl RedactionRule {
    /// Rule with no flags and the default replacement.
    pub fn new(organization_scope: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            organization_scope: organization_scope.into(),
            pattern: pattern.into(),
            flags: String::new(),
            replacement: default_replacement(),
        }
    }

    /// Set the regex flags.
    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = flags.into();
        self
    }

    /// Set the replacement text.
    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = replacement.into();
        self
    }
}

/// Context a redaction pass runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionContext<'a> {
    /// Local routes skip organization rules.
    pub is_local: bool,
    /// Organization whose rules apply.
    pub organization_scope: Option<&'a str>,
}
