//! In-memory redaction rule source.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RedactionRule;
use crate::domain::ports::RedactionRuleSource;

/// Fixed rule set, filtered by organization on lookup.
#[derive(Debug, Clone, Default)]
pub struct StaticRedactionRules {
    rules: Vec<RedactionRule>,
}

impl StaticRedactionRules {
    /// Source serving `rules`.
    pub fn new(rules: Vec<RedactionRule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl RedactionRuleSource for StaticRedactionRules {
    async fn rules_for(&self, org: &str) -> DomainResult<Vec<RedactionRule>> {
        Ok(self
            .rules
            .iter()
            .filter(|rule| rule.organization_scope == org)
            .cloned()
            .collect())
    }
}
