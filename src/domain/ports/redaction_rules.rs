//! Source of organization redaction rules.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RedactionRule;

/// Source of organization-specific redaction rules.
#[async_trait]
pub trait RedactionRuleSource: Send + Sync {
    /// Rules for `org` in registration order.
    async fn rules_for(&self, org: &str) -> DomainResult<Vec<RedactionRule>>;
}
