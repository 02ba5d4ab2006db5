//! In-memory port implementations.

pub mod agent_store;
pub mod approval_store;
pub mod redaction_rules;

pub use agent_store::InMemoryAgentStore;
pub use approval_store::InMemoryApprovalStore;
pub use redaction_rules::StaticRedactionRules;
