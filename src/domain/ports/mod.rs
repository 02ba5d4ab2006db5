//! Port traits for the runtime's external collaborators.

pub mod agent_store;
pub mod approval_store;
pub mod generation;
pub mod http_client;
pub mod redaction_rules;
pub mod validation;

pub use agent_store::{merge_metadata, AgentStore};
pub use approval_store::ApprovalStore;
pub use generation::{GenerationOutput, GenerationParams, GenerationService};
pub use http_client::{HttpClient, HttpRequest, HttpResponse};
pub use redaction_rules::RedactionRuleSource;
pub use validation::{PolicyService, ValidationOutcome, ValidationService};
