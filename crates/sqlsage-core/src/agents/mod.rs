//! Prompt-driven stages of the pipeline. Each agent wraps one
//! [`LlmClient`](crate::providers::llm::LlmClient) and owns its prompt.

pub mod builder;
pub mod debugger;
pub mod responder;
pub mod validator;

pub use builder::SqlBuilder;
pub use debugger::{RepairContext, RepairOutcome, RepairPolicy, RepairState, SqlDebugger};
pub use responder::SqlResponder;
pub use validator::SqlValidator;

/// Placeholder used in prompts when example retrieval is off.
pub const NO_EXAMPLES: &str = "-No examples provided..-";
