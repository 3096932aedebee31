pub mod agents;
pub mod audit;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod model;
pub mod providers;
pub mod report;
pub mod retrieval;
pub mod sql;

pub use audit::AuditTrail;
pub use engine::{Pipeline, PipelineSettings};
pub use errors::{ConfigError, PipelineFailure};
