pub mod pipeline;

pub use pipeline::{AgentClients, Pipeline, PipelineSettings};
