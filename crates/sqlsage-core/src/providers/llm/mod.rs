use crate::model::{LlmResponse, SamplingConfig};
use async_trait::async_trait;

pub mod family;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One stateless completion.
    async fn complete(&self, prompt: &str, sampling: &SamplingConfig)
        -> anyhow::Result<LlmResponse>;

    /// Opens a multi-turn session primed with `context`.
    async fn start_chat(&self, context: &str) -> anyhow::Result<Box<dyn ChatSession>>;

    fn provider_name(&self) -> &'static str;

    fn model_id(&self) -> &str;
}

/// A stateful conversation. Earlier turns stay visible to the model on every
/// `send`; how they are kept is up to the implementation.
#[async_trait]
pub trait ChatSession: Send {
    async fn send(&mut self, prompt: &str) -> anyhow::Result<String>;

    /// Completed user/model exchanges so far, including any priming turn.
    fn turns(&self) -> usize;
}

pub mod fake;
pub mod vertex;
