use crate::errors::ConfigError;
use async_trait::async_trait;

pub mod cached;
pub mod fake;
pub mod vertex;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    fn model_id(&self) -> &str;
}

/// Backend selector for the embedder. Only Vertex AI is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderMode {
    Vertex,
}

impl EmbedderMode {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim() {
            "vertex" => Ok(EmbedderMode::Vertex),
            other => Err(ConfigError(format!(
                "unsupported embedder mode '{}' (supported: vertex)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_vertex_mode_is_accepted() {
        assert_eq!(EmbedderMode::parse("vertex").unwrap(), EmbedderMode::Vertex);
        let err = EmbedderMode::parse("openai").unwrap_err();
        assert!(err.to_string().starts_with("config error: unsupported embedder mode"));
    }
}
