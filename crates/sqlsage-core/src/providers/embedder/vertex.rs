use super::Embedder;
use crate::providers::{google_error_message, GcpSettings};
use async_trait::async_trait;
use serde_json::json;

pub const DEFAULT_EMBEDDING_MODEL: &str = "textembedding-gecko@002";

pub struct VertexEmbedder {
    pub model: String,
    gcp: GcpSettings,
    base_url: String,
    client: reqwest::Client,
}

impl VertexEmbedder {
    pub fn new(model: String, gcp: GcpSettings) -> Self {
        let base_url = gcp.vertex_models_url();
        Self {
            model,
            gcp,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn predict(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = format!("{}/{}:predict", self.base_url, self.model);
        let instances: Vec<_> = texts.iter().map(|t| json!({ "content": t })).collect();
        let body = json!({ "instances": instances });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.gcp.access_token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "Vertex AI embeddings error ({}): {}",
                status,
                google_error_message(&error_text)
            );
        }

        let json: serde_json::Value = resp.json().await?;
        parse_predictions(&json, texts.len())
    }
}

fn parse_predictions(json: &serde_json::Value, expected: usize) -> anyhow::Result<Vec<Vec<f32>>> {
    let predictions = json
        .get("predictions")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Vertex AI embeddings response missing predictions"))?;
    if predictions.len() != expected {
        anyhow::bail!(
            "Vertex AI returned {} embeddings for {} inputs",
            predictions.len(),
            expected
        );
    }

    predictions
        .iter()
        .map(|p| {
            let values = p
                .pointer("/embeddings/values")
                .and_then(|v| v.as_array())
                .ok_or_else(|| anyhow::anyhow!("embedding prediction missing values"))?;
            values
                .iter()
                .map(|x| {
                    x.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| anyhow::anyhow!("embedding value is not a number"))
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl Embedder for VertexEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut v = self.predict(&[text]).await?;
        v.pop()
            .ok_or_else(|| anyhow::anyhow!("Vertex AI returned no embedding"))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
