use crate::errors::CallTimeout;
use std::fmt;
use std::future::Future;
use std::time::Duration;

pub mod embedder;
pub mod llm;
pub mod warehouse;

/// Where and as whom the Google Cloud calls are made.
#[derive(Clone)]
pub struct GcpSettings {
    pub project_id: String,
    pub region: String,
    /// OAuth2 bearer token. Obtaining it is the caller's business.
    pub access_token: String,
}

impl GcpSettings {
    pub fn new(
        project_id: impl Into<String>,
        region: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            region: region.into(),
            access_token: access_token.into(),
        }
    }

    /// Base URL for publisher models on Vertex AI in this project/region.
    pub fn vertex_models_url(&self) -> String {
        format!(
            "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models",
            region = self.region,
            project = self.project_id
        )
    }
}

impl fmt::Debug for GcpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpSettings")
            .field("project_id", &self.project_id)
            .field("region", &self.region)
            .field("access_token", &"***")
            .finish()
    }
}

/// Pulls the most useful message out of a Google API error body.
pub(crate) fn google_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Runs one external call under the caller's timeout policy, if any.
pub async fn with_timeout<T, F>(limit: Option<Duration>, call: &'static str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let Some(limit) = limit else {
        return fut.await;
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => {
            tracing::warn!(event = "call_timeout", call = call, timeout_ms = limit.as_millis() as u64);
            Err(CallTimeout { call, after: limit }.into())
        }
    }
}
