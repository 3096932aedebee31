use super::family::{AgentRole, Endpoint, ModelFamily};
use super::{ChatSession, LlmClient};
use crate::errors::ConfigError;
use crate::model::{LlmResponse, SamplingConfig};
use crate::providers::{google_error_message, GcpSettings};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

/// Vertex AI client for one model family.
#[derive(Clone)]
pub struct VertexClient {
    family: ModelFamily,
    gcp: GcpSettings,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: "user",
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }

    fn model(text: &str) -> Self {
        Self {
            role: "model",
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

impl GenerationConfig {
    fn from_sampling(s: &SamplingConfig) -> Option<Self> {
        if s.max_output_tokens.is_none()
            && s.temperature.is_none()
            && s.top_p.is_none()
            && s.top_k.is_none()
        {
            return None;
        }
        Some(Self {
            max_output_tokens: s.max_output_tokens,
            temperature: s.temperature,
            top_p: s.top_p,
            top_k: s.top_k,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    author: &'static str,
    content: String,
}

impl VertexClient {
    pub fn new(family: ModelFamily, gcp: GcpSettings) -> Self {
        let base_url = gcp.vertex_models_url();
        Self {
            family,
            gcp,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Resolves `model_id` for `role`, rejecting ids the role cannot use.
    pub fn for_role(role: AgentRole, model_id: &str, gcp: GcpSettings) -> Result<Self, ConfigError> {
        let family = ModelFamily::for_role(role, model_id)?;
        Ok(Self::new(family, gcp))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, self.family.vertex_model(), method)
    }

    async fn post(&self, method: &str, body: &Value) -> anyhow::Result<Value> {
        let url = self.url(method);
        tracing::debug!(event = "vertex_request", model = %self.family, method = %method);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.gcp.access_token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "Vertex AI {} error ({}): {}",
                method,
                status,
                google_error_message(&error_text)
            );
        }

        Ok(resp.json().await?)
    }

    fn generate_content_body(contents: &[Content], sampling: &SamplingConfig) -> anyhow::Result<Value> {
        let req = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig::from_sampling(sampling),
        };
        Ok(serde_json::to_value(req)?)
    }

    fn predict_body(&self, prompt: &str, sampling: &SamplingConfig) -> Value {
        let instance = match self.family {
            ModelFamily::CodeBison32k => json!({ "prefix": prompt }),
            _ => json!({ "prompt": prompt }),
        };
        json!({
            "instances": [instance],
            "parameters": predict_parameters(sampling),
        })
    }

    fn codechat_body(context: &str, messages: &[ChatMessage]) -> Value {
        json!({
            "instances": [{ "context": context, "messages": messages }],
            "parameters": {},
        })
    }

    async fn generate(&self, contents: &[Content], sampling: &SamplingConfig) -> anyhow::Result<String> {
        let body = Self::generate_content_body(contents, sampling)?;
        let json = self.post("generateContent", &body).await?;
        candidate_text(&json)
    }
}

fn predict_parameters(s: &SamplingConfig) -> Value {
    let mut params = serde_json::Map::new();
    if let Some(t) = s.temperature {
        params.insert("temperature".into(), json!(t));
    }
    if let Some(m) = s.max_output_tokens {
        params.insert("maxOutputTokens".into(), json!(m));
    }
    Value::Object(params)
}

/// Concatenates the text parts of the first Gemini candidate.
fn candidate_text(json: &Value) -> anyhow::Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Vertex AI response missing candidates"))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        let reason = json
            .pointer("/candidates/0/finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("unknown");
        anyhow::bail!("Vertex AI candidate has no text (finish reason: {})", reason);
    }
    Ok(text)
}

fn prediction_text(json: &Value, pointer: &str) -> anyhow::Result<String> {
    json.pointer(pointer)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("Vertex AI prediction missing content at {}", pointer))
}

#[async_trait]
impl LlmClient for VertexClient {
    async fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> anyhow::Result<LlmResponse> {
        let sampling = self.family.effective_sampling(sampling);

        let text = match self.family.endpoint() {
            Endpoint::GenerateContent => self.generate(&[Content::user(prompt)], &sampling).await?,
            Endpoint::Predict => {
                let body = self.predict_body(prompt, &sampling);
                let json = self.post("predict", &body).await?;
                prediction_text(&json, "/predictions/0/content")?
            }
        };

        Ok(LlmResponse {
            text,
            provider: "vertex".to_string(),
            model: self.family.vertex_model().to_string(),
            meta: json!({}),
        })
    }

    async fn start_chat(&self, context: &str) -> anyhow::Result<Box<dyn ChatSession>> {
        if !self.family.supports_chat() {
            return Err(ConfigError(format!("model '{}' does not support chat", self.family)).into());
        }

        match self.family.endpoint() {
            Endpoint::Predict => Ok(Box::new(CodechatSession {
                client: self.clone(),
                context: context.to_string(),
                messages: Vec::new(),
            })),
            Endpoint::GenerateContent => {
                // Gemini has no separate context slot; the context is the first turn.
                let mut session = GeminiSession {
                    client: self.clone(),
                    history: Vec::new(),
                };
                session.send(context).await?;
                Ok(Box::new(session))
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "vertex"
    }

    fn model_id(&self) -> &str {
        self.family.id()
    }
}

struct GeminiSession {
    client: VertexClient,
    history: Vec<Content>,
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send(&mut self, prompt: &str) -> anyhow::Result<String> {
        let mut contents = self.history.clone();
        contents.push(Content::user(prompt));
        let reply = self
            .client
            .generate(&contents, &SamplingConfig::model_defaults())
            .await?;
        // History only grows once the turn has a reply.
        contents.push(Content::model(&reply));
        self.history = contents;
        Ok(reply)
    }

    fn turns(&self) -> usize {
        self.history.len() / 2
    }
}

struct CodechatSession {
    client: VertexClient,
    context: String,
    messages: Vec<ChatMessage>,
}

#[async_trait]
impl ChatSession for CodechatSession {
    async fn send(&mut self, prompt: &str) -> anyhow::Result<String> {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage {
            author: "user",
            content: prompt.to_string(),
        });
        let body = VertexClient::codechat_body(&self.context, &messages);
        let json = self.client.post("predict", &body).await?;
        let reply = prediction_text(&json, "/predictions/0/candidates/0/content")?;
        messages.push(ChatMessage {
            author: "bot",
            content: reply.clone(),
        });
        self.messages = messages;
        Ok(reply)
    }

    fn turns(&self) -> usize {
        self.messages.len() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcp() -> GcpSettings {
        GcpSettings::new("proj", "us-central1", "token")
    }

    #[test]
    fn url_uses_vertex_model_name() {
        let c = VertexClient::new(ModelFamily::GeminiUltra, gcp());
        assert!(c
            .url("generateContent")
            .ends_with("/models/gemini-1.0-ultra-001:generateContent"));
    }

    #[test]
    fn for_role_rejects_unsupported_model() {
        let err = VertexClient::for_role(AgentRole::Responder, "code-bison-32k", gcp())
            .err()
            .unwrap();
        assert!(err.to_string().contains("cannot be used as responder"));
    }

    #[test]
    fn generate_body_omits_unset_knobs() {
        let body = VertexClient::generate_content_body(
            &[Content::user("hi")],
            &SamplingConfig::model_defaults(),
        )
        .unwrap();
        assert!(body.get("generationConfig").is_none());
        assert_eq!(body["contents"][0]["role"], "user");

        let body =
            VertexClient::generate_content_body(&[Content::user("hi")], &SamplingConfig::default())
                .unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(body["generationConfig"]["topK"], 32);
    }

    #[test]
    fn predict_body_only_carries_accepted_knobs() {
        let c = VertexClient::new(ModelFamily::CodeBison32k, gcp());
        let sampling = ModelFamily::CodeBison32k.effective_sampling(&SamplingConfig::default());
        let body = c.predict_body("write sql", &sampling);
        assert_eq!(body["instances"][0]["prefix"], "write sql");
        assert_eq!(body["parameters"]["maxOutputTokens"], 2048);
        assert!(body["parameters"].get("topK").is_none());
        assert!(body["parameters"].get("topP").is_none());
    }

    #[test]
    fn candidate_text_joins_parts() {
        let resp = json!({
            "candidates": [{ "content": { "parts": [{ "text": "SELECT " }, { "text": "1" }] } }]
        });
        assert_eq!(candidate_text(&resp).unwrap(), "SELECT 1");

        let blocked = json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }]
        });
        let err = candidate_text(&blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn chat_on_non_chat_family_is_config_error() {
        let c = VertexClient::new(ModelFamily::TextBison32k, gcp());
        let err = c.start_chat("ctx").await.err().unwrap();
        assert!(crate::errors::try_map_error(&err).is_some());
    }
}
