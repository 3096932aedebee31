use super::{ChatSession, LlmClient};
use crate::model::{LlmResponse, SamplingConfig};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

enum Reply {
    Text(String),
    Fail(String),
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<Reply>,
    fallback: Option<String>,
    prompts: Vec<String>,
    samplings: Vec<SamplingConfig>,
    chat_contexts: Vec<String>,
}

/// Scripted client for tests and offline runs.
///
/// Completions and chat turns draw from one shared script, in call order.
/// When the script runs dry the fallback answers; without a fallback the call
/// fails.
#[derive(Clone)]
pub struct FakeClient {
    model: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut st = self.lock();
            st.script
                .extend(responses.into_iter().map(|s| Reply::Text(s.into())));
        }
        self
    }

    /// Queues a failing call after whatever is already scripted.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.lock().script.push_back(Reply::Fail(message.into()));
        self
    }

    pub fn with_fallback(self, text: impl Into<String>) -> Self {
        self.lock().fallback = Some(text.into());
        self
    }

    /// Every prompt seen, completions and chat turns alike.
    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    pub fn samplings(&self) -> Vec<SamplingConfig> {
        self.lock().samplings.clone()
    }

    pub fn sessions_started(&self) -> usize {
        self.lock().chat_contexts.len()
    }

    pub fn chat_contexts(&self) -> Vec<String> {
        self.lock().chat_contexts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, prompt: &str) -> anyhow::Result<String> {
        let mut st = self.lock();
        st.prompts.push(prompt.to_string());
        match st.script.pop_front() {
            Some(Reply::Text(t)) => Ok(t),
            Some(Reply::Fail(msg)) => anyhow::bail!("fake provider error: {}", msg),
            None => st
                .fallback
                .clone()
                .ok_or_else(|| anyhow::anyhow!("fake provider: script exhausted")),
        }
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> anyhow::Result<LlmResponse> {
        self.lock().samplings.push(*sampling);
        let text = self.next_reply(prompt)?;
        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: self.model.clone(),
            meta: json!({}),
        })
    }

    async fn start_chat(&self, context: &str) -> anyhow::Result<Box<dyn ChatSession>> {
        self.lock().chat_contexts.push(context.to_string());
        Ok(Box::new(FakeChatSession {
            client: self.clone(),
            history: Vec::new(),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

pub struct FakeChatSession {
    client: FakeClient,
    history: Vec<(String, String)>,
}

#[async_trait]
impl ChatSession for FakeChatSession {
    async fn send(&mut self, prompt: &str) -> anyhow::Result<String> {
        let reply = self.client.next_reply(prompt)?;
        self.history.push((prompt.to_string(), reply.clone()));
        Ok(reply)
    }

    fn turns(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_then_fallback_then_exhausted() -> anyhow::Result<()> {
        let c = FakeClient::new("gemini-1.0-pro").with_responses(["a", "b"]);
        let s = SamplingConfig::default();
        assert_eq!(c.complete("p1", &s).await?.text, "a");
        assert_eq!(c.complete("p2", &s).await?.text, "b");
        assert!(c.complete("p3", &s).await.is_err());
        assert_eq!(c.prompts(), vec!["p1", "p2", "p3"]);

        let c = c.with_fallback("z");
        assert_eq!(c.complete("p4", &s).await?.text, "z");
        Ok(())
    }

    #[tokio::test]
    async fn chat_shares_script_and_counts_turns() -> anyhow::Result<()> {
        let c = FakeClient::new("gemini-1.0-pro")
            .with_responses(["SELECT 2"])
            .with_failure("quota");
        let mut session = c.start_chat("you fix SQL").await?;
        assert_eq!(session.send("fix SELECT 1").await?, "SELECT 2");
        assert_eq!(session.turns(), 1);
        let err = session.send("again").await.unwrap_err();
        assert!(err.to_string().contains("quota"));
        assert_eq!(session.turns(), 1);
        assert_eq!(c.sessions_started(), 1);
        Ok(())
    }
}
