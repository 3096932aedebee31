use crate::model::{QueryResult, SamplingConfig};
use crate::providers::llm::LlmClient;
use std::sync::Arc;

/// Turns a result set into a short answer for the user. No retries.
pub struct SqlResponder {
    client: Arc<dyn LlmClient>,
}

impl SqlResponder {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub fn prompt(question: &str, result: &QueryResult) -> String {
        let rows = serde_json::to_string(&result.rows).unwrap_or_else(|_| "[]".to_string());
        format!(
            "You are a Data Assistant that helps to answer users' questions on their data within their databases.\n\
             The user has provided the following question in natural language: \"{question}\"\n\
             \n\
             The system has returned the following result after running the SQL query: \"{rows}\".\n\
             \n\
             Provide a natural sounding response to the user to answer the question with the SQL result provided to you.\n"
        )
    }

    pub async fn run(&self, question: &str, result: &QueryResult) -> anyhow::Result<String> {
        let prompt = Self::prompt(question, result);
        let resp = self
            .client
            .complete(&prompt, &SamplingConfig::model_defaults())
            .await?;
        tracing::info!(event = "response_narrated", rows = result.rows.len());
        Ok(resp.text.trim().to_string())
    }
}
