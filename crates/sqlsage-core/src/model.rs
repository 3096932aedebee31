use serde::{Deserialize, Serialize};

/// Sampling knobs for a completion call. `None` means "model default".
///
/// Not every model family accepts every knob; see
/// [`ModelFamily::effective_sampling`](crate::providers::llm::family::ModelFamily::effective_sampling).
///
/// Missing keys take the generation defaults; an explicit `null` defers to
/// the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: Some(2048),
            temperature: Some(0.4),
            top_p: Some(1.0),
            top_k: Some(32),
        }
    }
}

impl SamplingConfig {
    /// Leave every knob to the model.
    pub fn model_defaults() -> Self {
        Self {
            max_output_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// Schema-level judgment of a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    #[serde(default)]
    pub errors: serde_json::Value,
}

impl Verdict {
    /// The verdict used when validation is switched off for a run.
    pub fn bypassed() -> Self {
        Self {
            valid: true,
            errors: serde_json::Value::Null,
        }
    }

    /// Error detail rendered for a rewrite prompt.
    pub fn error_detail(&self) -> String {
        match &self.errors {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "(no detail given)".to_string(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// Result of a cost-only trial run. `diagnostic` is the cost estimate on
/// success and the warehouse error message on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub diagnostic: String,
}

impl ExecutionOutcome {
    pub fn success(bytes_processed: u64) -> Self {
        Self {
            succeeded: true,
            diagnostic: format!("This query will process {} bytes.", bytes_processed),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            diagnostic: message.into(),
        }
    }
}

pub type SqlRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<SqlRow>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// String value of `column` in every row, skipping rows where it is absent.
    pub fn column_strings(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.get(column))
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Stored SQL for an identical earlier question.
    ExactMatch,
    Generated,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub question: String,
    pub sql: String,
    pub invalid: bool,
    pub source: AnswerSource,
    pub rounds: u32,
    /// Narrated answer; absent when the SQL stayed invalid.
    pub response: Option<String>,
    pub result: Option<QueryResult>,
    pub audit: String,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}
