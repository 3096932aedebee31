use crate::errors::MalformedResponse;
use crate::model::{SamplingConfig, Verdict};
use crate::providers::llm::LlmClient;
use crate::sql::strip_json_fences;
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use std::sync::Arc;

/// Schema-level classifier for a draft. Stateless.
pub struct SqlValidator {
    client: Arc<dyn LlmClient>,
}

impl SqlValidator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub fn prompt(question: &str, table_schema: &str, column_schema: &str, sql: &str) -> String {
        format!(
            "Classify the SQL query: {sql} as valid or invalid?\n\
             \n\
             Guidelines to be valid:\n\
             - all column_name in the query must exist in the table_name.\n\
             - all join columns must be the same data_type.\n\
             - table relationships must be correct.\n\
             - Use fully qualified names with table_alias.column_name.\n\
             \n\
             Parameters:\n\
             - SQL query: {sql}\n\
             - table schema: {table_schema}\n\
             - column description: {column_schema}\n\
             \n\
             Respond using a valid JSON format with two elements valid and errors:\n\
             {{ \"valid\": true or false, \"errors\": errors }}\n\
             \n\
             Initial user question:\n\
             {question}\n"
        )
    }

    pub async fn check(
        &self,
        question: &str,
        table_schema: &str,
        column_schema: &str,
        sql: &str,
    ) -> anyhow::Result<Verdict> {
        let prompt = Self::prompt(question, table_schema, column_schema, sql);
        let resp = self
            .client
            .complete(&prompt, &SamplingConfig::model_defaults())
            .await?;
        let verdict = parse_verdict(&resp.text)?;
        tracing::info!(event = "sql_validated", valid = verdict.valid);
        Ok(verdict)
    }
}

fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "required": ["valid"],
        "properties": {
            "valid": { "type": "boolean" }
        }
    })
}

/// Decodes the validator's answer, possibly wrapped in a code fence.
///
/// Anything that is not an object with a boolean `valid` is a
/// [`MalformedResponse`]; it is never read as either verdict.
pub fn parse_verdict(raw: &str) -> Result<Verdict, MalformedResponse> {
    let malformed = |reason: String| MalformedResponse {
        what: "verdict",
        reason,
        raw: raw.to_string(),
    };

    let instance: Value = serde_json::from_str(&strip_json_fences(raw))
        .map_err(|e| malformed(format!("not JSON: {}", e)))?;

    let schema = verdict_schema();
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| malformed(format!("verdict schema: {}", e)))?;
    if let Err(errors) = compiled.validate(&instance) {
        let msgs: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(malformed(msgs.join("; ")));
    }

    serde_json::from_value(instance).map_err(|e| malformed(e.to_string()))
}
