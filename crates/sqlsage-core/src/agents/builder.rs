use crate::model::SamplingConfig;
use crate::providers::llm::LlmClient;
use crate::sql::normalize_sql;
use std::sync::Arc;

/// One-shot generator of the first draft.
pub struct SqlBuilder {
    client: Arc<dyn LlmClient>,
}

impl SqlBuilder {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub fn prompt(
        question: &str,
        table_schema: &str,
        column_schema: &str,
        examples: &str,
    ) -> String {
        format!(
            "You are a BigQuery SQL guru. Write a SQL-compliant query for BigQuery that answers the following question while using the provided context to correctly refer to the BigQuery tables and the needed column names.\n\
             \n\
             Guidelines:\n\
             - Join as few tables as possible.\n\
             - When joining tables, ensure all join columns are the same data type.\n\
             - Analyze the database and the table schema provided as parameters and understand the relations (column and table relations).\n\
             - Always use SAFE_CAST.\n\
             - Generate the SQL in a single line.\n\
             - Use fully qualified names with ticks (`project_id.owner.table_name`).\n\
             - Use the column names mentioned in Table Schema.\n\
             - Use SQL 'AS' statement to assign a new name temporarily to a table column or even a table wherever needed.\n\
             - Table names are case-sensitive.\n\
             - Refer to the examples provided: {examples}\n\
             \n\
             Here are some examples of user questions and SQL queries:\n\
             {examples}\n\
             \n\
             question:\n\
             {question}\n\
             \n\
             Table Schema:\n\
             {table_schema}\n\
             \n\
             Column Description:\n\
             {column_schema}\n"
        )
    }

    /// Drafts SQL for `question`. The returned text is already normalized.
    ///
    /// Knobs the model family does not accept are dropped by the client, never
    /// rejected.
    pub async fn build_sql(
        &self,
        question: &str,
        table_schema: &str,
        column_schema: &str,
        examples: &str,
        sampling: &SamplingConfig,
    ) -> anyhow::Result<String> {
        let prompt = Self::prompt(question, table_schema, column_schema, examples);
        let resp = self.client.complete(&prompt, sampling).await?;
        let sql = normalize_sql(&resp.text);
        if sql.is_empty() {
            anyhow::bail!("model {} returned no SQL", self.client.model_id());
        }
        tracing::info!(
            event = "sql_generated",
            provider = self.client.provider_name(),
            model = self.client.model_id(),
            chars = sql.len()
        );
        Ok(sql)
    }
}
