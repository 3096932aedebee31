use crate::embeddings::util::vector_literal;
use crate::model::{QueryResult, SqlRow};
use crate::providers::warehouse::Warehouse;
use std::fmt;
use std::sync::Arc;

pub const TABLE_CORPUS: &str = "table_details_embeddings";
pub const COLUMN_CORPUS: &str = "tablecolumn_details_embeddings";
pub const EXAMPLE_CORPUS: &str = "example_prompt_sql_embeddings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Table,
    Column,
    Example,
}

impl SearchMode {
    pub fn corpus(&self) -> &'static str {
        match self {
            SearchMode::Table => TABLE_CORPUS,
            SearchMode::Column => COLUMN_CORPUS,
            SearchMode::Example => EXAMPLE_CORPUS,
        }
    }

    fn select_list(&self) -> &'static str {
        match self {
            SearchMode::Table | SearchMode::Column => "base.content AS content",
            SearchMode::Example => {
                "base.example_user_question AS example_user_question, base.example_generated_sql AS example_generated_sql"
            }
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::Table => "table",
            SearchMode::Column => "column",
            SearchMode::Example => "example",
        })
    }
}

/// Vector search over the metadata corpora, issued as warehouse SQL.
pub struct SimilarityRetriever {
    warehouse: Arc<dyn Warehouse>,
    project_id: String,
    metadata_dataset: String,
}

impl SimilarityRetriever {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        project_id: impl Into<String>,
        metadata_dataset: impl Into<String>,
    ) -> Self {
        Self {
            warehouse,
            project_id: project_id.into(),
            metadata_dataset: metadata_dataset.into(),
        }
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}.{}", self.project_id, self.metadata_dataset, table)
    }

    pub fn search_sql(
        &self,
        mode: SearchMode,
        embedding: &[f32],
        cap: u32,
        threshold: f64,
    ) -> anyhow::Result<String> {
        if !threshold.is_finite() {
            anyhow::bail!("similarity threshold must be finite, got {}", threshold);
        }
        let qe = vector_literal(embedding)?;
        // The threshold is a post-filter on the search output, not an index option.
        Ok(format!(
            "SELECT {} FROM VECTOR_SEARCH(TABLE `{}`, \"embedding\", (SELECT {} AS qe), top_k => {}, distance_type => \"COSINE\") WHERE 1 - distance > {}",
            mode.select_list(),
            self.qualified(mode.corpus()),
            qe,
            cap,
            threshold
        ))
    }

    /// Ranked snippets for one corpus, flattened into prompt text.
    ///
    /// Table and column rows become one line each; example rows become
    /// `Example_question: ..; Example_SQL: ..` pairs. No rows yields an empty
    /// string.
    pub async fn similar_matches(
        &self,
        mode: SearchMode,
        embedding: &[f32],
        cap: u32,
        threshold: f64,
    ) -> anyhow::Result<String> {
        if cap == 0 {
            return Ok(String::new());
        }
        let sql = self.search_sql(mode, embedding, cap, threshold)?;
        let result = self.warehouse.query(&sql).await?;

        if result.is_empty() {
            tracing::warn!(
                event = "retrieval_empty",
                mode = %mode,
                threshold = threshold,
                "no matches above threshold"
            );
        } else {
            tracing::info!(event = "retrieval", mode = %mode, matches = result.rows.len());
        }
        format_matches(mode, &result)
    }

    pub fn exact_match_sql(&self, question: &str) -> String {
        format!(
            "SELECT example_user_question, example_generated_sql FROM `{}` WHERE LOWER(example_user_question) = LOWER('{}') LIMIT 1",
            self.qualified(EXAMPLE_CORPUS),
            escape_string_literal(question)
        )
    }

    /// Stored SQL for a question already in the example corpus, compared
    /// case-insensitively.
    pub async fn exact_match(&self, question: &str) -> anyhow::Result<Option<String>> {
        let result = self.warehouse.query(&self.exact_match_sql(question)).await?;
        let Some(row) = result.rows.first() else {
            tracing::info!(event = "exact_match_miss");
            return Ok(None);
        };
        let sql = cell(row, "example_generated_sql")?;
        tracing::info!(event = "exact_match_hit");
        Ok(Some(sql.to_string()))
    }
}

fn cell<'a>(row: &'a SqlRow, column: &str) -> anyhow::Result<&'a str> {
    row.get(column)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("retrieval row missing text column '{}'", column))
}

fn format_matches(mode: SearchMode, result: &QueryResult) -> anyhow::Result<String> {
    let mut out = String::new();
    for row in &result.rows {
        match mode {
            SearchMode::Table | SearchMode::Column => {
                out.push_str(cell(row, "content")?);
                out.push('\n');
            }
            SearchMode::Example => {
                out.push_str("\n Example_question: ");
                out.push_str(cell(row, "example_user_question")?);
                out.push_str("; Example_SQL: ");
                out.push_str(cell(row, "example_generated_sql")?);
            }
        }
    }
    Ok(out)
}

/// Escapes text for a single-quoted GoogleSQL string literal.
pub fn escape_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::warehouse::fake::FakeWarehouse;
    use serde_json::json;

    fn rows(columns: &[&str], data: Vec<serde_json::Value>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: data
                .into_iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
        }
    }

    fn retriever(wh: Arc<FakeWarehouse>) -> SimilarityRetriever {
        SimilarityRetriever::new(wh, "acme-prod", "sqlsage_meta")
    }

    #[test]
    fn search_sql_applies_threshold_as_post_filter() -> anyhow::Result<()> {
        let r = retriever(Arc::new(FakeWarehouse::new()));
        let sql = r.search_sql(SearchMode::Column, &[0.5, -1.0], 10, 0.3)?;
        assert!(sql.contains("`acme-prod.sqlsage_meta.tablecolumn_details_embeddings`"));
        assert!(sql.contains("(SELECT [0.5, -1] AS qe)"));
        assert!(sql.contains("top_k => 10"));
        assert!(sql.ends_with("WHERE 1 - distance > 0.3"));
        Ok(())
    }

    #[tokio::test]
    async fn table_matches_are_one_line_each() -> anyhow::Result<()> {
        let wh = Arc::new(FakeWarehouse::new().with_result_for(
            TABLE_CORPUS,
            rows(
                &["content"],
                vec![
                    json!({ "content": "orders: one row per order" }),
                    json!({ "content": "customers: master data" }),
                ],
            ),
        ));
        let text = retriever(wh.clone())
            .similar_matches(SearchMode::Table, &[1.0], 5, 0.3)
            .await?;
        assert_eq!(text, "orders: one row per order\ncustomers: master data\n");
        assert_eq!(wh.queried_sql().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn example_matches_are_pairs() -> anyhow::Result<()> {
        let wh = Arc::new(FakeWarehouse::new().with_result_for(
            EXAMPLE_CORPUS,
            rows(
                &["example_user_question", "example_generated_sql"],
                vec![json!({
                    "example_user_question": "total orders?",
                    "example_generated_sql": "SELECT COUNT(*) FROM `p.d.orders`"
                })],
            ),
        ));
        let text = retriever(wh)
            .similar_matches(SearchMode::Example, &[1.0], 5, 0.3)
            .await?;
        assert_eq!(
            text,
            "\n Example_question: total orders?; Example_SQL: SELECT COUNT(*) FROM `p.d.orders`"
        );
        Ok(())
    }

    #[tokio::test]
    async fn no_rows_yield_empty_text() -> anyhow::Result<()> {
        let wh = Arc::new(FakeWarehouse::new());
        let text = retriever(wh)
            .similar_matches(SearchMode::Column, &[1.0], 5, 0.9)
            .await?;
        assert!(text.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn zero_cap_skips_the_query() -> anyhow::Result<()> {
        let wh = Arc::new(FakeWarehouse::new());
        let text = retriever(wh.clone())
            .similar_matches(SearchMode::Example, &[1.0], 0, 0.3)
            .await?;
        assert!(text.is_empty());
        assert!(wh.queried_sql().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn exact_match_escapes_and_returns_sql() -> anyhow::Result<()> {
        let wh = Arc::new(FakeWarehouse::new().with_result_for(
            "LOWER(example_user_question)",
            rows(
                &["example_user_question", "example_generated_sql"],
                vec![json!({
                    "example_user_question": "Who's the top customer?",
                    "example_generated_sql": "SELECT name FROM `p.d.customers` LIMIT 1"
                })],
            ),
        ));
        let r = retriever(wh.clone());
        let hit = r.exact_match("who's the top customer?").await?;
        assert_eq!(hit.as_deref(), Some("SELECT name FROM `p.d.customers` LIMIT 1"));

        let sent = wh.queried_sql();
        assert!(sent[0].contains("LOWER('who\\'s the top customer?')"));
        Ok(())
    }

    #[test]
    fn multi_line_question_stays_on_one_literal_line() {
        let r = retriever(Arc::new(FakeWarehouse::new()));
        let sql = r.exact_match_sql("who had\nthe most\r\trevenue?");
        assert!(!sql.contains('\n'));
        assert!(!sql.contains('\r'));
        assert!(sql.contains("LOWER('who had\\nthe most\\r\\trevenue?')"));
        assert_eq!(escape_string_literal("a\\b'c"), "a\\\\b\\'c");
    }

    #[tokio::test]
    async fn exact_match_miss_is_none() -> anyhow::Result<()> {
        let r = retriever(Arc::new(FakeWarehouse::new()));
        assert!(r.exact_match("anything").await?.is_none());
        Ok(())
    }
}
