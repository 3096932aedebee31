use crate::agents::debugger::ENTERING_DEBUGGER;
use crate::agents::{
    RepairContext, RepairPolicy, SqlBuilder, SqlDebugger, SqlResponder, SqlValidator, NO_EXAMPLES,
};
use crate::audit::AuditTrail;
use crate::config::{DataSource, DebuggingConfig, RetrievalConfig, SageConfig};
use crate::errors::{ConfigError, PipelineFailure, Stage, StageError};
use crate::model::{AnswerSource, PipelineOutput, SamplingConfig};
use crate::providers::embedder::cached::CachedEmbedder;
use crate::providers::embedder::vertex::VertexEmbedder;
use crate::providers::embedder::{Embedder, EmbedderMode};
use crate::providers::llm::family::AgentRole;
use crate::providers::llm::vertex::VertexClient;
use crate::providers::llm::LlmClient;
use crate::providers::warehouse::bigquery::BigQueryWarehouse;
use crate::providers::warehouse::Warehouse;
use crate::providers::with_timeout;
use crate::retrieval::{SearchMode, SimilarityRetriever};
use crate::sql::normalize_sql;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub retrieval: RetrievalConfig,
    pub debugging: DebuggingConfig,
    pub sampling: SamplingConfig,
    /// Applied to every external call, repair loop included.
    pub call_timeout: Option<Duration>,
}

impl PipelineSettings {
    pub fn from_config(cfg: &SageConfig) -> Self {
        Self {
            retrieval: cfg.retrieval.clone(),
            debugging: cfg.debugging,
            sampling: cfg.sampling,
            call_timeout: cfg.timeouts.call_timeout(),
        }
    }

    pub fn repair_policy(&self) -> RepairPolicy {
        RepairPolicy {
            max_rounds: self.debugging.rounds,
            llm_validation: self.debugging.llm_validation,
            call_timeout: self.call_timeout,
        }
    }
}

/// One client per agent role.
#[derive(Clone)]
pub struct AgentClients {
    pub builder: Arc<dyn LlmClient>,
    pub validator: Arc<dyn LlmClient>,
    pub debugger: Arc<dyn LlmClient>,
    pub responder: Arc<dyn LlmClient>,
}

impl AgentClients {
    /// Every role served by the same client.
    pub fn shared(client: Arc<dyn LlmClient>) -> Self {
        Self {
            builder: client.clone(),
            validator: client.clone(),
            debugger: client.clone(),
            responder: client,
        }
    }
}

/// Question in, SQL plus narrated answer out.
///
/// Cloning is cheap; every component sits behind an `Arc` and none of them
/// holds per-run state. A run's session, draft, counter and audit trail live
/// on that run's stack.
#[derive(Clone)]
pub struct Pipeline {
    pub embedder: Arc<dyn Embedder>,
    pub warehouse: Arc<dyn Warehouse>,
    pub retriever: Arc<SimilarityRetriever>,
    pub builder: Arc<SqlBuilder>,
    pub validator: Arc<SqlValidator>,
    pub debugger: Arc<SqlDebugger>,
    pub responder: Arc<SqlResponder>,
    pub settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        clients: AgentClients,
        embedder: Arc<dyn Embedder>,
        warehouse: Arc<dyn Warehouse>,
        retriever: SimilarityRetriever,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            retriever: Arc::new(retriever),
            builder: Arc::new(SqlBuilder::new(clients.builder)),
            validator: Arc::new(SqlValidator::new(clients.validator)),
            debugger: Arc::new(SqlDebugger::new(
                clients.debugger,
                warehouse.clone(),
                settings.repair_policy(),
            )),
            responder: Arc::new(SqlResponder::new(clients.responder)),
            warehouse,
            settings,
        }
    }

    /// Wires the Google Cloud implementations. Every model id is checked
    /// against its role here, before any call is made.
    pub fn from_config(cfg: &SageConfig, access_token: &str) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let gcp = cfg.gcp_settings(access_token);

        let warehouse: Arc<dyn Warehouse> = match cfg.data_source()? {
            DataSource::BigQuery => Arc::new(BigQueryWarehouse::new(gcp.clone())),
        };

        let embedder: Arc<dyn Embedder> = match cfg.embedder_mode()? {
            EmbedderMode::Vertex => Arc::new(VertexEmbedder::new(cfg.embedder.model.clone(), gcp.clone())),
        };
        let embedder: Arc<dyn Embedder> = if cfg.embedder.cache_entries > 0 {
            Arc::new(CachedEmbedder::new(embedder, cfg.embedder.cache_entries))
        } else {
            embedder
        };

        let client = |role: AgentRole| -> Result<Arc<dyn LlmClient>, ConfigError> {
            let c = VertexClient::for_role(role, cfg.models.for_role(role), gcp.clone())?;
            Ok(Arc::new(c))
        };
        let clients = AgentClients {
            builder: client(AgentRole::Builder)?,
            validator: client(AgentRole::Validator)?,
            debugger: client(AgentRole::Debugger)?,
            responder: client(AgentRole::Responder)?,
        };

        let retriever = SimilarityRetriever::new(
            warehouse.clone(),
            &cfg.gcp.project_id,
            &cfg.gcp.metadata_dataset,
        );

        tracing::info!(
            event = "pipeline_ready",
            warehouse = warehouse.name(),
            embedder = embedder.model_id(),
            builder = clients.builder.model_id(),
            debugger = clients.debugger.model_id()
        );
        Ok(Self::new(
            clients,
            embedder,
            warehouse,
            retriever,
            PipelineSettings::from_config(cfg),
        ))
    }

    /// Answers one question.
    ///
    /// Round exhaustion is not a failure: the output comes back with
    /// `invalid = true` and no narrated response. Any stage failure comes back
    /// with the audit trail recorded so far.
    pub async fn answer(&self, question: &str) -> Result<PipelineOutput, PipelineFailure> {
        let mut audit = AuditTrail::new();
        match self.run(question, &mut audit).await {
            Ok(out) => Ok(out),
            Err(error) => {
                tracing::error!(
                    event = "pipeline_failed",
                    stage = %error.stage,
                    error = %error.source
                );
                Err(PipelineFailure { error, audit })
            }
        }
    }

    /// Answers independent questions concurrently, at most `parallel` at a
    /// time. Results are in input order.
    ///
    /// Dropping the returned future aborts every run it started.
    pub async fn answer_many(
        &self,
        questions: &[String],
        parallel: usize,
    ) -> anyhow::Result<Vec<Result<PipelineOutput, PipelineFailure>>> {
        let sem = Arc::new(Semaphore::new(parallel.max(1)));
        let mut set = JoinSet::new();

        for (idx, q) in questions.iter().enumerate() {
            let permit = sem.clone().acquire_owned().await?;
            let this = self.clone();
            let q = q.clone();
            set.spawn(async move {
                let _permit = permit;
                (idx, this.answer(&q).await)
            });
        }

        let mut slots: Vec<Option<Result<PipelineOutput, PipelineFailure>>> =
            questions.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (idx, result) = joined?;
            slots[idx] = Some(result);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(idx, r)| r.ok_or_else(|| anyhow::anyhow!("run {} produced no result", idx)))
            .collect()
    }

    async fn run(&self, question: &str, audit: &mut AuditTrail) -> Result<PipelineOutput, StageError> {
        let limit = self.settings.call_timeout;
        let r = &self.settings.retrieval;
        tracing::info!(event = "question_received", chars = question.len());

        if r.use_examples {
            let hit = with_timeout(limit, "exact_match", self.retriever.exact_match(question))
                .await
                .map_err(|e| StageError::new(Stage::ExactMatch, e))?;
            if let Some(stored) = hit {
                let sql = normalize_sql(&stored);
                audit.push(format!("Found a matching question from the history! Stored SQL: {}", sql));
                return self
                    .finish(question, sql, false, AnswerSource::ExactMatch, 0, audit)
                    .await;
            }
            audit.push("No exact match found for the user question.");
        }

        let qe = with_timeout(limit, "embed", self.embedder.embed(question))
            .await
            .map_err(|e| StageError::new(Stage::Embed, e))?;

        let retrieve = |mode: SearchMode, cap: u32, threshold: f64| {
            let qe = &qe;
            async move {
                with_timeout(
                    limit,
                    "retrieve",
                    self.retriever.similar_matches(mode, qe, cap, threshold),
                )
                .await
                .map_err(|e| StageError::new(Stage::Retrieve, e))
            }
        };
        let tables = retrieve(SearchMode::Table, r.num_table_matches, r.table_similarity_threshold).await?;
        let columns = retrieve(SearchMode::Column, r.num_column_matches, r.column_similarity_threshold).await?;
        let examples = if r.use_examples {
            retrieve(SearchMode::Example, r.num_example_matches, r.example_similarity_threshold).await?
        } else {
            String::new()
        };
        let examples = if examples.is_empty() {
            NO_EXAMPLES.to_string()
        } else {
            examples
        };

        let draft = with_timeout(
            limit,
            "generate",
            self.builder
                .build_sql(question, &tables, &columns, &examples, &self.settings.sampling),
        )
        .await
        .map_err(|e| StageError::new(Stage::Generate, e))?;
        audit.push(format!("Generated SQL: {}", draft));

        audit.push(ENTERING_DEBUGGER);
        let ctx = RepairContext {
            question,
            table_schema: &tables,
            column_schema: &columns,
            examples: &examples,
        };
        let outcome = self
            .debugger
            .start_debugger(&draft, &ctx, &self.validator, audit)
            .await?;

        self.finish(
            question,
            outcome.sql,
            outcome.invalid,
            AnswerSource::Generated,
            outcome.rounds,
            audit,
        )
        .await
    }

    async fn finish(
        &self,
        question: &str,
        sql: String,
        invalid: bool,
        source: AnswerSource,
        rounds: u32,
        audit: &mut AuditTrail,
    ) -> Result<PipelineOutput, StageError> {
        let limit = self.settings.call_timeout;
        let (response, result) = if invalid {
            audit.push("SQL is still invalid; skipping execution and narration.");
            (None, None)
        } else {
            let result = with_timeout(limit, "query", self.warehouse.query(&sql))
                .await
                .map_err(|e| StageError::new(Stage::Execute, e).with_sql(&sql))?;
            let text = with_timeout(limit, "narrate", self.responder.run(question, &result))
                .await
                .map_err(|e| StageError::new(Stage::Narrate, e).with_sql(&sql))?;
            (Some(text), Some(result))
        };

        tracing::info!(
            event = "pipeline_finished",
            invalid = invalid,
            rounds = rounds,
            source = ?source
        );
        Ok(PipelineOutput {
            question: question.to_string(),
            sql,
            invalid,
            source,
            rounds,
            response,
            result,
            audit: audit.render(),
            finished_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, SAMPLE_CONFIG};

    #[test]
    fn settings_follow_config() {
        let raw = SAMPLE_CONFIG
            .replace("rounds: 2", "rounds: 4")
            .replace("call_timeout_secs: 120", "call_timeout_secs: 0");
        let cfg = parse_config(&raw, "inline", true, |_| None).unwrap();
        let s = PipelineSettings::from_config(&cfg);
        assert_eq!(s.debugging.rounds, 4);
        assert!(s.debugging.llm_validation);
        assert_eq!(s.call_timeout, None);
        assert_eq!(s.repair_policy().call_timeout, None);
    }

    #[test]
    fn repair_loop_shares_the_pipeline_timeout() {
        let cfg = parse_config(SAMPLE_CONFIG, "inline", true, |_| None).unwrap();
        let p = Pipeline::from_config(&cfg, "token").unwrap();
        assert_eq!(p.settings.call_timeout, Some(Duration::from_secs(120)));
        assert_eq!(p.debugger.policy().call_timeout, p.settings.call_timeout);
        assert_eq!(p.debugger.policy().max_rounds, 2);
    }

    #[test]
    fn from_config_builds_without_network() {
        let cfg = parse_config(SAMPLE_CONFIG, "inline", true, |_| None).unwrap();
        let p = Pipeline::from_config(&cfg, "token").unwrap();
        assert_eq!(p.warehouse.name(), "bigquery");
        assert_eq!(p.embedder.model_id(), "textembedding-gecko@002");
    }
}
