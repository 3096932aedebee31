use crate::errors::ConfigError;
use crate::model::SamplingConfig;
use crate::providers::embedder::vertex::DEFAULT_EMBEDDING_MODEL;
use crate::providers::embedder::EmbedderMode;
use crate::providers::llm::family::{AgentRole, ModelFamily};
use crate::providers::GcpSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_PATH: &str = "sqlsage.yaml";

pub const ENV_PROJECT_ID: &str = "SQLSAGE_PROJECT_ID";
pub const ENV_REGION: &str = "SQLSAGE_REGION";
pub const ENV_DATASET: &str = "SQLSAGE_DATASET";
pub const ENV_METADATA_DATASET: &str = "SQLSAGE_METADATA_DATASET";
pub const ENV_DATA_SOURCE: &str = "SQLSAGE_DATA_SOURCE";
pub const ENV_ACCESS_TOKEN: &str = "SQLSAGE_ACCESS_TOKEN";
pub const ENV_GOOGLE_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const IDENTIFIER_PATTERN: &str = "^[A-Za-z0-9_-]+$";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SageConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub gcp: GcpConfig,
    #[serde(default = "default_data_source")]
    pub data_source: String,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub debugging: DebuggingConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Dataset the generated SQL queries.
    #[serde(default)]
    pub dataset: String,
    /// Dataset holding the embedding corpora.
    #[serde(default)]
    pub metadata_dataset: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            region: default_region(),
            dataset: String::new(),
            metadata_dataset: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub builder: String,
    pub validator: String,
    pub debugger: String,
    pub responder: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let id = ModelFamily::Gemini10Pro.id().to_string();
        Self {
            builder: id.clone(),
            validator: id.clone(),
            debugger: id.clone(),
            responder: id,
        }
    }
}

impl ModelsConfig {
    pub fn for_role(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::Builder => &self.builder,
            AgentRole::Validator => &self.validator,
            AgentRole::Debugger => &self.debugger,
            AgentRole::Responder => &self.responder,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub mode: String,
    pub model: String,
    /// In-memory embedding memo size; 0 turns it off.
    pub cache_entries: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            mode: "vertex".to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            cache_entries: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Use the (question, SQL) corpus for exact matches and few-shot examples.
    pub use_examples: bool,
    pub table_similarity_threshold: f64,
    pub column_similarity_threshold: f64,
    pub example_similarity_threshold: f64,
    pub num_table_matches: u32,
    pub num_column_matches: u32,
    pub num_example_matches: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            use_examples: true,
            table_similarity_threshold: 0.3,
            column_similarity_threshold: 0.3,
            example_similarity_threshold: 0.3,
            num_table_matches: 5,
            num_column_matches: 10,
            num_example_matches: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggingConfig {
    pub rounds: u32,
    pub llm_validation: bool,
}

impl Default for DebuggingConfig {
    fn default() -> Self {
        Self {
            rounds: crate::agents::debugger::DEFAULT_DEBUGGING_ROUNDS,
            llm_validation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Per external call; 0 disables the limit.
    pub call_timeout_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 120,
        }
    }
}

impl TimeoutsConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    BigQuery,
}

impl DataSource {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bigquery" => Ok(DataSource::BigQuery),
            _ => Err(ConfigError(format!(
                "unsupported data source '{}' (supported: bigquery)",
                s
            ))),
        }
    }
}

fn default_version() -> u32 {
    SUPPORTED_CONFIG_VERSION
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_data_source() -> String {
    "bigquery".to_string()
}

impl SageConfig {
    /// Environment wins over the file for the deployment identifiers.
    pub fn apply_env_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 5] = [
            (ENV_PROJECT_ID, &mut self.gcp.project_id),
            (ENV_REGION, &mut self.gcp.region),
            (ENV_DATASET, &mut self.gcp.dataset),
            (ENV_METADATA_DATASET, &mut self.gcp.metadata_dataset),
            (ENV_DATA_SOURCE, &mut self.data_source),
        ];
        for (key, slot) in targets {
            if let Some(v) = env(key).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(event = "config_env_override", key = key);
                *slot = v.trim().to_string();
            }
        }
    }

    pub fn data_source(&self) -> Result<DataSource, ConfigError> {
        DataSource::parse(&self.data_source)
    }

    pub fn embedder_mode(&self) -> Result<EmbedderMode, ConfigError> {
        EmbedderMode::parse(&self.embedder.mode)
    }

    pub fn family_for(&self, role: AgentRole) -> Result<ModelFamily, ConfigError> {
        ModelFamily::for_role(role, self.models.for_role(role))
    }

    pub fn gcp_settings(&self, access_token: impl Into<String>) -> GcpSettings {
        GcpSettings::new(&self.gcp.project_id, &self.gcp.region, access_token)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }

        let ident = regex::Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| ConfigError(format!("identifier pattern: {}", e)))?;
        let ids = [
            ("gcp.project_id", &self.gcp.project_id),
            ("gcp.region", &self.gcp.region),
            ("gcp.dataset", &self.gcp.dataset),
            ("gcp.metadata_dataset", &self.gcp.metadata_dataset),
        ];
        for (field, value) in ids {
            if value.is_empty() {
                return Err(ConfigError(format!("{} is required", field)));
            }
            if !ident.is_match(value) {
                return Err(ConfigError(format!(
                    "{} '{}' may only contain letters, digits, '_' and '-'",
                    field, value
                )));
            }
        }

        self.data_source()?;
        self.embedder_mode()?;
        for role in [
            AgentRole::Builder,
            AgentRole::Validator,
            AgentRole::Debugger,
            AgentRole::Responder,
        ] {
            self.family_for(role)?;
        }

        let r = &self.retrieval;
        let thresholds = [
            ("retrieval.table_similarity_threshold", r.table_similarity_threshold),
            ("retrieval.column_similarity_threshold", r.column_similarity_threshold),
            ("retrieval.example_similarity_threshold", r.example_similarity_threshold),
        ];
        for (field, t) in thresholds {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError(format!("{} must be within [0, 1], got {}", field, t)));
            }
        }
        if r.num_table_matches == 0 || r.num_column_matches == 0 {
            return Err(ConfigError(
                "retrieval.num_table_matches and retrieval.num_column_matches must be at least 1"
                    .into(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<SageConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, &path.display().to_string(), strict, |k| {
        std::env::var(k).ok()
    })
}

/// Parses, applies environment overrides and validates.
///
/// Unknown keys fail in strict mode and are logged otherwise. Keys starting
/// with `_` or `x-` are YAML anchor holders and always allowed.
pub fn parse_config<F>(raw: &str, origin: &str, strict: bool, env: F) -> Result<SageConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut ignored_keys = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);
    let mut cfg: SageConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML ({}): {}", origin, e)))?;

    let unknown: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if !unknown.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown fields in strict mode: {:?} (file: {})",
                unknown, origin
            )));
        }
        tracing::warn!(event = "config_unknown_fields", fields = ?unknown, file = origin);
    }

    cfg.apply_env_overrides(env);
    cfg.validate()?;
    Ok(cfg)
}

/// Bearer token for Google APIs from the environment.
pub fn access_token_from<F>(env: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    [ENV_ACCESS_TOKEN, ENV_GOOGLE_TOKEN]
        .into_iter()
        .find_map(|k| env(k).filter(|v| !v.trim().is_empty()))
        .map(|v| v.trim().to_string())
        .ok_or_else(|| {
            ConfigError(format!(
                "no access token: set {} or {}",
                ENV_ACCESS_TOKEN, ENV_GOOGLE_TOKEN
            ))
        })
}

pub fn access_token_from_env() -> Result<String, ConfigError> {
    access_token_from(|k| std::env::var(k).ok())
}

pub const SAMPLE_CONFIG: &str = r#"version: 1
gcp:
  project_id: my-project
  region: us-central1
  dataset: sales
  metadata_dataset: sqlsage_meta
data_source: bigquery
models:
  builder: gemini-1.0-pro
  validator: gemini-1.0-pro
  debugger: gemini-1.0-pro
  responder: gemini-1.0-pro
embedder:
  mode: vertex
  model: textembedding-gecko@002
  cache_entries: 256
retrieval:
  use_examples: true
  table_similarity_threshold: 0.3
  column_similarity_threshold: 0.3
  example_similarity_threshold: 0.3
  num_table_matches: 5
  num_column_matches: 10
  num_example_matches: 5
debugging:
  rounds: 2
  llm_validation: true
sampling:
  max_output_tokens: 2048
  temperature: 0.4
  top_p: 1.0
  top_k: 32
timeouts:
  call_timeout_secs: 120
"#;

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))
}
