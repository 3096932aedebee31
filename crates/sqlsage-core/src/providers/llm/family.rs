use crate::errors::ConfigError;
use crate::model::SamplingConfig;
use std::fmt;

/// Supported model identifiers. Anything else is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    CodeBison32k,
    TextBison32k,
    CodechatBison32k,
    Gemini10Pro,
    Gemini15Pro,
    GeminiUltra,
}

/// Which Vertex AI method serves the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    GenerateContent,
    Predict,
}

/// The part a model plays in the pipeline; each role accepts a subset of families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Builder,
    Validator,
    Debugger,
    Responder,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgentRole::Builder => "builder",
            AgentRole::Validator => "validator",
            AgentRole::Debugger => "debugger",
            AgentRole::Responder => "responder",
        })
    }
}

impl AgentRole {
    pub fn supported(&self) -> &'static [ModelFamily] {
        use ModelFamily::*;
        match self {
            AgentRole::Builder => &[CodeBison32k, TextBison32k, Gemini10Pro, Gemini15Pro],
            AgentRole::Debugger => &[CodechatBison32k, Gemini10Pro, GeminiUltra],
            AgentRole::Validator | AgentRole::Responder => &[Gemini10Pro, Gemini15Pro],
        }
    }
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 6] = [
        ModelFamily::CodeBison32k,
        ModelFamily::TextBison32k,
        ModelFamily::CodechatBison32k,
        ModelFamily::Gemini10Pro,
        ModelFamily::Gemini15Pro,
        ModelFamily::GeminiUltra,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ModelFamily::CodeBison32k => "code-bison-32k",
            ModelFamily::TextBison32k => "text-bison-32k",
            ModelFamily::CodechatBison32k => "codechat-bison-32k",
            ModelFamily::Gemini10Pro => "gemini-1.0-pro",
            ModelFamily::Gemini15Pro => "gemini-1.5-pro",
            ModelFamily::GeminiUltra => "gemini-ultra",
        }
    }

    /// Name of the published model on Vertex AI.
    pub fn vertex_model(&self) -> &'static str {
        match self {
            ModelFamily::CodeBison32k => "code-bison-32k",
            ModelFamily::TextBison32k => "text-bison-32k",
            ModelFamily::CodechatBison32k => "codechat-bison-32k",
            ModelFamily::Gemini10Pro => "gemini-1.0-pro-001",
            ModelFamily::Gemini15Pro => "gemini-1.5-pro-001",
            ModelFamily::GeminiUltra => "gemini-1.0-ultra-001",
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            ModelFamily::CodeBison32k
            | ModelFamily::TextBison32k
            | ModelFamily::CodechatBison32k => Endpoint::Predict,
            _ => Endpoint::GenerateContent,
        }
    }

    pub fn supports_chat(&self) -> bool {
        matches!(
            self,
            ModelFamily::CodechatBison32k | ModelFamily::Gemini10Pro | ModelFamily::GeminiUltra
        )
    }

    pub fn parse(id: &str) -> Result<Self, ConfigError> {
        let id = id.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.id() == id)
            .ok_or_else(|| {
                let all: Vec<&str> = Self::ALL.iter().map(|f| f.id()).collect();
                ConfigError(format!(
                    "unsupported model '{}'{} (supported: {})",
                    id,
                    did_you_mean(id, &all),
                    all.join(", ")
                ))
            })
    }

    /// Parses `id` and checks that `role` can run on it.
    pub fn for_role(role: AgentRole, id: &str) -> Result<Self, ConfigError> {
        let family = Self::parse(id)?;
        let supported = role.supported();
        if !supported.contains(&family) {
            let ids: Vec<&str> = supported.iter().map(|f| f.id()).collect();
            return Err(ConfigError(format!(
                "model '{}' cannot be used as {} (supported: {})",
                id,
                role,
                ids.join(", ")
            )));
        }
        Ok(family)
    }

    /// Drops the knobs this family does not accept. PaLM `predict` only takes
    /// `maxOutputTokens` and `temperature`; Gemini takes all four.
    pub fn effective_sampling(&self, requested: &SamplingConfig) -> SamplingConfig {
        match self.endpoint() {
            Endpoint::GenerateContent => *requested,
            Endpoint::Predict => SamplingConfig {
                max_output_tokens: requested.max_output_tokens,
                temperature: requested.temperature,
                top_p: None,
                top_k: None,
            },
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

fn did_you_mean(input: &str, candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|c| (strsim::normalized_levenshtein(input, c), *c))
        .filter(|(score, _)| *score >= 0.6)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| format!("; did you mean '{}'?", c))
        .unwrap_or_default()
}
