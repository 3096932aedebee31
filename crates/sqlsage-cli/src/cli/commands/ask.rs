use super::exit_codes;
use crate::cli::args::{AskArgs, OutputFormat};
use sqlsage_core::config::{access_token_from_env, SageConfig};
use sqlsage_core::errors::PipelineFailure;
use sqlsage_core::model::PipelineOutput;
use sqlsage_core::report::{console, json};
use sqlsage_core::Pipeline;

pub async fn run(args: AskArgs) -> anyhow::Result<i32> {
    let mut cfg = match super::load_or_exit(&args.config, args.strict) {
        Ok(cfg) => cfg,
        Err(code) => return Ok(code),
    };
    apply_overrides(&mut cfg, &args);

    let token = match access_token_from_env() {
        Ok(t) => t,
        Err(e) => return Ok(super::config_error(&e)),
    };
    let pipeline = match Pipeline::from_config(&cfg, &token) {
        Ok(p) => p,
        Err(e) => return Ok(super::config_error(&e)),
    };

    let results = pipeline.answer_many(&args.questions, args.parallel).await?;

    match args.format {
        OutputFormat::Text => {
            for (q, r) in args.questions.iter().zip(&results) {
                match r {
                    Ok(out) => println!("{}", console::render_output(out)),
                    Err(f) => println!("{}", console::render_failure(q, f)),
                }
            }
        }
        OutputFormat::Json => {
            let mut docs = Vec::with_capacity(results.len());
            for (q, r) in args.questions.iter().zip(&results) {
                docs.push(match r {
                    Ok(out) => json::output_json(out)?,
                    Err(f) => json::failure_json(q, f),
                });
            }
            println!("{}", serde_json::to_string_pretty(&docs)?);
        }
    }

    Ok(exit_code(&results))
}

fn apply_overrides(cfg: &mut SageConfig, args: &AskArgs) {
    if let Some(rounds) = args.rounds {
        cfg.debugging.rounds = rounds;
    }
    if args.no_validation {
        cfg.debugging.llm_validation = false;
    }
    if args.no_examples {
        cfg.retrieval.use_examples = false;
    }
}

/// Worst outcome wins: misconfiguration, then a failed stage, then SQL that
/// never passed.
fn exit_code(results: &[Result<PipelineOutput, PipelineFailure>]) -> i32 {
    let failures = results.iter().filter_map(|r| r.as_ref().err());
    let mut code = exit_codes::OK;
    for f in failures {
        if f.is_config_error() {
            return exit_codes::CONFIG_ERROR;
        }
        code = exit_codes::RUN_FAILED;
    }
    if code == exit_codes::OK && results.iter().flatten().any(|o| o.invalid) {
        code = exit_codes::INVALID_SQL;
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlsage_core::audit::AuditTrail;
    use sqlsage_core::errors::{ConfigError, Stage, StageError};
    use sqlsage_core::model::AnswerSource;

    fn output(invalid: bool) -> PipelineOutput {
        PipelineOutput {
            question: "q".into(),
            sql: "SELECT 1".into(),
            invalid,
            source: AnswerSource::Generated,
            rounds: 0,
            response: None,
            result: None,
            audit: String::new(),
            finished_at: "2026-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    fn failure(err: anyhow::Error) -> PipelineFailure {
        PipelineFailure {
            error: StageError::new(Stage::Generate, err),
            audit: AuditTrail::new(),
        }
    }

    #[test]
    fn worst_outcome_decides_exit_code() {
        assert_eq!(exit_code(&[Ok(output(false))]), exit_codes::OK);
        assert_eq!(
            exit_code(&[Ok(output(false)), Ok(output(true))]),
            exit_codes::INVALID_SQL
        );
        assert_eq!(
            exit_code(&[Ok(output(true)), Err(failure(anyhow::anyhow!("quota")))]),
            exit_codes::RUN_FAILED
        );
        assert_eq!(
            exit_code(&[
                Err(failure(anyhow::anyhow!("quota"))),
                Err(failure(ConfigError("bad model".into()).into())),
            ]),
            exit_codes::CONFIG_ERROR
        );
    }
}
