use super::exit_codes;
use crate::cli::args::DryRunArgs;
use sqlsage_core::config::{access_token_from_env, DataSource};
use sqlsage_core::providers::warehouse::bigquery::BigQueryWarehouse;
use sqlsage_core::providers::warehouse::Warehouse;
use sqlsage_core::providers::with_timeout;
use sqlsage_core::sql::normalize_sql;

pub async fn run(args: DryRunArgs) -> anyhow::Result<i32> {
    let cfg = match super::load_or_exit(&args.config, args.strict) {
        Ok(cfg) => cfg,
        Err(code) => return Ok(code),
    };
    let token = match access_token_from_env() {
        Ok(t) => t,
        Err(e) => return Ok(super::config_error(&e)),
    };

    let warehouse: Box<dyn Warehouse> = match cfg.data_source()? {
        DataSource::BigQuery => Box::new(BigQueryWarehouse::new(cfg.gcp_settings(token))),
    };

    let sql = normalize_sql(&args.sql);
    let outcome = with_timeout(cfg.timeouts.call_timeout(), "dry_run", async {
        Ok::<_, anyhow::Error>(warehouse.dry_run(&sql).await)
    })
    .await?;

    println!("{}", outcome.diagnostic);
    if outcome.succeeded {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::INVALID_SQL)
    }
}
