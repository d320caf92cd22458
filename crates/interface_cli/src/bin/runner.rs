//! `claims-runner`: drives the decision pipeline against PostgreSQL
//!
//! # Usage
//!
//! ```bash
//! claims-runner process CLM-0190f3a2-...
//! claims-runner queue --limit 20
//! claims-runner decide CLM-... --decision approve --agent USR-...
//! RUNNER_DATABASE_URL=postgres://... claims-runner --migrate evaluate CLM-...
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_claims::{ClaimDecisionService, EngineConfig};
use infra_db::{create_pool, run_migrations, PgClaimStore};
use interface_cli::{Cli, RunnerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = RunnerConfig::from_env().context("invalid RUNNER_* configuration")?;
    init_tracing(&config.log_level);

    let engine = EngineConfig::from_env().context("invalid CLAIMS_* configuration")?;
    engine
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid engine thresholds")?;

    let pool = create_pool(config.database())
        .await
        .context("failed to connect to the claims database")?;

    if cli.migrate || config.run_migrations {
        run_migrations(&pool).await.context("failed to apply migrations")?;
    }

    let store = Arc::new(PgClaimStore::new(pool));
    let service = ClaimDecisionService::new(store, engine);

    let output = cli.command.execute(&service).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initializes the tracing subscriber; `RUST_LOG` wins over the configured level
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
