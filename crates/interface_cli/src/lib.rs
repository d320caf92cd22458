//! Claims Runner
//!
//! Command-line front end for the claims decision pipeline. It wires a
//! PostgreSQL-backed [`ClaimDecisionService`](domain_claims::ClaimDecisionService)
//! from environment configuration and runs one operation per invocation.
//!
//! # Environment Variables
//!
//! * `RUNNER_DATABASE_URL` - PostgreSQL connection string (or `DATABASE_URL`)
//! * `RUNNER_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `RUNNER_MAX_CONNECTIONS` - pool size (default: 5)
//! * `RUNNER_RUN_MIGRATIONS` - apply migrations on start (default: false)
//! * `CLAIMS_*` - engine thresholds, see `EngineConfig`

pub mod cli;
pub mod config;

pub use cli::{Cli, Command, DecisionArg};
pub use config::RunnerConfig;
