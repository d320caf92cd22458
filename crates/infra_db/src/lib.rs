//! PostgreSQL storage for the claims decision pipeline
//!
//! - [`repositories`]: SQL and row types
//! - [`adapters`]: the `ClaimStore` port implementation, [`PgClaimStore`]
//! - [`pool`]: connection pooling and the embedded migrations
//!
//! Every pipeline step is committed in one transaction whose claim update
//! is guarded by the status and version the step started from, so two
//! workers racing on the same claim cannot both win.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgClaimStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/claims")).await?;
//! run_migrations(&pool).await?;
//! let store = PgClaimStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::PgClaimStore;
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
