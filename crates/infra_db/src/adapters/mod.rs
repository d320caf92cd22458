//! Domain Adapters
//!
//! Implementations of the claims ports over the PostgreSQL repositories.
//!
//! ```rust,ignore
//! use infra_db::adapters::PgClaimStore;
//! use domain_claims::ClaimStore;
//!
//! let store = PgClaimStore::new(pool);
//! let claim = store.get_claim(claim_id).await?;
//! ```

pub mod claims;

pub use claims::PgClaimStore;
