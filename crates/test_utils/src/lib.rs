//! Fixtures, builders and harnesses shared by the claims test suites
//!
//! Builders produce claims, plans and validation rules with sensible
//! defaults; `database` spins up a migrated PostgreSQL container for the
//! adapter tests; `generators` holds the proptest strategies.

pub mod assertions;
pub mod builders;
pub mod database;
pub mod fixtures;
pub mod generators;

pub use assertions::*;
pub use builders::*;
pub use database::*;
pub use fixtures::*;
pub use generators::*;
