//! Repository implementations
//!
//! Repositories own the SQL and work in row types. Conversion to domain
//! types happens in the adapters.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate builds
//! without a live database.

pub mod claims;
pub mod reference;

pub use claims::ClaimsRepository;
pub use reference::ReferenceRepository;
