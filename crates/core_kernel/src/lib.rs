//! Shared vocabulary of the claims decision pipeline
//!
//! Typed identifiers, currency-aware money and the error type that every
//! storage port returns. The domain and adapter crates all build on these.

pub mod identifiers;
pub mod money;
pub mod ports;

pub use identifiers::{
    AuditEntryId, ClaimId, DecisionId, DocumentId, DuplicateMatchId, MemberPolicyId, PlanId,
    RuleId, UserId,
};
pub use money::{Currency, Money, MoneyError};
pub use ports::{DomainPort, PortError};
