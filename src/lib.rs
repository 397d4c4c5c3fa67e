//! Member Unit of Work
//!
//! Transaction-scoped connection handling for member balance operations.
//! A [`TransactionCoordinator`] checks out one connection per unit of work,
//! binds it to the current call chain through the [`affinity`] registry, and
//! commits or rolls back exactly once. Repositories pick up the bound
//! connection on their own, so business code never touches transaction
//! boundaries.

pub mod affinity;
pub mod config;
pub mod error;
pub mod executor;
pub mod member;
pub mod repository;
pub mod schema;
pub mod service;
pub mod transaction_aware;
pub mod unit_of_work;

pub use config::DatabaseConfig;
pub use error::{Error, Result, StoreFaultKind, TransactionPhase};
pub use executor::{Ambient, ConnectionProvider, Executor, TransactionId};
pub use member::Member;
pub use repository::MemberRepository;
pub use service::{MemberService, REJECTED_MEMBER_ID};
pub use transaction_aware::TransactionAware;
pub use unit_of_work::{TransactionCoordinator, TransactionState, TransactionStats, UnitOfWork};
