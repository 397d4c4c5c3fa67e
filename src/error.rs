use std::fmt;
use std::time::Duration;

/// Which transaction boundary step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionPhase::Begin => "begin",
            TransactionPhase::Commit => "commit",
            TransactionPhase::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a driver fault, in the spirit of vendor error-code
/// translation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFaultKind {
    /// Malformed statement or unknown table/column (SQLSTATE class 42).
    BadGrammar,
    /// The connection to the store was lost or never established.
    Connectivity,
    Other,
}

impl StoreFaultKind {
    pub fn classify(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreFaultKind::Connectivity,
            sqlx::Error::Database(db) => {
                let code = db.code();
                let grammar_code = code.as_deref().is_some_and(|c| c.starts_with("42"));
                let grammar_text = {
                    let message = db.message().to_ascii_lowercase();
                    message.contains("syntax error")
                        || message.contains("no such table")
                        || message.contains("no such column")
                };
                if grammar_code || grammar_text {
                    StoreFaultKind::BadGrammar
                } else {
                    StoreFaultKind::Other
                }
            }
            _ => StoreFaultKind::Other,
        }
    }
}

impl fmt::Display for StoreFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreFaultKind::BadGrammar => "bad grammar",
            StoreFaultKind::Connectivity => "connectivity",
            StoreFaultKind::Other => "store",
        };
        f.write_str(name)
    }
}

/// Error type for the data-access layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("member not found: member_id={member_id}")]
    NotFound { member_id: String },

    #[error("member already exists: member_id={member_id}")]
    ConstraintViolation {
        member_id: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{kind} fault during {operation}")]
    DataAccess {
        operation: &'static str,
        kind: StoreFaultKind,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement `{operation}` exceeded timeout of {timeout:?}")]
    StatementTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("connection abandoned after a statement timed out")]
    ConnectionTainted,

    #[error("no transaction is bound to the current call chain")]
    NoActiveTransaction,

    #[error("a transaction is already bound to the current call chain")]
    AlreadyBound,

    #[error("not running inside a connection affinity scope")]
    Unscoped,

    #[error("no connection available from the pool")]
    PoolExhausted(#[source] sqlx::Error),

    #[error("transfer rejected: {0}")]
    DomainValidation(String),

    #[error("invalid member: {0}")]
    InvalidMember(String),

    #[error("transaction {phase} failed")]
    Transaction {
        phase: TransactionPhase,
        #[source]
        source: sqlx::Error,
        /// The fault that triggered the failed rollback, kept so neither is lost.
        original: Option<Box<Error>>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn data_access(operation: &'static str, source: sqlx::Error) -> Self {
        Error::DataAccess {
            operation,
            kind: StoreFaultKind::classify(&source),
            source,
        }
    }

    /// Business logic rejected the operation; the store itself was healthy.
    pub fn is_business_fault(&self) -> bool {
        matches!(
            self,
            Error::DomainValidation(_)
                | Error::InvalidMember(_)
                | Error::NotFound { .. }
                | Error::ConstraintViolation { .. }
        )
    }

    /// The store, the pool, or the transaction boundary failed.
    pub fn is_store_fault(&self) -> bool {
        matches!(
            self,
            Error::DataAccess { .. }
                | Error::StatementTimeout { .. }
                | Error::ConnectionTainted
                | Error::PoolExhausted(_)
                | Error::Transaction { .. }
        )
    }

    /// The root cause carried by a failed rollback, if any.
    pub fn original(&self) -> Option<&Error> {
        match self {
            Error::Transaction { original, .. } => original.as_deref(),
            _ => None,
        }
    }
}

/// Result type for data-access operations
pub type Result<T> = std::result::Result<T, Error>;
