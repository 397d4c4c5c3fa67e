use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use uuid::Uuid;

use crate::{affinity, Error, Result};

/// Identifier of one unit of work, carried through logs and observer callbacks.
pub type TransactionId = Uuid;

/// Executor wraps the pooled connection checked out for one unit of work.
///
/// Clones share the same connection slot. The unit of work that created the
/// executor owns the slot and empties it exactly once on release; every clone
/// handed to a repository sees `NoActiveTransaction` afterwards.
#[derive(Clone)]
pub struct Executor {
    id: TransactionId,
    conn: Arc<Mutex<Option<PoolConnection<Any>>>>,
    statement_timeout: Duration,
    tainted: Arc<AtomicBool>,
}

impl Executor {
    /// Creates a new Executor from a checked-out pool connection.
    pub fn new(conn: PoolConnection<Any>, id: TransactionId, statement_timeout: Duration) -> Self {
        Self {
            id,
            conn: Arc::new(Mutex::new(Some(conn))),
            statement_timeout,
            tainted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Exclusive access to the connection for running statements.
    ///
    /// Fails with `NoActiveTransaction` once the unit of work has released the
    /// connection, and with `ConnectionTainted` after a statement was abandoned
    /// on it. The guard only exposes the connection, never the pooled handle,
    /// so callers cannot return it to the pool themselves.
    pub async fn connection(&self) -> Result<MappedMutexGuard<'_, AnyConnection>> {
        let slot = self.conn.lock().await;
        if slot.is_some() && self.is_tainted() {
            return Err(Error::ConnectionTainted);
        }
        MutexGuard::try_map(slot, |slot| slot.as_deref_mut())
            .map_err(|_| Error::NoActiveTransaction)
    }

    /// Locks the connection slot. The slot is `None` once the unit of work has released it.
    pub(crate) async fn slot(&self) -> MutexGuard<'_, Option<PoolConnection<Any>>> {
        self.conn.lock().await
    }

    /// True when a statement was abandoned mid-flight and the connection
    /// state can no longer be trusted.
    pub fn is_tainted(&self) -> bool {
        self.tainted.load(Ordering::Acquire)
    }

    pub(crate) fn taint(&self) {
        self.tainted.store(true, Ordering::Release);
    }

    /// Runs one statement future under the statement timeout.
    ///
    /// The outer `Result` carries the timeout; the inner one is the driver's
    /// own outcome, left for the caller to translate.
    pub async fn within_timeout<T, F>(
        &self,
        operation: &'static str,
        statement: F,
    ) -> Result<std::result::Result<T, sqlx::Error>>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.statement_timeout, statement).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                self.taint();
                tracing::warn!(
                    tx_id = %self.id,
                    operation,
                    timeout = ?self.statement_timeout,
                    "statement timed out"
                );
                Err(Error::StatementTimeout {
                    operation,
                    timeout: self.statement_timeout,
                })
            }
        }
    }

    /// Takes ownership of the connection, leaving None in its place.
    /// This should only be called when releasing the unit of work.
    pub(crate) async fn take_connection(&self) -> Option<PoolConnection<Any>> {
        self.conn.lock().await.take()
    }

    /// Synchronous variant for drop paths; gives up if a repository still holds the lock.
    pub(crate) fn try_take_connection(&self) -> Option<PoolConnection<Any>> {
        self.conn.try_lock().ok().and_then(|mut slot| slot.take())
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("statement_timeout", &self.statement_timeout)
            .field("tainted", &self.is_tainted())
            .finish_non_exhaustive()
    }
}

/// Source of the connection a repository runs its statements on.
pub trait ConnectionProvider: Send + Sync {
    fn executor(&self) -> Result<Executor>;
}

/// Resolves the executor bound to the current call chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ambient;

impl ConnectionProvider for Ambient {
    fn executor(&self) -> Result<Executor> {
        affinity::current()
    }
}

impl ConnectionProvider for Executor {
    fn executor(&self) -> Result<Executor> {
        Ok(self.clone())
    }
}
