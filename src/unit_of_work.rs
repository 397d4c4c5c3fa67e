use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Connection, Executor as _};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{DatabaseConfig, DEFAULT_STATEMENT_TIMEOUT};
use crate::{affinity, Error, Executor, Result, TransactionAware, TransactionId, TransactionPhase};

/// Completion state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// One checked-out connection and the transaction running on it.
///
/// Owned exclusively by the coordinator for the duration of a call. The pooled
/// connection is moved out of the executor exactly once, by [`UnitOfWork::release`]
/// or, if the unit of work is dropped mid-flight, by `Drop`, which discards it
/// instead of returning a connection with an open transaction to the pool.
#[derive(Debug)]
pub struct UnitOfWork {
    executor: Executor,
    auto_commit_suspended: bool,
    state: TransactionState,
    restorable: bool,
    released: bool,
}

impl UnitOfWork {
    fn new(executor: Executor, auto_commit_suspended: bool) -> Self {
        Self {
            executor,
            auto_commit_suspended,
            state: TransactionState::Active,
            restorable: true,
            released: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.executor.id()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_auto_commit_suspended(&self) -> bool {
        self.auto_commit_suspended
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Suspends auto-commit by opening an explicit transaction.
    async fn suspend_auto_commit(&mut self) -> std::result::Result<(), sqlx::Error> {
        if let Err(err) = self.run_boundary("BEGIN").await {
            self.restorable = false;
            return Err(err);
        }
        self.auto_commit_suspended = true;
        tracing::debug!(tx_id = %self.id(), "transaction started");
        Ok(())
    }

    pub(crate) async fn commit(&mut self) -> std::result::Result<(), sqlx::Error> {
        debug_assert_eq!(self.state, TransactionState::Active);
        self.run_boundary("COMMIT").await?;
        self.state = TransactionState::Committed;
        tracing::debug!(tx_id = %self.id(), "transaction committed");
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) -> std::result::Result<(), sqlx::Error> {
        debug_assert_eq!(self.state, TransactionState::Active);
        self.state = TransactionState::RolledBack;
        if self.executor.is_tainted() {
            // Closing the connection on release aborts the transaction; a
            // ROLLBACK would only queue behind the abandoned statement.
            self.restorable = false;
            tracing::debug!(tx_id = %self.id(), "rollback left to connection close");
            return Ok(());
        }
        match self.run_boundary("ROLLBACK").await {
            Ok(()) => {
                tracing::debug!(tx_id = %self.id(), "transaction rolled back");
                Ok(())
            }
            Err(err) => {
                self.restorable = false;
                Err(err)
            }
        }
    }

    /// Runs BEGIN, COMMIT or ROLLBACK under the statement timeout.
    ///
    /// A boundary that does not answer in time taints the executor and is
    /// reported as an I/O timeout, so the connection is discarded on release.
    async fn run_boundary(&self, statement: &'static str) -> std::result::Result<(), sqlx::Error> {
        let timeout = self.executor.statement_timeout();
        let mut slot = self.executor.slot().await;
        let conn = slot.as_deref_mut().ok_or(sqlx::Error::PoolClosed)?;
        match tokio::time::timeout(timeout, (&mut *conn).execute(statement)).await {
            Ok(done) => done.map(|_| ()),
            Err(_) => {
                self.executor.taint();
                tracing::warn!(tx_id = %self.id(), statement, ?timeout, "transaction boundary timed out");
                Err(boundary_timeout(statement, timeout))
            }
        }
    }

    /// Restores auto-commit behaviour and hands the connection back to the pool.
    ///
    /// Connections that cannot be restored to a clean state are closed instead.
    pub(crate) async fn release(mut self) {
        self.released = true;
        let Some(mut conn) = self.executor.take_connection().await else {
            return;
        };

        if self.executor.is_tainted() {
            // The driver is still busy with the abandoned statement; closing
            // politely would wait for it.
            drop(conn.detach());
            tracing::warn!(tx_id = %self.id(), "abandoned connection dropped instead of returned to pool");
            return;
        }

        let mut reusable = self.restorable;
        if reusable && self.auto_commit_suspended && self.state == TransactionState::Active {
            let timeout = self.executor.statement_timeout();
            let restored = match tokio::time::timeout(timeout, (&mut *conn).execute("ROLLBACK")).await {
                Ok(done) => done.map(|_| ()),
                Err(_) => Err(boundary_timeout("ROLLBACK", timeout)),
            };
            if let Err(err) = restored {
                tracing::warn!(tx_id = %self.id(), error = %err, "failed to restore auto-commit");
                reusable = false;
            }
        }
        self.auto_commit_suspended = false;

        if reusable {
            drop(conn);
            tracing::debug!(tx_id = %self.id(), "connection returned to pool");
        } else {
            discard(conn, self.executor.statement_timeout()).await;
            tracing::warn!(tx_id = %self.id(), "connection discarded instead of returned to pool");
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(conn) = self.executor.try_take_connection() {
            tracing::warn!(tx_id = %self.id(), "unit of work dropped before release; closing connection");
            drop(conn.detach());
        }
    }
}

async fn discard(conn: PoolConnection<Any>, timeout: Duration) {
    match tokio::time::timeout(timeout, conn.detach().close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(error = %err, "error while closing discarded connection"),
        Err(_) => tracing::debug!("gave up closing discarded connection"),
    }
}

fn boundary_timeout(statement: &'static str, timeout: Duration) -> sqlx::Error {
    sqlx::Error::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{statement} exceeded timeout of {timeout:?}"),
    ))
}

/// Commit/rollback counters across every unit of work run by a coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub committed: u64,
    pub rolled_back: u64,
    /// ROLLBACK statements the store refused. The connection was discarded,
    /// which ends the transaction, but the store never confirmed it.
    pub rollback_failed: u64,
}

/// Runs business operations inside a transaction bracket.
///
/// `run_in_transaction` acquires a connection, suspends auto-commit, binds
/// the connection to the current call chain, runs the operation, then commits
/// or rolls back exactly once and releases the connection whatever happened.
pub struct TransactionCoordinator {
    pool: AnyPool,
    statement_timeout: Duration,
    observers: RwLock<Vec<Arc<dyn TransactionAware>>>,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    rollback_failed: AtomicU64,
}

impl TransactionCoordinator {
    /// Create a new coordinator over the given connection pool.
    pub fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            observers: RwLock::new(Vec::new()),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
            rollback_failed: AtomicU64::new(0),
        }
    }

    /// Connect a pool from configuration and wrap it.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let pool = config.connect().await?;
        Ok(Self::new(pool).with_statement_timeout(config.statement_timeout))
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Register a component that needs to be notified of transaction events.
    pub fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.observers.write().push(observer);
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            rollback_failed: self.rollback_failed.load(Ordering::Relaxed),
        }
    }

    /// Run `operation` as one atomic unit of work.
    ///
    /// Errors raised by the operation are returned unchanged after a successful
    /// rollback. A failed commit surfaces as `Error::Transaction` with
    /// `TransactionPhase::Commit`; a failed rollback as
    /// `TransactionPhase::Rollback` carrying the original fault.
    pub async fn run_in_transaction<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        affinity::scope(self.transactional(operation)).await
    }

    /// Run `operation` with an ambient connection but without a transaction:
    /// every statement commits on its own, so a failure part-way leaves the
    /// earlier statements applied.
    pub async fn run_auto_commit<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        affinity::scope(async move {
            if affinity::is_bound() {
                return Err(Error::AlreadyBound);
            }
            let uow = self.acquire().await?;
            let span = tracing::debug_span!("auto_commit", tx_id = %uow.id());
            async move {
                let binding = match affinity::bind_scoped(uow.executor().clone()) {
                    Ok(binding) => binding,
                    Err(err) => {
                        uow.release().await;
                        return Err(err);
                    }
                };
                let outcome = operation().await;
                drop(binding);
                uow.release().await;
                outcome
            }
            .instrument(span)
            .await
        })
        .await
    }

    async fn transactional<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if affinity::is_bound() {
            return Err(Error::AlreadyBound);
        }

        let mut uow = self.acquire().await?;
        let span = tracing::info_span!("unit_of_work", tx_id = %uow.id());

        async move {
            if let Err(source) = uow.suspend_auto_commit().await {
                tracing::error!(error = %source, "failed to begin transaction");
                uow.release().await;
                return Err(Error::Transaction {
                    phase: TransactionPhase::Begin,
                    source,
                    original: None,
                });
            }
            let binding = match affinity::bind_scoped(uow.executor().clone()) {
                Ok(binding) => binding,
                Err(err) => {
                    uow.release().await;
                    return Err(err);
                }
            };

            let outcome = operation().await;
            let result = self.complete(&mut uow, outcome).await;

            drop(binding);
            uow.release().await;
            result
        }
        .instrument(span)
        .await
    }

    async fn acquire(&self) -> Result<UnitOfWork> {
        let conn = self.pool.acquire().await.map_err(|err| match err {
            sqlx::Error::PoolTimedOut => {
                tracing::warn!("timed out waiting for a pooled connection");
                Error::PoolExhausted(err)
            }
            other => Error::data_access("acquire", other),
        })?;
        let executor = Executor::new(conn, Uuid::new_v4(), self.statement_timeout);
        tracing::debug!(tx_id = %executor.id(), "connection acquired");
        Ok(UnitOfWork::new(executor, false))
    }

    async fn complete<T>(&self, uow: &mut UnitOfWork, outcome: Result<T>) -> Result<T> {
        match outcome {
            // An abandoned statement may still apply; its outcome is unknown.
            Ok(_) if uow.executor().is_tainted() => {
                tracing::warn!("operation succeeded on an abandoned connection; rolling back");
                Err(self.roll_back(uow, Error::ConnectionTainted).await)
            }
            Ok(value) => match uow.commit().await {
                Ok(()) => {
                    self.notify_commit(uow.id()).await;
                    Ok(value)
                }
                Err(commit_err) => {
                    tracing::error!(error = %commit_err, "commit failed; rolling back");
                    let commit_fault = Error::Transaction {
                        phase: TransactionPhase::Commit,
                        source: commit_err,
                        original: None,
                    };
                    Err(self.roll_back(uow, commit_fault).await)
                }
            },
            Err(err) => {
                tracing::info!(error = %err, "operation failed; rolling back");
                Err(self.roll_back(uow, err).await)
            }
        }
    }

    /// Rolls back and returns the fault the caller should see.
    async fn roll_back(&self, uow: &mut UnitOfWork, cause: Error) -> Error {
        let rollback = uow.rollback().await;
        let counter = match rollback {
            Ok(()) => &self.rolled_back,
            Err(_) => &self.rollback_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.notify_rollback(uow.id()).await;
        match rollback {
            Ok(()) => cause,
            Err(source) => {
                tracing::error!(error = %source, cause = %cause, "rollback failed");
                Error::Transaction {
                    phase: TransactionPhase::Rollback,
                    source,
                    original: Some(Box::new(cause)),
                }
            }
        }
    }

    async fn notify_commit(&self, tx_id: TransactionId) {
        self.committed.fetch_add(1, Ordering::Relaxed);
        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            if let Err(err) = observer.on_commit(tx_id).await {
                tracing::warn!(error = %err, "commit observer failed");
            }
        }
    }

    async fn notify_rollback(&self, tx_id: TransactionId) {
        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            if let Err(err) = observer.on_rollback(tx_id).await {
                tracing::warn!(error = %err, "rollback observer failed");
            }
        }
    }
}
