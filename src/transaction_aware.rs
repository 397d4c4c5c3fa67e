use async_trait::async_trait;

use crate::{Result, TransactionId};

/// Trait for components that need to be notified of transaction lifecycle events.
///
/// Observers are registered on a [`TransactionCoordinator`](crate::TransactionCoordinator)
/// and called after the boundary has been crossed, so they can update caches
/// or record outcomes. A failing observer is logged and never changes the
/// outcome of the unit of work.
#[async_trait]
pub trait TransactionAware: Send + Sync {
    /// Called after a successful commit.
    async fn on_commit(&self, tx_id: TransactionId) -> Result<()>;

    /// Called after a rollback, including one that followed a failed commit.
    async fn on_rollback(&self, tx_id: TransactionId) -> Result<()>;
}
