use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use member_unit_of_work::{Result, TransactionAware, TransactionId};

/// Records every lifecycle callback it receives.
#[derive(Default)]
pub struct RecordingObserver {
    commits: RwLock<Vec<TransactionId>>,
    rollbacks: RwLock<Vec<TransactionId>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commits(&self) -> Vec<TransactionId> {
        self.commits.read().clone()
    }

    pub fn rollbacks(&self) -> Vec<TransactionId> {
        self.rollbacks.read().clone()
    }
}

#[async_trait]
impl TransactionAware for RecordingObserver {
    async fn on_commit(&self, tx_id: TransactionId) -> Result<()> {
        self.commits.write().push(tx_id);
        Ok(())
    }

    async fn on_rollback(&self, tx_id: TransactionId) -> Result<()> {
        self.rollbacks.write().push(tx_id);
        Ok(())
    }
}
