use log::error;

use crate::error::BatchError;

/// Transaction isolation requested for chunk commits.
///
/// Some backends cannot honor a non-default level for the engine's own
/// metadata writes; managers are expected to fall back to `Default` and log a
/// warning rather than fail (see `RdbcTransactionManager`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Owns the transactional resource shared by the record sink and the
/// execution store.
///
/// The chunk controller opens exactly one transaction per chunk and never
/// nests them. A manager is free to be a no-op when the sink has no
/// transactional backend; see [`ResourcelessTransactionManager`].
pub trait TransactionManager {
    fn begin(&self, isolation: IsolationLevel) -> Result<(), BatchError>;
    fn commit(&self) -> Result<(), BatchError>;
    fn rollback(&self) -> Result<(), BatchError>;
}

/// No-op transaction manager for sinks without a transactional backend.
///
/// With this manager a chunk that fails mid-write may leave partial sink
/// effects behind, and a crash between the sink write and the state store
/// write can lose progress tracking. Restarting after such a failure
/// reprocesses the interrupted chunk: at-least-once delivery. Use a real
/// manager (for instance the rdbc one) when the sink and the store share a
/// transactional resource.
#[derive(Default)]
pub struct ResourcelessTransactionManager;

impl TransactionManager for ResourcelessTransactionManager {
    fn begin(&self, _isolation: IsolationLevel) -> Result<(), BatchError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Scoped transaction: commits exactly once or rolls back on every other
/// exit path, including panics and early returns.
pub struct TransactionGuard<'a> {
    manager: &'a dyn TransactionManager,
    completed: bool,
}

impl<'a> TransactionGuard<'a> {
    pub fn begin(
        manager: &'a dyn TransactionManager,
        isolation: IsolationLevel,
    ) -> Result<Self, BatchError> {
        manager.begin(isolation)?;
        Ok(Self {
            manager,
            completed: false,
        })
    }

    /// Commits the transaction, consuming the guard. After a failed commit
    /// the transaction is gone; the guard does not attempt a rollback on top.
    pub fn commit(mut self) -> Result<(), BatchError> {
        self.completed = true;
        self.manager.commit()
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            if let Err(err) = self.manager.rollback() {
                error!("Transaction rollback failed: {}", err);
            }
        }
    }
}
