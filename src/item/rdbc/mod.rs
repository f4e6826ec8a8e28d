//! Relational source, sink and transaction plumbing over a `sqlx` `Any`
//! pool.
//!
//! Everything in this module routes its statements through one
//! [`RdbcTransactionManager`], so the sink write, the execution metadata and
//! the commit all happen on a single transactional resource. That is what
//! closes the window between "data written" and "progress recorded".

pub mod rdbc_reader;

pub mod rdbc_writer;

use std::cell::RefCell;
use std::future::Future;

use log::warn;
use sqlx::{
    Any, Pool, Transaction,
    any::{AnyArguments, AnyQueryResult, AnyRow},
    query::Query,
};

use crate::{
    core::transaction::{IsolationLevel, TransactionManager},
    error::BatchError,
};

/// Transaction manager bound to a `sqlx` `Any` pool.
///
/// While a transaction is active, every statement issued through
/// [`execute`](Self::execute) / [`fetch_all`](Self::fetch_all) runs on that
/// transaction's connection; outside one, statements run directly on the
/// pool. The engine is synchronous, so the async pool is driven with
/// `block_in_place` on the ambient tokio runtime.
///
/// The `Any` driver cannot apply a per-transaction isolation level, so any
/// request other than [`IsolationLevel::Default`] falls back to the backend
/// default with a warning.
pub struct RdbcTransactionManager {
    pool: Pool<Any>,
    current: RefCell<Option<Transaction<'static, Any>>>,
}

impl RdbcTransactionManager {
    pub fn new(pool: Pool<Any>) -> Self {
        Self {
            pool,
            current: RefCell::new(None),
        }
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
    }

    /// Runs a statement on the active transaction, or on the pool when no
    /// transaction is open.
    pub fn execute<'q>(
        &self,
        query: Query<'q, Any, AnyArguments<'q>>,
    ) -> Result<AnyQueryResult, sqlx::Error> {
        Self::block_on(async {
            let mut current = self.current.borrow_mut();
            match current.as_mut() {
                Some(transaction) => query.execute(&mut **transaction).await,
                None => query.execute(&self.pool).await,
            }
        })
    }

    /// Fetches all rows of a query on the active transaction, or on the pool
    /// when no transaction is open.
    pub fn fetch_all<'q>(
        &self,
        query: Query<'q, Any, AnyArguments<'q>>,
    ) -> Result<Vec<AnyRow>, sqlx::Error> {
        Self::block_on(async {
            let mut current = self.current.borrow_mut();
            match current.as_mut() {
                Some(transaction) => query.fetch_all(&mut **transaction).await,
                None => query.fetch_all(&self.pool).await,
            }
        })
    }
}

impl TransactionManager for RdbcTransactionManager {
    fn begin(&self, isolation: IsolationLevel) -> Result<(), BatchError> {
        if isolation != IsolationLevel::Default {
            warn!(
                "Isolation level {:?} is not supported by the Any driver, falling back to Default",
                isolation
            );
        }

        if self.current.borrow().is_some() {
            return Err(BatchError::Transaction(
                "a transaction is already active".to_owned(),
            ));
        }

        let transaction = Self::block_on(self.pool.begin())
            .map_err(|err| BatchError::Transaction(err.to_string()))?;
        *self.current.borrow_mut() = Some(transaction);
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        let transaction = self
            .current
            .borrow_mut()
            .take()
            .ok_or_else(|| BatchError::Transaction("no active transaction to commit".to_owned()))?;

        Self::block_on(transaction.commit()).map_err(|err| BatchError::Transaction(err.to_string()))
    }

    fn rollback(&self) -> Result<(), BatchError> {
        // rolling back with no active transaction is a no-op
        let Some(transaction) = self.current.borrow_mut().take() else {
            return Ok(());
        };

        Self::block_on(transaction.rollback())
            .map_err(|err| BatchError::Transaction(err.to_string()))
    }
}
