//! Persistence of job and step execution metadata.
//!
//! The store is what makes a failed run restartable: the chunk controller
//! saves the step execution (counters plus resume cursor) inside the same
//! transaction as each chunk commit, and a later run reads it back to seed
//! the restart.

use uuid::Uuid;

use crate::{
    core::{job::JobExecution, step::StepExecution},
    error::BatchError,
};

pub mod memory;

#[cfg(feature = "rdbc")]
pub mod rdbc;

/// Durable store for execution metadata.
///
/// `save_step` is called from within the chunk transaction scope, so a store
/// sharing the sink's transactional resource commits metadata and data
/// atomically. A store on a separate resource degrades to at-least-once
/// semantics on restart: data may be committed without the matching progress
/// record.
pub trait ExecutionStore {
    fn save_job(&self, execution: &JobExecution) -> Result<(), BatchError>;

    /// Saves or replaces the step execution identified by `execution.id`.
    fn save_step(&self, execution: &StepExecution) -> Result<(), BatchError>;

    fn find_step(&self, id: Uuid) -> Result<Option<StepExecution>, BatchError>;

    /// Returns the most recently started execution of the given step across
    /// all runs of the given job, if any.
    fn find_last_step(
        &self,
        job_name: &str,
        step_name: &str,
    ) -> Result<Option<StepExecution>, BatchError>;
}
