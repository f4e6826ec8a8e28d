use std::{collections::HashMap, sync::Mutex};

use uuid::Uuid;

use crate::{
    core::{job::JobExecution, step::StepExecution},
    error::BatchError,
    repository::ExecutionStore,
};

/// In-memory execution store.
///
/// Supports restart within one process (run a job to failure, then run it
/// again against the same store) but offers no durability: pair it with a
/// database-backed store for anything that must survive a crash.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    jobs: Mutex<HashMap<Uuid, JobExecution>>,
    steps: Mutex<Vec<StepExecution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error() -> BatchError {
        BatchError::StateStore("execution store mutex poisoned".to_owned())
    }
}

impl ExecutionStore for InMemoryExecutionStore {
    fn save_job(&self, execution: &JobExecution) -> Result<(), BatchError> {
        let mut jobs = self.jobs.lock().map_err(|_| Self::lock_error())?;
        jobs.insert(execution.id, execution.clone());
        Ok(())
    }

    fn save_step(&self, execution: &StepExecution) -> Result<(), BatchError> {
        let mut steps = self.steps.lock().map_err(|_| Self::lock_error())?;
        match steps.iter_mut().find(|step| step.id == execution.id) {
            Some(existing) => *existing = execution.clone(),
            None => steps.push(execution.clone()),
        }
        Ok(())
    }

    fn find_step(&self, id: Uuid) -> Result<Option<StepExecution>, BatchError> {
        let steps = self.steps.lock().map_err(|_| Self::lock_error())?;
        Ok(steps.iter().find(|step| step.id == id).cloned())
    }

    fn find_last_step(
        &self,
        job_name: &str,
        step_name: &str,
    ) -> Result<Option<StepExecution>, BatchError> {
        let steps = self.steps.lock().map_err(|_| Self::lock_error())?;
        // insertion order doubles as execution order
        Ok(steps
            .iter()
            .rev()
            .find(|step| step.job_name == job_name && step.step_name == step_name)
            .cloned())
    }
}
