use log::{error, info};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    core::{
        build_name,
        step::{Step, StepExecution, StepStatus},
    },
    error::BatchError,
    repository::{ExecutionStore, memory::InMemoryExecutionStore},
};

type JobResult<T> = Result<T, BatchError>;

/// Status of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Starting,
    Started,
    Completed,
    Failed,
    Stopped,
}

/// One typed launch parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobParameter {
    String(String),
    Long(i64),
    Double(f64),
    Bool(bool),
}

/// Immutable, ordered mapping of launch parameters.
///
/// Parameters are fixed once the job starts; record sources consume them to
/// parameterize their queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    entries: Vec<(String, JobParameter)>,
}

impl JobParameters {
    pub fn get(&self, key: &str) -> Option<&JobParameter> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(JobParameter::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(JobParameter::Long(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(JobParameter::Double(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(JobParameter::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, JobParameter)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Builder for [`JobParameters`]. Later values win on duplicate keys.
#[derive(Default)]
pub struct JobParametersBuilder {
    entries: Vec<(String, JobParameter)>,
}

impl JobParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_string(self, key: &str, value: &str) -> Self {
        self.add(key, JobParameter::String(value.to_owned()))
    }

    pub fn add_long(self, key: &str, value: i64) -> Self {
        self.add(key, JobParameter::Long(value))
    }

    pub fn add_double(self, key: &str, value: f64) -> Self {
        self.add(key, JobParameter::Double(value))
    }

    pub fn add_bool(self, key: &str, value: bool) -> Self {
        self.add(key, JobParameter::Bool(value))
    }

    fn add(mut self, key: &str, value: JobParameter) -> Self {
        self.entries.retain(|(name, _)| name != key);
        self.entries.push((key.to_owned(), value));
        self
    }

    pub fn build(self) -> JobParameters {
        JobParameters {
            entries: self.entries,
        }
    }
}

/// Identifies one run of a job. Terminal once the status reaches
/// `Completed`, `Failed` or `Stopped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_name: String,
    pub status: JobStatus,
    pub exit_message: Option<String>,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub parameters: JobParameters,
}

impl JobExecution {
    fn new(job_name: &str, parameters: JobParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.to_owned(),
            status: JobStatus::Starting,
            exit_message: None,
            start_time: None,
            end_time: None,
            parameters,
        }
    }
}

/// A launchable batch job.
pub trait Job {
    fn run(&self) -> JobResult<JobExecution>;
}

/// Sequential composition of steps over a shared execution store.
///
/// Before executing a step, the job consults the store for that step's last
/// execution: a completed one is skipped, a failed or stopped one seeds a
/// restart that resumes past the already committed chunks.
pub struct JobInstance<'a> {
    name: String,
    steps: Vec<&'a dyn Step>,
    parameters: JobParameters,
    store: Option<&'a dyn ExecutionStore>,
    default_store: InMemoryExecutionStore,
}

impl JobInstance<'_> {
    fn store(&self) -> &dyn ExecutionStore {
        self.store.unwrap_or(&self.default_store)
    }

    /// Resolves the step execution for this run, or `None` when a prior run
    /// already completed the step.
    fn prepare_step_execution(
        &self,
        step_name: &str,
        store: &dyn ExecutionStore,
    ) -> Result<Option<StepExecution>, BatchError> {
        match store.find_last_step(&self.name, step_name)? {
            Some(previous) if previous.status == StepStatus::Completed => {
                info!(
                    "Step already completed in a prior run, skipping: {}",
                    step_name
                );
                Ok(None)
            }
            Some(previous)
                if previous.status == StepStatus::Failed
                    || previous.status == StepStatus::Stopped =>
            {
                info!("Restarting step from last committed chunk: {}", step_name);
                Ok(Some(StepExecution::restart_of(
                    &previous,
                    self.parameters.clone(),
                )))
            }
            _ => Ok(Some(StepExecution::new(
                &self.name,
                step_name,
                self.parameters.clone(),
            ))),
        }
    }

    fn finish(
        &self,
        mut execution: JobExecution,
        status: JobStatus,
        exit_message: Option<String>,
        store: &dyn ExecutionStore,
    ) -> JobResult<JobExecution> {
        execution.status = status;
        execution.exit_message = exit_message;
        execution.end_time = Some(OffsetDateTime::now_utc());
        store.save_job(&execution)?;
        Ok(execution)
    }
}

impl Job for JobInstance<'_> {
    fn run(&self) -> JobResult<JobExecution> {
        let store = self.store();

        let mut job_execution = JobExecution::new(&self.name, self.parameters.clone());
        info!("Start of job: {}, id: {}", self.name, job_execution.id);

        job_execution.status = JobStatus::Started;
        job_execution.start_time = Some(OffsetDateTime::now_utc());
        store.save_job(&job_execution)?;

        for step in &self.steps {
            let Some(mut step_execution) = self.prepare_step_execution(step.get_name(), store)?
            else {
                continue;
            };

            if let Err(err) = step.execute(&mut step_execution, store) {
                error!("Job failed on step: {}, error: {}", step.get_name(), err);
                self.finish(
                    job_execution,
                    JobStatus::Failed,
                    Some(err.to_string()),
                    store,
                )?;
                return Err(BatchError::Step(step.get_name().to_owned()));
            }

            if step_execution.status == StepStatus::Stopped {
                info!("Job stopped at step boundary: {}", step.get_name());
                return self.finish(job_execution, JobStatus::Stopped, None, store);
            }
        }

        info!("End of job: {}, id: {}", self.name, job_execution.id);
        self.finish(job_execution, JobStatus::Completed, None, store)
    }
}

/// Builder for a job instance.
#[derive(Default)]
pub struct JobBuilder<'a> {
    name: Option<String>,
    steps: Vec<&'a dyn Step>,
    parameters: JobParameters,
    store: Option<&'a dyn ExecutionStore>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: String) -> JobBuilder<'a> {
        self.name = Some(name);
        self
    }

    /// Sets the first step of the job.
    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    /// Adds a step; steps execute in the order they were added.
    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn parameters(mut self, parameters: JobParameters) -> JobBuilder<'a> {
        self.parameters = parameters;
        self
    }

    /// Sets the execution store shared by the job and its steps. Without one
    /// the job falls back to a private in-memory store, which rules out
    /// restart across process runs.
    pub fn repository(mut self, store: &'a dyn ExecutionStore) -> JobBuilder<'a> {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> JobInstance<'a> {
        JobInstance {
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
            parameters: self.parameters,
            store: self.store,
            default_store: InMemoryExecutionStore::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn parameters_keep_insertion_order_and_latest_value() {
        let parameters = JobParametersBuilder::new()
            .add_string("target", "customer_credit")
            .add_long("threshold", 1000)
            .add_long("threshold", 2000)
            .add_bool("dry_run", false)
            .build();

        assert_eq!(parameters.len(), 3);
        assert_eq!(parameters.get_string("target"), Some("customer_credit"));
        assert_eq!(parameters.get_long("threshold"), Some(2000));
        assert_eq!(parameters.get_bool("dry_run"), Some(false));
        assert_eq!(parameters.get_long("missing"), None);
        // type-mismatched access yields nothing
        assert_eq!(parameters.get_string("threshold"), None);
    }

    #[test]
    fn empty_job_completes() -> Result<()> {
        let job = JobBuilder::new().name("empty".to_string()).build();
        let execution = job.run()?;

        assert_eq!(execution.status, JobStatus::Completed);
        assert!(execution.start_time.is_some());
        assert!(execution.end_time.is_some());
        Ok(())
    }
}
