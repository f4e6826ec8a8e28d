use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    core::{
        build_name,
        chunk::{Chunk, ChunkStatus},
        context::ExecutionContext,
        item::{DefaultProcessor, ItemProcessor, ItemReader, ItemWriter, SOURCE_CURSOR_KEY},
        job::JobParameters,
        transaction::{
            IsolationLevel, ResourcelessTransactionManager, TransactionGuard, TransactionManager,
        },
    },
    error::BatchError,
    repository::ExecutionStore,
};

/// Status of one step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Starting,
    Started,
    Completed,
    Failed,
    Stopped,
}

/// What to do when the processor fails on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformErrorPolicy {
    /// Fail the chunk: the whole chunk rolls back and the step fails.
    #[default]
    Abort,
    /// Drop the record, count it as skipped and keep going.
    Skip,
}

/// Cloneable stop signal, honored only at chunk boundaries.
///
/// The in-flight chunk always completes or rolls back atomically before the
/// step transitions to [`StepStatus::Stopped`]; no record is left
/// half-processed.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    inner: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Runtime record of one step's progress within one job run.
///
/// Counters and the execution context are updated in the same transaction as
/// each chunk commit, so after a failure they reflect exactly the state of
/// the last committed chunk. A restarted execution is seeded from its failed
/// predecessor through [`StepExecution::restart_of`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: Uuid,
    pub job_name: String,
    pub step_name: String,
    pub status: StepStatus,
    pub read_count: usize,
    pub write_count: usize,
    pub filter_count: usize,
    pub skip_count: usize,
    pub commit_count: usize,
    pub rollback_count: usize,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub exit_message: Option<String>,
    pub execution_context: ExecutionContext,
    pub job_parameters: JobParameters,
}

impl StepExecution {
    pub fn new(job_name: &str, step_name: &str, parameters: JobParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.to_owned(),
            step_name: step_name.to_owned(),
            status: StepStatus::Starting,
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            skip_count: 0,
            commit_count: 0,
            rollback_count: 0,
            start_time: None,
            end_time: None,
            exit_message: None,
            execution_context: ExecutionContext::new(),
            job_parameters: parameters,
        }
    }

    /// Seeds a new execution from a failed or stopped predecessor: counters
    /// and execution context carry over, so the reader resumes past the last
    /// committed chunk and the counters keep accumulating across runs.
    pub fn restart_of(previous: &StepExecution, parameters: JobParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: previous.job_name.clone(),
            step_name: previous.step_name.clone(),
            status: StepStatus::Starting,
            read_count: previous.read_count,
            write_count: previous.write_count,
            filter_count: previous.filter_count,
            skip_count: previous.skip_count,
            commit_count: previous.commit_count,
            rollback_count: previous.rollback_count,
            start_time: None,
            end_time: None,
            exit_message: None,
            execution_context: previous.execution_context.clone(),
            job_parameters: parameters,
        }
    }
}

/// Counter and context state captured before a chunk, restored when the
/// chunk's transaction rolls back.
struct Savepoint {
    read_count: usize,
    write_count: usize,
    filter_count: usize,
    skip_count: usize,
    commit_count: usize,
    context: ExecutionContext,
}

impl Savepoint {
    fn of(execution: &StepExecution) -> Self {
        Self {
            read_count: execution.read_count,
            write_count: execution.write_count,
            filter_count: execution.filter_count,
            skip_count: execution.skip_count,
            commit_count: execution.commit_count,
            context: execution.execution_context.clone(),
        }
    }

    fn restore(self, execution: &mut StepExecution) {
        execution.read_count = self.read_count;
        execution.write_count = self.write_count;
        execution.filter_count = self.filter_count;
        execution.skip_count = self.skip_count;
        execution.commit_count = self.commit_count;
        execution.execution_context = self.context;
    }
}

/// A step that can be executed as part of a job.
pub trait Step {
    fn execute(
        &self,
        execution: &mut StepExecution,
        store: &dyn ExecutionStore,
    ) -> Result<(), BatchError>;

    fn get_name(&self) -> &str;
}

/// Chunk-oriented step: paginated read, transform, transactional chunked
/// write, checkpoint.
///
/// Each iteration opens one transaction, accumulates up to `chunk_size`
/// accepted records, writes them through the sink, folds the chunk tallies
/// and the reader checkpoint into the step execution, persists the execution
/// and commits. Any failure rolls the transaction back and leaves the
/// execution exactly as of the last committed chunk.
pub struct StepInstance<'a, R, W> {
    name: String,
    reader: &'a dyn ItemReader<R>,
    processor: &'a dyn ItemProcessor<R, W>,
    writer: &'a dyn ItemWriter<W>,
    chunk_size: usize,
    isolation: IsolationLevel,
    transaction_manager: &'a dyn TransactionManager,
    transform_error_policy: TransformErrorPolicy,
    stop_flag: StopFlag,
}

impl<R, W> StepInstance<'_, R, W> {
    fn open_resources(&self, execution: &StepExecution) -> Result<(), BatchError> {
        self.reader.open(execution)?;
        self.writer.open()
    }

    fn close_resources(&self) {
        if let Err(err) = self.reader.close() {
            warn!("Error while closing reader: {}", err);
        }
        if let Err(err) = self.writer.close() {
            warn!("Error while closing writer: {}", err);
        }
    }

    fn chunk_loop(
        &self,
        execution: &mut StepExecution,
        store: &dyn ExecutionStore,
    ) -> Result<(), BatchError> {
        loop {
            if self.stop_flag.is_stopped() {
                info!("Stop signal honored at chunk boundary, step: {}", self.name);
                execution.status = StepStatus::Stopped;
                return Ok(());
            }

            let savepoint = Savepoint::of(execution);
            let mut chunk = Chunk::new(self.chunk_size);

            match self.run_chunk(&mut chunk, execution, store) {
                Ok(()) => {
                    if chunk.status() == ChunkStatus::Finished {
                        execution.status = StepStatus::Completed;
                        return Ok(());
                    }
                }
                Err(err) => {
                    savepoint.restore(execution);
                    execution.rollback_count += 1;
                    return Err(err);
                }
            }
        }
    }

    /// Runs one full chunk iteration inside a single transaction scope.
    fn run_chunk(
        &self,
        chunk: &mut Chunk<W>,
        execution: &mut StepExecution,
        store: &dyn ExecutionStore,
    ) -> Result<(), BatchError> {
        let transaction = TransactionGuard::begin(self.transaction_manager, self.isolation)?;

        self.fill_chunk(chunk)?;

        // Nothing was read at all: no progress to record, no commit.
        if chunk.status() == ChunkStatus::Finished && chunk.read_count() == 0 {
            return Ok(());
        }

        if !chunk.is_empty() {
            debug!("Writing chunk of {} records", chunk.items().len());
            self.writer.write(chunk.items())?;
        }

        // Counter and cursor updates ride in the same transaction as the
        // sink write, so they are atomically consistent with it.
        execution.read_count += chunk.read_count();
        execution.filter_count += chunk.filter_count();
        execution.skip_count += chunk.skip_count();
        if !chunk.is_empty() {
            execution.write_count += chunk.items().len();
            execution.commit_count += 1;
        }
        if let Some(cursor) = self.reader.checkpoint() {
            execution.execution_context.put(SOURCE_CURSOR_KEY, &cursor);
        }
        store.save_step(execution)?;

        transaction.commit()?;
        debug!(
            "Chunk committed, step: {}, commits: {}",
            self.name, execution.commit_count
        );
        Ok(())
    }

    fn fill_chunk(&self, chunk: &mut Chunk<W>) -> Result<(), BatchError> {
        debug!("Start reading chunk");

        while chunk.status() == ChunkStatus::Continuable {
            match self.reader.read()? {
                None => chunk.mark_finished(),
                Some(item) => {
                    chunk.record_read();
                    match self.processor.process(&item) {
                        Ok(Some(output)) => chunk.push(output),
                        Ok(None) => chunk.record_filtered(),
                        Err(err) => match self.transform_error_policy {
                            TransformErrorPolicy::Abort => return Err(err),
                            TransformErrorPolicy::Skip => {
                                warn!("Record skipped after transform failure: {}", err);
                                chunk.record_skipped();
                            }
                        },
                    }
                }
            }
        }

        debug!("End reading chunk: {:?}", chunk.status());
        Ok(())
    }
}

impl<R, W> Step for StepInstance<'_, R, W> {
    fn execute(
        &self,
        execution: &mut StepExecution,
        store: &dyn ExecutionStore,
    ) -> Result<(), BatchError> {
        info!("Start of step: {}", self.name);

        execution.status = StepStatus::Started;
        execution.start_time = Some(OffsetDateTime::now_utc());
        store.save_step(execution)?;

        let outcome = match self.open_resources(execution) {
            Ok(()) => {
                let result = self.chunk_loop(execution, store);
                self.close_resources();
                result
            }
            Err(err) => Err(err),
        };

        execution.end_time = Some(OffsetDateTime::now_utc());

        match outcome {
            Ok(()) => {
                store.save_step(execution)?;
                info!("End of step: {}, status: {:?}", self.name, execution.status);
                Ok(())
            }
            Err(err) => {
                execution.status = StepStatus::Failed;
                execution.exit_message = Some(err.to_string());
                store.save_step(execution)?;
                error!("Step failed: {}, error: {}", self.name, err);
                Err(err)
            }
        }
    }

    fn get_name(&self) -> &str {
        &self.name
    }
}

/// Builder for chunk-oriented steps.
///
/// `chunk` is the commit interval: the number of accepted records written per
/// transaction. Smaller chunks mean more frequent transactions but less
/// reprocessed work on restart.
pub struct StepBuilder<'a, R, W> {
    name: Option<String>,
    reader: Option<&'a dyn ItemReader<R>>,
    processor: Option<&'a dyn ItemProcessor<R, W>>,
    writer: Option<&'a dyn ItemWriter<W>>,
    chunk_size: usize,
    isolation: IsolationLevel,
    transaction_manager: Option<&'a dyn TransactionManager>,
    transform_error_policy: TransformErrorPolicy,
    stop_flag: Option<StopFlag>,
}

impl<'a, R, W> Default for StepBuilder<'a, R, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, R, W> StepBuilder<'a, R, W> {
    pub fn new() -> StepBuilder<'a, R, W> {
        Self {
            name: None,
            reader: None,
            processor: None,
            writer: None,
            chunk_size: 1,
            isolation: IsolationLevel::Default,
            transaction_manager: None,
            transform_error_policy: TransformErrorPolicy::default(),
            stop_flag: None,
        }
    }

    pub fn name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn reader(mut self, reader: &'a impl ItemReader<R>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a impl ItemProcessor<R, W>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a impl ItemWriter<W>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Sets the commit interval in accepted records per transaction.
    pub fn chunk(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn transaction_manager(mut self, manager: &'a dyn TransactionManager) -> Self {
        self.transaction_manager = Some(manager);
        self
    }

    pub fn transform_error_policy(mut self, policy: TransformErrorPolicy) -> Self {
        self.transform_error_policy = policy;
        self
    }

    pub fn stop_flag(mut self, stop_flag: StopFlag) -> Self {
        self.stop_flag = Some(stop_flag);
        self
    }

    /// Validates the configuration and builds the step. Fails fast with
    /// [`BatchError::Configuration`] before any record is read.
    pub fn build(self) -> Result<StepInstance<'a, R, W>, BatchError>
    where
        DefaultProcessor: ItemProcessor<R, W>,
    {
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(
                "chunk size must be at least 1".to_owned(),
            ));
        }

        let reader = self
            .reader
            .ok_or_else(|| BatchError::Configuration("a reader is required".to_owned()))?;
        let writer = self
            .writer
            .ok_or_else(|| BatchError::Configuration("a writer is required".to_owned()))?;

        Ok(StepInstance {
            name: self.name.unwrap_or_else(build_name),
            reader,
            processor: self.processor.unwrap_or(&DefaultProcessor),
            writer,
            chunk_size: self.chunk_size,
            isolation: self.isolation,
            transaction_manager: self
                .transaction_manager
                .unwrap_or(&ResourcelessTransactionManager),
            transform_error_policy: self.transform_error_policy,
            stop_flag: self.stop_flag.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_flag_propagates_to_clones() {
        let flag = StopFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_stopped());

        flag.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn restart_carries_counters_and_context() {
        let mut previous =
            StepExecution::new("ioSampleJob", "step1", JobParameters::default());
        previous.read_count = 4;
        previous.write_count = 4;
        previous.commit_count = 2;
        previous.rollback_count = 1;
        previous.status = StepStatus::Failed;
        previous.execution_context.put("source.cursor", &4u64);

        let restarted = StepExecution::restart_of(&previous, JobParameters::default());

        assert_ne!(restarted.id, previous.id);
        assert_eq!(restarted.status, StepStatus::Starting);
        assert_eq!(restarted.read_count, 4);
        assert_eq!(restarted.commit_count, 2);
        assert_eq!(restarted.execution_context.get::<u64>("source.cursor"), Some(4));
        assert!(restarted.exit_message.is_none());
    }

    #[test]
    fn build_rejects_zero_chunk_size() {
        struct NoopReader;
        impl ItemReader<u32> for NoopReader {
            fn read(&self) -> crate::core::item::ItemReaderResult<u32> {
                Ok(None)
            }
        }
        struct NoopWriter;
        impl ItemWriter<u32> for NoopWriter {
            fn write(&self, _items: &[u32]) -> crate::core::item::ItemWriterResult {
                Ok(())
            }
        }

        let reader = NoopReader;
        let writer = NoopWriter;
        let result: Result<StepInstance<u32, u32>, BatchError> = StepBuilder::new()
            .reader(&reader)
            .writer(&writer)
            .chunk(0)
            .build();

        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn build_requires_a_reader_and_a_writer() {
        let result: Result<StepInstance<u32, u32>, BatchError> = StepBuilder::new().build();
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
