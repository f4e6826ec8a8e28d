use crate::core::step::StepExecution;
use crate::error::BatchError;

/// Opaque resume token produced by an [`ItemReader`].
///
/// A cursor captures everything the reader needs to resume immediately after
/// the last record it returned. The engine never inspects it; it only stores
/// it in the execution context at commit time under [`SOURCE_CURSOR_KEY`].
pub type Cursor = serde_json::Value;

/// Execution context key under which the chunk controller persists the
/// reader's checkpoint cursor.
pub const SOURCE_CURSOR_KEY: &str = "source.cursor";

pub type ItemReaderResult<R> = Result<Option<R>, BatchError>;
pub type ItemProcessorResult<W> = Result<Option<W>, BatchError>;
pub type ItemWriterResult = Result<(), BatchError>;

/// A restartable source of input records.
///
/// Implementations typically page through an underlying ordered query and
/// expose records one at a time, hiding page boundaries from the caller.
///
/// The underlying query must produce a stable total order (for instance, sort
/// by a unique key). Without it, paging across fetches is undefined: rows
/// mutated concurrently can be skipped or duplicated between pages. This is a
/// caller responsibility, not something the engine can enforce.
pub trait ItemReader<R> {
    /// Prepares the reader for a step execution.
    ///
    /// Restartable readers look up their resume cursor in
    /// `execution.execution_context` under [`SOURCE_CURSOR_KEY`] and must skip
    /// every record up to and including that cursor. Job parameters are
    /// available through `execution.job_parameters`.
    fn open(&self, _execution: &StepExecution) -> Result<(), BatchError> {
        Ok(())
    }

    /// Returns the next record, `Ok(None)` at end of stream, or an error on
    /// an underlying read failure. A read failure is fatal to the current
    /// chunk but the already committed chunks are untouched.
    fn read(&self) -> ItemReaderResult<R>;

    /// Returns a cursor resuming immediately after the last record returned
    /// by [`read`](Self::read), or `None` for non-restartable readers.
    fn checkpoint(&self) -> Option<Cursor> {
        None
    }

    fn close(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Transforms one input record into zero or one output record.
///
/// Processors must be pure with respect to shared state: the same input always
/// yields the same output, and the only allowed side effects are the
/// processor's own internal counters.
pub trait ItemProcessor<R, W> {
    /// Returns `Ok(Some(record))` for an accepted record, `Ok(None)` to
    /// filter the record out of the chunk, or an error to fail the chunk
    /// (subject to the step's transform error policy).
    fn process(&self, item: &R) -> ItemProcessorResult<W>;
}

/// Durably persists one chunk of output records.
///
/// `write` is invoked exactly once per committed chunk, always inside the
/// transaction scope owned by the chunk controller. If that transaction rolls
/// back, no partial effect of `write` may remain visible.
pub trait ItemWriter<W> {
    fn write(&self, items: &[W]) -> ItemWriterResult;

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Pass-through processor used when a step declares no processor of its own.
#[derive(Default)]
pub struct DefaultProcessor;

impl<R: Clone> ItemProcessor<R, R> for DefaultProcessor {
    fn process(&self, item: &R) -> ItemProcessorResult<R> {
        Ok(Some(item.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_processor_passes_records_through() {
        let processor = DefaultProcessor;
        let result = processor.process(&21u32).unwrap();
        assert_eq!(result, Some(21));
    }
}
