use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use log::debug;

use crate::{
    core::{
        item::{Cursor, ItemReader, ItemReaderResult, SOURCE_CURSOR_KEY},
        step::StepExecution,
    },
    error::BatchError,
};

/// Strategy fetching one fixed-size page from an ordered source.
///
/// `offset` is the number of records already consumed from the source; the
/// fetcher must return the next `limit` records of the total order starting
/// there, or fewer (possibly none) at the end of the set. The order must be
/// stable across fetches, e.g. backed by a sort on a unique key.
pub trait PageFetcher<R> {
    fn fetch(&self, offset: u64, limit: usize) -> Result<Vec<R>, BatchError>;
}

/// Restartable reader that pages through a [`PageFetcher`] and exposes
/// records one at a time, hiding page boundaries from the caller.
///
/// The page size is a pure fetch-granularity knob, independent of the step's
/// chunk size. The checkpoint cursor is the count of records handed out so
/// far; on open the reader seeks straight to the persisted cursor, so records
/// of committed chunks are never fetched again.
pub struct PagingItemReader<'a, R> {
    fetcher: &'a dyn PageFetcher<R>,
    page_size: usize,
    position: Cell<u64>,
    buffer: RefCell<VecDeque<R>>,
    exhausted: Cell<bool>,
}

impl<'a, R> PagingItemReader<'a, R> {
    fn new(fetcher: &'a dyn PageFetcher<R>, page_size: usize) -> Self {
        Self {
            fetcher,
            page_size,
            position: Cell::new(0),
            buffer: RefCell::new(VecDeque::with_capacity(page_size)),
            exhausted: Cell::new(false),
        }
    }
}

impl<R> ItemReader<R> for PagingItemReader<'_, R> {
    fn open(&self, execution: &StepExecution) -> Result<(), BatchError> {
        let resume = execution
            .execution_context
            .get::<u64>(SOURCE_CURSOR_KEY)
            .unwrap_or(0);
        debug!("Opening paging reader at offset {}", resume);

        self.position.set(resume);
        self.buffer.borrow_mut().clear();
        self.exhausted.set(false);
        Ok(())
    }

    fn read(&self) -> ItemReaderResult<R> {
        if self.exhausted.get() {
            return Ok(None);
        }

        if self.buffer.borrow().is_empty() {
            let page = self.fetcher.fetch(self.position.get(), self.page_size)?;
            if page.is_empty() {
                self.exhausted.set(true);
                return Ok(None);
            }
            self.buffer.borrow_mut().extend(page);
        }

        let item = self.buffer.borrow_mut().pop_front();
        if item.is_some() {
            self.position.set(self.position.get() + 1);
        }
        Ok(item)
    }

    fn checkpoint(&self) -> Option<Cursor> {
        Some(Cursor::from(self.position.get()))
    }
}

/// Builder for [`PagingItemReader`].
pub struct PagingItemReaderBuilder<'a, R> {
    fetcher: Option<&'a dyn PageFetcher<R>>,
    page_size: usize,
}

impl<'a, R> Default for PagingItemReaderBuilder<'a, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, R> PagingItemReaderBuilder<'a, R> {
    pub fn new() -> Self {
        Self {
            fetcher: None,
            page_size: 10,
        }
    }

    pub fn fetcher(mut self, fetcher: &'a dyn PageFetcher<R>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the fetch granularity, independent of the step's chunk size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn build(self) -> Result<PagingItemReader<'a, R>, BatchError> {
        if self.page_size == 0 {
            return Err(BatchError::Configuration(
                "page size must be at least 1".to_owned(),
            ));
        }
        let fetcher = self
            .fetcher
            .ok_or_else(|| BatchError::Configuration("a page fetcher is required".to_owned()))?;

        Ok(PagingItemReader::new(fetcher, self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::job::JobParameters;

    struct VecFetcher {
        records: Vec<u32>,
        fetched_offsets: Mutex<Vec<u64>>,
    }

    impl VecFetcher {
        fn new(records: Vec<u32>) -> Self {
            Self {
                records,
                fetched_offsets: Mutex::new(Vec::new()),
            }
        }
    }

    impl PageFetcher<u32> for VecFetcher {
        fn fetch(&self, offset: u64, limit: usize) -> Result<Vec<u32>, BatchError> {
            self.fetched_offsets.lock().unwrap().push(offset);
            let start = (offset as usize).min(self.records.len());
            let end = (start + limit).min(self.records.len());
            Ok(self.records[start..end].to_vec())
        }
    }

    fn drain<R>(reader: &impl ItemReader<R>) -> Vec<R> {
        let mut items = Vec::new();
        while let Some(item) = reader.read().unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn hides_page_boundaries_from_the_caller() {
        let fetcher = VecFetcher::new((1..=7).collect());
        let reader = PagingItemReaderBuilder::new()
            .fetcher(&fetcher)
            .page_size(3)
            .build()
            .unwrap();

        let execution = StepExecution::new("job", "step", JobParameters::default());
        reader.open(&execution).unwrap();

        assert_eq!(drain(&reader), vec![1, 2, 3, 4, 5, 6, 7]);
        // pages of 3 fetched at offsets 0, 3 and 6, then one empty fetch
        // signalling exhaustion
        assert_eq!(*fetcher.fetched_offsets.lock().unwrap(), vec![0, 3, 6, 7]);

        // reading past the end stays at end of stream
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn checkpoint_counts_records_handed_out() {
        let fetcher = VecFetcher::new((1..=5).collect());
        let reader = PagingItemReaderBuilder::new()
            .fetcher(&fetcher)
            .page_size(2)
            .build()
            .unwrap();

        let execution = StepExecution::new("job", "step", JobParameters::default());
        reader.open(&execution).unwrap();

        assert_eq!(reader.checkpoint(), Some(Cursor::from(0u64)));
        reader.read().unwrap();
        reader.read().unwrap();
        reader.read().unwrap();
        assert_eq!(reader.checkpoint(), Some(Cursor::from(3u64)));
    }

    #[test]
    fn open_resumes_past_the_persisted_cursor() {
        let fetcher = VecFetcher::new((1..=6).collect());
        let reader = PagingItemReaderBuilder::new()
            .fetcher(&fetcher)
            .page_size(2)
            .build()
            .unwrap();

        let mut execution = StepExecution::new("job", "step", JobParameters::default());
        execution
            .execution_context
            .put(SOURCE_CURSOR_KEY, &Cursor::from(4u64));
        reader.open(&execution).unwrap();

        assert_eq!(drain(&reader), vec![5, 6]);
        // no fetch ever went below the resume offset
        assert!(
            fetcher
                .fetched_offsets
                .lock()
                .unwrap()
                .iter()
                .all(|offset| *offset >= 4)
        );
    }

    #[test]
    fn build_rejects_zero_page_size() {
        let fetcher = VecFetcher::new(vec![]);
        let result = PagingItemReaderBuilder::new()
            .fetcher(&fetcher)
            .page_size(0)
            .build();

        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
