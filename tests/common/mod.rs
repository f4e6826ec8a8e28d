//! Shared fixtures for the engine semantics tests: an ordered customer
//! credit source that records which offsets it was asked to fetch, writers
//! with controllable failures, and a transaction manager that records its
//! begin/commit/rollback sequence.
#![allow(dead_code)]

use std::sync::Mutex;

use chunkflow::{
    core::{
        item::{ItemProcessor, ItemProcessorResult, ItemWriter, ItemWriterResult},
        step::StopFlag,
        transaction::{IsolationLevel, TransactionManager},
    },
    error::BatchError,
    item::paging::PageFetcher,
};

#[derive(Clone, Debug, PartialEq)]
pub struct CustomerCredit {
    pub id: u64,
    pub credit: i64,
}

pub fn credits(count: u64) -> Vec<CustomerCredit> {
    (1..=count)
        .map(|id| CustomerCredit {
            id,
            credit: 100 * id as i64,
        })
        .collect()
}

/// Ordered in-memory source that records every fetch offset, so tests can
/// prove which part of the key space was re-read after a restart.
pub struct RecordingFetcher {
    records: Vec<CustomerCredit>,
    pub fetched_offsets: Mutex<Vec<u64>>,
}

impl RecordingFetcher {
    pub fn new(records: Vec<CustomerCredit>) -> Self {
        Self {
            records,
            fetched_offsets: Mutex::new(Vec::new()),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched_offsets.lock().unwrap().len()
    }
}

impl PageFetcher<CustomerCredit> for RecordingFetcher {
    fn fetch(&self, offset: u64, limit: usize) -> Result<Vec<CustomerCredit>, BatchError> {
        self.fetched_offsets.lock().unwrap().push(offset);
        let start = (offset as usize).min(self.records.len());
        let end = (start + limit).min(self.records.len());
        Ok(self.records[start..end].to_vec())
    }
}

/// Increases every credit by a fixed amount, never filters, and records the
/// ids it was asked to transform.
pub struct CreditIncreaseProcessor {
    pub amount: i64,
    pub seen_ids: Mutex<Vec<u64>>,
}

impl CreditIncreaseProcessor {
    pub fn new(amount: i64) -> Self {
        Self {
            amount,
            seen_ids: Mutex::new(Vec::new()),
        }
    }
}

impl ItemProcessor<CustomerCredit, CustomerCredit> for CreditIncreaseProcessor {
    fn process(&self, item: &CustomerCredit) -> ItemProcessorResult<CustomerCredit> {
        self.seen_ids.lock().unwrap().push(item.id);
        Ok(Some(CustomerCredit {
            id: item.id,
            credit: item.credit + self.amount,
        }))
    }
}

/// Filters out records with odd ids.
pub struct EvenIdProcessor;

impl ItemProcessor<CustomerCredit, CustomerCredit> for EvenIdProcessor {
    fn process(&self, item: &CustomerCredit) -> ItemProcessorResult<CustomerCredit> {
        if item.id % 2 == 0 {
            Ok(Some(item.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Fails on one specific id, accepts everything else unchanged.
pub struct FailOnIdProcessor {
    pub failing_id: u64,
}

impl ItemProcessor<CustomerCredit, CustomerCredit> for FailOnIdProcessor {
    fn process(&self, item: &CustomerCredit) -> ItemProcessorResult<CustomerCredit> {
        if item.id == self.failing_id {
            Err(BatchError::ItemProcessor(format!(
                "cannot transform record {}",
                item.id
            )))
        } else {
            Ok(Some(item.clone()))
        }
    }
}

/// Collects each written chunk for later inspection.
#[derive(Default)]
pub struct CollectingWriter {
    pub chunks: Mutex<Vec<Vec<CustomerCredit>>>,
}

impl CollectingWriter {
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn written_ids(&self) -> Vec<Vec<u64>> {
        self.chunks
            .lock()
            .unwrap()
            .iter()
            .map(|chunk| chunk.iter().map(|credit| credit.id).collect())
            .collect()
    }
}

impl ItemWriter<CustomerCredit> for CollectingWriter {
    fn write(&self, items: &[CustomerCredit]) -> ItemWriterResult {
        self.chunks.lock().unwrap().push(items.to_vec());
        Ok(())
    }
}

/// Collects chunks but fails the nth write call (1-based).
pub struct FailingWriter {
    pub collected: CollectingWriter,
    fail_on_call: usize,
    calls: Mutex<usize>,
}

impl FailingWriter {
    pub fn fail_on_call(fail_on_call: usize) -> Self {
        Self {
            collected: CollectingWriter::default(),
            fail_on_call,
            calls: Mutex::new(0),
        }
    }
}

impl ItemWriter<CustomerCredit> for FailingWriter {
    fn write(&self, items: &[CustomerCredit]) -> ItemWriterResult {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls == self.fail_on_call {
            return Err(BatchError::ItemWriter("sink unavailable".to_owned()));
        }
        self.collected.write(items)
    }
}

/// Commits normally but raises the stop flag during the nth write call
/// (1-based), simulating an external stop request arriving mid-run.
pub struct StoppingWriter {
    pub collected: CollectingWriter,
    stop_flag: StopFlag,
    stop_on_call: usize,
    calls: Mutex<usize>,
}

impl StoppingWriter {
    pub fn new(stop_flag: StopFlag, stop_on_call: usize) -> Self {
        Self {
            collected: CollectingWriter::default(),
            stop_flag,
            stop_on_call,
            calls: Mutex::new(0),
        }
    }
}

impl ItemWriter<CustomerCredit> for StoppingWriter {
    fn write(&self, items: &[CustomerCredit]) -> ItemWriterResult {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls == self.stop_on_call {
            self.stop_flag.stop();
        }
        self.collected.write(items)
    }
}

/// Transaction manager recording the sequence of begin/commit/rollback
/// calls.
#[derive(Default)]
pub struct RecordingTransactionManager {
    pub events: Mutex<Vec<&'static str>>,
}

impl RecordingTransactionManager {
    pub fn count_of(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|name| **name == event)
            .count()
    }
}

impl TransactionManager for RecordingTransactionManager {
    fn begin(&self, _isolation: IsolationLevel) -> Result<(), BatchError> {
        self.events.lock().unwrap().push("begin");
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        self.events.lock().unwrap().push("commit");
        Ok(())
    }

    fn rollback(&self) -> Result<(), BatchError> {
        self.events.lock().unwrap().push("rollback");
        Ok(())
    }
}
