#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # chunkflow

 A chunk-oriented batch processing engine: read a bounded or unbounded record
 set page by page, transform each record, write in fixed-size transactional
 groups, and track progress so a failed run resumes without reprocessing
 committed work.

 ## Core concepts

 - **Job**: the whole batch process, composed of one or more steps executed
   in order over a shared execution store.
 - **Step**: one chunk-oriented phase: paginated read, transform,
   transactional chunked write, checkpoint.
 - **ItemReader**: restartable source of input records, one at a time, with
   an opaque resume cursor.
 - **ItemProcessor**: pure transform mapping one input record to zero or one
   output record (filtering allowed).
 - **ItemWriter**: durable sink persisting one chunk per transaction.
 - **ExecutionStore**: persisted job/step execution metadata (status,
   counters, resume cursor) powering restart and auditing.

 ## Example

```rust
use chunkflow::{
    core::{
        item::{ItemProcessor, ItemProcessorResult},
        job::{Job, JobBuilder, JobStatus},
        step::StepBuilder,
    },
    error::BatchError,
    item::paging::{PageFetcher, PagingItemReaderBuilder},
};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq)]
struct CustomerCredit {
    id: u64,
    credit: i64,
}

struct CreditFetcher {
    credits: Vec<CustomerCredit>,
}

impl PageFetcher<CustomerCredit> for CreditFetcher {
    fn fetch(&self, offset: u64, limit: usize) -> Result<Vec<CustomerCredit>, BatchError> {
        let start = (offset as usize).min(self.credits.len());
        let end = (start + limit).min(self.credits.len());
        Ok(self.credits[start..end].to_vec())
    }
}

struct CreditIncreaseProcessor;

impl ItemProcessor<CustomerCredit, CustomerCredit> for CreditIncreaseProcessor {
    fn process(&self, item: &CustomerCredit) -> ItemProcessorResult<CustomerCredit> {
        Ok(Some(CustomerCredit {
            id: item.id,
            credit: item.credit + 1000,
        }))
    }
}

#[derive(Default)]
struct CollectingWriter {
    chunks: Mutex<Vec<Vec<CustomerCredit>>>,
}

impl chunkflow::core::item::ItemWriter<CustomerCredit> for CollectingWriter {
    fn write(&self, items: &[CustomerCredit]) -> chunkflow::core::item::ItemWriterResult {
        self.chunks.lock().unwrap().push(items.to_vec());
        Ok(())
    }
}

fn main() -> Result<(), BatchError> {
    let fetcher = CreditFetcher {
        credits: (1..=5).map(|id| CustomerCredit { id, credit: 100 }).collect(),
    };
    let reader = PagingItemReaderBuilder::new()
        .fetcher(&fetcher)
        .page_size(4)
        .build()?;
    let processor = CreditIncreaseProcessor;
    let writer = CollectingWriter::default();

    let step = StepBuilder::new()
        .name("step1".to_string())
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .chunk(2) // commit interval
        .build()?;

    let job = JobBuilder::new()
        .name("ioSampleJob".to_string())
        .start(&step)
        .build();
    let execution = job.run()?;
    assert_eq!(execution.status, JobStatus::Completed);

    let chunks = writer.chunks.lock().unwrap();
    assert_eq!(chunks.len(), 3); // commits of 2, 2 and 1 records
    assert!(chunks.iter().all(|chunk| chunk.iter().all(|c| c.credit == 1100)));
    Ok(())
}
```

 ## Features

| **Feature**  | **Description**                                                    |
|--------------|--------------------------------------------------------------------|
| logger       | Debug `ItemWriter` that logs records instead of persisting them    |
| rdbc         | sqlx-backed reader, writer, transaction manager and metadata store |
| rdbc-sqlite  | `rdbc` with the SQLite driver                                      |
| rdbc-postgres| `rdbc` with the PostgreSQL driver                                  |
| rdbc-mysql   | `rdbc` with the MySQL/MariaDB driver                               |
| full         | Everything above (with SQLite)                                     |

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Core module for chunk-oriented batch processing
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Set of item readers / writers and their backing integrations
pub mod item;

/// Persistence of job and step execution metadata
pub mod repository;
