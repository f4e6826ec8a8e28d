use std::fmt::Debug;

use log::info;

use crate::core::item::{ItemWriter, ItemWriterResult};

/// Debug sink that logs every record instead of persisting it.
///
/// Useful for dry runs and for inspecting what a step would write. The writer
/// has no transactional backend, so pair it with the resourceless transaction
/// manager.
#[derive(Default)]
pub struct LoggerWriter;

impl<T> ItemWriter<T> for LoggerWriter
where
    T: Debug,
{
    fn write(&self, items: &[T]) -> ItemWriterResult {
        info!("Writing chunk of {} records", items.len());
        items.iter().for_each(|item| info!("Record: {:?}", item));
        Ok(())
    }
}
