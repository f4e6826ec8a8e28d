/// Progress of the chunk currently being accumulated.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ChunkStatus {
    /// The chunk can accept more records.
    Continuable,
    /// The chunk holds `chunk_size` accepted records and must be written.
    Full,
    /// The reader reported end of stream while filling this chunk.
    Finished,
}

/// Transient buffer of transformed records awaiting a single write
/// transaction.
///
/// A chunk also tallies the reads, filtered records and skipped records that
/// happened while filling it. The tallies are folded into the step execution
/// only when the chunk commits, so a rolled back chunk leaves no trace in the
/// persisted counters.
///
/// The boundary is the number of *accepted* records: filtered records do not
/// count towards the chunk size.
pub struct Chunk<W> {
    items: Vec<W>,
    status: ChunkStatus,
    chunk_size: usize,
    read_count: usize,
    filter_count: usize,
    skip_count: usize,
}

impl<W> Chunk<W> {
    pub fn new(chunk_size: usize) -> Chunk<W> {
        Chunk {
            items: Vec::with_capacity(chunk_size),
            status: ChunkStatus::Continuable,
            chunk_size,
            read_count: 0,
            filter_count: 0,
            skip_count: 0,
        }
    }

    /// Appends an accepted record. Marks the chunk full once `chunk_size`
    /// records have been accepted.
    pub fn push(&mut self, item: W) {
        self.items.push(item);
        if self.items.len() == self.chunk_size {
            self.status = ChunkStatus::Full;
        }
    }

    pub fn record_read(&mut self) {
        self.read_count += 1;
    }

    pub fn record_filtered(&mut self) {
        self.filter_count += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skip_count += 1;
    }

    pub fn mark_finished(&mut self) {
        self.status = ChunkStatus::Finished;
    }

    pub fn items(&self) -> &[W] {
        &self.items
    }

    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    pub fn read_count(&self) -> usize {
        self.read_count
    }

    pub fn filter_count(&self) -> usize {
        self.filter_count
    }

    pub fn skip_count(&self) -> usize {
        self.skip_count
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_becomes_full_at_chunk_size_accepted_records() {
        let mut chunk: Chunk<u32> = Chunk::new(2);
        assert_eq!(chunk.status(), ChunkStatus::Continuable);

        chunk.record_read();
        chunk.push(1);
        assert_eq!(chunk.status(), ChunkStatus::Continuable);

        chunk.record_read();
        chunk.push(2);
        assert_eq!(chunk.status(), ChunkStatus::Full);
        assert_eq!(chunk.items(), &[1, 2]);
        assert_eq!(chunk.read_count(), 2);
    }

    #[test]
    fn filtered_records_do_not_fill_the_chunk() {
        let mut chunk: Chunk<u32> = Chunk::new(2);

        chunk.record_read();
        chunk.record_filtered();
        chunk.record_read();
        chunk.push(2);

        assert_eq!(chunk.status(), ChunkStatus::Continuable);
        assert_eq!(chunk.read_count(), 2);
        assert_eq!(chunk.filter_count(), 1);
        assert_eq!(chunk.items(), &[2]);
    }

    #[test]
    fn finished_chunk_keeps_its_partial_items() {
        let mut chunk: Chunk<u32> = Chunk::new(3);
        chunk.record_read();
        chunk.push(1);
        chunk.mark_finished();

        assert_eq!(chunk.status(), ChunkStatus::Finished);
        assert_eq!(chunk.items(), &[1]);
    }
}
