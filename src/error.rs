use thiserror::Error;

/// Batch error
///
/// Each variant maps to one collaborator of the chunk engine, so a caller can
/// tell from the failure which side of the read/transform/write cycle broke.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("ItemReader error: {0}")]
    ItemReader(String),

    #[error("ItemProcessor error: {0}")]
    ItemProcessor(String),

    #[error("ItemWriter error: {0}")]
    ItemWriter(String),

    #[error("Execution store error: {0}")]
    StateStore(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Step failed: {0}")]
    Step(String),
}
