/// Restartable paging reader over a pluggable page fetcher.
pub mod paging;

#[cfg(feature = "logger")]
/// Debug item writer that logs records instead of persisting them.
pub mod logger;

#[cfg(feature = "rdbc")]
/// Relational reader, writer and transaction manager backed by sqlx.
pub mod rdbc;
