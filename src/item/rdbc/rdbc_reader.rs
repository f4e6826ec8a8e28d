use sqlx::{QueryBuilder, any::AnyRow};

use crate::{error::BatchError, item::paging::PageFetcher, item::rdbc::RdbcTransactionManager};

/// Maps one relational row to a record.
pub trait RdbcRowMapper<T> {
    fn map_row(&self, row: &AnyRow) -> T;
}

/// Page fetcher backed by an SQL query, paged with `LIMIT`/`OFFSET`.
///
/// The query must define a stable total order (an `ORDER BY` on a unique
/// key); offset paging over an unordered query can skip or duplicate rows
/// between fetches. Compose with `PagingItemReader` to get a restartable
/// record source over the query.
pub struct RdbcPageFetcher<'a, T> {
    session: &'a RdbcTransactionManager,
    query: &'a str,
    row_mapper: &'a dyn RdbcRowMapper<T>,
}

impl<T> PageFetcher<T> for RdbcPageFetcher<'_, T> {
    fn fetch(&self, offset: u64, limit: usize) -> Result<Vec<T>, BatchError> {
        let mut query_builder = QueryBuilder::new(self.query);
        query_builder.push(format!(" LIMIT {} OFFSET {}", limit, offset));

        let rows = self
            .session
            .fetch_all(query_builder.build())
            .map_err(|err| BatchError::ItemReader(err.to_string()))?;

        Ok(rows.iter().map(|row| self.row_mapper.map_row(row)).collect())
    }
}

/// Builder for [`RdbcPageFetcher`].
#[derive(Default)]
pub struct RdbcPageFetcherBuilder<'a, T> {
    session: Option<&'a RdbcTransactionManager>,
    query: Option<&'a str>,
    row_mapper: Option<&'a dyn RdbcRowMapper<T>>,
}

impl<'a, T> RdbcPageFetcherBuilder<'a, T> {
    pub fn new() -> Self {
        Self {
            session: None,
            query: None,
            row_mapper: None,
        }
    }

    pub fn session(mut self, session: &'a RdbcTransactionManager) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the source query. It must carry its own `ORDER BY` clause.
    pub fn query(mut self, query: &'a str) -> Self {
        self.query = Some(query);
        self
    }

    pub fn row_mapper(mut self, row_mapper: &'a dyn RdbcRowMapper<T>) -> Self {
        self.row_mapper = Some(row_mapper);
        self
    }

    pub fn build(self) -> Result<RdbcPageFetcher<'a, T>, BatchError> {
        Ok(RdbcPageFetcher {
            session: self
                .session
                .ok_or_else(|| BatchError::Configuration("a session is required".to_owned()))?,
            query: self
                .query
                .ok_or_else(|| BatchError::Configuration("a query is required".to_owned()))?,
            row_mapper: self
                .row_mapper
                .ok_or_else(|| BatchError::Configuration("a row mapper is required".to_owned()))?,
        })
    }
}
