use sqlx::{Any, QueryBuilder, query_builder::Separated};

use crate::{
    core::item::{ItemWriter, ItemWriterResult},
    error::BatchError,
    item::rdbc::RdbcTransactionManager,
};

// The number of bind parameters in MySQL must fit in a `u16`.
const BIND_LIMIT: usize = 65535;

/// Binds one record's values onto a multi-row INSERT statement, in column
/// declaration order.
pub trait RdbcItemBinder<T> {
    fn bind(&self, item: &T, query_builder: Separated<Any, &str>);
}

/// Sink inserting each chunk into a target table with one multi-row INSERT.
///
/// Statements run through the shared [`RdbcTransactionManager`], so the
/// insert only becomes visible when the chunk controller commits; on rollback
/// no partial effect remains.
pub struct RdbcItemWriter<'a, W> {
    session: &'a RdbcTransactionManager,
    table: &'a str,
    columns: Vec<&'a str>,
    item_binder: &'a dyn RdbcItemBinder<W>,
}

impl<W> ItemWriter<W> for RdbcItemWriter<'_, W> {
    fn write(&self, items: &[W]) -> ItemWriterResult {
        if items.is_empty() {
            return Ok(());
        }

        // Refuse instead of silently truncating: a partial write would break
        // the chunk's exactly-once accounting.
        if items.len() * self.columns.len() > BIND_LIMIT {
            return Err(BatchError::ItemWriter(format!(
                "chunk of {} records exceeds the {} bind parameter limit",
                items.len(),
                BIND_LIMIT
            )));
        }

        let mut query_builder = QueryBuilder::new("INSERT INTO ");
        query_builder.push(self.table);
        query_builder.push(" (");
        query_builder.push(self.columns.join(","));
        query_builder.push(") ");
        query_builder.push_values(items.iter(), |builder, item| {
            self.item_binder.bind(item, builder);
        });

        self.session
            .execute(query_builder.build())
            .map_err(|err| BatchError::ItemWriter(err.to_string()))?;

        Ok(())
    }
}

/// Builder for [`RdbcItemWriter`].
#[derive(Default)]
pub struct RdbcItemWriterBuilder<'a, T> {
    session: Option<&'a RdbcTransactionManager>,
    table: Option<&'a str>,
    columns: Vec<&'a str>,
    item_binder: Option<&'a dyn RdbcItemBinder<T>>,
}

impl<'a, T> RdbcItemWriterBuilder<'a, T> {
    pub fn new() -> Self {
        Self {
            session: None,
            table: None,
            columns: Vec::new(),
            item_binder: None,
        }
    }

    pub fn session(mut self, session: &'a RdbcTransactionManager) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the destination table.
    pub fn table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    pub fn add_column(mut self, column: &'a str) -> Self {
        self.columns.push(column);
        self
    }

    pub fn item_binder(mut self, item_binder: &'a dyn RdbcItemBinder<T>) -> Self {
        self.item_binder = Some(item_binder);
        self
    }

    pub fn build(self) -> Result<RdbcItemWriter<'a, T>, BatchError> {
        if self.columns.is_empty() {
            return Err(BatchError::Configuration(
                "one or more columns are required".to_owned(),
            ));
        }

        Ok(RdbcItemWriter {
            session: self
                .session
                .ok_or_else(|| BatchError::Configuration("a session is required".to_owned()))?,
            table: self
                .table
                .ok_or_else(|| BatchError::Configuration("a table name is required".to_owned()))?,
            columns: self.columns,
            item_binder: self
                .item_binder
                .ok_or_else(|| BatchError::Configuration("an item binder is required".to_owned()))?,
        })
    }
}
