use sqlx::{QueryBuilder, Row, any::AnyRow};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{
    core::{
        context::ExecutionContext,
        job::{JobExecution, JobParameters, JobStatus},
        step::{StepExecution, StepStatus},
    },
    error::BatchError,
    item::rdbc::RdbcTransactionManager,
    repository::ExecutionStore,
};

const CREATE_JOB_TABLE: &str = "CREATE TABLE IF NOT EXISTS batch_job_execution (
    id TEXT PRIMARY KEY,
    job_name TEXT NOT NULL,
    status TEXT NOT NULL,
    exit_message TEXT,
    start_time TEXT,
    end_time TEXT,
    parameters TEXT NOT NULL,
    updated_at BIGINT NOT NULL
)";

const CREATE_STEP_TABLE: &str = "CREATE TABLE IF NOT EXISTS batch_step_execution (
    id TEXT PRIMARY KEY,
    job_name TEXT NOT NULL,
    step_name TEXT NOT NULL,
    status TEXT NOT NULL,
    read_count BIGINT NOT NULL,
    write_count BIGINT NOT NULL,
    filter_count BIGINT NOT NULL,
    skip_count BIGINT NOT NULL,
    commit_count BIGINT NOT NULL,
    rollback_count BIGINT NOT NULL,
    exit_message TEXT,
    start_time TEXT,
    end_time TEXT,
    execution_context TEXT NOT NULL,
    job_parameters TEXT NOT NULL,
    updated_at BIGINT NOT NULL
)";

/// Execution store persisting metadata through the shared rdbc session.
///
/// `save_step` runs on the session's active transaction when the chunk
/// controller holds one open, so the step counters, the resume cursor and the
/// sink's inserts commit atomically.
pub struct RdbcExecutionStore<'a> {
    session: &'a RdbcTransactionManager,
}

impl<'a> RdbcExecutionStore<'a> {
    pub fn new(session: &'a RdbcTransactionManager) -> Self {
        Self { session }
    }

    /// Creates the metadata tables when they do not exist yet.
    pub fn setup_schema(&self) -> Result<(), BatchError> {
        for statement in [CREATE_JOB_TABLE, CREATE_STEP_TABLE] {
            self.session
                .execute(sqlx::query(statement))
                .map_err(|err| BatchError::StateStore(err.to_string()))?;
        }
        Ok(())
    }
}

fn store_error(err: impl ToString) -> BatchError {
    BatchError::StateStore(err.to_string())
}

fn job_status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Starting => "STARTING",
        JobStatus::Started => "STARTED",
        JobStatus::Completed => "COMPLETED",
        JobStatus::Failed => "FAILED",
        JobStatus::Stopped => "STOPPED",
    }
}

fn step_status_to_str(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Starting => "STARTING",
        StepStatus::Started => "STARTED",
        StepStatus::Completed => "COMPLETED",
        StepStatus::Failed => "FAILED",
        StepStatus::Stopped => "STOPPED",
    }
}

fn step_status_from_str(value: &str) -> Result<StepStatus, BatchError> {
    match value {
        "STARTING" => Ok(StepStatus::Starting),
        "STARTED" => Ok(StepStatus::Started),
        "COMPLETED" => Ok(StepStatus::Completed),
        "FAILED" => Ok(StepStatus::Failed),
        "STOPPED" => Ok(StepStatus::Stopped),
        other => Err(store_error(format!("unknown step status: {}", other))),
    }
}

fn format_time(value: Option<OffsetDateTime>) -> Result<Option<String>, BatchError> {
    value
        .map(|time| time.format(&Rfc3339).map_err(store_error))
        .transpose()
}

fn parse_time(value: Option<String>) -> Result<Option<OffsetDateTime>, BatchError> {
    value
        .map(|text| OffsetDateTime::parse(&text, &Rfc3339).map_err(store_error))
        .transpose()
}

fn map_step_row(row: &AnyRow) -> Result<StepExecution, BatchError> {
    let id: String = row.try_get("id").map_err(store_error)?;
    let status: String = row.try_get("status").map_err(store_error)?;
    let context: String = row.try_get("execution_context").map_err(store_error)?;
    let parameters: String = row.try_get("job_parameters").map_err(store_error)?;
    let start_time: Option<String> = row.try_get("start_time").map_err(store_error)?;
    let end_time: Option<String> = row.try_get("end_time").map_err(store_error)?;

    let count = |column: &str| -> Result<usize, BatchError> {
        let value: i64 = row.try_get(column).map_err(store_error)?;
        Ok(value as usize)
    };

    Ok(StepExecution {
        id: Uuid::parse_str(&id).map_err(store_error)?,
        job_name: row.try_get("job_name").map_err(store_error)?,
        step_name: row.try_get("step_name").map_err(store_error)?,
        status: step_status_from_str(&status)?,
        read_count: count("read_count")?,
        write_count: count("write_count")?,
        filter_count: count("filter_count")?,
        skip_count: count("skip_count")?,
        commit_count: count("commit_count")?,
        rollback_count: count("rollback_count")?,
        start_time: parse_time(start_time)?,
        end_time: parse_time(end_time)?,
        exit_message: row.try_get("exit_message").map_err(store_error)?,
        execution_context: serde_json::from_str::<ExecutionContext>(&context)
            .map_err(store_error)?,
        job_parameters: serde_json::from_str::<JobParameters>(&parameters).map_err(store_error)?,
    })
}

fn now_nanos() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as i64
}

impl ExecutionStore for RdbcExecutionStore<'_> {
    fn save_job(&self, execution: &JobExecution) -> Result<(), BatchError> {
        let parameters = serde_json::to_string(&execution.parameters).map_err(store_error)?;
        let start_time = format_time(execution.start_time)?;
        let end_time = format_time(execution.end_time)?;

        let mut delete = QueryBuilder::new("DELETE FROM batch_job_execution WHERE id = ");
        delete.push_bind(execution.id.to_string());
        self.session.execute(delete.build()).map_err(store_error)?;

        let mut insert = QueryBuilder::new(
            "INSERT INTO batch_job_execution \
             (id, job_name, status, exit_message, start_time, end_time, parameters, updated_at) ",
        );
        insert.push_values([execution], |mut builder, execution| {
            builder.push_bind(execution.id.to_string());
            builder.push_bind(execution.job_name.clone());
            builder.push_bind(job_status_to_str(execution.status));
            builder.push_bind(execution.exit_message.clone());
            builder.push_bind(start_time.clone());
            builder.push_bind(end_time.clone());
            builder.push_bind(parameters.clone());
            builder.push_bind(now_nanos());
        });
        self.session.execute(insert.build()).map_err(store_error)?;
        Ok(())
    }

    fn save_step(&self, execution: &StepExecution) -> Result<(), BatchError> {
        let context = serde_json::to_string(&execution.execution_context).map_err(store_error)?;
        let parameters = serde_json::to_string(&execution.job_parameters).map_err(store_error)?;
        let start_time = format_time(execution.start_time)?;
        let end_time = format_time(execution.end_time)?;

        let mut delete = QueryBuilder::new("DELETE FROM batch_step_execution WHERE id = ");
        delete.push_bind(execution.id.to_string());
        self.session.execute(delete.build()).map_err(store_error)?;

        let mut insert = QueryBuilder::new(
            "INSERT INTO batch_step_execution \
             (id, job_name, step_name, status, read_count, write_count, filter_count, \
              skip_count, commit_count, rollback_count, exit_message, start_time, end_time, \
              execution_context, job_parameters, updated_at) ",
        );
        insert.push_values([execution], |mut builder, execution| {
            builder.push_bind(execution.id.to_string());
            builder.push_bind(execution.job_name.clone());
            builder.push_bind(execution.step_name.clone());
            builder.push_bind(step_status_to_str(execution.status));
            builder.push_bind(execution.read_count as i64);
            builder.push_bind(execution.write_count as i64);
            builder.push_bind(execution.filter_count as i64);
            builder.push_bind(execution.skip_count as i64);
            builder.push_bind(execution.commit_count as i64);
            builder.push_bind(execution.rollback_count as i64);
            builder.push_bind(execution.exit_message.clone());
            builder.push_bind(start_time.clone());
            builder.push_bind(end_time.clone());
            builder.push_bind(context.clone());
            builder.push_bind(parameters.clone());
            builder.push_bind(now_nanos());
        });
        self.session.execute(insert.build()).map_err(store_error)?;
        Ok(())
    }

    fn find_step(&self, id: Uuid) -> Result<Option<StepExecution>, BatchError> {
        let mut query = QueryBuilder::new("SELECT * FROM batch_step_execution WHERE id = ");
        query.push_bind(id.to_string());

        let rows = self.session.fetch_all(query.build()).map_err(store_error)?;
        rows.first().map(map_step_row).transpose()
    }

    fn find_last_step(
        &self,
        job_name: &str,
        step_name: &str,
    ) -> Result<Option<StepExecution>, BatchError> {
        let mut query = QueryBuilder::new("SELECT * FROM batch_step_execution WHERE job_name = ");
        query.push_bind(job_name.to_owned());
        query.push(" AND step_name = ");
        query.push_bind(step_name.to_owned());
        query.push(" ORDER BY updated_at DESC LIMIT 1");

        let rows = self.session.fetch_all(query.build()).map_err(store_error)?;
        rows.first().map(map_step_row).transpose()
    }
}
