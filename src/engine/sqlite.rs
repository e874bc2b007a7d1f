use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::engine::{EngineError, SqlEngine};
use crate::output::{FileOutputCollector, OutputCollector};
use crate::scheduler::job::{EngineOptions, JobId};

/// Plan option capping the number of rows written.
pub const MAX_ROWS_OPTION: &str = "max_rows";

/// Runs queries against a local SQLite database opened read-only and writes
/// the result set to `<output_dir>/<job id>`.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    database: PathBuf,
    output_dir: PathBuf,
}

impl SqliteEngine {
    pub fn new(database: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            output_dir: output_dir.into(),
        }
    }

    fn max_rows(options: &EngineOptions) -> Result<Option<u64>, EngineError> {
        match options.get(MAX_ROWS_OPTION) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| EngineError::InvalidOption {
                    name: MAX_ROWS_OPTION.to_string(),
                    reason: format!("expected a non-negative integer, got {}", value),
                }),
        }
    }

    fn run_blocking(
        &self,
        job_id: JobId,
        sql: &str,
        max_rows: Option<u64>,
    ) -> Result<bool, EngineError> {
        let conn = Connection::open_with_flags(
            &self.database,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut collector = FileOutputCollector::create(&self.output_dir, &job_id.to_string())?;

        let written = write_result_set(&conn, sql, max_rows, &mut collector);
        let closed = collector.close();
        let rows = written?;
        closed?;

        tracing::debug!(job_id, rows, path = %collector.path().display(), "Result set written");
        Ok(true)
    }
}

fn write_result_set(
    conn: &Connection,
    sql: &str,
    max_rows: Option<u64>,
    collector: &mut dyn OutputCollector,
) -> Result<u64, EngineError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    collector.init_columns(&columns)?;

    let mut rows = stmt.query([])?;
    let mut written = 0u64;
    while let Some(row) = rows.next()? {
        if max_rows.is_some_and(|max| written >= max) {
            break;
        }
        let values = (0..columns.len())
            .map(|i| row.get_ref(i).map(render_value))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collector.collect(&values)?;
        written += 1;
    }
    Ok(written)
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => b.iter().map(|byte| format!("{:02x}", byte)).collect(),
    }
}

#[async_trait]
impl SqlEngine for SqliteEngine {
    async fn execute(
        &self,
        job_id: JobId,
        sql: &str,
        options: &EngineOptions,
    ) -> Result<bool, EngineError> {
        let max_rows = Self::max_rows(options)?;
        let engine = self.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || engine.run_blocking(job_id, &sql, max_rows))
            .await
            .map_err(|e| EngineError::Execution(format!("sqlite task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_value_formats_each_storage_class() {
        assert_eq!(render_value(ValueRef::Null), "NULL");
        assert_eq!(render_value(ValueRef::Integer(-3)), "-3");
        assert_eq!(render_value(ValueRef::Real(1.5)), "1.5");
        assert_eq!(render_value(ValueRef::Text(b"abc")), "abc");
        assert_eq!(render_value(ValueRef::Blob(&[0x0a, 0xff])), "0aff");
    }

    #[test]
    fn max_rows_rejects_non_integer() {
        let mut options = EngineOptions::new();
        options.insert(MAX_ROWS_OPTION.to_string(), serde_json::json!("ten"));
        assert!(matches!(
            SqliteEngine::max_rows(&options),
            Err(EngineError::InvalidOption { .. })
        ));

        options.insert(MAX_ROWS_OPTION.to_string(), serde_json::json!(10));
        assert_eq!(SqliteEngine::max_rows(&options).unwrap(), Some(10));
        assert_eq!(SqliteEngine::max_rows(&EngineOptions::new()).unwrap(), None);
    }
}
