use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::{RelayError, Result};
use crate::scheduler::job::{Job, JobId, JobState};
use crate::store::JobStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id        TEXT NOT NULL,
    state          TEXT NOT NULL,
    submit_time    TEXT NOT NULL,
    start_time     TEXT,
    end_time       TEXT,
    query_term     TEXT,
    execution_plan TEXT NOT NULL,
    host           TEXT,
    report_url     TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_state_host ON jobs (state, host);
";

const COLUMNS: &str =
    "id, user_id, state, submit_time, start_time, end_time, query_term, execution_plan, host, report_url";

const SET_ALL: &str = "user_id = ?1, state = ?2, submit_time = ?3, start_time = ?4, end_time = ?5, \
                       query_term = ?6, execution_plan = ?7, host = ?8, report_url = ?9";

const NOT_TERMINAL: &str = "state NOT IN ('SUCC', 'FAIL')";

/// A job as submitted, before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub execution_plan: String,
    pub query_term: Option<String>,
}

/// Job store backed by a SQLite database file.
///
/// Several controller processes may open the same file; SQLite serializes
/// the writes and the conditional `UPDATE ... WHERE state = ? AND host IS ?`
/// statements provide the compare-and-swap.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Self::bootstrap(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a new job in WAIT and return its id.
    pub async fn submit(&self, job: NewJob) -> Result<JobId> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO jobs (user_id, state, submit_time, query_term, execution_plan) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    job.user_id,
                    JobState::Wait.as_str(),
                    Utc::now(),
                    job.query_term,
                    job.execution_plan
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| RelayError::Store("job store connection poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| RelayError::Internal(format!("job store task failed: {}", e)))?
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let state: String = row.get(2)?;
    let state = state
        .parse::<JobState>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(Job {
        id: row.get(0)?,
        user_id: row.get(1)?,
        state,
        submit_time: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        query_term: row.get(6)?,
        execution_plan: row.get(7)?,
        host: row.get(8)?,
        report_url: row.get(9)?,
    })
}

fn query_jobs(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, map_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn get_jobs_by_state(&self, state: JobState, limit: usize) -> Result<Vec<Job>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            query_jobs(
                conn,
                &format!("SELECT {COLUMNS} FROM jobs WHERE state = ?1 ORDER BY id LIMIT ?2"),
                params![state.as_str(), limit],
            )
        })
        .await
    }

    async fn get_job_by_id(&self, id: JobId) -> Result<Job> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                map_row,
            )
            .optional()?
            .ok_or(RelayError::JobNotFound(id))
        })
        .await
    }

    async fn get_jobs_by_state_and_host(&self, state: JobState, host: &str) -> Result<Vec<Job>> {
        let host = host.to_string();
        self.with_conn(move |conn| {
            query_jobs(
                conn,
                &format!("SELECT {COLUMNS} FROM jobs WHERE state = ?1 AND host = ?2 ORDER BY id"),
                params![state.as_str(), host],
            )
        })
        .await
    }

    async fn update_job_by_id(&self, job: &Job, id: JobId) -> Result<()> {
        let job = job.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                &format!("UPDATE jobs SET {SET_ALL} WHERE id = ?10 AND {NOT_TERMINAL}"),
                params![
                    job.user_id,
                    job.state.as_str(),
                    job.submit_time,
                    job.start_time,
                    job.end_time,
                    job.query_term,
                    job.execution_plan,
                    job.host,
                    job.report_url,
                    id
                ],
            )?;
            if changed > 0 {
                return Ok(());
            }
            let exists = conn
                .query_row("SELECT 1 FROM jobs WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?;
            match exists {
                Some(()) => Err(RelayError::TerminalJob(id)),
                None => Err(RelayError::JobNotFound(id)),
            }
        })
        .await
    }

    async fn update_job_by_id_and_prev_state_and_host(
        &self,
        job: &Job,
        id: JobId,
        prev_state: JobState,
        prev_host: Option<&str>,
    ) -> Result<bool> {
        let job = job.clone();
        let prev_host = prev_host.map(str::to_string);
        self.with_conn(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE jobs SET {SET_ALL} \
                     WHERE id = ?10 AND state = ?11 AND host IS ?12 AND {NOT_TERMINAL}"
                ),
                params![
                    job.user_id,
                    job.state.as_str(),
                    job.submit_time,
                    job.start_time,
                    job.end_time,
                    job.query_term,
                    job.execution_plan,
                    job.host,
                    job.report_url,
                    id,
                    prev_state.as_str(),
                    prev_host
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn update_jobs_state_and_host_by_ids(
        &self,
        state: JobState,
        host: Option<&str>,
        ids: &[JobId],
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = (0..ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let mut values = Vec::with_capacity(ids.len() + 2);
        values.push(Value::Text(state.as_str().to_string()));
        values.push(match host {
            Some(h) => Value::Text(h.to_string()),
            None => Value::Null,
        });
        values.extend(ids.iter().map(|id| Value::Integer(*id)));

        self.with_conn(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE jobs SET state = ?1, host = ?2 \
                     WHERE id IN ({placeholders}) AND {NOT_TERMINAL}"
                ),
                params_from_iter(values.iter()),
            )?;
            Ok(changed)
        })
        .await
    }
}
