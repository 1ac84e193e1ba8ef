//! Durable job store persisted in SQLite.
//!
//! All jobs live in one `jobs` table. Every transition is a single
//! conditional `UPDATE ... WHERE id = ? AND state = ?`, so two workers (or
//! two processes sharing the file) can never both apply the same transition.
//! The database runs in WAL mode with a busy timeout, which lets a separate
//! `enqueue` or `dlq retry` invocation write while a worker pool is running.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::domain::{Job, JobId, JobState};
use crate::error::QueueError;
use crate::observability::StateCounts;
use crate::ports::{Clock, JobStore, SystemClock};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 8;

/// SQLite-backed job store. Cheap to clone.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteJobStore {
    /// Open (or create) the database file at `path`, creating parent
    /// directories as needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        debug!(path = %path.display(), "opened job database");
        Self::from_pool(pool).await
    }

    /// A private in-memory database. Held on a single connection that never
    /// expires, since every new SQLite memory connection is a fresh database.
    pub async fn in_memory() -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if missing.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, QueueError> {
        migrate(&pool).await?;
        Ok(Self {
            pool,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn now(&self) -> String {
        encode_timestamp(self.clock.now())
    }

    async fn transition(
        &self,
        id: &JobId,
        from: JobState,
        to: JobState,
        attempts: Option<u32>,
    ) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?1,
                attempts = COALESCE(?2, attempts),
                updated_at = ?3
            WHERE id = ?4 AND state = ?5
            "#,
        )
        .bind(to.as_str())
        .bind(attempts.map(i64::from))
        .bind(self.now())
        .bind(id.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn migrate(pool: &SqlitePool) -> Result<(), QueueError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id           TEXT PRIMARY KEY,
            command      TEXT NOT NULL,
            state        TEXT NOT NULL,
            attempts     INTEGER NOT NULL DEFAULT 0,
            max_retries  INTEGER NOT NULL DEFAULT 3,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs (state, created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Fixed-width UTC timestamps, so text order equals time order.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::CorruptRecord(format!("invalid {column} '{value}': {e}")))
}

fn decode_count(column: &str, value: i64) -> Result<u32, QueueError> {
    u32::try_from(value)
        .map_err(|_| QueueError::CorruptRecord(format!("{column} out of range: {value}")))
}

fn row_to_job(row: &SqliteRow) -> Result<Job, QueueError> {
    let id: String = row.try_get("id")?;
    let id = JobId::parse(id).map_err(|e| QueueError::CorruptRecord(e.to_string()))?;

    let command: String = row.try_get("command")?;

    let state: String = row.try_get("state")?;
    let state = state
        .parse::<JobState>()
        .map_err(|e| QueueError::CorruptRecord(e.to_string()))?;

    let attempts = decode_count("attempts", row.try_get("attempts")?)?;
    let max_retries = decode_count("max_retries", row.try_get("max_retries")?)?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Job {
        id,
        command,
        state,
        attempts,
        max_retries,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        if job.command.trim().is_empty() {
            return Err(QueueError::InvalidJob("command must not be empty".to_string()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_retries))
        .bind(encode_timestamp(job.created_at))
        .bind(encode_timestamp(job.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(QueueError::DuplicateId(job.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn claim_next_pending(&self) -> Result<Option<Job>, QueueError> {
        // Select and transition in one statement; the outer state check keeps
        // it a no-op if another connection got there first.
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'processing', updated_at = ?1
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending'
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            AND state = 'pending'
            RETURNING id, command, state, attempts, max_retries, created_at, updated_at
            "#,
        )
        .bind(self.now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn mark_completed(&self, id: &JobId) -> Result<u64, QueueError> {
        self.transition(id, JobState::Processing, JobState::Completed, None)
            .await
    }

    async fn mark_retryable_failure(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError> {
        self.transition(id, JobState::Processing, JobState::Failed, Some(attempts))
            .await
    }

    async fn mark_dead(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError> {
        self.transition(id, JobState::Processing, JobState::Dead, Some(attempts))
            .await
    }

    async fn return_to_pending(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError> {
        self.transition(id, JobState::Failed, JobState::Pending, Some(attempts))
            .await
    }

    async fn requeue_from_dlq(&self, id: &JobId) -> Result<Job, QueueError> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', attempts = 0, updated_at = ?1
            WHERE id = ?2 AND state = 'dead'
            RETURNING id, command, state, attempts, max_retries, created_at, updated_at
            "#,
        )
        .bind(self.now())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return row_to_job(&row);
        }

        match self.get(id).await? {
            Some(job) => Err(QueueError::NotInDlq {
                id: id.clone(),
                state: job.state,
            }),
            None => Err(QueueError::NotFound(id.clone())),
        }
    }

    async fn recover_orphans(&self) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', updated_at = ?1
            WHERE state IN ('processing', 'failed')
            "#,
        )
        .bind(self.now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query(
            r#"
            SELECT id, command, state, attempts, max_retries, created_at, updated_at
            FROM jobs
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        let rows = match state {
            Some(state) => {
                sqlx::query(
                    r#"
                    SELECT id, command, state, attempts, max_retries, created_at, updated_at
                    FROM jobs
                    WHERE state = ?1
                    ORDER BY created_at DESC, rowid DESC
                    "#,
                )
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, command, state, attempts, max_retries, created_at, updated_at
                    FROM jobs
                    ORDER BY created_at DESC, rowid DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_job).collect()
    }

    async fn summary(&self) -> Result<StateCounts, QueueError> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StateCounts::default();
        for row in rows {
            let state: String = row.try_get("state")?;
            let state = state
                .parse::<JobState>()
                .map_err(|e| QueueError::CorruptRecord(e.to_string()))?;
            let n: i64 = row.try_get("n")?;
            counts.add(state, u64::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn id(s: &str) -> JobId {
        JobId::parse(s).unwrap()
    }

    fn job(name: &str, created_at: DateTime<Utc>) -> Job {
        Job::new(id(name), "exit 0", 3, created_at)
    }

    #[tokio::test]
    async fn enqueue_then_get_round_trips_every_field() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let original = Job::new(id("a"), "echo 'hi there'", 5, start());
        store.enqueue(original.clone()).await.unwrap();

        let loaded = store.get(&id("a")).await.unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(store.get(&id("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sub_microsecond_creation_times_round_trip() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let precise = Utc.timestamp_opt(1_700_000_000, 987_654_321).unwrap();
        let submitted = Job::new(id("precise"), "true", 3, precise);
        store.enqueue(submitted.clone()).await.unwrap();

        assert_eq!(store.get(&id("precise")).await.unwrap(), Some(submitted));
    }

    #[tokio::test]
    async fn duplicate_ids_and_empty_commands_are_rejected() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        store.enqueue(job("a", start())).await.unwrap();

        assert!(matches!(
            store.enqueue(job("a", start())).await,
            Err(QueueError::DuplicateId(dup)) if dup == id("a")
        ));

        let mut empty = job("b", start());
        empty.command = "   ".to_string();
        assert!(matches!(
            store.enqueue(empty).await,
            Err(QueueError::InvalidJob(_))
        ));
    }

    #[tokio::test]
    async fn claim_takes_oldest_and_stamps_updated_at() {
        let now = start() + ChronoDuration::minutes(5);
        let store = SqliteJobStore::in_memory()
            .await
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(now)));
        store.enqueue(job("late", start() + ChronoDuration::seconds(3))).await.unwrap();
        store.enqueue(job("early", start())).await.unwrap();

        let claimed = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.id, id("early"));
        assert_eq!(claimed.state, JobState::Processing);
        assert_eq!(claimed.updated_at, now);
        assert_eq!(claimed.created_at, start());

        assert_eq!(
            store.claim_next_pending().await.unwrap().unwrap().id,
            id("late")
        );
        assert!(store.claim_next_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn equal_timestamps_claim_in_insertion_order() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        store.enqueue(job("z-first", start())).await.unwrap();
        store.enqueue(job("a-second", start())).await.unwrap();

        assert_eq!(
            store.claim_next_pending().await.unwrap().unwrap().id,
            id("z-first")
        );
    }

    #[tokio::test]
    async fn transitions_are_conditional() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        store.enqueue(job("a", start())).await.unwrap();

        assert_eq!(store.mark_completed(&id("a")).await.unwrap(), 0);
        assert_eq!(store.return_to_pending(&id("a"), 1).await.unwrap(), 0);
        assert_eq!(store.mark_dead(&id("ghost"), 1).await.unwrap(), 0);

        store.claim_next_pending().await.unwrap();
        assert_eq!(store.mark_retryable_failure(&id("a"), 1).await.unwrap(), 1);
        assert!(store.claim_next_pending().await.unwrap().is_none());

        assert_eq!(store.return_to_pending(&id("a"), 1).await.unwrap(), 1);
        let again = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(again.attempts, 1);

        assert_eq!(store.mark_completed(&id("a")).await.unwrap(), 1);
        assert_eq!(store.mark_completed(&id("a")).await.unwrap(), 0);
        let done = store.get(&id("a")).await.unwrap().unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.attempts, 1);
    }

    #[tokio::test]
    async fn requeue_from_dlq_only_applies_to_dead_jobs() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        store.enqueue(job("a", start())).await.unwrap();
        store.claim_next_pending().await.unwrap();
        store.mark_dead(&id("a"), 4).await.unwrap();

        let requeued = store.requeue_from_dlq(&id("a")).await.unwrap();
        assert_eq!(requeued.state, JobState::Pending);
        assert_eq!(requeued.attempts, 0);

        assert!(matches!(
            store.requeue_from_dlq(&id("a")).await,
            Err(QueueError::NotInDlq {
                state: JobState::Pending,
                ..
            })
        ));
        assert!(matches!(
            store.requeue_from_dlq(&id("ghost")).await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_and_summary_agree() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
            store
                .enqueue(job(name, start() + ChronoDuration::seconds(i as i64)))
                .await
                .unwrap();
        }
        store.claim_next_pending().await.unwrap();
        store.mark_dead(&id("a"), 1).await.unwrap();

        let ids: Vec<_> = store
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec![id("d"), id("c"), id("b"), id("a")]);

        let dead = store.list(Some(JobState::Dead)).await.unwrap();
        assert_eq!(dead.len(), 1);

        let counts = store.summary().await.unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.dead, 1);
        assert_eq!(counts.total(), 4);
    }

    #[tokio::test]
    async fn jobs_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.db");

        let store = SqliteJobStore::open(&path).await.unwrap();
        store.enqueue(job("durable", start())).await.unwrap();
        store.close().await;

        let reopened = SqliteJobStore::open(&path).await.unwrap();
        let loaded = reopened.get(&id("durable")).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Pending);
    }

    #[tokio::test]
    async fn orphans_of_a_killed_pool_are_recovered_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let crashed = SqliteJobStore::open(&path).await.unwrap();
        for (i, name) in ["mid-run", "mid-backoff", "dead", "queued"].iter().enumerate() {
            crashed
                .enqueue(job(name, start() + ChronoDuration::seconds(i as i64)))
                .await
                .unwrap();
        }
        crashed.claim_next_pending().await.unwrap();
        crashed.claim_next_pending().await.unwrap();
        crashed.mark_retryable_failure(&id("mid-backoff"), 1).await.unwrap();
        crashed.claim_next_pending().await.unwrap();
        crashed.mark_dead(&id("dead"), 4).await.unwrap();
        crashed.close().await;

        let store = SqliteJobStore::open(&path).await.unwrap();
        assert_eq!(store.recover_orphans().await.unwrap(), 2);
        assert_eq!(store.recover_orphans().await.unwrap(), 0);

        let counts = store.summary().await.unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.processing + counts.failed, 0);
        assert_eq!(counts.dead, 1);

        let first = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(first.id, id("mid-run"));
        let second = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(second.id, id("mid-backoff"));
        assert_eq!(second.attempts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claimers_never_share_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteJobStore::open(dir.path().join("queue.db")).await.unwrap());
        for i in 0..20 {
            store
                .enqueue(job(&format!("job-{i:02}"), start() + ChronoDuration::seconds(i)))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Some(job) = store.claim_next_pending().await.unwrap() {
                    mine.push(job.id);
                }
                mine
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            claimed.extend(handle.await.unwrap());
        }
        claimed.sort();
        let before = claimed.len();
        claimed.dedup();
        assert_eq!(before, 20);
        assert_eq!(claimed.len(), 20);
    }
}
