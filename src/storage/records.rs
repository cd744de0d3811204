//! Persistent generation records.
//!
//! Every state change goes through [`RecordStore::update`], which loads the
//! record, applies one [`Transition`], and writes it back atomically. A
//! terminal record swallows later writes, so a cancel racing a pipeline's
//! final write resolves to whichever landed first.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior, params};

use crate::core::models::{GenerationRecord, RecordFilter, Transition};
use crate::error::{GateError, Result};
use crate::storage::schema::{db_err, run_migrations};

/// Result of an atomic update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Record after the update (unchanged if `applied` is false).
    pub record: GenerationRecord,
    /// False when the record was already terminal.
    pub applied: bool,
}

/// Storage for generation records.
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails if the id exists.
    fn create(&self, record: &GenerationRecord) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<GenerationRecord>>;

    /// Apply `transition` to record `id` in one atomic step.
    ///
    /// # Errors
    /// [`GateError::NotFound`] for an unknown id,
    /// [`GateError::IllegalTransition`] for an edge outside the lifecycle.
    fn update(&self, id: &str, transition: &Transition) -> Result<UpdateOutcome>;

    /// Matching records, newest first, paged by `filter`.
    fn list(&self, filter: &RecordFilter) -> Result<Vec<GenerationRecord>>;

    /// Remove a record. Returns whether it existed.
    fn delete(&self, id: &str) -> Result<bool>;
}

fn not_found(id: &str) -> GateError {
    GateError::NotFound(format!("generation {id}"))
}

// =============================================================================
// SQLite
// =============================================================================

const COLUMNS: &str = "id, provider, model, spec_json, key_ref, status, provider_job_id, \
    content_location, error, error_kind, progress, duration_seconds, width, height, \
    estimated_cost_usd, cost_usd, generation_time_seconds, created_at, updated_at, completed_at";

/// Records in a `SQLite` database.
///
/// File databases run in WAL mode with a second read-only connection, so
/// `get` and `list` read the last committed state while an update holds the
/// write lock. In-memory databases share one connection for both.
#[derive(Debug)]
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("open record database"))?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err("set busy timeout"))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(db_err("enable WAL"))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened record database");

        let mut store = Self::with_connection(conn)?;
        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(db_err("open record reader"))?;
        reader
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(db_err("set busy timeout"))?;
        store.reader = Some(Mutex::new(reader));
        Ok(store)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory database"))?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            reader: None,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        lock_connection(&self.conn)
    }

    /// Connection for queries that never write.
    fn read_lock(&self) -> Result<MutexGuard<'_, Connection>> {
        lock_connection(self.reader.as_ref().unwrap_or(&self.conn))
    }
}

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

fn lock_connection(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| GateError::Storage("record database lock poisoned".to_string()))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GateError::Storage(format!("bad timestamp '{raw}': {e}")))
}

/// Column values as read, before domain conversion.
struct RawRecord {
    id: String,
    provider: String,
    model: String,
    spec_json: String,
    key_ref: String,
    status: String,
    provider_job_id: Option<String>,
    content_location: Option<String>,
    error: Option<String>,
    error_kind: Option<String>,
    progress: Option<i64>,
    duration_seconds: Option<f64>,
    width: Option<i64>,
    height: Option<i64>,
    estimated_cost_usd: Option<f64>,
    cost_usd: Option<f64>,
    generation_time_seconds: Option<f64>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            provider: row.get(1)?,
            model: row.get(2)?,
            spec_json: row.get(3)?,
            key_ref: row.get(4)?,
            status: row.get(5)?,
            provider_job_id: row.get(6)?,
            content_location: row.get(7)?,
            error: row.get(8)?,
            error_kind: row.get(9)?,
            progress: row.get(10)?,
            duration_seconds: row.get(11)?,
            width: row.get(12)?,
            height: row.get(13)?,
            estimated_cost_usd: row.get(14)?,
            cost_usd: row.get(15)?,
            generation_time_seconds: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
            completed_at: row.get(19)?,
        })
    }

    fn into_record(self) -> Result<GenerationRecord> {
        let spec = serde_json::from_str(&self.spec_json)
            .map_err(|e| GateError::Storage(format!("bad spec for {}: {e}", self.id)))?;
        Ok(GenerationRecord {
            provider: self
                .provider
                .parse()
                .map_err(|_| GateError::Storage(format!("unknown provider '{}'", self.provider)))?,
            status: self.status.parse()?,
            error_kind: self.error_kind.as_deref().map(str::parse).transpose()?,
            progress: self.progress.and_then(|p| u8::try_from(p).ok()),
            width: self.width.and_then(|w| u32::try_from(w).ok()),
            height: self.height.and_then(|h| u32::try_from(h).ok()),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            model: self.model,
            spec,
            key_ref: self.key_ref,
            provider_job_id: self.provider_job_id,
            content_location: self.content_location,
            error: self.error,
            duration_seconds: self.duration_seconds,
            estimated_cost_usd: self.estimated_cost_usd,
            cost_usd: self.cost_usd,
            generation_time_seconds: self.generation_time_seconds,
        })
    }
}

fn select_one(conn: &Connection, id: &str) -> Result<Option<GenerationRecord>> {
    let sql = format!("SELECT {COLUMNS} FROM generations WHERE id = ?1");
    conn.query_row(&sql, [id], RawRecord::from_row)
        .optional()
        .map_err(db_err("load generation"))?
        .map(RawRecord::into_record)
        .transpose()
}

impl RecordStore for SqliteRecordStore {
    fn create(&self, record: &GenerationRecord) -> Result<()> {
        let spec_json = serde_json::to_string(&record.spec)?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO generations ({COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
            ),
            params![
                record.id,
                record.provider.cli_name(),
                record.model,
                spec_json,
                record.key_ref,
                record.status.as_str(),
                record.provider_job_id,
                record.content_location,
                record.error,
                record.error_kind.map(|k| k.as_str()),
                record.progress.map(i64::from),
                record.duration_seconds,
                record.width.map(i64::from),
                record.height.map(i64::from),
                record.estimated_cost_usd,
                record.cost_usd,
                record.generation_time_seconds,
                timestamp(record.created_at),
                timestamp(record.updated_at),
                record.completed_at.map(timestamp),
            ],
        )
        .map_err(db_err("insert generation"))?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<GenerationRecord>> {
        let conn = self.read_lock()?;
        select_one(&conn, id)
    }

    fn update(&self, id: &str, transition: &Transition) -> Result<UpdateOutcome> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err("begin update"))?;

        let mut record = select_one(&tx, id)?.ok_or_else(|| not_found(id))?;
        let applied = record.apply(transition, Utc::now())?;
        if applied {
            tx.execute(
                "UPDATE generations SET status = ?2, provider_job_id = ?3, content_location = ?4, \
                 error = ?5, error_kind = ?6, progress = ?7, duration_seconds = ?8, width = ?9, \
                 height = ?10, cost_usd = ?11, generation_time_seconds = ?12, updated_at = ?13, \
                 completed_at = ?14 WHERE id = ?1",
                params![
                    record.id,
                    record.status.as_str(),
                    record.provider_job_id,
                    record.content_location,
                    record.error,
                    record.error_kind.map(|k| k.as_str()),
                    record.progress.map(i64::from),
                    record.duration_seconds,
                    record.width.map(i64::from),
                    record.height.map(i64::from),
                    record.cost_usd,
                    record.generation_time_seconds,
                    timestamp(record.updated_at),
                    record.completed_at.map(timestamp),
                ],
            )
            .map_err(db_err("write generation"))?;
        }
        tx.commit().map_err(db_err("commit update"))?;
        Ok(UpdateOutcome { record, applied })
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<GenerationRecord>> {
        let limit = filter
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let offset = i64::try_from(filter.offset).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE (?1 IS NULL OR provider = ?1) AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
        );

        let conn = self.read_lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err("prepare list"))?;
        let rows = stmt
            .query_map(
                params![
                    filter.provider.map(|p| p.cli_name()),
                    filter.status.map(|s| s.as_str()),
                    limit,
                    offset
                ],
                RawRecord::from_row,
            )
            .map_err(db_err("list generations"))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_err("read generation row"))?.into_record()?);
        }
        Ok(records)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM generations WHERE id = ?1", [id])
            .map_err(db_err("delete generation"))?;
        Ok(deleted > 0)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Records held in memory. Used in tests and when no database is wanted.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<String, (u64, GenerationRecord)>,
    next_seq: u64,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> GateError {
        GateError::Storage("record store lock poisoned".to_string())
    }
}

impl RecordStore for MemoryRecordStore {
    fn create(&self, record: &GenerationRecord) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        if inner.records.contains_key(&record.id) {
            return Err(GateError::Storage(format!("generation {} already exists", record.id)));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.records.insert(record.id.clone(), (seq, record.clone()));
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<GenerationRecord>> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.records.get(id).map(|(_, r)| r.clone()))
    }

    fn update(&self, id: &str, transition: &Transition) -> Result<UpdateOutcome> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let (_, stored) = inner.records.get_mut(id).ok_or_else(|| not_found(id))?;
        let mut record = stored.clone();
        let applied = record.apply(transition, Utc::now())?;
        if applied {
            *stored = record.clone();
        }
        Ok(UpdateOutcome { record, applied })
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<GenerationRecord>> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut matching: Vec<&(u64, GenerationRecord)> = inner
            .records
            .values()
            .filter(|(_, r)| filter.matches(r))
            .collect();
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then_with(|| seq_b.cmp(seq_a))
        });
        Ok(matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        Ok(inner.records.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{
        ContentMetadata, FailureKind, GenerationSpec, GenerationStatus,
    };
    use crate::core::provider::Provider;
    use chrono::Duration;

    fn record(provider: Provider, model: &str, offset_secs: i64) -> GenerationRecord {
        let spec = GenerationSpec::new(model, "a cat", 5).with_aspect_ratio("16:9");
        GenerationRecord::new(
            provider,
            spec,
            provider.default_key_ref(),
            Some(0.5),
            Utc::now() + Duration::seconds(offset_secs),
        )
    }

    fn stores() -> Vec<Box<dyn RecordStore>> {
        vec![
            Box::new(SqliteRecordStore::open_in_memory().unwrap()),
            Box::new(MemoryRecordStore::new()),
        ]
    }

    #[test]
    fn create_get_round_trip() {
        for store in stores() {
            let rec = record(Provider::OpenAi, "sora-2", 0);
            store.create(&rec).unwrap();
            let loaded = store.get(&rec.id).unwrap().unwrap();
            assert_eq!(loaded.spec, rec.spec);
            assert_eq!(loaded.status, GenerationStatus::Queued);
            assert_eq!(loaded.estimated_cost_usd, Some(0.5));
            assert!(store.get("gen_missing").unwrap().is_none());
            assert!(store.create(&rec).is_err());
        }
    }

    #[test]
    fn update_walks_the_lifecycle() {
        for store in stores() {
            let rec = record(Provider::Runway, "runway-gen3", 0);
            store.create(&rec).unwrap();

            let submitted = store
                .update(&rec.id, &Transition::Submitted { provider_job_id: "job-1".into() })
                .unwrap();
            assert!(submitted.applied);
            assert_eq!(submitted.record.status, GenerationStatus::Processing);

            store.update(&rec.id, &Transition::Progress { progress: 40 }).unwrap();
            let done = store
                .update(
                    &rec.id,
                    &Transition::Completed {
                        content_location: "/videos/x.mp4".into(),
                        metadata: ContentMetadata {
                            duration_seconds: Some(5.0),
                            width: Some(1280),
                            height: Some(720),
                        },
                        cost_usd: Some(0.25),
                    },
                )
                .unwrap();
            assert!(done.applied);

            let loaded = store.get(&rec.id).unwrap().unwrap();
            assert_eq!(loaded.status, GenerationStatus::Completed);
            assert_eq!(loaded.provider_job_id.as_deref(), Some("job-1"));
            assert_eq!(loaded.content_location.as_deref(), Some("/videos/x.mp4"));
            assert_eq!(loaded.width, Some(1280));
            assert_eq!(loaded.progress, Some(100));
            assert!(loaded.completed_at.is_some());
        }
    }

    #[test]
    fn terminal_records_ignore_writes() {
        for store in stores() {
            let rec = record(Provider::Kling, "kling-1.5", 0);
            store.create(&rec).unwrap();
            store.update(&rec.id, &Transition::Cancelled).unwrap();

            let late = store
                .update(
                    &rec.id,
                    &Transition::Failed {
                        kind: FailureKind::Timeout,
                        message: "late".into(),
                    },
                )
                .unwrap();
            assert!(!late.applied);
            assert_eq!(late.record.status, GenerationStatus::Cancelled);
            assert!(store.get(&rec.id).unwrap().unwrap().error.is_none());
        }
    }

    #[test]
    fn illegal_transition_leaves_record_unchanged() {
        for store in stores() {
            let rec = record(Provider::OpenAi, "sora-2", 0);
            store.create(&rec).unwrap();
            let err = store
                .update(
                    &rec.id,
                    &Transition::Completed {
                        content_location: "x".into(),
                        metadata: ContentMetadata::default(),
                        cost_usd: None,
                    },
                )
                .unwrap_err();
            assert!(matches!(err, GateError::IllegalTransition { .. }));
            assert_eq!(store.get(&rec.id).unwrap().unwrap().status, GenerationStatus::Queued);
        }
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        for store in stores() {
            let err = store.update("gen_nope", &Transition::Cancelled).unwrap_err();
            assert!(matches!(err, GateError::NotFound(_)));
        }
    }

    #[test]
    fn list_is_newest_first_with_filters_and_paging() {
        for store in stores() {
            let oldest = record(Provider::OpenAi, "sora-2", -30);
            let middle = record(Provider::Kling, "kling-1.0", -20);
            let newest = record(Provider::OpenAi, "sora-1", -10);
            for r in [&oldest, &middle, &newest] {
                store.create(r).unwrap();
            }
            store.update(&middle.id, &Transition::Cancelled).unwrap();

            let all = store.list(&RecordFilter::default()).unwrap();
            let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, [newest.id.as_str(), middle.id.as_str(), oldest.id.as_str()]);

            let openai = store
                .list(&RecordFilter {
                    provider: Some(Provider::OpenAi),
                    ..RecordFilter::default()
                })
                .unwrap();
            assert_eq!(openai.len(), 2);

            let cancelled = store
                .list(&RecordFilter {
                    status: Some(GenerationStatus::Cancelled),
                    ..RecordFilter::default()
                })
                .unwrap();
            assert_eq!(cancelled.len(), 1);
            assert_eq!(cancelled[0].id, middle.id);

            let page = store
                .list(&RecordFilter {
                    offset: 1,
                    limit: Some(1),
                    ..RecordFilter::default()
                })
                .unwrap();
            assert_eq!(page.len(), 1);
            assert_eq!(page[0].id, middle.id);
        }
    }

    #[test]
    fn delete_reports_existence() {
        for store in stores() {
            let rec = record(Provider::OpenAi, "sora-2", 0);
            store.create(&rec).unwrap();
            assert!(store.delete(&rec.id).unwrap());
            assert!(!store.delete(&rec.id).unwrap());
            assert!(store.get(&rec.id).unwrap().is_none());
        }
    }

    #[test]
    fn sqlite_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/generations.sqlite");
        let rec = record(Provider::Runway, "runway-gen4", 0);
        {
            let store = SqliteRecordStore::open(&path).unwrap();
            store.create(&rec).unwrap();
            store
                .update(&rec.id, &Transition::Submitted { provider_job_id: "r-9".into() })
                .unwrap();
        }
        let reopened = SqliteRecordStore::open(&path).unwrap();
        let loaded = reopened.get(&rec.id).unwrap().unwrap();
        assert_eq!(loaded.status, GenerationStatus::Processing);
        assert_eq!(loaded.provider_job_id.as_deref(), Some("r-9"));
    }

    #[test]
    fn reads_proceed_while_a_write_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRecordStore::open(&dir.path().join("generations.sqlite")).unwrap();
        let rec = record(Provider::Kling, "kling-1.5", 0);
        store.create(&rec).unwrap();

        let writer = store.lock().unwrap();
        writer
            .execute_batch("BEGIN IMMEDIATE; UPDATE generations SET model = 'kling-1.0';")
            .unwrap();

        // Uncommitted write is invisible and does not block the reader.
        let seen = store.get(&rec.id).unwrap().unwrap();
        assert_eq!(seen.model, "kling-1.5");
        assert_eq!(store.list(&RecordFilter::default()).unwrap().len(), 1);

        writer.execute_batch("COMMIT").unwrap();
        drop(writer);
        assert_eq!(store.get(&rec.id).unwrap().unwrap().model, "kling-1.0");
    }
}
