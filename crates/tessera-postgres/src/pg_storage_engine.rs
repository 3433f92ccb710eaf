//! `PostgreSQL` implementation of the `StorageEngine` trait.
//!
//! ## Appends
//!
//! 1. Begin a `READ COMMITTED` transaction
//! 2. Take `pg_advisory_xact_lock` on the stream id
//! 3. Drop the stream's expired records
//! 4. Compare `MAX(event_number)` with the batch's expected version
//! 5. Insert every record and commit
//!
//! Every statement after the lock sees what the previous lock holder
//! committed. Deletes take the same lock. A unique violation (`23505`) on the
//! record id or on `(stream_id, event_number)` means another writer got there
//! first and is reported as a concurrency conflict.
//!
//! ## Reads
//!
//! Each read runs in one read-only transaction at the configured isolation
//! level and pages through the stream by event number.
//!
//! ## Expiry
//!
//! Expired records are invisible as soon as they expire. They are removed
//! by the next append to their stream, or by [`PgStorageEngine::purge_expired`]
//! for the whole table.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument, warn};

use tessera_core::clock::{Clock, SystemClock};
use tessera_core::engine::{ReadPredicate, StorageEngine, expected_version_of, validate_batch};
use tessera_core::error::EventStoreError;
use tessera_core::event::StorageEvent;
use tessera_core::record::EventRecord;
use tessera_core::scan::{PageCursor, forward_end, read_all, read_back_until};

use crate::error::{PgStorageError, is_conflict_signature};
use crate::options::{PgStorageOptions, WRITE_TRANSACTION_SQL};
use crate::schema::{Statements, create_table_statements};

/// Builder for [`PgStorageEngine`].
pub struct PgStorageEngineBuilder {
    pool: PgPool,
    options: PgStorageOptions,
    clock: Arc<dyn Clock>,
}

impl PgStorageEngineBuilder {
    /// Replaces the default options.
    #[must_use]
    pub fn options(mut self, options: PgStorageOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the system clock used for record expiry.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the options and creates the engine without touching the
    /// database.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Validation` if an option is invalid.
    pub fn build(self) -> Result<PgStorageEngine, EventStoreError> {
        self.options.validate()?;
        Ok(PgStorageEngine {
            statements: Statements::for_table(&self.options.table_name),
            pool: self.pool,
            options: self.options,
            clock: self.clock,
        })
    }

    /// Builds the engine and creates its table if missing.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Validation` if an option is invalid, or
    /// `EventStoreError::Backend` if the schema cannot be created.
    pub async fn initialise(self) -> Result<PgStorageEngine, EventStoreError> {
        let engine = self.build()?;
        engine.initialise().await?;
        Ok(engine)
    }
}

impl fmt::Debug for PgStorageEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStorageEngineBuilder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// PostgreSQL-backed storage engine.
#[derive(Clone)]
pub struct PgStorageEngine {
    pool: PgPool,
    options: PgStorageOptions,
    statements: Statements,
    clock: Arc<dyn Clock>,
}

impl PgStorageEngine {
    /// Starts building an engine over `pool` with default options and the
    /// system clock.
    #[must_use]
    pub fn builder(pool: PgPool) -> PgStorageEngineBuilder {
        PgStorageEngineBuilder {
            pool,
            options: PgStorageOptions::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// The options this engine was built with.
    #[must_use]
    pub fn options(&self) -> &PgStorageOptions {
        &self.options
    }

    /// Removes every expired record of the table, `delete_batch_size` rows
    /// per statement, and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Backend` if a delete fails. Batches removed
    /// before the failure stay removed.
    #[instrument(skip(self), fields(table = %self.options.table_name), err)]
    pub async fn purge_expired(&self) -> Result<u64, EventStoreError> {
        let batch_size = self.options.delete_batch_size;
        let now = self.clock.now();

        let mut purged = 0;
        loop {
            let rows = sqlx::query(&self.statements.purge_expired_batch)
                .bind(now)
                .bind(i64::from(batch_size))
                .execute(&self.pool)
                .await
                .map_err(PgStorageError::query("purge_expired_batch"))?
                .rows_affected();
            debug!(operation = "purge_expired_batch", rows, "round trip");
            purged += rows;
            if rows < u64::from(batch_size) {
                break;
            }
        }
        Ok(purged)
    }

    async fn begin(
        &self,
        settings: &str,
    ) -> Result<Transaction<'static, Postgres>, PgStorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(PgStorageError::query("begin_transaction"))?;
        sqlx::query(settings)
            .execute(&mut *tx)
            .await
            .map_err(PgStorageError::query("set_transaction"))?;
        Ok(tx)
    }

    async fn begin_read(&self) -> Result<Transaction<'static, Postgres>, PgStorageError> {
        let settings = self.options.isolation_level.read_transaction_sql();
        self.begin(settings).await
    }

    async fn begin_write(
        &self,
        stream_id: &str,
    ) -> Result<Transaction<'static, Postgres>, PgStorageError> {
        let mut tx = self.begin(WRITE_TRANSACTION_SQL).await?;
        sqlx::query(&self.statements.lock_stream)
            .bind(stream_id)
            .execute(&mut *tx)
            .await
            .map_err(PgStorageError::query("lock_stream"))?;
        Ok(tx)
    }

    async fn insert_record(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        record: &EventRecord,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(&self.statements.insert)
            .bind(&record.id)
            .bind(record.event_id)
            .bind(&record.body)
            .bind(&record.body_type)
            .bind(&record.metadata)
            .bind(&record.metadata_type)
            .bind(&record.stream_id)
            .bind(record.event_number)
            .bind(record.time_to_live_seconds)
            .bind(expires_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

impl fmt::Debug for PgStorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStorageEngine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageEngine for PgStorageEngine {
    #[instrument(skip(self), fields(table = %self.options.table_name), err)]
    async fn initialise(&self) -> Result<(), EventStoreError> {
        for statement in create_table_statements(&self.options.table_name) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(PgStorageError::query("initialise"))?;
        }
        debug!(operation = "initialise", "round trip");
        self.purge_expired().await?;
        Ok(())
    }

    #[instrument(
        skip(self, events),
        fields(table = %self.options.table_name, event_count = events.len()),
        err
    )]
    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<StorageEvent>,
    ) -> Result<(), EventStoreError> {
        let Some(expected) = expected_version_of(&events) else {
            return Ok(());
        };
        validate_batch(stream_id, &events)?;

        let ttl = self.options.document_time_to_live_seconds;
        let now = self.clock.now();
        let expires_at = self.clock.expiry(ttl);

        let mut tx = self.begin_write(stream_id).await?;

        let purged = sqlx::query(&self.statements.purge_expired)
            .bind(stream_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(append_error(stream_id, expected, "purge_expired"))?
            .rows_affected();
        debug!(operation = "purge_expired", rows = purged, "round trip");

        let actual: i64 = sqlx::query_scalar(&self.statements.current_version)
            .bind(stream_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(append_error(stream_id, expected, "current_version"))?;
        if actual != expected {
            tx.rollback()
                .await
                .map_err(PgStorageError::query("rollback"))?;
            debug!(expected, actual, "rejecting stale append");
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: stream_id.to_owned(),
                expected,
                actual: Some(actual),
            });
        }

        let count = events.len();
        for event in events {
            let record = EventRecord::from_storage_event(event, ttl);
            self.insert_record(&mut tx, &record, expires_at)
                .await
                .map_err(append_error(stream_id, expected, "insert_record"))?;
        }

        tx.commit()
            .await
            .map_err(append_error(stream_id, expected, "commit_transaction"))?;
        debug!(operation = "append", rows = count, "round trip");
        Ok(())
    }

    #[instrument(skip(self), fields(table = %self.options.table_name), err)]
    async fn read_stream_forwards(
        &self,
        stream_id: &str,
        start: i64,
        count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        let mut cursor = ForwardPages {
            tx: self.begin_read().await?,
            sql: &self.statements.read_forwards_page,
            stream_id,
            next: start,
            end: forward_end(start, count),
            now: self.clock.now(),
            page_size: self.options.page_size,
            exhausted: false,
        };
        let events = read_all(&mut cursor).await?;
        finish_read(cursor.tx).await?;
        Ok(events)
    }

    #[instrument(
        skip(self, read_from_here),
        fields(table = %self.options.table_name),
        err
    )]
    async fn read_stream_forwards_from_last(
        &self,
        stream_id: &str,
        read_from_here: &ReadPredicate<'_>,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        let mut cursor = BackwardPages {
            tx: self.begin_read().await?,
            sql: &self.statements.read_backwards_page,
            stream_id,
            through: i64::MAX,
            now: self.clock.now(),
            page_size: self.options.page_size,
            exhausted: false,
        };
        let events = read_back_until(&mut cursor, read_from_here).await?;
        finish_read(cursor.tx).await?;
        Ok(events)
    }

    #[instrument(skip(self), fields(table = %self.options.table_name), err)]
    async fn delete_stream(&self, stream_id: &str) -> Result<(), EventStoreError> {
        let batch_size = u64::from(self.options.delete_batch_size);
        let mut tx = self.begin_write(stream_id).await?;

        let mut deleted = 0;
        loop {
            let rows = sqlx::query(&self.statements.delete_batch)
                .bind(stream_id)
                .bind(i64::from(self.options.delete_batch_size))
                .execute(&mut *tx)
                .await
                .map_err(PgStorageError::query("delete_batch"))?
                .rows_affected();
            debug!(operation = "delete_batch", rows, "round trip");
            deleted += rows;
            if rows < batch_size {
                break;
            }
        }

        tx.commit()
            .await
            .map_err(PgStorageError::query("commit_transaction"))?;
        debug!(operation = "delete", rows = deleted, "stream deleted");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let exists = sqlx::query_scalar::<_, bool>(&self.statements.table_exists)
            .bind(&self.options.table_name)
            .fetch_one(&self.pool)
            .await;
        match exists {
            Ok(true) => true,
            Ok(false) => {
                warn!(table = %self.options.table_name, "record table is missing");
                false
            }
            Err(err) => {
                warn!(error = %err, "health check failed");
                false
            }
        }
    }
}

/// Ascending keyset pages over `[next, end)`.
struct ForwardPages<'a> {
    tx: Transaction<'static, Postgres>,
    sql: &'a str,
    stream_id: &'a str,
    next: i64,
    end: i64,
    now: DateTime<Utc>,
    page_size: u32,
    exhausted: bool,
}

#[async_trait]
impl PageCursor for ForwardPages<'_> {
    async fn next_page(&mut self) -> Result<Option<Vec<StorageEvent>>, EventStoreError> {
        if self.exhausted || self.next >= self.end {
            return Ok(None);
        }
        let rows = sqlx::query(self.sql)
            .bind(self.stream_id)
            .bind(self.next)
            .bind(self.end)
            .bind(self.now)
            .bind(i64::from(self.page_size))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(PgStorageError::query("read_forwards_page"))?;
        debug!(operation = "read_forwards_page", rows = rows.len(), "round trip");

        let page = events_from_rows(&rows)?;
        match page.last() {
            Some(last) if is_full_page(&page, self.page_size) => self.next = last.event_number + 1,
            _ => self.exhausted = true,
        }
        Ok((!page.is_empty()).then_some(page))
    }
}

/// Descending keyset pages from `through` down to the first event.
struct BackwardPages<'a> {
    tx: Transaction<'static, Postgres>,
    sql: &'a str,
    stream_id: &'a str,
    through: i64,
    now: DateTime<Utc>,
    page_size: u32,
    exhausted: bool,
}

#[async_trait]
impl PageCursor for BackwardPages<'_> {
    async fn next_page(&mut self) -> Result<Option<Vec<StorageEvent>>, EventStoreError> {
        if self.exhausted || self.through < 1 {
            return Ok(None);
        }
        let rows = sqlx::query(self.sql)
            .bind(self.stream_id)
            .bind(self.through)
            .bind(self.now)
            .bind(i64::from(self.page_size))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(PgStorageError::query("read_backwards_page"))?;
        debug!(operation = "read_backwards_page", rows = rows.len(), "round trip");

        let page = events_from_rows(&rows)?;
        match page.last() {
            Some(last) if is_full_page(&page, self.page_size) => {
                self.through = last.event_number - 1;
            }
            _ => self.exhausted = true,
        }
        Ok((!page.is_empty()).then_some(page))
    }
}

async fn finish_read(tx: Transaction<'static, Postgres>) -> Result<(), PgStorageError> {
    tx.commit()
        .await
        .map_err(PgStorageError::query("commit_read"))
}

fn append_error<'a>(
    stream_id: &'a str,
    expected: i64,
    operation: &'static str,
) -> impl FnOnce(sqlx::Error) -> EventStoreError + 'a {
    move |err| {
        if is_conflict_signature(&err) {
            EventStoreError::ConcurrencyConflict {
                stream_id: stream_id.to_owned(),
                expected,
                actual: None,
            }
        } else {
            PgStorageError::query(operation)(err).into()
        }
    }
}

fn is_full_page(page: &[StorageEvent], page_size: u32) -> bool {
    u32::try_from(page.len()).is_ok_and(|len| len == page_size)
}

fn record_from_row(row: &PgRow) -> Result<EventRecord, sqlx::Error> {
    Ok(EventRecord {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        body: row.try_get("body")?,
        body_type: row.try_get("body_type")?,
        metadata: row.try_get("metadata")?,
        metadata_type: row.try_get("metadata_type")?,
        stream_id: row.try_get("stream_id")?,
        event_number: row.try_get("event_number")?,
        time_to_live_seconds: row.try_get("ttl")?,
    })
}

fn events_from_rows(rows: &[PgRow]) -> Result<Vec<StorageEvent>, PgStorageError> {
    rows.iter()
        .map(|row| {
            record_from_row(row)
                .map(StorageEvent::from)
                .map_err(PgStorageError::query("decode_row"))
        })
        .collect()
}
