//! Record table schema and the SQL the engine runs against it.
//!
//! One row per event. Columns mirror `EventRecord`; `expires_at` is derived
//! from `ttl` at write time so expiry is a plain comparison on read, and the
//! partial index on it serves the table-wide expiry sweep.

/// DDL creating the record table and its indexes. Idempotent.
#[must_use]
pub fn create_table_statements(table: &str) -> [String; 2] {
    [
        format!(
            r"
CREATE TABLE IF NOT EXISTS {table} (
    id            TEXT PRIMARY KEY,
    event_id      UUID NOT NULL,
    body          JSONB NOT NULL,
    body_type     TEXT NOT NULL,
    metadata      JSONB,
    metadata_type TEXT,
    stream_id     TEXT NOT NULL,
    event_number  BIGINT NOT NULL CHECK (event_number > 0),
    ttl           INTEGER,
    expires_at    TIMESTAMPTZ,
    UNIQUE (stream_id, event_number)
)"
        ),
        format!(
            r"
CREATE INDEX IF NOT EXISTS {table}_expires_at_idx
    ON {table} (expires_at)
    WHERE expires_at IS NOT NULL"
        ),
    ]
}

const RECORD_COLUMNS: &str =
    "id, event_id, body, body_type, metadata, metadata_type, stream_id, event_number, ttl";

/// Statements for one record table, rendered once per engine.
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub(crate) lock_stream: String,
    pub(crate) purge_expired: String,
    pub(crate) purge_expired_batch: String,
    pub(crate) current_version: String,
    pub(crate) insert: String,
    pub(crate) read_forwards_page: String,
    pub(crate) read_backwards_page: String,
    pub(crate) delete_batch: String,
    pub(crate) table_exists: String,
}

impl Statements {
    pub(crate) fn for_table(table: &str) -> Self {
        Self {
            lock_stream: "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))".to_owned(),
            purge_expired: format!(
                "DELETE FROM {table} WHERE stream_id = $1 AND expires_at <= $2"
            ),
            purge_expired_batch: format!(
                "DELETE FROM {table} WHERE id IN \
                 (SELECT id FROM {table} WHERE expires_at <= $1 LIMIT $2)"
            ),
            current_version: format!(
                "SELECT COALESCE(MAX(event_number), 0) AS current_version \
                 FROM {table} WHERE stream_id = $1"
            ),
            insert: format!(
                "INSERT INTO {table} ({RECORD_COLUMNS}, expires_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            ),
            read_forwards_page: format!(
                "SELECT {RECORD_COLUMNS} FROM {table} \
                 WHERE stream_id = $1 AND event_number >= $2 AND event_number < $3 \
                 AND (expires_at IS NULL OR expires_at > $4) \
                 ORDER BY event_number ASC LIMIT $5"
            ),
            read_backwards_page: format!(
                "SELECT {RECORD_COLUMNS} FROM {table} \
                 WHERE stream_id = $1 AND event_number <= $2 \
                 AND (expires_at IS NULL OR expires_at > $3) \
                 ORDER BY event_number DESC LIMIT $4"
            ),
            delete_batch: format!(
                "DELETE FROM {table} WHERE id IN \
                 (SELECT id FROM {table} WHERE stream_id = $1 LIMIT $2)"
            ),
            table_exists: "SELECT to_regclass($1) IS NOT NULL".to_owned(),
        }
    }
}
