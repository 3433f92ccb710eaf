//! Engine configuration.

use crate::error::PgStorageError;

/// Default table holding every stream's records.
pub const DEFAULT_TABLE_NAME: &str = "commits";

/// Default number of rows fetched per read round trip.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default number of rows removed per delete statement.
pub const DEFAULT_DELETE_BATCH_SIZE: u32 = 100;

/// Isolation level of the engine's read transactions.
///
/// A stricter level makes every page of one read come from the same
/// snapshot. Appends and deletes always run at `READ COMMITTED` so the stream
/// lock is held before any statement looks at the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub(crate) fn read_transaction_sql(self) -> &'static str {
        match self {
            Self::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ ONLY",
            Self::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY",
            Self::Serializable => {
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE READ ONLY DEFERRABLE"
            }
        }
    }
}

/// Settings of every append and delete transaction, independent of the
/// server's `default_transaction_isolation`.
pub(crate) const WRITE_TRANSACTION_SQL: &str =
    "SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ WRITE";

/// Options of a [`crate::PgStorageEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgStorageOptions {
    /// Table holding the records. Must be a plain identifier.
    pub table_name: String,
    /// Isolation level applied to paged reads.
    pub isolation_level: IsolationLevel,
    /// Rows fetched per read round trip.
    pub page_size: u32,
    /// Rows removed per delete statement.
    pub delete_batch_size: u32,
    /// Time-to-live stamped on every written record. `None` keeps records
    /// forever.
    pub document_time_to_live_seconds: Option<i32>,
}

impl Default for PgStorageOptions {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_owned(),
            isolation_level: IsolationLevel::default(),
            page_size: DEFAULT_PAGE_SIZE,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            document_time_to_live_seconds: None,
        }
    }
}

impl PgStorageOptions {
    /// Set the table name.
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Set the read isolation level.
    #[must_use]
    pub const fn with_isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.isolation_level = isolation_level;
        self
    }

    /// Set the read page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the delete batch size.
    #[must_use]
    pub const fn with_delete_batch_size(mut self, delete_batch_size: u32) -> Self {
        self.delete_batch_size = delete_batch_size;
        self
    }

    /// Set the record time-to-live.
    #[must_use]
    pub const fn with_document_time_to_live_seconds(mut self, seconds: Option<i32>) -> Self {
        self.document_time_to_live_seconds = seconds;
        self
    }

    /// Checks every option.
    ///
    /// # Errors
    ///
    /// Returns `PgStorageError::InvalidTableName` for a table name that is
    /// not a plain identifier, and `PgStorageError::NonPositive` for a zero
    /// size or a non-positive time-to-live.
    pub fn validate(&self) -> Result<(), PgStorageError> {
        if !is_plain_identifier(&self.table_name) {
            return Err(PgStorageError::InvalidTableName(self.table_name.clone()));
        }
        if self.page_size == 0 {
            return Err(PgStorageError::NonPositive("page_size"));
        }
        if self.delete_batch_size == 0 {
            return Err(PgStorageError::NonPositive("delete_batch_size"));
        }
        if self.document_time_to_live_seconds.is_some_and(|ttl| ttl <= 0) {
            return Err(PgStorageError::NonPositive("document_time_to_live_seconds"));
        }
        Ok(())
    }
}

// The table name is spliced into SQL text, so only unquoted identifiers that
// fit PostgreSQL's 63-byte limit are accepted.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 63
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = PgStorageOptions::default();

        assert_eq!(options.table_name, "commits");
        assert_eq!(options.isolation_level, IsolationLevel::ReadCommitted);
        assert_eq!(options.page_size, 100);
        assert_eq!(options.delete_batch_size, 100);
        assert_eq!(options.document_time_to_live_seconds, None);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_rejects_table_names_that_are_not_identifiers() {
        let too_long = "a".repeat(64);
        let names = [
            "",
            "1commits",
            "commits; DROP TABLE x",
            "my-table",
            "\"quoted\"",
            too_long.as_str(),
        ];
        for name in names {
            let options = PgStorageOptions::default().with_table_name(name);

            assert!(
                matches!(options.validate(), Err(PgStorageError::InvalidTableName(_))),
                "accepted {name:?}"
            );
        }
    }

    #[test]
    fn test_accepts_underscored_table_names() {
        let options = PgStorageOptions::default().with_table_name("_order_commits_2");

        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_sizes_and_non_positive_ttl() {
        let zero_page = PgStorageOptions::default().with_page_size(0);
        let zero_batch = PgStorageOptions::default().with_delete_batch_size(0);
        let zero_ttl = PgStorageOptions::default().with_document_time_to_live_seconds(Some(0));

        assert!(matches!(zero_page.validate(), Err(PgStorageError::NonPositive("page_size"))));
        assert!(matches!(
            zero_batch.validate(),
            Err(PgStorageError::NonPositive("delete_batch_size"))
        ));
        assert!(matches!(
            zero_ttl.validate(),
            Err(PgStorageError::NonPositive("document_time_to_live_seconds"))
        ));
    }

    #[test]
    fn test_isolation_levels_render_read_only_transactions() {
        assert!(
            IsolationLevel::Serializable
                .read_transaction_sql()
                .ends_with("SERIALIZABLE READ ONLY DEFERRABLE")
        );
        assert!(
            IsolationLevel::RepeatableRead
                .read_transaction_sql()
                .ends_with("REPEATABLE READ READ ONLY")
        );
        assert!(
            IsolationLevel::ReadCommitted
                .read_transaction_sql()
                .ends_with("READ COMMITTED READ ONLY")
        );
    }

    #[test]
    fn test_writes_always_run_read_committed() {
        assert!(WRITE_TRANSACTION_SQL.contains("READ COMMITTED"));
        assert!(WRITE_TRANSACTION_SQL.ends_with("READ WRITE"));
    }
}
