//! Payload target - which row and column the image route serves
//!
//! Table and column names are configuration, so they are validated as plain
//! SQL identifiers before any query text is built from them. The row id is
//! always bound as a parameter.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ValidationError;

/// Postgres truncates identifiers beyond this length.
const MAX_IDENT_LEN: usize = 63;

/// Default chunk size for payload reads (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound for a single chunk read (16 MiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

static IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid")
});

/// A validated, unquoted SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlIdent(String);

impl SqlIdent {
    pub fn new(field: &'static str, value: &str) -> Result<Self, ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::Empty { field });
        }
        if value.len() > MAX_IDENT_LEN {
            return Err(ValidationError::TooLong {
                field,
                max: MAX_IDENT_LEN,
            });
        }
        if !IDENT_RE.is_match(value) {
            return Err(ValidationError::InvalidFormat {
                field,
                reason: "must start with a letter or underscore and contain only letters, digits and underscores",
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The row and column holding the served payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobTarget {
    pub table: SqlIdent,
    pub column: SqlIdent,
    pub row_id: i64,
}

impl LobTarget {
    pub fn new(table: &str, column: &str, row_id: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            table: SqlIdent::new("table", table)?,
            column: SqlIdent::new("column", column)?,
            row_id,
        })
    }

    /// `$1` = row id. Yields zero rows, one NULL, or the payload length.
    pub fn length_query(&self) -> String {
        format!(
            "SELECT octet_length({})::BIGINT FROM {} WHERE id = $1",
            self.column, self.table
        )
    }

    /// `$1` = row id, `$2` = 1-based offset, `$3` = length.
    pub fn chunk_query(&self) -> String {
        format!(
            "SELECT substring({} FROM $2 FOR $3) FROM {} WHERE id = $1",
            self.column, self.table
        )
    }

    pub fn create_table_query(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (id BIGINT PRIMARY KEY, {} BYTEA)",
            self.table, self.column
        )
    }

    /// `$1` = row id, `$2` = payload (nullable).
    pub fn upsert_query(&self) -> String {
        format!(
            "INSERT INTO {table} (id, {col}) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET {col} = EXCLUDED.{col}",
            table = self.table,
            col = self.column
        )
    }
}

impl Default for LobTarget {
    fn default() -> Self {
        Self {
            table: SqlIdent("no_lobs".to_string()),
            column: SqlIdent("b".to_string()),
            row_id: 2,
        }
    }
}

/// What the image route serves and how it reads it.
#[derive(Debug, Clone)]
pub struct PayloadConfig {
    pub target: Arc<LobTarget>,
    pub chunk_size: usize,
}

impl PayloadConfig {
    pub fn new(target: LobTarget, chunk_size: usize) -> Result<Self, ValidationError> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ValidationError::OutOfRange {
                field: "chunk_size",
                min: 1,
                max: MAX_CHUNK_SIZE as u64,
            });
        }
        Ok(Self {
            target: Arc::new(target),
            chunk_size,
        })
    }
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            target: Arc::new(LobTarget::default()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
