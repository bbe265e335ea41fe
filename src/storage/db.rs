use std::path::Path;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::{
    config::LedgerConfig,
    storage::{error::StorageError, schema},
};

pub type SecondsSinceUnix = i64;

fn open_in_memory() -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open_in_memory()
}

fn open_from_file(path: &Path) -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open(path)
}

pub fn open(config: &LedgerConfig) -> Result<rusqlite::Connection, StorageError> {
    let db = if config.in_memory {
        open_in_memory()?
    } else {
        let path = config.path.as_ref().ok_or_else(|| {
            StorageError::Internal(anyhow!("ledger.path must be set unless ledger.in_memory"))
        })?;
        open_from_file(path)?
    };
    schema::init(&db)?;
    Ok(db)
}

/// converts time to number of seconds since unix epoch
pub fn to_seconds(time: DateTime<Utc>) -> SecondsSinceUnix {
    time.timestamp()
}

/// converts number of seconds since unix epoch to utc date time
pub fn from_seconds(since_unix: SecondsSinceUnix) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp(since_unix, 0).ok_or(anyhow!(
        "failed to convert {since_unix} s timestamp to datetime"
    ))
}
