//! Persisted tables: the vote ledger and the comments sheet.

use crate::{
    domain::ledger::{LedgerTable, Revision},
    storage::error::StorageError,
};

pub mod db;
pub mod error;
pub mod operations;
pub(crate) mod schema;

/// Whole-table store holding the vote ledger.
///
/// `update` is last-write-wins unless the implementation checks the revision
/// of the snapshot it is given; [`operations::Storage`] does and returns
/// [`StorageError::Conflict`] when the table moved on since it was read.
pub trait LedgerStore {
    fn read(&mut self) -> Result<LedgerTable, StorageError>;

    /// replaces the stored table with `table`, returns the new revision
    fn update(&mut self, table: &LedgerTable) -> Result<Revision, StorageError>;
}
