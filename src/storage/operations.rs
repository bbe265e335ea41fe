use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{Transaction, TransactionBehavior, params};

use crate::{
    config::LedgerConfig,
    domain::{
        comment::Comment,
        ledger::{LedgerEntry, LedgerTable, Revision, VoterId},
    },
    storage::{
        LedgerStore,
        db::{self, SecondsSinceUnix, from_seconds, to_seconds},
        error::StorageError,
        schema::{columns, tables},
    },
};

use columns::*;
use tables::*;

/// Main structure that implements all storage logic
pub struct Storage {
    pub(crate) db: rusqlite::Connection,
}

/// Row of the votes table exactly as stored.
struct VoteRow {
    url: String,
    name: String,
    artist: String,
    votes: i64,
    voted_by: String,
    added_at: SecondsSinceUnix,
}

impl VoteRow {
    fn into_entry(self) -> Result<LedgerEntry, StorageError> {
        let malformed = |reason: String| StorageError::MalformedRow {
            url: self.url.clone(),
            reason,
        };

        if self.votes < 0 {
            return Err(malformed(format!("negative vote count {}", self.votes)));
        }

        let voted_by: BTreeSet<VoterId> = serde_json::from_str(&self.voted_by)
            .map_err(|e| malformed(format!("{VOTED_BY} is not a list of voters: {e}")))?;

        let added_at = from_seconds(self.added_at).map_err(|e| malformed(e.to_string()))?;

        if usize::try_from(self.votes).ok() != Some(voted_by.len()) {
            warn!(
                "Ledger row {} stores {} votes but {} voters, counting voters",
                self.url,
                self.votes,
                voted_by.len()
            );
        }

        Ok(LedgerEntry {
            url: self.url,
            name: self.name,
            artist: self.artist,
            voted_by,
            added_at,
        })
    }
}

impl Storage {
    /// when called, opens a data base connection
    pub fn new(config: &LedgerConfig) -> Result<Self, StorageError> {
        let db = db::open(config)?;
        Ok(Self::from_existing_conn(db))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    fn read_revision(tx: &Transaction) -> Result<Revision, StorageError> {
        let revision = tx.query_row(
            &format!("SELECT COALESCE(MAX({REVISION}), 0) FROM {LEDGER_REVISION}"),
            [],
            |row| row.get(0),
        )?;
        Ok(Revision(revision))
    }

    /// appends a comment, both author and text must be non-blank
    pub fn add_comment(
        &mut self,
        author: &str,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, StorageError> {
        let author = author.trim();
        let comment = comment.trim();
        if author.is_empty() {
            return Err(StorageError::InvalidComment("author is empty".into()));
        }
        if comment.is_empty() {
            return Err(StorageError::InvalidComment("comment is empty".into()));
        }

        self.db.execute(
            &format!("INSERT INTO {COMMENTS} ({AUTHOR}, {COMMENT}, {CREATED_AT}) VALUES (?1, ?2, ?3)"),
            params![author, comment, to_seconds(now)],
        )?;

        Ok(Comment {
            author: author.to_string(),
            comment: comment.to_string(),
            created_at: from_seconds(to_seconds(now))?,
        })
    }

    /// all comments, oldest first
    pub fn list_comments(&mut self) -> Result<Vec<Comment>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {AUTHOR}, {COMMENT}, {CREATED_AT} FROM {COMMENTS} ORDER BY {CREATED_AT}, rowid"
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, SecondsSinceUnix>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(author, comment, created_at)| -> Result<Comment, StorageError> {
                Ok(Comment {
                    author,
                    comment,
                    created_at: from_seconds(created_at)?,
                })
            })
            .collect()
    }
}

impl LedgerStore for Storage {
    fn read(&mut self) -> Result<LedgerTable, StorageError> {
        let tx = self.db.transaction()?;

        let (rows, revision) = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {URL}, {NAME}, {ARTIST}, {VOTES_COUNT}, {VOTED_BY}, {ADDED_AT} FROM {VOTES}"
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(VoteRow {
                        url: row.get(0)?,
                        name: row.get(1)?,
                        artist: row.get(2)?,
                        votes: row.get(3)?,
                        voted_by: row.get(4)?,
                        added_at: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            (rows, Self::read_revision(&tx)?)
        };

        tx.commit()?;

        let entries = rows
            .into_iter()
            .map(VoteRow::into_entry)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LedgerTable { revision, entries })
    }

    /// Writes the whole table back, but only if nobody wrote since `table` was read.
    fn update(&mut self, table: &LedgerTable) -> Result<Revision, StorageError> {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let found = Self::read_revision(&tx)?;
        if found != table.revision {
            return Err(StorageError::Conflict {
                expected: table.revision,
                found,
            });
        }

        tx.execute(&format!("DELETE FROM {VOTES}"), [])?;

        for entry in &table.entries {
            let voted_by = serde_json::to_string(&entry.voted_by)
                .map_err(|e| StorageError::Internal(e.into()))?;
            tx.execute(
                &format!(
                    "INSERT INTO {VOTES} ({URL}, {NAME}, {ARTIST}, {VOTES_COUNT}, {VOTED_BY}, {ADDED_AT})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    entry.url,
                    entry.name,
                    entry.artist,
                    entry.votes() as i64,
                    voted_by,
                    to_seconds(entry.added_at)
                ],
            )?;
        }

        let next = Revision(found.0 + 1);
        tx.execute(
            &format!("UPDATE {LEDGER_REVISION} SET {REVISION} = ?1"),
            params![next.0],
        )?;

        tx.commit()?;
        Ok(next)
    }
}
