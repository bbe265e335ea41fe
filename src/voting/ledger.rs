//! Vote ledger operations.
//!
//! Each mutation reads the whole table, applies the change and writes the
//! table back. When the store reports that somebody else wrote in between,
//! the change is re-applied on a fresh read.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::{
    domain::ledger::{LedgerTable, LedgerTrack, VoterId},
    storage::{LedgerStore, error::StorageError},
};

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Runs `apply` on a fresh copy of the ledger and persists it if it changed anything.
fn mutate<F>(store: &mut dyn LedgerStore, mut apply: F) -> Result<LedgerTable, StorageError>
where
    F: FnMut(&mut LedgerTable) -> bool,
{
    let mut attempt = 1;
    loop {
        let mut table = store.read()?;
        if !apply(&mut table) {
            return Ok(table);
        }

        match store.update(&table) {
            Ok(revision) => {
                table.revision = revision;
                return Ok(table);
            }
            Err(StorageError::Conflict { expected, found }) if attempt < MAX_WRITE_ATTEMPTS => {
                warn!(
                    "Ledger moved from {expected} to {found} while writing, retrying ({attempt}/{MAX_WRITE_ATTEMPTS})"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Adds `voter`'s vote for `track`, creating the ledger entry on the first vote.
///
/// Voting twice for the same track changes nothing.
pub fn vote_for_track(
    store: &mut dyn LedgerStore,
    voter: &VoterId,
    track: &LedgerTrack,
    now: DateTime<Utc>,
) -> Result<LedgerTable, StorageError> {
    mutate(store, |table| {
        let changed = table.cast_vote(voter, track, now);
        if changed {
            info!("{voter} voted for {} - {}", track.name, track.artist);
        } else {
            debug!("{voter} already voted for {}", track.url);
        }
        changed
    })
}

/// Takes back `voter`'s vote for the pending track at `url`.
///
/// A veto from someone who has not voted for the track is a no-op.
pub fn veto_for_track(
    store: &mut dyn LedgerStore,
    voter: &VoterId,
    url: &str,
) -> Result<LedgerTable, StorageError> {
    mutate(store, |table| {
        let changed = table.retract_vote(voter, url);
        if changed {
            info!("{voter} vetoed {url}");
        } else {
            debug!("{voter} has no vote on {url} to veto");
        }
        changed
    })
}

/// Drops entries added before `cutoff` and returns what is still pending,
/// most votes first, then oldest first.
pub fn refresh_votes(
    store: &mut dyn LedgerStore,
    cutoff: DateTime<Utc>,
) -> Result<LedgerTable, StorageError> {
    let mut table = mutate(store, |table| {
        let expired = table.expire_before(cutoff);
        if expired > 0 {
            info!("{expired} pending track(s) expired before {cutoff}");
        }
        expired > 0
    })?;
    table.sort_for_display();
    Ok(table)
}

/// Removes the given entries. Used once their promotion has been confirmed.
pub fn remove_entries(
    store: &mut dyn LedgerStore,
    urls: &[String],
) -> Result<LedgerTable, StorageError> {
    mutate(store, |table| {
        urls.iter()
            .fold(false, |changed, url| table.remove(url).is_some() || changed)
    })
}
