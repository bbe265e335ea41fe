use std::collections::HashSet;

use log::{info, warn};

use crate::{
    catalog::Catalog,
    domain::{
        ledger::LedgerEntry,
        track::{PlaylistId, TrackId},
    },
    storage::{LedgerStore, error::StorageError},
    voting::ledger::remove_entries,
};

#[derive(Debug, Clone)]
pub struct RetainedEntry {
    pub entry: LedgerEntry,
    pub reason: String,
}

/// Result of one promotion sweep.
#[derive(Debug, Clone, Default)]
pub struct PromotionReport {
    /// added to the playlist and removed from the ledger
    pub promoted: Vec<LedgerEntry>,
    /// qualified, but the playlist add failed; still in the ledger
    pub retained: Vec<RetainedEntry>,
}

impl PromotionReport {
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.retained.is_empty()
    }

    /// one line per entry, for showing to the user
    pub fn messages(&self) -> Vec<String> {
        let promoted = self
            .promoted
            .iter()
            .map(|e| format!("Added {} - {} to the playlist", e.name, e.artist));
        let retained = self.retained.iter().map(|r| {
            format!(
                "Could not add {} - {} to the playlist yet: {}",
                r.entry.name, r.entry.artist, r.reason
            )
        });
        promoted.chain(retained).collect()
    }
}

/// Moves every entry with more than `threshold` votes into the playlist.
///
/// Oldest entries go first. An entry leaves the ledger only after the catalog
/// confirmed the add (or already lists the track); failed adds stay for the
/// next sweep. Catalog failures never abort the sweep, ledger failures do.
pub fn promote_ready(
    catalog: &dyn Catalog,
    store: &mut dyn LedgerStore,
    playlist: &PlaylistId,
    threshold: usize,
) -> Result<PromotionReport, StorageError> {
    let candidates = store.read()?.promotion_candidates(threshold);
    let mut report = PromotionReport::default();
    if candidates.is_empty() {
        return Ok(report);
    }

    // tracks added by an earlier sweep whose ledger removal did not go through
    let already_listed: HashSet<TrackId> = match catalog.playlist_tracks(playlist) {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            warn!("Could not read playlist {playlist} before promoting: {e}");
            HashSet::new()
        }
    };

    for entry in candidates {
        let Some(id) = TrackId::parse_link(&entry.url) else {
            warn!("Pending entry {} is not a track link, leaving it", entry.url);
            report.retained.push(RetainedEntry {
                reason: "not a track link".to_string(),
                entry,
            });
            continue;
        };

        if already_listed.contains(&id) {
            info!("{} is already in playlist {playlist}, clearing it from the ledger", entry.url);
            report.promoted.push(entry);
            continue;
        }

        match catalog.add_to_playlist(playlist, &id) {
            Ok(()) => {
                info!(
                    "Promoted {} - {} with {} votes to playlist {playlist}",
                    entry.name,
                    entry.artist,
                    entry.votes()
                );
                report.promoted.push(entry);
            }
            Err(e) => {
                warn!("Failed to add {} to playlist {playlist}, keeping it pending: {e}", entry.url);
                report.retained.push(RetainedEntry {
                    reason: e.to_string(),
                    entry,
                });
            }
        }
    }

    if !report.promoted.is_empty() {
        let urls = report
            .promoted
            .iter()
            .map(|e| e.url.clone())
            .collect::<Vec<_>>();
        remove_entries(store, &urls)?;
    }

    Ok(report)
}
