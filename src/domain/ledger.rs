use std::{collections::BTreeSet, fmt::Display};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::track::TrackRecord;

/// Display name of the authenticated user casting a vote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(pub String);

impl Display for VoterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version stamp of a ledger snapshot, bumped on every successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Revision(pub i64);

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// What the ledger needs to know about a proposed track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTrack {
    pub url: String,
    pub name: String,
    pub artist: String,
}

impl From<&TrackRecord> for LedgerTrack {
    fn from(track: &TrackRecord) -> Self {
        Self {
            url: track.url.clone(),
            name: track.name.clone(),
            artist: track.artist.clone(),
        }
    }
}

impl From<&LedgerEntry> for LedgerTrack {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            url: entry.url.clone(),
            name: entry.name.clone(),
            artist: entry.artist.clone(),
        }
    }
}

/// Pending proposal. The vote count is the size of the voter set, so the two
/// can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub url: String,
    pub name: String,
    pub artist: String,
    pub voted_by: BTreeSet<VoterId>,
    pub added_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `added_at` is kept at whole seconds, the resolution the store keeps.
    pub fn new(track: &LedgerTrack, voter: &VoterId, now: DateTime<Utc>) -> Self {
        Self {
            url: track.url.clone(),
            name: track.name.clone(),
            artist: track.artist.clone(),
            voted_by: BTreeSet::from([voter.clone()]),
            added_at: now.trunc_subsecs(0),
        }
    }

    pub fn votes(&self) -> usize {
        self.voted_by.len()
    }

    pub fn has_voted(&self, voter: &VoterId) -> bool {
        self.voted_by.contains(voter)
    }
}

/// Whole ledger as read from the store, together with the revision it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTable {
    pub revision: Revision,
    pub entries: Vec<LedgerEntry>,
}

impl LedgerTable {
    pub fn find(&self, url: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.url == url)
    }

    /// Records a vote. Creates the entry on the first vote for an unseen track.
    ///
    /// Returns false when the voter had already voted for this track.
    pub fn cast_vote(&mut self, voter: &VoterId, track: &LedgerTrack, now: DateTime<Utc>) -> bool {
        match self.entries.iter_mut().find(|e| e.url == track.url) {
            Some(entry) => entry.voted_by.insert(voter.clone()),
            None => {
                self.entries.push(LedgerEntry::new(track, voter, now));
                true
            }
        }
    }

    /// Takes back the voter's vote. A veto from someone who never voted, or
    /// on a track that is not pending, changes nothing and returns false.
    pub fn retract_vote(&mut self, voter: &VoterId, url: &str) -> bool {
        self.entries
            .iter_mut()
            .find(|e| e.url == url)
            .map(|entry| entry.voted_by.remove(voter))
            .unwrap_or(false)
    }

    /// drops entries added strictly before `cutoff`, returns how many were dropped
    pub fn expire_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.added_at >= cutoff);
        before - self.entries.len()
    }

    pub fn remove(&mut self, url: &str) -> Option<LedgerEntry> {
        let idx = self.entries.iter().position(|e| e.url == url)?;
        Some(self.entries.remove(idx))
    }

    /// Most votes first, older first among equals. Url breaks remaining ties.
    pub fn sort_for_display(&mut self) {
        self.entries.sort_by(|a, b| {
            b.votes()
                .cmp(&a.votes())
                .then(a.added_at.cmp(&b.added_at))
                .then_with(|| a.url.cmp(&b.url))
        });
    }

    /// entries with more than `threshold` votes, oldest first
    pub fn promotion_candidates(&self, threshold: usize) -> Vec<LedgerEntry> {
        let mut candidates = self
            .entries
            .iter()
            .filter(|e| e.votes() > threshold)
            .cloned()
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.url.cmp(&b.url)));
        candidates
    }
}
