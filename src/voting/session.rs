use chrono::Utc;
use log::{info, warn};

use crate::{
    catalog::Catalog,
    config::VotingConfig,
    domain::{
        ledger::{LedgerEntry, LedgerTable, LedgerTrack, VoterId},
        track::{PlaylistId, TrackRecord},
    },
    storage::LedgerStore,
    voting::{
        error::VoteError,
        ledger::{refresh_votes, veto_for_track, vote_for_track},
        lookup::{TrackQuery, search_track},
        membership::{Membership, check_track_in_playlist},
        promotion::{PromotionReport, promote_ready},
    },
};

/// Ledger state after a vote, veto or sweep.
#[derive(Debug, Clone)]
pub struct Tally {
    /// entries still pending, in display order
    pub pending: Vec<LedgerEntry>,
    pub promotion: PromotionReport,
}

/// A freshly proposed track and the resulting tally.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub track: TrackRecord,
    pub tally: Tally,
}

/// Everything one user action needs: the user's catalog handle, the ledger,
/// the managed playlist and the voting rules.
///
/// Lives for a single request, nothing is shared between sessions except the
/// persisted ledger.
pub struct Session<'a> {
    catalog: &'a dyn Catalog,
    store: &'a mut dyn LedgerStore,
    playlist: &'a PlaylistId,
    voting: &'a VotingConfig,
    voter: VoterId,
}

impl<'a> Session<'a> {
    /// Identifies the voter. Any failure to read the current user means
    /// the token holder may not vote.
    pub fn open(
        catalog: &'a dyn Catalog,
        store: &'a mut dyn LedgerStore,
        playlist: &'a PlaylistId,
        voting: &'a VotingConfig,
    ) -> Result<Self, VoteError> {
        let user = catalog.current_user().map_err(|e| {
            warn!("Refusing vote access, could not read current user: {e}");
            VoteError::Unauthorized
        })?;

        Ok(Self {
            catalog,
            store,
            playlist,
            voting,
            voter: VoterId(user.display_name),
        })
    }

    pub fn voter(&self) -> &VoterId {
        &self.voter
    }

    pub fn has_voted(&self, entry: &LedgerEntry) -> bool {
        entry.has_voted(&self.voter)
    }

    pub fn search(&self, query: &TrackQuery) -> Result<TrackRecord, VoteError> {
        search_track(self.catalog, query)?.ok_or(VoteError::NotFound)
    }

    pub fn check(&self, track: &TrackRecord) -> Result<Membership, VoteError> {
        Ok(check_track_in_playlist(
            self.catalog,
            self.playlist,
            &track.id,
        )?)
    }

    /// Looks the track up, makes sure it is not in the playlist yet, votes
    /// for it and runs a promotion sweep.
    pub fn propose(&mut self, query: &TrackQuery) -> Result<Proposal, VoteError> {
        let track = self.search(query)?;

        let membership = self.check(&track)?;
        if !membership.can_vote {
            info!("{} proposed {track}, already in the playlist", self.voter);
            return Err(VoteError::AlreadyInPlaylist(membership.reason));
        }

        // an expired entry for the same track must not take this vote
        self.pending()?;
        vote_for_track(self.store, &self.voter, &LedgerTrack::from(&track), Utc::now())?;
        let tally = self.tally()?;

        Ok(Proposal { track, tally })
    }

    /// Votes for a track that is already pending.
    pub fn vote(&mut self, url: &str) -> Result<Tally, VoteError> {
        let track = self.pending_track(url)?;
        vote_for_track(self.store, &self.voter, &track, Utc::now())?;
        self.tally()
    }

    /// Takes back this voter's vote on a pending track.
    pub fn veto(&mut self, url: &str) -> Result<Tally, VoteError> {
        self.pending_track(url)?;
        veto_for_track(self.store, &self.voter, url)?;
        self.tally()
    }

    /// Runs a promotion sweep without voting.
    pub fn sweep(&mut self) -> Result<Tally, VoteError> {
        self.tally()
    }

    /// Pending entries inside the retention window, in display order.
    pub fn pending(&mut self) -> Result<LedgerTable, VoteError> {
        Ok(refresh_votes(self.store, self.voting.cutoff(Utc::now()))?)
    }

    /// Entry at `url` if it is still inside the retention window.
    fn pending_track(&mut self, url: &str) -> Result<LedgerTrack, VoteError> {
        self.pending()?
            .find(url)
            .map(LedgerTrack::from)
            .ok_or_else(|| VoteError::NotPending(url.to_string()))
    }

    fn tally(&mut self) -> Result<Tally, VoteError> {
        // expire first, entries past the window never get promoted
        self.pending()?;
        let promotion = promote_ready(
            self.catalog,
            self.store,
            self.playlist,
            self.voting.promotion_threshold,
        )?;
        let pending = self.pending()?.entries;
        Ok(Tally { pending, promotion })
    }
}
