use serde::Serialize;

use crate::{
    catalog::{Catalog, error::CatalogError},
    domain::track::{PlaylistId, TrackId},
};

/// Outcome of checking the live playlist for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Membership {
    /// true when the track is not in the playlist yet and can be voted on
    pub can_vote: bool,
    /// shown to the user as is
    pub reason: String,
}

/// Asks the catalog for the current playlist contents, never a cached copy.
pub fn check_track_in_playlist(
    catalog: &dyn Catalog,
    playlist: &PlaylistId,
    track: &TrackId,
) -> Result<Membership, CatalogError> {
    let present = catalog.playlist_tracks(playlist)?.contains(track);

    Ok(if present {
        Membership {
            can_vote: false,
            reason: "This track is already in the playlist.".to_string(),
        }
    } else {
        Membership {
            can_vote: true,
            reason: "This track is not in the playlist yet.".to_string(),
        }
    })
}
