//! Access to the streaming catalog: tracks, search, playlists.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    catalog::error::CatalogError,
    domain::track::{PlaylistId, TrackId, TrackRecord},
};

pub mod error;
#[cfg(test)]
pub mod fake;
pub mod spotify;

/// Authenticated user of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogUser {
    pub id: String,
    pub display_name: String,
}

/// Already-authenticated handle on the catalog API.
///
/// Every call goes to the catalog, nothing is cached between calls.
pub trait Catalog {
    /// None when no track has this id
    fn track(&self, id: &TrackId) -> Result<Option<TrackRecord>, CatalogError>;

    /// best match for the name and artist, None when nothing matches
    fn search(&self, name: &str, artist: &str) -> Result<Option<TrackRecord>, CatalogError>;

    fn current_user(&self) -> Result<CatalogUser, CatalogError>;

    /// ids of every track currently in the playlist
    fn playlist_tracks(&self, playlist: &PlaylistId) -> Result<Vec<TrackId>, CatalogError>;

    fn add_to_playlist(&self, playlist: &PlaylistId, track: &TrackId) -> Result<(), CatalogError>;
}

impl<C: Catalog + ?Sized> Catalog for Arc<C> {
    fn track(&self, id: &TrackId) -> Result<Option<TrackRecord>, CatalogError> {
        (**self).track(id)
    }

    fn search(&self, name: &str, artist: &str) -> Result<Option<TrackRecord>, CatalogError> {
        (**self).search(name, artist)
    }

    fn current_user(&self) -> Result<CatalogUser, CatalogError> {
        (**self).current_user()
    }

    fn playlist_tracks(&self, playlist: &PlaylistId) -> Result<Vec<TrackId>, CatalogError> {
        (**self).playlist_tracks(playlist)
    }

    fn add_to_playlist(&self, playlist: &PlaylistId, track: &TrackId) -> Result<(), CatalogError> {
        (**self).add_to_playlist(playlist, track)
    }
}

/// Opens a catalog handle for the holder of `token`.
pub trait Connect: Send + Sync {
    fn connect(&self, token: &str) -> Result<Box<dyn Catalog>, CatalogError>;
}
