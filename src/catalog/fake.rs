//! In-memory catalog used by tests.

use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    catalog::{Catalog, CatalogUser, error::CatalogError},
    domain::track::{PlaylistId, TrackId, TrackRecord},
};

pub struct FakeCatalog {
    pub tracks: Vec<TrackRecord>,
    pub playlist: Mutex<Vec<TrackId>>,
    pub user: Option<CatalogUser>,
    /// adds of these tracks fail with a 502
    pub failing_adds: Mutex<HashSet<TrackId>>,
    pub add_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(user: &str) -> Self {
        Self {
            tracks: Vec::new(),
            playlist: Mutex::new(Vec::new()),
            user: Some(CatalogUser {
                id: user.to_lowercase(),
                display_name: user.to_string(),
            }),
            failing_adds: Mutex::new(HashSet::new()),
            add_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_track(mut self, track: TrackRecord) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn fail_adds_of(&self, id: &TrackId) {
        self.failing_adds.lock().unwrap().insert(id.clone());
    }

    pub fn heal_adds(&self) {
        self.failing_adds.lock().unwrap().clear();
    }

    pub fn adds(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn in_playlist(&self, id: &TrackId) -> bool {
        self.playlist.lock().unwrap().contains(id)
    }
}

pub fn track_record(id: &str, name: &str, artist: &str) -> TrackRecord {
    let id = TrackId::new(id).unwrap();
    TrackRecord {
        url: id.to_url(),
        id,
        name: name.to_string(),
        artist: artist.to_string(),
        image: None,
        release_date: None,
        duration_ms: 180_000,
    }
}

impl Catalog for FakeCatalog {
    fn track(&self, id: &TrackId) -> Result<Option<TrackRecord>, CatalogError> {
        Ok(self.tracks.iter().find(|t| &t.id == id).cloned())
    }

    fn search(&self, name: &str, artist: &str) -> Result<Option<TrackRecord>, CatalogError> {
        Ok(self
            .tracks
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name) && t.artist.eq_ignore_ascii_case(artist))
            .cloned())
    }

    fn current_user(&self) -> Result<CatalogUser, CatalogError> {
        self.user.clone().ok_or(CatalogError::Unauthorized(403))
    }

    fn playlist_tracks(&self, _playlist: &PlaylistId) -> Result<Vec<TrackId>, CatalogError> {
        Ok(self.playlist.lock().unwrap().clone())
    }

    fn add_to_playlist(&self, _playlist: &PlaylistId, track: &TrackId) -> Result<(), CatalogError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_adds.lock().unwrap().contains(track) {
            return Err(CatalogError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        self.playlist.lock().unwrap().push(track.clone());
        Ok(())
    }
}
