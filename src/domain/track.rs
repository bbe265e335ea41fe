use std::fmt::Display;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use url::Url;

pub const TRACK_URL_BASE: &str = "https://open.spotify.com/track/";
const TRACK_URI_PREFIX: &str = "spotify:track:";
const CATALOG_HOST: &str = "open.spotify.com";

/// Catalog identifier of a track.
///
/// Always made of ASCII letters and digits, so it is safe to put into
/// request paths and playlist uris without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: &str) -> Option<Self> {
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(Self(id.to_string()))
        } else {
            None
        }
    }

    /// Extracts the track id out of anything a user might paste:
    /// `spotify:track:<id>`, `https://open.spotify.com[/intl-xx]/track/<id>?si=...`
    /// or a bare id.
    ///
    /// Returns None when the link does not point to a track.
    pub fn parse_link(link: &str) -> Option<Self> {
        let link = link.trim();

        if let Some(id) = link.strip_prefix(TRACK_URI_PREFIX) {
            return Self::new(id);
        }

        match Url::parse(link) {
            Ok(url) => {
                if url.host_str() != Some(CATALOG_HOST) {
                    return None;
                }
                let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
                let segments = match segments.as_slice() {
                    [locale, rest @ ..] if locale.starts_with("intl-") => rest,
                    all => all,
                };
                match segments {
                    ["track", id] => Self::new(id),
                    _ => None,
                }
            }
            Err(_) => Self::new(link),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// uri accepted by the playlist endpoints
    pub fn to_uri(&self) -> String {
        format!("{TRACK_URI_PREFIX}{}", self.0)
    }

    /// canonical link, used as the ledger key
    pub fn to_url(&self) -> String {
        format!("{TRACK_URL_BASE}{}", self.0)
    }
}

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(pub String);

impl Display for PlaylistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Track as resolved from the catalog. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub id: TrackId,
    pub url: String,
    pub name: String,
    pub artist: String,
    pub image: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub duration_ms: u64,
}

impl TrackRecord {
    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }

    /// duration as `m:ss`
    pub fn duration_display(&self) -> String {
        let secs = self.duration_ms / 1000;
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

impl Display for TrackRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.name, self.artist)?;
        if let Some(date) = self.release_date {
            write!(f, " - {date}")?;
        }
        Ok(())
    }
}

/// Parses release dates in the precisions the catalog reports them
/// (`1999-03-02`, `1999-03`, `1999`) as well as `03/02/1999`.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
        return Some(date);
    }

    if raw.len() == 4 {
        if let Ok(year) = raw.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }

    None
}
