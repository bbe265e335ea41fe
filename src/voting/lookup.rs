use log::debug;

use crate::{
    catalog::{Catalog, error::CatalogError},
    domain::track::{TrackId, TrackRecord},
    voting::error::VoteError,
};

/// What the user typed to find a track: a link, or a name together with an artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackQuery {
    Link(String),
    NameArtist { name: String, artist: String },
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TrackQuery {
    /// Builds a query from optional form fields. Blank fields count as missing.
    ///
    /// Exactly one form has to be filled in: a link alone, or both name and artist.
    pub fn from_parts(
        link: Option<&str>,
        name: Option<&str>,
        artist: Option<&str>,
    ) -> Result<Self, VoteError> {
        match (non_blank(link), non_blank(name), non_blank(artist)) {
            (Some(link), None, None) => Ok(Self::Link(link)),
            (None, Some(name), Some(artist)) => Ok(Self::NameArtist { name, artist }),
            (Some(_), _, _) => Err(VoteError::InvalidQuery(
                "search either by link or by track name and artist, not both".into(),
            )),
            (None, None, None) => Err(VoteError::InvalidQuery(
                "enter a track link, or a track name and artist".into(),
            )),
            (None, _, _) => Err(VoteError::InvalidQuery(
                "both track name and artist are needed".into(),
            )),
        }
    }
}

/// Resolves the query against the catalog.
///
/// A link that does not parse, an unknown id and an empty search all give `Ok(None)`.
pub fn search_track(
    catalog: &dyn Catalog,
    query: &TrackQuery,
) -> Result<Option<TrackRecord>, CatalogError> {
    match query {
        TrackQuery::Link(link) => match TrackId::parse_link(link) {
            Some(id) => catalog.track(&id),
            None => {
                debug!("'{link}' is not a track link");
                Ok(None)
            }
        },
        TrackQuery::NameArtist { name, artist } => catalog.search(name, artist),
    }
}
