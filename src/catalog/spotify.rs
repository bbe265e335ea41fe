use std::time::Duration;

use log::debug;
use reqwest::{
    StatusCode,
    blocking::{Client, RequestBuilder, Response},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use crate::{
    catalog::{Catalog, CatalogUser, Connect, error::CatalogError},
    config::CatalogConfig,
    domain::track::{PlaylistId, TrackId, TrackRecord, parse_release_date},
};

/// page size used when walking a playlist
const PLAYLIST_PAGE_LIMIT: &str = "100";

/// Web API client bound to one user's bearer token.
pub struct SpotifyCatalog {
    client: Client,
    api_base: String,
    token: String,
}

/// Connects to the web API with the configured base url and timeout.
pub struct SpotifyConnect {
    pub config: CatalogConfig,
}

impl Connect for SpotifyConnect {
    fn connect(&self, token: &str) -> Result<Box<dyn Catalog>, CatalogError> {
        Ok(Box::new(SpotifyCatalog::new(&self.config, token)?))
    }
}

#[derive(Deserialize)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbum>,
    #[serde(default)]
    duration_ms: u64,
}

#[derive(Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Deserialize)]
struct ApiAlbum {
    #[serde(default)]
    images: Vec<ApiImage>,
    release_date: Option<String>,
}

#[derive(Deserialize)]
struct ApiImage {
    url: String,
}

#[derive(Deserialize)]
struct ApiPage<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct ApiSearch {
    tracks: ApiPage<ApiTrack>,
}

#[derive(Deserialize)]
struct ApiPlaylistItem {
    /// null for removed or local tracks
    track: Option<ApiItemTrack>,
}

#[derive(Deserialize)]
struct ApiItemTrack {
    id: Option<String>,
}

#[derive(Deserialize)]
struct ApiUser {
    id: String,
    display_name: Option<String>,
}

impl ApiTrack {
    fn into_record(self) -> Result<TrackRecord, CatalogError> {
        let id = self
            .id
            .as_deref()
            .and_then(TrackId::new)
            .ok_or_else(|| CatalogError::Decode(format!("track '{}' has no usable id", self.name)))?;

        let artist = self
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_default();

        let (image, release_date) = match self.album {
            Some(album) => (
                album.images.into_iter().next().map(|i| i.url),
                album.release_date.as_deref().and_then(parse_release_date),
            ),
            None => (None, None),
        };

        Ok(TrackRecord {
            url: id.to_url(),
            id,
            name: self.name,
            artist,
            image,
            release_date,
            duration_ms: self.duration_ms,
        })
    }
}

impl SpotifyCatalog {
    pub fn new(config: &CatalogConfig, token: &str) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).bearer_auth(&self.token)
    }

    /// turns every non-success answer into an error
    fn check(response: Response) -> Result<Response, CatalogError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CatalogError::Unauthorized(status.as_u16()));
        }
        let body = response.text().unwrap_or_default();
        Err(CatalogError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
        let body = Self::check(response)?.text()?;
        serde_json::from_str(&body).map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

impl Catalog for SpotifyCatalog {
    fn track(&self, id: &TrackId) -> Result<Option<TrackRecord>, CatalogError> {
        let response = self.get(&self.endpoint(&format!("tracks/{id}"))).send()?;

        // unknown and malformed ids both mean there is no such track
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST
        ) {
            debug!("catalog has no track {id} ({})", response.status());
            return Ok(None);
        }

        let track: ApiTrack = Self::decode(response)?;
        track.into_record().map(Some)
    }

    fn search(&self, name: &str, artist: &str) -> Result<Option<TrackRecord>, CatalogError> {
        let query = format!("track:{name} artist:{artist}");
        let response = self
            .get(&self.endpoint("search"))
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")])
            .send()?;

        let search: ApiSearch = Self::decode(response)?;
        search
            .tracks
            .items
            .into_iter()
            .next()
            .map(ApiTrack::into_record)
            .transpose()
    }

    fn current_user(&self) -> Result<CatalogUser, CatalogError> {
        let user: ApiUser = Self::decode(self.get(&self.endpoint("me")).send()?)?;
        Ok(CatalogUser {
            display_name: user.display_name.unwrap_or_else(|| user.id.clone()),
            id: user.id,
        })
    }

    fn playlist_tracks(&self, playlist: &PlaylistId) -> Result<Vec<TrackId>, CatalogError> {
        let mut ids = Vec::new();

        let first = self
            .get(&self.endpoint(&format!("playlists/{playlist}/tracks")))
            .query(&[("fields", "items(track(id)),next"), ("limit", PLAYLIST_PAGE_LIMIT)])
            .send()?;
        let mut page: ApiPage<ApiPlaylistItem> = Self::decode(first)?;

        loop {
            ids.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track)
                    .filter_map(|track| track.id)
                    .filter_map(|id| TrackId::new(&id)),
            );

            match page.next {
                Some(next) => page = Self::decode(self.get(&next).send()?)?,
                None => break,
            }
        }

        Ok(ids)
    }

    fn add_to_playlist(&self, playlist: &PlaylistId, track: &TrackId) -> Result<(), CatalogError> {
        let response = self
            .client
            .post(self.endpoint(&format!("playlists/{playlist}/tracks")))
            .bearer_auth(&self.token)
            .json(&json!({ "uris": [track.to_uri()] }))
            .send()?;

        Self::check(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex, mpsc::Sender},
        thread::JoinHandle,
    };

    use chrono::NaiveDate;
    use rouille::{Request, Response};
    use serde_json::{Value, json};

    use super::*;
    use crate::domain::track::PlaylistId;

    const TOKEN: &str = "test-token";

    /// local stand-in for the catalog web API
    struct MockApi {
        base: String,
        stop: Sender<()>,
        handle: JoinHandle<()>,
    }

    impl MockApi {
        fn start<F>(handler: F) -> Self
        where
            F: Fn(&Request) -> Response + Send + Sync + 'static,
        {
            let expected = format!("Bearer {TOKEN}");
            let server = rouille::Server::new("127.0.0.1:0", move |request| {
                if request.header("Authorization") != Some(expected.as_str()) {
                    return Response::text("no token").with_status_code(401);
                }
                handler(request)
            })
            .unwrap();
            let base = format!("http://{}/v1", server.server_addr());
            let (handle, stop) = server.stoppable();
            Self { base, stop, handle }
        }

        fn catalog(&self, token: &str) -> SpotifyCatalog {
            let config = CatalogConfig {
                api_base: self.base.clone(),
                timeout_secs: 5,
                playlist_id: PlaylistId("p1".into()),
            };
            SpotifyCatalog::new(&config, token).unwrap()
        }

        fn shutdown(self) {
            self.stop.send(()).unwrap();
            self.handle.join().unwrap();
        }
    }

    fn track_json(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "duration_ms": 201_000,
            "artists": [{ "name": "Band" }, { "name": "Guest" }],
            "album": {
                "release_date": "1999-03",
                "images": [{ "url": "https://img/large.jpg" }, { "url": "https://img/small.jpg" }]
            }
        })
    }

    #[test]
    fn test_track_by_id() {
        let api = MockApi::start(|request| {
            rouille::router!(request,
                (GET) (/v1/tracks/{id: String}) => {
                    if id == "abc" {
                        Response::json(&track_json("abc", "Song"))
                    } else {
                        Response::text("invalid id").with_status_code(400)
                    }
                },
                _ => Response::empty_404()
            )
        });
        let catalog = api.catalog(TOKEN);

        let track = catalog.track(&TrackId::new("abc").unwrap()).unwrap().unwrap();
        assert_eq!(track.name, "Song");
        assert_eq!(track.artist, "Band");
        assert_eq!(track.url, "https://open.spotify.com/track/abc");
        assert_eq!(track.image.as_deref(), Some("https://img/large.jpg"));
        assert_eq!(track.release_date, NaiveDate::from_ymd_opt(1999, 3, 1));
        assert_eq!(track.duration_ms, 201_000);

        let missing = catalog.track(&TrackId::new("zzz").unwrap()).unwrap();
        assert!(missing.is_none());

        api.shutdown();
    }

    #[test]
    fn test_search_takes_top_match() {
        let api = MockApi::start(|request| {
            rouille::router!(request,
                (GET) (/v1/search) => {
                    let q = request.get_param("q").unwrap_or_default();
                    if q == "track:Song artist:Band" && request.get_param("limit").as_deref() == Some("1") {
                        Response::json(&json!({
                            "tracks": { "items": [track_json("abc", "Song")], "next": null }
                        }))
                    } else {
                        Response::json(&json!({ "tracks": { "items": [], "next": null } }))
                    }
                },
                _ => Response::empty_404()
            )
        });
        let catalog = api.catalog(TOKEN);

        let found = catalog.search("Song", "Band").unwrap().unwrap();
        assert_eq!(found.id, TrackId::new("abc").unwrap());

        assert!(catalog.search("Foo", "Bar").unwrap().is_none());

        api.shutdown();
    }

    #[test]
    fn test_playlist_tracks_follows_pages() {
        let api = MockApi::start(|request| {
            rouille::router!(request,
                (GET) (/v1/playlists/{_id: String}/tracks) => {
                    let host = request.header("Host").unwrap_or_default().to_string();
                    match request.get_param("offset").as_deref() {
                        None => Response::json(&json!({
                            "items": [
                                { "track": { "id": "t1" } },
                                { "track": null },
                                { "track": { "id": null } }
                            ],
                            "next": format!("http://{host}/v1/playlists/p1/tracks?offset=3")
                        })),
                        Some(_) => Response::json(&json!({
                            "items": [{ "track": { "id": "t2" } }],
                            "next": null
                        })),
                    }
                },
                _ => Response::empty_404()
            )
        });
        let catalog = api.catalog(TOKEN);

        let ids = catalog.playlist_tracks(&PlaylistId("p1".into())).unwrap();

        assert_eq!(
            ids,
            vec![TrackId::new("t1").unwrap(), TrackId::new("t2").unwrap()]
        );

        api.shutdown();
    }

    #[test]
    fn test_add_to_playlist_posts_uri() {
        let posted = Arc::new(Mutex::new(Vec::<Value>::new()));
        let recorded = Arc::clone(&posted);

        let api = MockApi::start(move |request| {
            rouille::router!(request,
                (POST) (/v1/playlists/{_id: String}/tracks) => {
                    match rouille::input::json_input::<Value>(request) {
                        Ok(body) => {
                            recorded.lock().unwrap().push(body);
                            Response::json(&json!({ "snapshot_id": "s1" })).with_status_code(201)
                        }
                        Err(_) => Response::text("bad body").with_status_code(400),
                    }
                },
                _ => Response::empty_404()
            )
        });
        let catalog = api.catalog(TOKEN);

        catalog
            .add_to_playlist(&PlaylistId("p1".into()), &TrackId::new("abc").unwrap())
            .unwrap();

        assert_eq!(
            posted.lock().unwrap().as_slice(),
            &[json!({ "uris": ["spotify:track:abc"] })]
        );

        api.shutdown();
    }

    #[test]
    fn test_add_to_playlist_failure_is_reported() {
        let api = MockApi::start(|_| Response::text("rate limited").with_status_code(429));
        let catalog = api.catalog(TOKEN);

        let err = catalog
            .add_to_playlist(&PlaylistId("p1".into()), &TrackId::new("abc").unwrap())
            .unwrap_err();

        assert!(matches!(err, CatalogError::Status { status: 429, .. }));

        api.shutdown();
    }

    #[test]
    fn test_current_user() {
        let api = MockApi::start(|request| {
            rouille::router!(request,
                (GET) (/v1/me) => {
                    Response::json(&json!({ "id": "u1", "display_name": "Alice" }))
                },
                _ => Response::empty_404()
            )
        });

        let user = api.catalog(TOKEN).current_user().unwrap();
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.id, "u1");

        let err = api.catalog("wrong").current_user().unwrap_err();
        assert!(matches!(err, CatalogError::Unauthorized(401)));

        api.shutdown();
    }
}
