use anyhow::anyhow;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rouille::{Request, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    catalog::{Catalog, Connect},
    config::{HttpConfig, VotingConfig},
    domain::{
        comment::Comment,
        ledger::{LedgerEntry, VoterId},
        track::{PlaylistId, TrackRecord},
    },
    http::error::ApiError,
    storage::{error::StorageError, operations::Storage},
    voting::{
        ledger::refresh_votes,
        lookup::TrackQuery,
        membership::Membership,
        promotion::PromotionReport,
        session::{Session, Tally},
    },
};

pub struct HttpServer {
    storage: Arc<Mutex<Storage>>,
    catalog: Box<dyn Connect>,
    playlist: PlaylistId,
    voting: VotingConfig,
    pub config: HttpConfig,
}

#[derive(Deserialize)]
struct TrackQueryRequest {
    url: Option<String>,
    name: Option<String>,
    artist: Option<String>,
}

impl TrackQueryRequest {
    fn into_query(self) -> Result<TrackQuery, ApiError> {
        Ok(TrackQuery::from_parts(
            self.url.as_deref(),
            self.name.as_deref(),
            self.artist.as_deref(),
        )?)
    }
}

#[derive(Deserialize)]
struct PendingRequest {
    url: String,
}

#[derive(Deserialize)]
struct CommentRequest {
    author: String,
    comment: String,
}

#[derive(Serialize, Deserialize)]
struct EntryResponse {
    url: String,
    name: String,
    artist: String,
    votes: usize,
    added_at: DateTime<Utc>,
    /// whether the caller voted, unknown without a token
    voted: Option<bool>,
}

#[derive(Serialize, Deserialize)]
struct TallyResponse {
    pending: Vec<EntryResponse>,
    promoted: Vec<String>,
    messages: Vec<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    track: TrackRecord,
    membership: Membership,
}

#[derive(Serialize)]
struct ProposalResponse {
    track: TrackRecord,
    #[serde(flatten)]
    tally: TallyResponse,
}

impl EntryResponse {
    fn from_domain(entry: &LedgerEntry, voter: Option<&VoterId>) -> Self {
        Self {
            url: entry.url.clone(),
            name: entry.name.clone(),
            artist: entry.artist.clone(),
            votes: entry.votes(),
            added_at: entry.added_at,
            voted: voter.map(|v| entry.has_voted(v)),
        }
    }
}

impl TallyResponse {
    fn from_domain(tally: &Tally, voter: &VoterId) -> Self {
        Self {
            pending: tally
                .pending
                .iter()
                .map(|e| EntryResponse::from_domain(e, Some(voter)))
                .collect(),
            promoted: promoted_urls(&tally.promotion),
            messages: tally.promotion.messages(),
        }
    }
}

fn promoted_urls(report: &PromotionReport) -> Vec<String> {
    report.promoted.iter().map(|e| e.url.clone()).collect()
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .header("Authorization")
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn json_body<T: DeserializeOwned>(request: &Request) -> Result<T, ApiError> {
    rouille::input::json_input(request)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

impl HttpServer {
    pub fn new(
        storage: Storage,
        catalog: Box<dyn Connect>,
        playlist: PlaylistId,
        voting: VotingConfig,
        config: HttpConfig,
    ) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            catalog,
            playlist,
            voting,
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let result = rouille::router!(request,
            (GET) (/votes) => { self.handle_pending(request) },
            (POST) (/votes) => { self.handle_propose(request) },
            (POST) (/votes/vote) => { self.handle_vote(request) },
            (POST) (/votes/veto) => { self.handle_veto(request) },
            (POST) (/search) => { self.handle_search(request) },
            (POST) (/sweep) => { self.handle_sweep(request) },
            (GET) (/comments) => { self.handle_list_comments() },
            (POST) (/comments) => { self.handle_add_comment(request) },
            _ => Ok(Response::empty_404())
        );

        let response = result.unwrap_or_else(ApiError::into_response);
        info!("Response: {} {} {}", request.method(), request.url(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    fn lock_storage(&self) -> Result<MutexGuard<'_, Storage>, ApiError> {
        self.storage.lock().map_err(|e| {
            ApiError::from(StorageError::Internal(anyhow!(
                "Could not access ledger storage under lock: {e}"
            )))
        })
    }

    fn connect(&self, request: &Request) -> Result<Box<dyn Catalog>, ApiError> {
        let token = bearer_token(request)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        self.catalog.connect(token).map_err(|e| {
            ApiError::Internal(format!("could not reach the catalog: {e}"))
        })
    }

    /// Opens a session for the caller and runs `action` in it.
    fn with_session<T>(
        &self,
        request: &Request,
        action: impl FnOnce(&mut Session) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let catalog = self.connect(request)?;
        let mut storage = self.lock_storage()?;
        let mut session = Session::open(&*catalog, &mut *storage, &self.playlist, &self.voting)?;
        action(&mut session)
    }

    /// Pending votes. Works without a token or voting rights, the `voted`
    /// flags are left out then.
    fn handle_pending(&self, request: &Request) -> Result<Response, ApiError> {
        if bearer_token(request).is_some() {
            let pending = self.with_session(request, |session| {
                let voter = session.voter().clone();
                Ok(session
                    .pending()?
                    .entries
                    .iter()
                    .map(|e| EntryResponse::from_domain(e, Some(&voter)))
                    .collect::<Vec<_>>())
            });
            match pending {
                Ok(pending) => return Ok(Response::json(&pending)),
                Err(ApiError::Forbidden(reason)) => {
                    debug!("Listing votes without voter marks: {reason}");
                }
                Err(e) => return Err(e),
            }
        }

        let mut storage = self.lock_storage()?;
        let table = refresh_votes(&mut *storage, self.voting.cutoff(Utc::now()))?;
        let pending = table
            .entries
            .iter()
            .map(|e| EntryResponse::from_domain(e, None))
            .collect::<Vec<_>>();
        Ok(Response::json(&pending))
    }

    fn handle_search(&self, request: &Request) -> Result<Response, ApiError> {
        let query = json_body::<TrackQueryRequest>(request)?.into_query()?;
        let found = self.with_session(request, |session| {
            let track = session.search(&query)?;
            let membership = session.check(&track)?;
            Ok(SearchResponse { track, membership })
        })?;
        Ok(Response::json(&found))
    }

    fn handle_propose(&self, request: &Request) -> Result<Response, ApiError> {
        let query = json_body::<TrackQueryRequest>(request)?.into_query()?;
        let proposal = self.with_session(request, |session| {
            let proposal = session.propose(&query)?;
            Ok(ProposalResponse {
                tally: TallyResponse::from_domain(&proposal.tally, session.voter()),
                track: proposal.track,
            })
        })?;
        Ok(Response::json(&proposal))
    }

    fn handle_vote(&self, request: &Request) -> Result<Response, ApiError> {
        let body: PendingRequest = json_body(request)?;
        let tally = self.with_session(request, |session| {
            let tally = session.vote(&body.url)?;
            Ok(TallyResponse::from_domain(&tally, session.voter()))
        })?;
        Ok(Response::json(&tally))
    }

    fn handle_veto(&self, request: &Request) -> Result<Response, ApiError> {
        let body: PendingRequest = json_body(request)?;
        let tally = self.with_session(request, |session| {
            let tally = session.veto(&body.url)?;
            Ok(TallyResponse::from_domain(&tally, session.voter()))
        })?;
        Ok(Response::json(&tally))
    }

    fn handle_sweep(&self, request: &Request) -> Result<Response, ApiError> {
        let tally = self.with_session(request, |session| {
            let tally = session.sweep()?;
            Ok(TallyResponse::from_domain(&tally, session.voter()))
        })?;
        Ok(Response::json(&tally))
    }

    fn handle_list_comments(&self) -> Result<Response, ApiError> {
        let comments: Vec<Comment> = self.lock_storage()?.list_comments()?;
        Ok(Response::json(&comments))
    }

    fn handle_add_comment(&self, request: &Request) -> Result<Response, ApiError> {
        let body: CommentRequest = json_body(request)?;
        let comment = self
            .lock_storage()?
            .add_comment(&body.author, &body.comment, Utc::now())?;
        Ok(Response::json(&comment).with_status_code(201))
    }
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{
            error::CatalogError,
            fake::{FakeCatalog, track_record},
        },
        domain::track::TrackId,
        storage::{LedgerStore, schema},
    };

    use rouille::Request;
    use rusqlite::Connection;
    use serde_json::{Value, json};
    use std::{collections::HashMap, io::Read, sync::Arc};

    const SONG_ID: &str = "4uLU6hMCjMI75M1A2tKUQC";

    /// hands out one fake catalog per bearer token
    struct FakeConnect {
        users: HashMap<String, Arc<FakeCatalog>>,
    }

    impl Connect for FakeConnect {
        fn connect(&self, token: &str) -> Result<Box<dyn Catalog>, CatalogError> {
            match self.users.get(token) {
                Some(catalog) => Ok(Box::new(Arc::clone(catalog))),
                None => {
                    let mut stranger = FakeCatalog::new("stranger");
                    stranger.user = None;
                    Ok(Box::new(stranger))
                }
            }
        }
    }

    struct Fixture {
        server: HttpServer,
        users: HashMap<String, Arc<FakeCatalog>>,
    }

    fn setup(threshold: usize, users: &[&str]) -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();

        let users = users
            .iter()
            .map(|name| {
                let catalog = FakeCatalog::new(name).with_track(track_record(SONG_ID, "Song", "Band"));
                (name.to_lowercase(), Arc::new(catalog))
            })
            .collect::<HashMap<_, _>>();

        let server = HttpServer::new(
            Storage::from_existing_conn(conn),
            Box::new(FakeConnect {
                users: users.clone(),
            }),
            PlaylistId("p1".into()),
            VotingConfig {
                promotion_threshold: threshold,
                retention_days: 7,
            },
            HttpConfig {
                bind_addr: "0.0.0.0".to_string(),
                port: 8080,
            },
        );

        Fixture { server, users }
    }

    fn post(path: &str, token: Option<&str>, body: Value) -> Request {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        Request::fake_http("POST", path, headers, body.to_string().into_bytes())
    }

    fn get(path: &str, token: Option<&str>) -> Request {
        let headers = token
            .map(|t| vec![("Authorization".to_string(), format!("Bearer {t}"))])
            .unwrap_or_default();
        Request::fake_http("GET", path, headers, vec![])
    }

    fn parse_text_response(response: rouille::Response) -> String {
        let mut buf = String::new();
        let mut reader = response.data.into_reader_and_size().0;
        reader.read_to_string(&mut buf).unwrap();
        buf
    }

    fn song_url() -> String {
        TrackId::new(SONG_ID).unwrap().to_url()
    }

    // --------------------------------------------------
    // ✅ SUCCESS
    // --------------------------------------------------

    #[test]
    fn test_http_propose_by_link() -> anyhow::Result<()> {
        let fixture = setup(4, &["Alice"]);

        let response = fixture.server.handle_request(&post(
            "/votes",
            Some("alice"),
            json!({ "url": format!("spotify:track:{SONG_ID}") }),
        ));

        assert_eq!(response.status_code, 200);
        let body: Value = parse_json_response(response)?;
        assert_eq!(body["track"]["name"], "Song");
        assert_eq!(body["pending"][0]["votes"], 1);
        assert_eq!(body["pending"][0]["voted"], true);

        Ok(())
    }

    #[test]
    fn test_http_search_reports_membership() -> anyhow::Result<()> {
        let fixture = setup(4, &["Alice"]);

        let response = fixture.server.handle_request(&post(
            "/search",
            Some("alice"),
            json!({ "name": "Song", "artist": "Band" }),
        ));

        assert_eq!(response.status_code, 200);
        let body: Value = parse_json_response(response)?;
        assert_eq!(body["membership"]["can_vote"], true);
        assert_eq!(body["track"]["url"], song_url());

        // searching does not vote
        let pending: Vec<EntryResponse> =
            parse_json_response(fixture.server.handle_request(&get("/votes", None)))?;
        assert!(pending.is_empty());

        Ok(())
    }

    #[test]
    fn test_http_vote_promotes_at_threshold() -> anyhow::Result<()> {
        let fixture = setup(1, &["Alice", "Bob"]);

        fixture.server.handle_request(&post(
            "/votes",
            Some("alice"),
            json!({ "url": song_url() }),
        ));

        let response = fixture.server.handle_request(&post(
            "/votes/vote",
            Some("bob"),
            json!({ "url": song_url() }),
        ));

        assert_eq!(response.status_code, 200);
        let body: TallyResponse = parse_json_response(response)?;
        assert!(body.pending.is_empty());
        assert_eq!(body.promoted, vec![song_url()]);
        assert_eq!(body.messages, vec!["Added Song - Band to the playlist".to_string()]);
        assert!(fixture.users["bob"].in_playlist(&TrackId::new(SONG_ID).unwrap()));

        Ok(())
    }

    #[test]
    fn test_http_pending_without_token() -> anyhow::Result<()> {
        let fixture = setup(4, &["Alice"]);
        fixture.server.handle_request(&post(
            "/votes",
            Some("alice"),
            json!({ "url": song_url() }),
        ));

        let anonymous: Vec<EntryResponse> =
            parse_json_response(fixture.server.handle_request(&get("/votes", None)))?;
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].voted, None);

        let alice: Vec<EntryResponse> =
            parse_json_response(fixture.server.handle_request(&get("/votes", Some("alice"))))?;
        assert_eq!(alice[0].voted, Some(true));

        Ok(())
    }

    #[test]
    fn test_http_pending_without_voting_rights() -> anyhow::Result<()> {
        let fixture = setup(4, &["Alice"]);
        fixture.server.handle_request(&post(
            "/votes",
            Some("alice"),
            json!({ "url": song_url() }),
        ));

        let response = fixture.server.handle_request(&get("/votes", Some("mallory")));

        assert_eq!(response.status_code, 200);
        let pending: Vec<EntryResponse> = parse_json_response(response)?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].voted, None);

        Ok(())
    }

    #[test]
    fn test_http_comments() -> anyhow::Result<()> {
        let fixture = setup(4, &[]);

        let response = fixture.server.handle_request(&post(
            "/comments",
            None,
            json!({ "author": "Alice", "comment": "More jazz please" }),
        ));
        assert_eq!(response.status_code, 201);

        let comments: Value =
            parse_json_response(fixture.server.handle_request(&get("/comments", None)))?;
        assert_eq!(comments[0]["author"], "Alice");
        assert_eq!(comments[0]["comment"], "More jazz please");

        Ok(())
    }

    // --------------------------------------------------
    // ❌ FAILURES
    // --------------------------------------------------

    #[test]
    fn test_http_not_found() {
        let fixture = setup(4, &["Alice"]);

        let response = fixture.server.handle_request(&post(
            "/votes",
            Some("alice"),
            json!({ "name": "Foo", "artist": "Bar" }),
        ));

        assert_eq!(response.status_code, 404);
        assert_eq!(
            parse_text_response(response),
            "Track not found. Please try again."
        );
    }

    #[test]
    fn test_http_already_in_playlist() -> anyhow::Result<()> {
        let fixture = setup(4, &["Alice"]);
        fixture.users["alice"].add_to_playlist(
            &PlaylistId("p1".into()),
            &TrackId::new(SONG_ID).unwrap(),
        )?;

        let response = fixture.server.handle_request(&post(
            "/votes",
            Some("alice"),
            json!({ "url": song_url() }),
        ));

        assert_eq!(response.status_code, 409);
        assert!(fixture.server.storage.lock().unwrap().read()?.entries.is_empty());

        Ok(())
    }

    #[test]
    fn test_http_incomplete_query() {
        let fixture = setup(4, &["Alice"]);

        let response =
            fixture
                .server
                .handle_request(&post("/votes", Some("alice"), json!({ "name": "Foo" })));

        assert_eq!(response.status_code, 400);
    }

    #[test]
    fn test_http_missing_token() {
        let fixture = setup(4, &["Alice"]);

        let response =
            fixture
                .server
                .handle_request(&post("/votes", None, json!({ "url": song_url() })));

        assert_eq!(response.status_code, 401);
    }

    #[test]
    fn test_http_user_without_voting_rights() {
        let fixture = setup(4, &["Alice"]);

        let response = fixture.server.handle_request(&post(
            "/votes",
            Some("mallory"),
            json!({ "url": song_url() }),
        ));

        assert_eq!(response.status_code, 403);
        assert!(parse_text_response(response).contains("not allowed to vote"));
    }

    #[test]
    fn test_http_vote_on_unknown_entry() {
        let fixture = setup(4, &["Alice"]);

        let response = fixture.server.handle_request(&post(
            "/votes/veto",
            Some("alice"),
            json!({ "url": song_url() }),
        ));

        assert_eq!(response.status_code, 404);
    }

    #[test]
    fn test_http_blank_comment() {
        let fixture = setup(4, &[]);

        let response = fixture.server.handle_request(&post(
            "/comments",
            None,
            json!({ "author": "Alice", "comment": "" }),
        ));

        assert_eq!(response.status_code, 400);
    }

    #[test]
    fn test_http_unknown_route() {
        let fixture = setup(4, &[]);

        let response = fixture.server.handle_request(&get("/tracks", None));

        assert_eq!(response.status_code, 404);
    }
}
