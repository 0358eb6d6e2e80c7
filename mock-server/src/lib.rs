//! In-memory fake of the video API, for integration tests.
//!
//! Errors use the API's envelope, `{"error": {"code", "message", "errors":
//! [{"domain", "reason", "message"}]}}`. `GET /captions/{id}` answers with
//! plain-text WebVTT and `GET /slow` waits before answering, so clients can
//! be tested against non-JSON bodies and cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub use axum::Router;

/// Upper bound for `GET /slow?delay_ms=`.
const MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_LIMIT: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    pub channel_title: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub kind: String,
    pub id: String,
    pub snippet: VideoSnippet,
    pub duration: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSnippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub kind: String,
    pub id: String,
    pub snippet: PlaylistSnippet,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub kind: String,
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total_results: usize,
    pub results_per_page: usize,
}

impl<T> ListResponse<T> {
    fn new(kind: &str, items: Vec<T>, total_results: usize) -> Self {
        let results_per_page = items.len();
        Self {
            kind: kind.to_string(),
            items,
            page_info: PageInfo {
                total_results,
                results_per_page,
            },
        }
    }
}

#[derive(Default, Deserialize)]
pub struct NewPlaylist {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

const CATALOGUE: &[(&str, &str, &str, &str)] = &[
    ("dQw4w9WgXcQ", "Never Gonna Give You Up", "Rick Astley", "PT3M33S"),
    ("9bZkp7q19f0", "Gangnam Style", "officialpsy", "PT4M13S"),
    ("rust001", "Rust in 100 Seconds", "Fireship", "PT2M25S"),
    ("rust002", "Async Rust and Tokio", "Jon Gjengset", "PT1H52M"),
    ("rust003", "Rust Ownership Explained", "Let's Get Rusty", "PT14M2S"),
];

fn catalogue() -> impl Iterator<Item = Video> {
    CATALOGUE.iter().map(|(id, title, channel, duration)| Video {
        kind: "youtube#video".to_string(),
        id: id.to_string(),
        snippet: VideoSnippet {
            title: title.to_string(),
            channel_title: channel.to_string(),
        },
        duration: duration.to_string(),
    })
}

/// An error answered in the API's envelope.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    domain: &'static str,
    reason: &'static str,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, domain: &'static str, reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            domain,
            reason,
            message: message.into(),
        }
    }

    fn missing_parameter(name: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "global",
            "missingRequiredParameter",
            format!("No filter selected. Expected one of: {name}"),
        )
    }

    fn quota_exceeded() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "youtube.quota",
            "quotaExceeded",
            "The request cannot be completed because you have exceeded your quota.",
        )
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        tracing::debug!(status = %self.status, reason = self.reason, "rejecting request");
        let body = json!({
            "error": {
                "code": self.status.as_u16(),
                "message": self.message,
                "errors": [{
                    "domain": self.domain,
                    "reason": self.reason,
                    "message": self.message,
                }],
            }
        });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Clone, Default)]
pub struct AppState {
    playlists: Arc<RwLock<HashMap<String, Playlist>>>,
    /// Requests left before every call fails with `quotaExceeded`.
    quota: Option<Arc<AtomicU64>>,
}

impl AppState {
    fn spend_quota(&self) -> Result<(), ApiFailure> {
        let Some(quota) = &self.quota else {
            return Ok(());
        };
        quota
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| ApiFailure::quota_exceeded())
    }
}

pub fn app() -> Router {
    router(AppState::default())
}

/// Like `app`, but only `quota` requests succeed; later ones get a 403.
pub fn app_with_quota(quota: u64) -> Router {
    router(AppState {
        quota: Some(Arc::new(AtomicU64::new(quota))),
        ..AppState::default()
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/videos", get(list_videos))
        .route("/search", get(search))
        .route(
            "/playlists",
            get(list_playlists).post(create_playlist).delete(delete_playlist),
        )
        .route("/captions/{id}", get(get_caption))
        .route("/slow", get(slow))
        .route_layer(middleware::from_fn_with_state(state.clone(), enforce_quota))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, app()).await
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, app).await
}

async fn enforce_quota(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.spend_quota() {
        Ok(()) => next.run(request).await,
        Err(failure) => failure.into_response(),
    }
}

#[derive(Deserialize)]
struct VideosQuery {
    id: Option<String>,
}

async fn list_videos(
    Query(query): Query<VideosQuery>,
) -> Result<Json<ListResponse<Video>>, ApiFailure> {
    let ids: Vec<String> = query
        .id
        .iter()
        .flat_map(|ids| ids.split(','))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(ApiFailure::missing_parameter("id"));
    }
    let items: Vec<Video> = catalogue().filter(|video| ids.contains(&video.id)).collect();
    let total = items.len();
    Ok(Json(ListResponse::new("youtube#videoListResponse", items, total)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    #[serde(default)]
    q: String,
    max_results: Option<usize>,
}

async fn search(Query(query): Query<SearchQuery>) -> Json<ListResponse<Video>> {
    let needle = query.q.to_lowercase();
    let matches: Vec<Video> = catalogue()
        .filter(|video| video.snippet.title.to_lowercase().contains(&needle))
        .collect();
    let total = matches.len();
    let limit = query
        .max_results
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .min(MAX_RESULTS_LIMIT);
    let items = matches.into_iter().take(limit).collect();
    Json(ListResponse::new("youtube#searchListResponse", items, total))
}

async fn list_playlists(State(state): State<AppState>) -> Json<ListResponse<Playlist>> {
    let playlists = state.playlists.read().await;
    let mut items: Vec<Playlist> = playlists.values().cloned().collect();
    items.sort_by(|a, b| a.snippet.title.cmp(&b.snippet.title));
    let total = items.len();
    Json(ListResponse::new("youtube#playlistListResponse", items, total))
}

async fn create_playlist(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Playlist>, ApiFailure> {
    let input: NewPlaylist = if body.is_empty() {
        NewPlaylist::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiFailure::new(StatusCode::BAD_REQUEST, "global", "parseError", format!("Parse Error: {e}"))
        })?
    };
    if input.title.trim().is_empty() {
        return Err(ApiFailure::new(
            StatusCode::BAD_REQUEST,
            "youtube.playlist",
            "invalidPlaylistSnippet",
            "The request provides an invalid playlist snippet.",
        ));
    }
    let playlist = Playlist {
        kind: "youtube#playlist".to_string(),
        id: format!("PL{}", Uuid::new_v4().simple()),
        snippet: PlaylistSnippet {
            title: input.title,
            description: input.description,
        },
    };
    state
        .playlists
        .write()
        .await
        .insert(playlist.id.clone(), playlist.clone());
    Ok(Json(playlist))
}

#[derive(Deserialize)]
struct PlaylistId {
    id: Option<String>,
}

/// The id may come from the query string or, as JSON-encoding clients
/// send it, from the body.
async fn delete_playlist(
    State(state): State<AppState>,
    Query(query): Query<PlaylistId>,
    body: Bytes,
) -> Result<StatusCode, ApiFailure> {
    let from_body = || {
        serde_json::from_slice::<PlaylistId>(&body)
            .ok()
            .and_then(|parsed| parsed.id)
    };
    let id = query
        .id
        .or_else(from_body)
        .ok_or_else(|| ApiFailure::missing_parameter("id"))?;

    let mut playlists = state.playlists.write().await;
    playlists.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or_else(|| {
        ApiFailure::new(
            StatusCode::NOT_FOUND,
            "youtube.playlist",
            "playlistNotFound",
            format!("The playlist identified with the request's id parameter ({id}) cannot be found."),
        )
    })
}

async fn get_caption(Path(id): Path<String>) -> Result<Response, ApiFailure> {
    let video = catalogue().find(|video| video.id == id).ok_or_else(|| {
        ApiFailure::new(
            StatusCode::NOT_FOUND,
            "youtube.caption",
            "captionNotFound",
            "The caption track could not be found.",
        )
    })?;
    let track = format!(
        "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\n{}\n",
        video.snippet.title
    );
    Ok(([(header::CONTENT_TYPE, "text/vtt; charset=utf-8")], track).into_response())
}

#[derive(Deserialize)]
struct SlowQuery {
    delay_ms: Option<u64>,
}

async fn slow(Query(query): Query<SlowQuery>) -> Json<serde_json::Value> {
    let delay = query.delay_ms.unwrap_or(1_000).min(MAX_DELAY_MS);
    tokio::time::sleep(Duration::from_millis(delay)).await;
    Json(json!({"kind": "youtube#slowResponse", "delayMs": delay}))
}
