//! HTTP surface: starts channel runs and streams their events as SSE.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{Request, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::pipeline::{Pipeline, RunHandle, clamp_max_videos};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/channel-download", post(start_channel_download))
        .fallback(api_fallback)
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelDownloadRequest {
    #[serde(default)]
    channel_url: Option<String>,
    /// Any JSON number or numeric string; see [`requested_max_videos`].
    #[serde(default)]
    max_videos: Option<Value>,
}

/// Reads a loosely typed `maxVideos`. Fractions are truncated and numeric
/// strings are parsed; anything else counts as absent.
fn requested_max_videos(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().map(|_| i64::MAX))
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|float| float.is_finite())
                    .map(|float| float.trunc() as i64)
            })
        }
        _ => None,
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn api_fallback(req: Request<Body>) -> Response {
    debug!(path = %req.uri().path(), "no route");
    ApiError::not_found("endpoint not found").into_response()
}

/// `POST /api/channel-download`. Replies with an event stream; closing it
/// cancels the run.
async fn start_channel_download(
    State(state): State<AppState>,
    payload: Result<Json<ChannelDownloadRequest>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let channel_url = request
        .channel_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("channelUrl is required"))?;
    let max_videos = clamp_max_videos(request.max_videos.as_ref().and_then(requested_max_videos));
    info!(channel = %channel_url, max_videos, "channel download requested");

    let RunHandle {
        mut events, cancel, ..
    } = state.pipeline.start(channel_url, max_videos);
    let stream = async_stream::stream! {
        let _cancel_on_drop = cancel.drop_guard();
        while let Some(event) = events.recv().await {
            yield Event::default().event(event.kind()).json_data(&event);
        }
        debug!("channel download stream finished");
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}
