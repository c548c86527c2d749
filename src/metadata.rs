//! Records produced by a channel run and the progress events that carry them.
//!
//! All structs in this module mirror the JSON shapes streamed to callers, so
//! field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// Length of a canonical video id.
pub const VIDEO_ID_LEN: usize = 11;

/// Watch page for a video id.
pub fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Thumbnail used when the player response lists none.
pub fn fallback_thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

/// Fully fetched metadata for one video.
///
/// `like_count`, `comment_count` and `transcript` stay `None` (serialized as
/// `null`) until a best-effort step fills them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub description: String,
    /// Seconds, 0 when unknown.
    pub duration: u64,
    pub view_count: u64,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub release_date: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub transcript: Option<String>,
}

impl VideoRecord {
    /// A record with every optional upstream field at its default.
    pub fn empty(video_id: &str) -> Self {
        Self {
            video_id: video_id.to_owned(),
            title: String::new(),
            description: String::new(),
            duration: 0,
            view_count: 0,
            like_count: None,
            comment_count: None,
            release_date: String::new(),
            video_url: video_url(video_id),
            thumbnail_url: fallback_thumbnail_url(video_id),
            transcript: None,
        }
    }
}

/// A video whose metadata fetch failed outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FailedVideo {
    pub video_id: String,
    pub error: String,
}

/// One entry of the `result` event. A failed fetch keeps its own shape instead
/// of being padded out with zeroed numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VideoOutcome {
    Fetched(VideoRecord),
    Failed(FailedVideo),
}

impl VideoOutcome {
    pub fn video_id(&self) -> &str {
        match self {
            Self::Fetched(record) => &record.video_id,
            Self::Failed(failed) => &failed.video_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn as_record(&self) -> Option<&VideoRecord> {
        match self {
            Self::Fetched(record) => Some(record),
            Self::Failed(_) => None,
        }
    }
}

/// Message streamed to the caller while a run advances.
///
/// Exactly one `Result` or `Error` ends a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Status { message: String, progress: u8 },
    Error { message: String },
    Result { videos: Vec<VideoOutcome> },
}

impl ProgressEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
            Self::Result { .. } => "result",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Status { .. })
    }
}
