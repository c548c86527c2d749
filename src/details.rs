//! Per-video metadata from the player endpoint.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http::HttpFetch;
use crate::innertube::{Innertube, PLAYER_URL};
use crate::metadata::{VideoRecord, fallback_thumbnail_url};
use crate::transcript::TranscriptSource;

pub struct DetailsFetcher<'a> {
    fetcher: &'a dyn HttpFetch,
    innertube: &'a Innertube,
    transcripts: &'a dyn TranscriptSource,
}

impl<'a> DetailsFetcher<'a> {
    pub fn new(
        fetcher: &'a dyn HttpFetch,
        innertube: &'a Innertube,
        transcripts: &'a dyn TranscriptSource,
    ) -> Self {
        Self {
            fetcher,
            innertube,
            transcripts,
        }
    }

    /// Fetches one video's record.
    ///
    /// Only a failed player request is an error. Missing fields fall back to
    /// defaults and a transcript failure leaves `transcript` empty. The
    /// transcript lookup is skipped once `cancel` fires.
    pub fn fetch(&self, video_id: &str, cancel: &CancellationToken) -> Result<VideoRecord> {
        let response = self
            .fetcher
            .post_json(PLAYER_URL, &self.innertube.player(video_id))
            .with_context(|| format!("fetching player response for {video_id}"))?;
        let mut record = record_from_player(video_id, &response);

        if !cancel.is_cancelled() {
            record.transcript = match self.transcripts.transcript(video_id) {
                Ok(transcript) => transcript,
                Err(err) => {
                    debug!(video_id, "transcript unavailable: {err:#}");
                    None
                }
            };
        }
        Ok(record)
    }
}

/// Maps a player response onto a record. Never fails.
pub fn record_from_player(video_id: &str, response: &Value) -> VideoRecord {
    let details = &response["videoDetails"];
    let microformat = &response["microformat"]["playerMicroformatRenderer"];

    let title = details["title"]
        .as_str()
        .or_else(|| microformat["title"]["simpleText"].as_str())
        .unwrap_or_default();
    let description = details["shortDescription"]
        .as_str()
        .or_else(|| microformat["description"]["simpleText"].as_str())
        .unwrap_or_default();
    let release_date = ["publishDate", "uploadDate"]
        .iter()
        .find_map(|field| microformat[*field].as_str())
        .map(normalize_release_date)
        .unwrap_or_default();

    VideoRecord {
        title: title.to_owned(),
        description: description.to_owned(),
        duration: lenient_u64(&details["lengthSeconds"]).unwrap_or(0),
        view_count: lenient_u64(&details["viewCount"]).unwrap_or(0),
        release_date,
        thumbnail_url: best_thumbnail(&details["thumbnail"]["thumbnails"])
            .unwrap_or_else(|| fallback_thumbnail_url(video_id)),
        ..VideoRecord::empty(video_id)
    }
}

/// Counts arrive as decimal strings; accept plain numbers too.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

/// Largest thumbnail by area; without dimensions the last entry wins since
/// lists run smallest to largest.
fn best_thumbnail(thumbnails: &Value) -> Option<String> {
    thumbnails
        .as_array()?
        .iter()
        .enumerate()
        .filter_map(|(index, thumb)| {
            let url = thumb["url"].as_str().filter(|url| !url.is_empty())?;
            let width = thumb["width"].as_u64().unwrap_or(0);
            let area = width.saturating_mul(thumb["height"].as_u64().unwrap_or(0));
            Some(((area, index), url))
        })
        .max_by_key(|(rank, _)| *rank)
        .map(|(_, url)| url.to_owned())
}

/// Reduces RFC 3339 timestamps and plain dates to `YYYY-MM-DD`. Anything else
/// is kept verbatim.
pub fn normalize_release_date(value: &str) -> String {
    let trimmed = value.trim();
    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return datetime.date_naive().format("%Y-%m-%d").to_string();
    }
    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    if let Some(prefix) = trimmed.get(..10)
        && let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
    {
        return date.format("%Y-%m-%d").to_string();
    }
    trimmed.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::StubFetcher;
    use crate::transcript::NoTranscripts;
    use anyhow::anyhow;
    use serde_json::json;

    const ID: &str = "dQw4w9WgXcQ";

    struct FixedTranscript(Result<Option<String>, String>);

    impl TranscriptSource for FixedTranscript {
        fn transcript(&self, _video_id: &str) -> Result<Option<String>> {
            self.0.clone().map_err(|message| anyhow!(message))
        }
    }

    fn player_response() -> Value {
        json!({
            "videoDetails": {
                "videoId": ID,
                "title": "Never Gonna",
                "shortDescription": "line one\nline two",
                "lengthSeconds": "213",
                "viewCount": "1,500,000",
                "thumbnail": {"thumbnails": [
                    {"url": "https://i.ytimg.com/small.jpg", "width": 120, "height": 90},
                    {"url": "https://i.ytimg.com/big.jpg", "width": 1280, "height": 720},
                    {"url": "https://i.ytimg.com/mid.jpg", "width": 480, "height": 360},
                ]},
            },
            "microformat": {"playerMicroformatRenderer": {
                "publishDate": "2009-10-24T23:57:33-07:00",
                "uploadDate": "2009-10-25",
            }},
        })
    }

    #[test]
    fn maps_player_fields() {
        let record = record_from_player(ID, &player_response());
        assert_eq!(record.title, "Never Gonna");
        assert_eq!(record.description, "line one\nline two");
        assert_eq!(record.duration, 213);
        assert_eq!(record.view_count, 1_500_000);
        assert_eq!(record.thumbnail_url, "https://i.ytimg.com/big.jpg");
        assert_eq!(record.release_date, "2009-10-24");
        assert_eq!(record.video_url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(record.like_count, None);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let record = record_from_player(ID, &json!({"playabilityStatus": {"status": "ERROR"}}));
        assert_eq!(record, VideoRecord::empty(ID));
    }

    #[test]
    fn unsized_thumbnails_prefer_last() {
        let thumbs = json!([{"url": "a"}, {"url": "b"}, {"url": ""}]);
        assert_eq!(best_thumbnail(&thumbs).as_deref(), Some("b"));
        assert_eq!(best_thumbnail(&json!([])), None);
    }

    #[test]
    fn huge_thumbnail_dimensions_saturate() {
        let thumbs = json!([
            {"url": "small", "width": 120, "height": 90},
            {"url": "huge", "width": u64::MAX, "height": u64::MAX},
            {"url": "also-huge", "width": u64::MAX, "height": 3},
        ]);
        // Both saturate to the same area, so the later entry wins the tie.
        assert_eq!(best_thumbnail(&thumbs).as_deref(), Some("also-huge"));
    }

    #[test]
    fn release_dates_normalize() {
        assert_eq!(normalize_release_date("2024-03-01T10:00:00+00:00"), "2024-03-01");
        assert_eq!(normalize_release_date("2024-03-01"), "2024-03-01");
        assert_eq!(normalize_release_date("20240301"), "2024-03-01");
        assert_eq!(normalize_release_date("2024-03-01T10:00:00"), "2024-03-01");
        assert_eq!(normalize_release_date("last week"), "last week");
    }

    #[test]
    fn fetch_attaches_transcript() {
        let fetcher = StubFetcher::new().post(PLAYER_URL, ID, player_response());
        let innertube = Innertube::new("2.0");
        let transcripts = FixedTranscript(Ok(Some("hello there".into())));
        let record = DetailsFetcher::new(&fetcher, &innertube, &transcripts)
            .fetch(ID, &CancellationToken::new())
            .unwrap();
        assert_eq!(record.transcript.as_deref(), Some("hello there"));
    }

    #[test]
    fn transcript_failure_is_not_fatal() {
        let fetcher = StubFetcher::new().post(PLAYER_URL, ID, player_response());
        let innertube = Innertube::new("2.0");
        let transcripts = FixedTranscript(Err("HTTP 429".into()));
        let record = DetailsFetcher::new(&fetcher, &innertube, &transcripts)
            .fetch(ID, &CancellationToken::new())
            .unwrap();
        assert_eq!(record.title, "Never Gonna");
        assert_eq!(record.transcript, None);
    }

    #[test]
    fn player_failure_is_an_error() {
        let fetcher = StubFetcher::new().failing_post(PLAYER_URL, ID, "HTTP 403");
        let innertube = Innertube::new("2.0");
        let err = DetailsFetcher::new(&fetcher, &innertube, &NoTranscripts)
            .fetch(ID, &CancellationToken::new())
            .unwrap_err();
        assert!(format!("{err:#}").contains("HTTP 403"));
    }
}
