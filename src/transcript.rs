//! Optional transcript lookup keyed by video id.

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::Regex;
use tracing::debug;

use crate::http::HttpFetch;

const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";

static TEXT_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text\b[^>]*>(.*?)</text>").expect("valid segment regex"));
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid entity regex"));
static INLINE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

pub trait TranscriptSource: Send + Sync {
    /// `Ok(None)` when the video has no transcript in the wanted language.
    fn transcript(&self, video_id: &str) -> Result<Option<String>>;
}

/// Used when transcripts are switched off.
pub struct NoTranscripts;

impl TranscriptSource for NoTranscripts {
    fn transcript(&self, _video_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Reads caption tracks from the public timed-text endpoint, falling back to
/// the auto-generated track when no manual one exists.
pub struct TimedTextTranscripts {
    fetcher: Arc<dyn HttpFetch>,
    language: String,
}

impl TimedTextTranscripts {
    pub fn new(fetcher: Arc<dyn HttpFetch>, language: &str) -> Self {
        let language = language
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        Self { fetcher, language }
    }

    fn track_urls(&self, video_id: &str) -> [String; 2] {
        let manual = format!("{TIMEDTEXT_URL}?v={video_id}&lang={}", self.language);
        let generated = format!("{manual}&kind=asr");
        [manual, generated]
    }
}

impl TranscriptSource for TimedTextTranscripts {
    fn transcript(&self, video_id: &str) -> Result<Option<String>> {
        let mut last_error = None;
        for url in self.track_urls(video_id) {
            match self.fetcher.get_text(&url) {
                Ok(body) => {
                    if let Some(text) = parse_timed_text(&body) {
                        return Ok(Some(text));
                    }
                    debug!(video_id, url = %url, "caption track empty");
                }
                Err(err) => last_error = Some(err),
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

/// Joins the `<text>` segments of a timed-text document with single spaces.
pub fn parse_timed_text(document: &str) -> Option<String> {
    let segments: Vec<String> = TEXT_SEGMENT
        .captures_iter(document)
        .map(|captures| {
            let stripped = INLINE_TAG.replace_all(&captures[1], "");
            let decoded = decode_entities(&stripped);
            decoded.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join(" "))
    }
}

fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |captures: &regex::Captures<'_>| {
        let raw = &captures[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
