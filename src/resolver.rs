//! Turns a user-supplied channel reference into a canonical channel id.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::http::HttpFetch;

const BASE_URL: &str = "https://www.youtube.com";

// "UC" followed by 22 url-safe base64 characters.
static CHANNEL_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UC[A-Za-z0-9_-]{22}$").expect("valid channel id regex"));
static HANDLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@?[\w.-]{3,30}$").expect("valid handle regex"));
// Names the primary channel even on dubbed or localized page variants.
static CANONICAL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link rel="canonical" href="https://www\.youtube\.com/channel/(UC[A-Za-z0-9_-]{22})""#)
        .expect("valid canonical marker regex")
});
static CHANNEL_ID_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:channelId|externalId)":"(UC[A-Za-z0-9_-]{22})""#)
        .expect("valid channel id marker regex")
});

/// Canonical channel identifier, `UC` plus 22 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn parse(value: &str) -> Option<Self> {
        CHANNEL_ID_REGEX
            .is_match(value)
            .then(|| Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-empty channel URL, handle or id as typed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReference(String);

impl ChannelReference {
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::EmptyReference);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The web document to fetch for this reference.
    pub fn page_url(&self) -> String {
        let value = self.0.as_str();
        if value.starts_with("http://") || value.starts_with("https://") {
            return value.to_owned();
        }
        if value.starts_with("www.youtube.com/")
            || value.starts_with("youtube.com/")
            || value.starts_with("m.youtube.com/")
        {
            return format!("https://{value}");
        }
        if HANDLE_REGEX.is_match(value) {
            let handle = value.trim_start_matches('@');
            return format!("{BASE_URL}/@{handle}");
        }
        format!("{BASE_URL}/{}", value.trim_start_matches('/'))
    }
}

impl fmt::Display for ChannelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves `reference` with a single page fetch. Network failures propagate;
/// a page without any id marker is [`PipelineError::ResolutionFailed`].
pub fn resolve(
    fetcher: &dyn HttpFetch,
    reference: &ChannelReference,
) -> Result<ChannelId, PipelineError> {
    if let Some(id) = ChannelId::parse(reference.as_str()) {
        debug!(%id, "reference is already a channel id");
        return Ok(id);
    }

    let url = reference.page_url();
    let page = fetcher.get_text(&url)?;
    let id = find_channel_id(&page).ok_or_else(|| PipelineError::ResolutionFailed {
        reference: reference.to_string(),
    })?;
    info!(%reference, %id, "resolved channel");
    Ok(id)
}

/// Canonical link first, generic id fields second.
pub fn find_channel_id(page: &str) -> Option<ChannelId> {
    [&*CANONICAL_MARKER, &*CHANNEL_ID_MARKER]
        .into_iter()
        .find_map(|marker| marker.captures(page))
        .and_then(|captures| ChannelId::parse(&captures[1]))
}
