//! Walks a channel's paginated "videos" listing.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::http::HttpFetch;
use crate::innertube::{BROWSE_URL, Innertube};
use crate::resolver::ChannelId;
use crate::search::{collect_video_ids, find_continuation};

/// Upper bound on videos per run.
pub const MAX_VIDEOS: usize = 100;

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationEnd {
    /// Collected the requested number of ids.
    Filled,
    /// The last page carried no continuation token.
    Exhausted,
    /// Hit the continuation round limit.
    Stalled,
    /// A follow-up page failed to load; earlier pages are kept.
    FetchFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    pub video_ids: Vec<String>,
    pub rounds: usize,
    pub end: PaginationEnd,
}

pub struct Enumerator<'a> {
    fetcher: &'a dyn HttpFetch,
    innertube: &'a Innertube,
    max_continuations: usize,
}

impl<'a> Enumerator<'a> {
    pub fn new(
        fetcher: &'a dyn HttpFetch,
        innertube: &'a Innertube,
        max_continuations: usize,
    ) -> Self {
        Self {
            fetcher,
            innertube,
            max_continuations,
        }
    }

    /// Lists up to `max_videos` (clamped to 1..=[`MAX_VIDEOS`]) ids in
    /// discovery order.
    ///
    /// Only a failed first page is an error. Later failures, a missing token
    /// or the round limit end pagination with whatever was collected; an empty
    /// result is returned as-is and judged by the caller.
    pub fn enumerate(
        &self,
        channel_id: &ChannelId,
        max_videos: usize,
        cancel: &CancellationToken,
    ) -> Result<Enumeration, PipelineError> {
        let max_videos = max_videos.clamp(1, MAX_VIDEOS);
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut page = self
            .fetcher
            .post_json(BROWSE_URL, &self.innertube.browse_videos(channel_id.as_str()))
            .map_err(|cause| PipelineError::EnumerationFailed {
                channel_id: channel_id.to_string(),
                cause,
            })?;

        let mut video_ids = Vec::new();
        collect_video_ids(&page, &mut video_ids, max_videos);
        debug!(%channel_id, found = video_ids.len(), "first browse page");

        let mut rounds = 0;
        let end = loop {
            if video_ids.len() >= max_videos {
                break PaginationEnd::Filled;
            }
            if rounds >= self.max_continuations {
                warn!(%channel_id, rounds, "continuation limit reached");
                break PaginationEnd::Stalled;
            }
            let Some(token) = find_continuation(&page) else {
                break PaginationEnd::Exhausted;
            };
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            rounds += 1;
            page = match self
                .fetcher
                .post_json(BROWSE_URL, &self.innertube.browse_continuation(&token))
            {
                Ok(page) => page,
                Err(err) => {
                    warn!(%channel_id, rounds, "continuation fetch failed: {err:#}");
                    break PaginationEnd::FetchFailed;
                }
            };
            let before = video_ids.len();
            collect_video_ids(&page, &mut video_ids, max_videos);
            debug!(%channel_id, rounds, found = video_ids.len() - before, "continuation page");
        };

        video_ids.truncate(max_videos);
        info!(%channel_id, videos = video_ids.len(), rounds, ?end, "enumeration finished");
        Ok(Enumeration {
            video_ids,
            rounds,
            end,
        })
    }
}
