//! Fatal failures of a channel run.
//!
//! Only conditions that end a run live here. A single video failing is
//! recorded in that video's [`crate::metadata::VideoOutcome`], failed
//! enrichment is swallowed, and stalled pagination is reported through
//! [`crate::enumerator::PaginationEnd`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("channel reference must not be empty")]
    EmptyReference,
    #[error("could not find a channel id for {reference}")]
    ResolutionFailed { reference: String },
    #[error("channel {channel_id} has no videos")]
    EnumerationEmpty { channel_id: String },
    #[error("listing videos for channel {channel_id} failed: {cause:#}")]
    EnumerationFailed {
        channel_id: String,
        cause: anyhow::Error,
    },
    #[error("run was cancelled")]
    Cancelled,
    #[error("progress channel closed by the consumer")]
    ChannelClosed,
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl PipelineError {
    /// True when the consumer went away; no terminal event can be delivered.
    /// A cancelled run still has a listener and ends with an error event.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ChannelClosed)
    }
}
