//! Ordered, bounded delivery of progress events to one consumer.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::PipelineError;
use crate::metadata::{ProgressEvent, VideoOutcome};

/// Events buffered between the blocking pipeline and the async consumer.
pub const EVENT_BUFFER: usize = 16;

/// Coarse position of a run, mapped onto a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Listing,
    Fetching { done: usize, total: usize },
    Done,
}

impl Stage {
    pub fn percent(self) -> u8 {
        match self {
            Self::Resolving => 0,
            Self::Listing => 5,
            Self::Fetching { total: 0, .. } => 10,
            Self::Fetching { done, total } => {
                let fraction = done.min(total) * 85 / total;
                10 + fraction as u8
            }
            Self::Done => 100,
        }
    }
}

/// Producer half of a run's event stream.
///
/// Sends block while the buffer is full. Progress never goes backwards and
/// nothing is sent after the terminal event.
pub struct ProgressReporter {
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
    last_percent: u8,
    finished: bool,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            last_percent: 0,
            finished: false,
        }
    }

    /// A reporter plus the receiver its events go to.
    pub fn channel(cancel: CancellationToken) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (Self::new(tx, cancel), rx)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails once the run has been cancelled or its consumer went away.
    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.tx.is_closed() {
            self.cancel.cancel();
            return Err(PipelineError::ChannelClosed);
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    pub fn stage(&mut self, stage: Stage, message: impl Into<String>) -> Result<(), PipelineError> {
        self.status(stage.percent(), message)
    }

    pub fn status(&mut self, percent: u8, message: impl Into<String>) -> Result<(), PipelineError> {
        let progress = percent.clamp(self.last_percent, 100);
        self.last_percent = progress;
        self.send(ProgressEvent::Status {
            message: message.into(),
            progress,
        })
    }

    /// Sends the terminal `result` event.
    pub fn finish(&mut self, videos: Vec<VideoOutcome>) -> Result<(), PipelineError> {
        self.send(ProgressEvent::Result { videos })
    }

    /// Sends the terminal `error` event.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), PipelineError> {
        self.send(ProgressEvent::Error {
            message: message.into(),
        })
    }

    fn send(&mut self, event: ProgressEvent) -> Result<(), PipelineError> {
        if self.finished {
            debug!(kind = event.kind(), "dropping event after terminal event");
            return Ok(());
        }
        self.finished = event.is_terminal();
        self.tx.blocking_send(event).map_err(|_| {
            self.cancel.cancel();
            PipelineError::ChannelClosed
        })
    }
}
