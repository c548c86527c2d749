use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

use tubescan::config::{SettingsOverrides, resolve_settings};
use tubescan::metadata::{ProgressEvent, VideoOutcome};
use tubescan::pipeline::{Pipeline, RunHandle, clamp_max_videos};

/// Collects metadata for a channel's latest videos and prints every progress
/// event as one JSON line on stdout.
#[derive(Debug, Clone, Parser)]
#[command(name = "download_channel", version)]
struct DownloaderArgs {
    /// Channel URL, @handle or UC… id.
    channel: String,
    /// Videos to collect (1-100).
    #[arg(long, allow_negative_numbers = true)]
    max_videos: Option<i64>,
    /// Mirror progress into this file as `{"progress", "message"}`.
    #[arg(long)]
    progress_file: Option<PathBuf>,
    /// Write the final video list here as a JSON array.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    no_transcripts: bool,
    #[arg(long)]
    no_enrich: bool,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl DownloaderArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            fetch_workers: self.workers,
            transcripts: self.no_transcripts.then_some(false),
            enrich: self.no_enrich.then_some(false),
            env_path: self.env_file.clone(),
            ..SettingsOverrides::default()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressReport {
    progress: u8,
    message: String,
}

#[derive(Clone)]
struct ProgressWriter {
    path: PathBuf,
}

impl ProgressWriter {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn write(&self, progress: u8, message: &str) {
        let report = ProgressReport {
            progress: progress.min(100),
            message: message.to_string(),
        };
        match serde_json::to_vec(&report) {
            Ok(payload) => {
                if let Err(err) = write_atomic(&self.path, &payload) {
                    warn!(path = %self.path.display(), "could not write progress file: {err:#}");
                }
            }
            Err(err) => warn!("could not serialize progress report: {err}"),
        }
    }
}

/// Writes through a sibling temp file so readers never see a partial file.
fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}

/// How a run ended, as seen from its event stream.
#[derive(Debug, PartialEq, Eq)]
enum Finish {
    Videos(usize),
    Failed(String),
}

/// Fans each event out to stdout, the progress file and the output file.
struct EventSink {
    progress: Option<ProgressWriter>,
    output: Option<PathBuf>,
}

impl EventSink {
    fn handle(&self, event: &ProgressEvent, out: &mut impl Write) -> Result<Option<Finish>> {
        let line = serde_json::to_string(event).context("serializing event")?;
        writeln!(out, "{line}").context("writing event to stdout")?;

        match event {
            ProgressEvent::Status { message, progress } => {
                self.update_progress(*progress, message);
                Ok(None)
            }
            ProgressEvent::Error { message } => {
                self.update_progress(100, &format!("Failed: {message}"));
                Ok(Some(Finish::Failed(message.clone())))
            }
            ProgressEvent::Result { videos } => {
                if let Some(path) = &self.output {
                    write_videos(path, videos)?;
                }
                self.update_progress(100, "Done");
                Ok(Some(Finish::Videos(videos.len())))
            }
        }
    }

    fn update_progress(&self, percent: u8, message: &str) {
        if let Some(writer) = &self.progress {
            writer.write(percent, message);
        }
    }
}

fn write_videos(path: &Path, videos: &[VideoOutcome]) -> Result<()> {
    let payload = serde_json::to_vec_pretty(videos).context("serializing videos")?;
    write_atomic(path, &payload)
}

#[tokio::main]
async fn main() -> Result<()> {
    tubescan::init_logging();
    let args = DownloaderArgs::parse();
    let settings = resolve_settings(args.overrides())?;
    let max_videos = clamp_max_videos(args.max_videos);
    let pipeline = Arc::new(Pipeline::from_settings(&settings));

    let sink = EventSink {
        progress: args.progress_file.clone().map(ProgressWriter::new),
        output: args.output.clone(),
    };

    info!(channel = %args.channel, max_videos, "starting channel run");
    let RunHandle {
        mut events,
        cancel,
        task,
    } = pipeline.start(args.channel.clone(), max_videos);

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let mut finish = None;
    let stdout = io::stdout();
    while let Some(event) = events.recv().await {
        if let Some(done) = sink.handle(&event, &mut stdout.lock())? {
            finish = Some(done);
        }
    }
    task.await.context("channel run task failed")?;

    match finish {
        Some(Finish::Videos(count)) => {
            info!(videos = count, "channel run finished");
            Ok(())
        }
        Some(Finish::Failed(message)) => bail!("{message}"),
        None => bail!("run ended without a terminal event"),
    }
}
