//! Orchestrates one channel run: resolve, list, fetch each video, report.
//!
//! A run is blocking work (every upstream call goes through [`HttpFetch`]), so
//! [`Pipeline::start`] moves it onto tokio's blocking pool and hands the caller
//! the receiving half of a bounded event channel. Per-video failures stay
//! inside that video's entry; anything else ends the run with a single
//! `error` event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc as std_mpsc};
use std::thread;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_FETCH_WORKERS, DEFAULT_MAX_CONTINUATIONS, Settings};
use crate::details::DetailsFetcher;
use crate::engagement::EngagementEnricher;
use crate::enumerator::{Enumerator, MAX_VIDEOS};
use crate::error::PipelineError;
use crate::http::{HttpFetch, UreqFetcher};
use crate::innertube::Innertube;
use crate::metadata::{FailedVideo, ProgressEvent, VideoOutcome, VideoRecord};
use crate::progress::{ProgressReporter, Stage};
use crate::resolver::{self, ChannelReference};
use crate::transcript::{NoTranscripts, TimedTextTranscripts, TranscriptSource};

/// Videos fetched when the caller does not say.
pub const DEFAULT_MAX_VIDEOS: usize = 10;

/// Clamps a caller-supplied video limit into `1..=100`.
pub fn clamp_max_videos(requested: Option<i64>) -> usize {
    let requested = requested.unwrap_or(DEFAULT_MAX_VIDEOS as i64);
    requested.clamp(1, MAX_VIDEOS as i64) as usize
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub max_continuations: usize,
    pub fetch_workers: usize,
    pub enrich: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_continuations: DEFAULT_MAX_CONTINUATIONS,
            fetch_workers: DEFAULT_FETCH_WORKERS,
            enrich: true,
        }
    }
}

/// A started run. Dropping `events` or cancelling `cancel` stops it at the
/// next checkpoint.
pub struct RunHandle {
    pub events: mpsc::Receiver<ProgressEvent>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

pub struct Pipeline {
    fetcher: Arc<dyn HttpFetch>,
    transcripts: Arc<dyn TranscriptSource>,
    innertube: Innertube,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        transcripts: Arc<dyn TranscriptSource>,
        innertube: Innertube,
        options: PipelineOptions,
    ) -> Self {
        Self {
            fetcher,
            transcripts,
            innertube,
            options,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let fetcher: Arc<dyn HttpFetch> = Arc::new(UreqFetcher::from_settings(settings));
        let transcripts: Arc<dyn TranscriptSource> = if settings.transcripts {
            Arc::new(TimedTextTranscripts::new(
                Arc::clone(&fetcher),
                &settings.transcript_lang,
            ))
        } else {
            Arc::new(NoTranscripts)
        };
        Self::new(
            fetcher,
            transcripts,
            Innertube::new(settings.client_version.clone()),
            settings.pipeline_options(),
        )
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Starts a run on the blocking pool. Must be called inside a tokio
    /// runtime.
    pub fn start(self: &Arc<Self>, reference: String, max_videos: usize) -> RunHandle {
        let cancel = CancellationToken::new();
        let (mut reporter, events) = ProgressReporter::channel(cancel.clone());
        let pipeline = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                pipeline.run(&reference, max_videos, &mut reporter)
            }));
            if outcome.is_err() {
                warn!(%reference, "channel run panicked");
                if let Err(err) = reporter.fail("internal error while processing channel") {
                    debug!("could not report panic: {err}");
                }
            }
        });
        RunHandle {
            events,
            cancel,
            task,
        }
    }

    /// Runs to completion on the current thread, ending with exactly one
    /// terminal event unless the consumer went away first.
    pub fn run(&self, reference: &str, max_videos: usize, reporter: &mut ProgressReporter) {
        let outcome = self
            .collect(reference, max_videos, reporter)
            .and_then(|videos| reporter.finish(videos));
        match outcome {
            Ok(()) => {}
            Err(err) if err.is_disconnect() => {
                info!(reference, "run abandoned: {err}");
            }
            Err(err) => {
                warn!(reference, "run failed: {err}");
                if let Err(err) = reporter.fail(err.to_string()) {
                    debug!("could not report failure: {err}");
                }
            }
        }
    }

    fn collect(
        &self,
        reference: &str,
        max_videos: usize,
        reporter: &mut ProgressReporter,
    ) -> Result<Vec<VideoOutcome>, PipelineError> {
        let reference = ChannelReference::parse(reference)?;
        reporter.stage(Stage::Resolving, "Resolving channel")?;
        reporter.checkpoint()?;
        let channel_id = resolver::resolve(self.fetcher.as_ref(), &reference)?;

        reporter.stage(Stage::Listing, format!("Listing videos for {channel_id}"))?;
        let enumeration = Enumerator::new(
            self.fetcher.as_ref(),
            &self.innertube,
            self.options.max_continuations,
        )
        .enumerate(&channel_id, max_videos, reporter.cancel_token())?;
        if enumeration.video_ids.is_empty() {
            return Err(PipelineError::EnumerationEmpty {
                channel_id: channel_id.to_string(),
            });
        }

        let ids = enumeration.video_ids;
        let total = ids.len();
        reporter.stage(
            Stage::Fetching { done: 0, total },
            format!("Found {total} videos"),
        )?;
        let workers = self.options.fetch_workers.clamp(1, total);
        let videos = if workers == 1 {
            self.fetch_sequential(&ids, reporter)?
        } else {
            self.fetch_parallel(&ids, workers, reporter)?
        };

        let failed = videos.iter().filter(|video| video.is_failed()).count();
        info!(%channel_id, total, failed, "channel run complete");
        reporter.stage(Stage::Done, "Done")?;
        Ok(videos)
    }

    fn fetch_sequential(
        &self,
        ids: &[String],
        reporter: &mut ProgressReporter,
    ) -> Result<Vec<VideoOutcome>, PipelineError> {
        let cancel = reporter.cancel_token().clone();
        let total = ids.len();
        let mut videos = Vec::with_capacity(total);
        for (index, video_id) in ids.iter().enumerate() {
            reporter.checkpoint()?;
            let outcome = self.fetch_video(video_id, &cancel);
            let done = index + 1;
            reporter.stage(Stage::Fetching { done, total }, describe(&outcome, done, total))?;
            videos.push(outcome);
        }
        Ok(videos)
    }

    /// Fetches with a fixed pool of scoped threads. Results land in slots by
    /// discovery position so output order does not depend on completion
    /// order; only this thread reports progress.
    fn fetch_parallel(
        &self,
        ids: &[String],
        workers: usize,
        reporter: &mut ProgressReporter,
    ) -> Result<Vec<VideoOutcome>, PipelineError> {
        let cancel = reporter.cancel_token().clone();
        let total = ids.len();
        let slots: Mutex<Vec<Option<VideoOutcome>>> = Mutex::new(vec![None; total]);
        let cursor = AtomicUsize::new(0);
        let (done_tx, done_rx) = std_mpsc::channel::<usize>();

        let reported = thread::scope(|scope| {
            for _ in 0..workers {
                let done_tx = done_tx.clone();
                let (slots, cursor, cancel) = (&slots, &cursor, &cancel);
                scope.spawn(move || {
                    while !cancel.is_cancelled() {
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(video_id) = ids.get(index) else {
                            break;
                        };
                        let outcome = self.fetch_video(video_id, cancel);
                        slots.lock()[index] = Some(outcome);
                        if done_tx.send(index).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            let mut done = 0;
            for index in done_rx.iter() {
                done += 1;
                let message = match &slots.lock()[index] {
                    Some(outcome) => describe(outcome, done, total),
                    None => continue,
                };
                if let Err(err) = reporter.stage(Stage::Fetching { done, total }, message) {
                    cancel.cancel();
                    return Err(err);
                }
            }
            Ok(())
        });
        reported?;
        reporter.checkpoint()?;

        slots
            .into_inner()
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(PipelineError::Cancelled)
    }

    /// Details then enrichment for one video. Never fails the run; a panic
    /// while handling one video is recorded against that video only.
    fn fetch_video(&self, video_id: &str, cancel: &CancellationToken) -> VideoOutcome {
        let fetched = panic::catch_unwind(AssertUnwindSafe(|| self.fetch_record(video_id, cancel)));
        let error = match fetched {
            Ok(Ok(record)) => return VideoOutcome::Fetched(record),
            Ok(Err(err)) => {
                warn!(video_id, "metadata fetch failed: {err:#}");
                format!("{err:#}")
            }
            Err(_) => {
                warn!(video_id, "metadata fetch panicked");
                "internal error while fetching metadata".to_owned()
            }
        };
        VideoOutcome::Failed(FailedVideo {
            video_id: video_id.to_owned(),
            error,
        })
    }

    fn fetch_record(&self, video_id: &str, cancel: &CancellationToken) -> anyhow::Result<VideoRecord> {
        let details = DetailsFetcher::new(
            self.fetcher.as_ref(),
            &self.innertube,
            self.transcripts.as_ref(),
        );
        let record = details.fetch(video_id, cancel)?;
        if self.options.enrich && !cancel.is_cancelled() {
            Ok(EngagementEnricher::new(self.fetcher.as_ref()).enrich(record))
        } else {
            Ok(record)
        }
    }
}

fn describe(outcome: &VideoOutcome, done: usize, total: usize) -> String {
    match outcome {
        VideoOutcome::Fetched(record) if !record.title.is_empty() => {
            format!("Fetched {done}/{total}: {}", record.title)
        }
        VideoOutcome::Fetched(record) => format!("Fetched {done}/{total}: {}", record.video_id),
        VideoOutcome::Failed(failed) => format!("Failed {done}/{total}: {}", failed.video_id),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::enumerator::tests::{CHANNEL, grid_page, video_id};
    use crate::http::testing::StubFetcher;
    use crate::innertube::{BROWSE_URL, PLAYER_URL};
    use crate::metadata::video_url;
    use serde_json::{Value, json};

    const HANDLE_PAGE: &str = "https://www.youtube.com/@Demo";

    fn player(id: &str, title: &str) -> Value {
        json!({
            "videoDetails": {"videoId": id, "title": title, "lengthSeconds": "60", "viewCount": "10"},
            "microformat": {"playerMicroformatRenderer": {"publishDate": "2024-05-01"}},
        })
    }

    fn channel_page() -> String {
        format!(r#"<link rel="canonical" href="https://www.youtube.com/channel/{CHANNEL}">"#)
    }

    /// `@Demo` resolving to a channel with `count` videos on one page; each
    /// watch page reports 7 likes.
    pub(crate) fn stub_channel(count: usize) -> StubFetcher {
        let ids: Vec<String> = (0..count).map(video_id).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut fetcher = StubFetcher::new()
            .page(HANDLE_PAGE, &channel_page())
            .post(BROWSE_URL, CHANNEL, grid_page(&refs, None));
        for (n, id) in ids.iter().enumerate() {
            fetcher = fetcher
                .post(PLAYER_URL, id, player(id, &format!("Video {n}")))
                .page(&video_url(id), r#""label":"7 likes""#);
        }
        fetcher
    }

    fn pipeline(fetcher: StubFetcher, workers: usize) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            Arc::new(fetcher),
            Arc::new(NoTranscripts),
            Innertube::new("2.0"),
            PipelineOptions {
                fetch_workers: workers,
                ..PipelineOptions::default()
            },
        ))
    }

    async fn collect_events(pipeline: &Arc<Pipeline>, reference: &str, max: usize) -> Vec<ProgressEvent> {
        let RunHandle {
            mut events, task, ..
        } = pipeline.start(reference.to_string(), max);
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }
        task.await.unwrap();
        collected
    }

    fn percents(events: &[ProgressEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Status { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect()
    }

    fn result_videos(events: &[ProgressEvent]) -> &[VideoOutcome] {
        match events.last() {
            Some(ProgressEvent::Result { videos }) => videos,
            other => panic!("expected result event, got {other:?}"),
        }
    }

    #[test]
    fn clamps_requested_max() {
        assert_eq!(clamp_max_videos(None), 10);
        assert_eq!(clamp_max_videos(Some(0)), 1);
        assert_eq!(clamp_max_videos(Some(-5)), 1);
        assert_eq!(clamp_max_videos(Some(42)), 42);
        assert_eq!(clamp_max_videos(Some(1_000)), 100);
    }

    #[tokio::test]
    async fn successful_run_reports_progress_then_result() {
        let pipeline = pipeline(stub_channel(3), 1);
        let events = collect_events(&pipeline, "@Demo", 3).await;

        let percents = percents(&events);
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(percents.first(), Some(&0));
        assert_eq!(percents.last(), Some(&100));
        assert!(matches!(
            &events[events.len() - 2],
            ProgressEvent::Status { progress: 100, .. }
        ));
        assert_eq!(
            events.iter().filter(|event| event.is_terminal()).count(),
            1
        );

        let videos = result_videos(&events);
        assert_eq!(videos.len(), 3);
        for (n, video) in videos.iter().enumerate() {
            let record = video.as_record().unwrap();
            assert_eq!(record.video_id, video_id(n));
            assert_eq!(record.title, format!("Video {n}"));
            assert_eq!(record.release_date, "2024-05-01");
            assert_eq!(record.like_count, Some(7));
            assert_eq!(record.comment_count, None);
        }
    }

    #[tokio::test]
    async fn failed_video_keeps_only_id_and_error() {
        let fetcher = stub_channel(3).failing_post(PLAYER_URL, &video_id(1), "HTTP 500");
        let events = collect_events(&pipeline(fetcher, 1), "@Demo", 3).await;

        let videos = result_videos(&events);
        assert_eq!(videos.len(), 3);
        assert!(!videos[0].is_failed());
        assert!(!videos[2].is_failed());
        let failed = serde_json::to_value(&videos[1]).unwrap();
        let keys: Vec<&String> = failed.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["videoId", "error"]);
        assert_eq!(failed["videoId"], video_id(1));
        assert!(failed["error"].as_str().unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn unresolvable_channel_ends_with_single_error() {
        let fetcher = StubFetcher::new().page(HANDLE_PAGE, "<html>no ids here</html>");
        let events = collect_events(&pipeline(fetcher, 1), "@Demo", 5).await;

        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
        assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);
        assert!(!events.iter().any(|event| matches!(event, ProgressEvent::Result { .. })));
    }

    #[tokio::test]
    async fn empty_channel_is_an_error() {
        let fetcher = StubFetcher::new()
            .page(HANDLE_PAGE, &channel_page())
            .post(BROWSE_URL, CHANNEL, json!({"contents": {}}));
        let events = collect_events(&pipeline(fetcher, 1), "@Demo", 5).await;
        match events.last() {
            Some(ProgressEvent::Error { message }) => assert!(message.contains("no videos")),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_reference_is_an_error() {
        let events = collect_events(&pipeline(StubFetcher::new(), 1), "  ", 5).await;
        assert_eq!(
            events,
            [ProgressEvent::Error {
                message: PipelineError::EmptyReference.to_string()
            }]
        );
    }

    #[tokio::test]
    async fn parallel_fetch_preserves_discovery_order() {
        let pipeline = pipeline(stub_channel(8), 4);
        let events = collect_events(&pipeline, "@Demo", 8).await;

        let percents = percents(&events);
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
        let ids: Vec<&str> = result_videos(&events)
            .iter()
            .map(VideoOutcome::video_id)
            .collect();
        let expected: Vec<String> = (0..8).map(video_id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn enrichment_can_be_disabled() {
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(stub_channel(1)),
            Arc::new(NoTranscripts),
            Innertube::new("2.0"),
            PipelineOptions {
                enrich: false,
                ..PipelineOptions::default()
            },
        ));
        let events = collect_events(&pipeline, "@Demo", 1).await;
        let record = result_videos(&events)[0].as_record().unwrap().clone();
        assert_eq!(record.like_count, None);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_run_quietly() {
        // More events than the buffer holds, so the run must block on the
        // consumer at some point.
        let pipeline = pipeline(stub_channel(40), 1);
        let RunHandle { events, task, cancel } = pipeline.start("@Demo".to_string(), 40);
        drop(events);
        task.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn cancelled_run_ends_with_error_event() {
        let fetcher = stub_channel(3);
        let pipeline = pipeline(fetcher, 1);
        let cancel = CancellationToken::new();
        let (mut reporter, mut rx) = ProgressReporter::channel(cancel.clone());
        cancel.cancel();
        pipeline.run("@Demo", 3, &mut reporter);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);
        match events.last() {
            Some(ProgressEvent::Error { message }) => {
                assert_eq!(message, &PipelineError::Cancelled.to_string())
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(!events.iter().any(|event| matches!(event, ProgressEvent::Result { .. })));
    }

    #[tokio::test]
    async fn oversized_thumbnail_does_not_abort_run() {
        let id = video_id(1);
        let mut response = player(&id, "Huge");
        response["videoDetails"]["thumbnail"] = json!({"thumbnails": [
            {"url": "https://i.ytimg.com/huge.jpg", "width": u64::MAX, "height": 2},
        ]});
        let fetcher = stub_channel(3).post(PLAYER_URL, &id, response);
        let events = collect_events(&pipeline(fetcher, 1), "@Demo", 3).await;

        let videos = result_videos(&events);
        assert_eq!(videos.len(), 3);
        assert!(videos.iter().all(|video| !video.is_failed()));
        let record = videos[1].as_record().unwrap();
        assert_eq!(record.thumbnail_url, "https://i.ytimg.com/huge.jpg");
    }

    /// Delegates to a stub but panics on one video's player request.
    struct PanicsOnVideo {
        inner: StubFetcher,
        video_id: String,
    }

    impl HttpFetch for PanicsOnVideo {
        fn get_text(&self, url: &str) -> anyhow::Result<String> {
            self.inner.get_text(url)
        }

        fn post_json(&self, url: &str, body: &Value) -> anyhow::Result<Value> {
            if body["videoId"] == self.video_id.as_str() {
                panic!("malformed player response");
            }
            self.inner.post_json(url, body)
        }
    }

    #[tokio::test]
    async fn panic_in_one_video_is_recorded_against_it() {
        for workers in [1, 3] {
            let fetcher = PanicsOnVideo {
                inner: stub_channel(3),
                video_id: video_id(1),
            };
            let pipeline = Arc::new(Pipeline::new(
                Arc::new(fetcher),
                Arc::new(NoTranscripts),
                Innertube::new("2.0"),
                PipelineOptions {
                    fetch_workers: workers,
                    ..PipelineOptions::default()
                },
            ));
            let events = collect_events(&pipeline, "@Demo", 3).await;

            let videos = result_videos(&events);
            assert_eq!(videos.len(), 3);
            assert!(!videos[0].is_failed());
            assert!(!videos[2].is_failed());
            match &videos[1] {
                VideoOutcome::Failed(failed) => {
                    assert_eq!(failed.video_id, video_id(1));
                    assert_eq!(failed.error, "internal error while fetching metadata");
                }
                other => panic!("expected failed entry, got {other:?}"),
            }
        }
    }
}
