use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::clock::{SegmentClock, TickOutcome};
use super::config::SessionConfig;
use super::events::SessionEvent;
use super::stats::{SessionState, SessionStats};
use crate::audio::{encode_wav, AudioChunk, CaptureBackend, CaptureEvent};
use crate::error::{CaptureError, UploadError};
use crate::upload::TranscriptionApi;

/// Accumulated samples for the segment currently being captured.
///
/// Append-only between flushes; a flush drains it atomically. The format is
/// taken from the first chunk of a run so the flushed WAV matches whatever
/// the device actually delivered.
struct SegmentBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl SegmentBuffer {
    fn new() -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: 16000,
            channels: 1,
        }
    }

    fn push(&mut self, chunk: AudioChunk) {
        if self.samples.is_empty() {
            self.sample_rate = chunk.sample_rate;
            self.channels = chunk.channels;
        }
        self.samples.extend_from_slice(&chunk.samples);
    }

    fn drain(&mut self) -> (Vec<i16>, u32, u16) {
        (
            std::mem::take(&mut self.samples),
            self.sample_rate,
            self.channels,
        )
    }
}

/// A recording session that owns the capture device, the tick timer, and the
/// upload pipeline for one user-facing capture toggle.
pub struct RecordingSession {
    config: SessionConfig,
    inner: Arc<Inner>,

    /// Handle for the tick timer task; at most one exists at a time
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

/// State shared between the session and its spawned tasks.
struct Inner {
    session_id: String,
    api: Arc<dyn TranscriptionApi>,

    /// Capture device; held exclusively by the session while recording
    backend: Mutex<Box<dyn CaptureBackend>>,

    /// When the session object was created
    started_at: chrono::DateTime<chrono::Utc>,

    /// Whether recording is currently active
    is_recording: AtomicBool,

    /// Bumped on every start; upload results from an older generation are
    /// discarded instead of applied to the new session
    generation: AtomicU64,

    /// Elapsed ticks, mirrored out of the tick task for stats and the
    /// manual-stop reset flag
    elapsed_ticks: AtomicU64,

    /// Segment length in ticks; re-read at each boundary
    segment_ticks: AtomicU64,

    segments_uploaded: AtomicUsize,
    transcripts_received: AtomicUsize,

    /// Samples captured since the last flush
    buffer: Mutex<SegmentBuffer>,

    /// Reference text scored against each returned transcript
    reference_text: Mutex<String>,

    /// Handle for the capture-event consumer task
    capture_task: Mutex<Option<JoinHandle<()>>>,

    events_tx: mpsc::Sender<SessionEvent>,
}

impl RecordingSession {
    /// Create a new session around a capture backend and an upload client.
    /// Returns the session and the event stream the frontend renders.
    pub fn new(
        config: SessionConfig,
        api: Arc<dyn TranscriptionApi>,
        backend: Box<dyn CaptureBackend>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        info!("Creating recording session: {}", config.session_id);

        let (events_tx, events_rx) = mpsc::channel(100);

        let inner = Arc::new(Inner {
            session_id: config.session_id.clone(),
            api,
            backend: Mutex::new(backend),
            started_at: Utc::now(),
            is_recording: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            elapsed_ticks: AtomicU64::new(0),
            segment_ticks: AtomicU64::new(config.segment_ticks()),
            segments_uploaded: AtomicUsize::new(0),
            transcripts_received: AtomicUsize::new(0),
            buffer: Mutex::new(SegmentBuffer::new()),
            reference_text: Mutex::new(String::new()),
            capture_task: Mutex::new(None),
            events_tx,
        });

        let session = Self {
            config,
            inner,
            tick_task: Mutex::new(None),
        };

        (session, events_rx)
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// The capture toggle: Idle starts a session, Recording stops it.
    ///
    /// Starting acquires the microphone first; a `PermissionDenied` failure
    /// leaves the session Idle with no timer running, and the caller alerts
    /// the user.
    pub async fn toggle(&self) -> Result<SessionState, CaptureError> {
        match self.state() {
            SessionState::Idle => {
                self.start().await?;
                Ok(SessionState::Recording)
            }
            SessionState::Recording => {
                self.stop().await;
                Ok(SessionState::Idle)
            }
        }
    }

    /// Start recording. A no-op (with a warning) if already recording, so at
    /// most one timer exists at a time.
    pub async fn start(&self) -> Result<(), CaptureError> {
        if self.inner.is_recording.load(Ordering::SeqCst) {
            warn!("Recording already started");
            return Ok(());
        }

        info!("Starting recording session: {}", self.inner.session_id);

        // Acquire the device before committing to any state change.
        let capture_rx = self.inner.backend.lock().await.start().await?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.elapsed_ticks.store(0, Ordering::SeqCst);
        self.inner.buffer.lock().await.drain();
        self.inner.is_recording.store(true, Ordering::SeqCst);

        {
            let mut slot = self.inner.capture_task.lock().await;
            *slot = Some(Inner::spawn_capture_task(&self.inner, capture_rx));
        }

        {
            let mut slot = self.tick_task.lock().await;
            *slot = Some(spawn_tick_task(
                Arc::clone(&self.inner),
                self.config.tick_interval,
                self.config.max_ticks(),
            ));
        }

        debug!("Session generation {} started", generation);
        let _ = self.inner.events_tx.send(SessionEvent::Started).await;

        Ok(())
    }

    /// Manual stop: flush the current buffer one last time and go Idle. The
    /// reset flag follows the stop policy (true only while still within the
    /// first segment's worth of ticks).
    pub async fn stop(&self) {
        if !self.inner.is_recording.load(Ordering::SeqCst) {
            warn!("Recording not active");
            return;
        }

        let reset = self.inner.elapsed_ticks.load(Ordering::SeqCst)
            <= self.inner.segment_ticks.load(Ordering::SeqCst);

        Inner::finalize(&self.inner, reset, false).await;

        // The tick task notices the cleared flag on its next period.
        let handle = self.tick_task.lock().await.take();
        if let Some(task) = handle {
            if let Err(e) = task.await {
                error!("Tick task panicked: {}", e);
            }
        }
    }

    /// Set the reference text used for accuracy scoring after each segment.
    pub async fn set_reference_text(&self, text: impl Into<String>) {
        *self.inner.reference_text.lock().await = text.into();
    }

    /// Change the segment length; applies from the next segment boundary.
    pub fn set_segment_ticks(&self, segment_ticks: u64) {
        self.inner
            .segment_ticks
            .store(segment_ticks.max(1), Ordering::SeqCst);
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state(),
            started_at: self.inner.started_at,
            elapsed_secs: self.inner.elapsed_ticks.load(Ordering::SeqCst) as f64 / 100.0,
            segments_uploaded: self.inner.segments_uploaded.load(Ordering::SeqCst),
            transcripts_received: self.inner.transcripts_received.load(Ordering::SeqCst),
        }
    }
}

impl Inner {
    fn state(&self) -> SessionState {
        if self.is_recording.load(Ordering::SeqCst) {
            SessionState::Recording
        } else {
            SessionState::Idle
        }
    }

    /// Shared shutdown path for manual stop and the session-length cap.
    /// Idempotent: the swap on the recording flag picks a single winner.
    async fn finalize(inner: &Arc<Self>, reset: bool, forced: bool) {
        if !inner.is_recording.swap(false, Ordering::SeqCst) {
            return;
        }

        info!(
            "Stopping recording session: {} (forced={})",
            inner.session_id, forced
        );

        if let Err(e) = inner.backend.lock().await.stop().await {
            error!("Failed to stop capture backend: {}", e);
        }

        // The capture task ends once the backend closes its channel; join it
        // so every chunk has landed in the buffer before the final drain.
        let handle = inner.capture_task.lock().await.take();
        if let Some(task) = handle {
            if let Err(e) = task.await {
                error!("Capture task panicked: {}", e);
            }
        }

        let (samples, sample_rate, channels) = inner.buffer.lock().await.drain();
        Self::spawn_flush(inner, samples, sample_rate, channels, reset);

        inner.elapsed_ticks.store(0, Ordering::SeqCst);
        let _ = inner.events_tx.send(SessionEvent::Stopped { forced }).await;
    }

    /// Rotate the recorder at a segment boundary: stop the device, drain the
    /// buffer, restart the device, and upload the drained segment.
    async fn rotate_segment(inner: &Arc<Self>, reset: bool) -> Result<(), CaptureError> {
        debug!("Segment boundary (reset={})", reset);

        // Hold the device lock across the whole stop/drain/restart sequence
        // so a concurrent finalize cannot interleave with it.
        let mut backend = inner.backend.lock().await;
        backend.stop().await?;

        let handle = inner.capture_task.lock().await.take();
        if let Some(task) = handle {
            if let Err(e) = task.await {
                error!("Capture task panicked: {}", e);
            }
        }

        let (samples, sample_rate, channels) = inner.buffer.lock().await.drain();

        // A manual stop may have finalized while this boundary was in
        // flight; reacquiring the device then would leave it held while
        // the session is Idle.
        if inner.is_recording.load(Ordering::SeqCst) {
            let capture_rx = backend.start().await?;
            let mut slot = inner.capture_task.lock().await;
            *slot = Some(Self::spawn_capture_task(inner, capture_rx));
        }
        drop(backend);

        Self::spawn_flush(inner, samples, sample_rate, channels, reset);
        Ok(())
    }

    fn spawn_capture_task(inner: &Arc<Self>, mut rx: mpsc::Receiver<CaptureEvent>) -> JoinHandle<()> {
        let inner = Arc::clone(inner);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    CaptureEvent::Chunk(chunk) => {
                        inner.buffer.lock().await.push(chunk);
                    }
                    CaptureEvent::Stopped => break,
                }
            }
        })
    }

    /// Upload a drained segment and chain the reference-text scoring.
    /// Results from a stale generation are discarded, not applied.
    fn spawn_flush(inner: &Arc<Self>, samples: Vec<i16>, sample_rate: u32, channels: u16, reset: bool) {
        if samples.is_empty() {
            debug!("Skipping flush of empty segment buffer");
            return;
        }

        let flush_generation = inner.generation.load(Ordering::SeqCst);
        let inner = Arc::clone(inner);

        tokio::spawn(async move {
            let wav = match encode_wav(&samples, sample_rate, channels) {
                Ok(wav) => wav,
                Err(e) => {
                    error!("Segment encode failed: {}", e);
                    return;
                }
            };

            let text = match inner.api.transcribe_segment(wav, reset).await {
                Ok(text) => text,
                Err(e) => {
                    inner.report_upload_failure(e, flush_generation).await;
                    return;
                }
            };

            inner.segments_uploaded.fetch_add(1, Ordering::SeqCst);

            if inner.generation.load(Ordering::SeqCst) != flush_generation {
                debug!("Discarding transcript from stale session generation");
                return;
            }

            inner.transcripts_received.fetch_add(1, Ordering::SeqCst);
            let _ = inner.events_tx.send(SessionEvent::Transcript { text }).await;

            let reference = inner.reference_text.lock().await.clone();
            match inner.api.score_reference(&reference).await {
                Ok(report) => {
                    if inner.generation.load(Ordering::SeqCst) == flush_generation {
                        let _ = inner.events_tx.send(SessionEvent::Metrics(report)).await;
                    }
                }
                Err(e) => inner.report_upload_failure(e, flush_generation).await,
            }
        });
    }

    /// Surface an upload failure unless the session has moved on to a newer
    /// generation. Rejections carry the server's message verbatim.
    async fn report_upload_failure(&self, err: UploadError, flush_generation: u64) {
        let message = match err {
            UploadError::Rejected(message) => {
                warn!("Upload rejected by server: {}", message);
                message
            }
            other => {
                error!("Upload failed: {}", other);
                other.to_string()
            }
        };

        if self.generation.load(Ordering::SeqCst) == flush_generation {
            let _ = self.events_tx.send(SessionEvent::UploadFailed { message }).await;
        }
    }
}

fn spawn_tick_task(
    inner: Arc<Inner>,
    tick_interval: std::time::Duration,
    max_ticks: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut clock = SegmentClock::new(inner.segment_ticks.load(Ordering::SeqCst), max_ticks);
        let mut interval = tokio::time::interval(tick_interval);
        // The first interval tick fires immediately; consume it so tick
        // counting starts one period after the session does.
        interval.tick().await;

        loop {
            interval.tick().await;

            if !inner.is_recording.load(Ordering::SeqCst) {
                break;
            }

            let outcome = clock.on_tick();

            // A manual stop can finalize between the check above and here;
            // its reset of the elapsed counter must not be overwritten, and
            // a boundary on this tick must not rotate an Idle session.
            if !inner.is_recording.load(Ordering::SeqCst) {
                break;
            }
            inner
                .elapsed_ticks
                .store(clock.elapsed_ticks(), Ordering::SeqCst);

            match outcome {
                TickOutcome::Continue => {}
                TickOutcome::SegmentBoundary { reset } => {
                    if let Err(e) = Inner::rotate_segment(&inner, reset).await {
                        error!("Segment rotation failed: {}", e);
                        Inner::finalize(&inner, false, true).await;
                        break;
                    }
                    // Pick up a changed segment length for the next one.
                    clock.set_segment_ticks(inner.segment_ticks.load(Ordering::SeqCst));
                }
                TickOutcome::ForceStop => {
                    info!("Session length cap reached, force-stopping");
                    Inner::finalize(&inner, false, true).await;
                    break;
                }
            }

            if inner.is_recording.load(Ordering::SeqCst) && clock.elapsed_ticks() % 100 == 0 {
                let _ = inner
                    .events_tx
                    .send(SessionEvent::Elapsed {
                        seconds: clock.elapsed_seconds(),
                    })
                    .await;
            }
        }

        // The tick task is the last writer on every exit path; `stop()`
        // joins it, so elapsed reads as 0 once the session is Idle.
        inner.elapsed_ticks.store(0, Ordering::SeqCst);
    })
}
