// Integration tests for the recording session controller
//
// These drive the Idle/Recording state machine, segment rotation, and the
// upload chain against a scripted capture backend and a scripted server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use recite::audio::{AudioChunk, CaptureBackend, CaptureEvent};
use recite::error::{CaptureError, UploadError};
use recite::session::{RecordingSession, SessionConfig, SessionEvent, SessionState};
use recite::upload::{AccuracyReport, TranscriptionApi};

/// Capture backend that emits a steady stream of chunks until stopped.
struct ScriptedBackend {
    starts: Arc<AtomicUsize>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ScriptedBackend {
    fn new(starts: Arc<AtomicUsize>) -> Self {
        Self {
            starts,
            stop_tx: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(100);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        self.stop_tx = Some(stop_tx);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(1));
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let chunk = AudioChunk {
                            samples: vec![7i16; 16],
                            sample_rate: 16000,
                            channels: 1,
                            timestamp_ms: 0,
                        };
                        if tx.send(CaptureEvent::Chunk(chunk)).await.is_err() {
                            return;
                        }
                    }
                }
            }
            let _ = tx.send(CaptureEvent::Stopped).await;
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Backend whose device acquisition always fails.
struct DeniedBackend;

#[async_trait::async_trait]
impl CaptureBackend for DeniedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        Err(CaptureError::PermissionDenied)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "denied"
    }
}

/// Scripted server: records reset flags and scored texts, optionally rejects
/// segments or delays responses.
#[derive(Default)]
struct ScriptedApi {
    resets: Mutex<Vec<bool>>,
    scored: Mutex<Vec<String>>,
    reject_message: Option<String>,
    delay: Duration,
}

impl ScriptedApi {
    fn report() -> AccuracyReport {
        AccuracyReport {
            wer: "0.25".into(),
            wcr: "0.75".into(),
            rtf: "0.40".into(),
            precision_micro: "0.90".into(),
            precision_macro: "0.85".into(),
            recall_micro: "0.88".into(),
            recall_macro: "0.80".into(),
            f1_micro: "0.89".into(),
            f1_macro: "0.82".into(),
        }
    }
}

#[async_trait::async_trait]
impl TranscriptionApi for ScriptedApi {
    async fn transcribe_segment(&self, _wav: Vec<u8>, reset: bool) -> Result<String, UploadError> {
        self.resets.lock().unwrap().push(reset);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reject_message {
            Some(message) => Err(UploadError::Rejected(message.clone())),
            None => Ok("scripted transcript".to_string()),
        }
    }

    async fn transcribe_file(
        &self,
        _file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        Ok("scripted file transcript".to_string())
    }

    async fn score_reference(&self, text: &str) -> Result<AccuracyReport, UploadError> {
        self.scored.lock().unwrap().push(text.to_string());
        Ok(Self::report())
    }
}

fn fast_config(segment_ms: u64, max_ms: u64) -> SessionConfig {
    SessionConfig {
        session_id: "test-session".to_string(),
        segment_duration: Duration::from_millis(segment_ms),
        max_duration: Duration::from_millis(max_ms),
        tick_interval: Duration::from_millis(1),
    }
}

fn build_session(
    config: SessionConfig,
    api: Arc<ScriptedApi>,
) -> (
    RecordingSession,
    mpsc::Receiver<SessionEvent>,
    Arc<AtomicUsize>,
) {
    let starts = Arc::new(AtomicUsize::new(0));
    let backend = Box::new(ScriptedBackend::new(Arc::clone(&starts)));
    let (session, events) = RecordingSession::new(config, api, backend);
    (session, events, starts)
}

/// Wait for the next non-Elapsed event.
async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event channel closed");

        if !matches!(event, SessionEvent::Elapsed { .. }) {
            return event;
        }
    }
}

#[tokio::test]
async fn toggle_moves_idle_to_recording_and_back() {
    let api = Arc::new(ScriptedApi::default());
    let (session, mut events, _) = build_session(fast_config(5000, 60_000), Arc::clone(&api));

    assert_eq!(session.state(), SessionState::Idle);

    let state = session.toggle().await.unwrap();
    assert_eq!(state, SessionState::Recording);
    assert!(matches!(next_event(&mut events).await, SessionEvent::Started));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(session.stats().elapsed_secs > 0.0);

    let state = session.toggle().await.unwrap();
    assert_eq!(state, SessionState::Idle);
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Stopped { forced: false }
    ));

    // Elapsed returns to 0 exactly on the transition to Idle.
    assert_eq!(session.stats().elapsed_secs, 0.0);
}

#[tokio::test]
async fn quick_manual_stop_flushes_with_reset_true() {
    let api = Arc::new(ScriptedApi::default());
    let (session, mut events, _) = build_session(fast_config(5000, 60_000), Arc::clone(&api));

    session.toggle().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.toggle().await.unwrap();

    // Final flush lands on a detached task; the transcript event signals it.
    loop {
        match next_event(&mut events).await {
            SessionEvent::Transcript { text } => {
                assert_eq!(text, "scripted transcript");
                break;
            }
            SessionEvent::Started | SessionEvent::Stopped { .. } => continue,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    let resets = api.resets.lock().unwrap().clone();
    assert_eq!(resets, vec![true], "stop within the first segment keeps reset=true");
}

#[tokio::test]
async fn permission_denied_leaves_session_idle_with_no_timer() {
    let api = Arc::new(ScriptedApi::default());
    let (session, mut events) = RecordingSession::new(
        fast_config(5000, 60_000),
        api,
        Box::new(DeniedBackend),
    );

    let result = session.toggle().await;
    assert!(matches!(result, Err(CaptureError::PermissionDenied)));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.stats().elapsed_secs, 0.0);

    // No Started event, no ticks: the channel stays empty.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn starting_twice_is_idempotent() {
    let api = Arc::new(ScriptedApi::default());
    let (session, _events, starts) = build_session(fast_config(5000, 60_000), api);

    session.start().await.unwrap();
    session.start().await.unwrap();

    assert_eq!(
        starts.load(Ordering::SeqCst),
        1,
        "second start must not reacquire the device or add a timer"
    );

    session.stop().await;
}

#[tokio::test]
async fn segment_rotation_restarts_capture_and_uses_reset_formula() {
    let api = Arc::new(ScriptedApi::default());
    // 25-tick segments, cap far away: boundaries at 25, 50, 75, ...
    let (session, _events, starts) = build_session(fast_config(25, 60_000), Arc::clone(&api));

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(140)).await;
    session.stop().await;

    // Give the detached flush tasks time to record their calls.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resets = api.resets.lock().unwrap().clone();
    assert!(
        resets.len() >= 3,
        "expected several segment flushes, got {resets:?}"
    );
    assert!(resets[0], "first boundary is below two segments: reset=true");
    assert!(
        resets[1..].iter().all(|&reset| !reset),
        "later boundaries and the final stop flush carry reset=false: {resets:?}"
    );

    // Each rotation stops and reacquires the device.
    assert!(
        starts.load(Ordering::SeqCst) >= 3,
        "rotation should restart the capture device"
    );
}

#[tokio::test]
async fn repeated_toggling_never_leaves_timer_or_device_running() {
    let api = Arc::new(ScriptedApi::default());
    // Three-tick segments so stops frequently land right on a rotation.
    let (session, mut events, starts) = build_session(fast_config(3, 60_000), Arc::clone(&api));

    for _ in 0..15 {
        session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.stop().await;

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            session.stats().elapsed_secs,
            0.0,
            "elapsed must read 0 once stop returns"
        );

        // A rotation racing the stop must not reacquire the device.
        let starts_after_stop = starts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            starts.load(Ordering::SeqCst),
            starts_after_stop,
            "capture device reacquired after stop"
        );
        assert_eq!(session.stats().elapsed_secs, 0.0);

        while events.try_recv().is_ok() {}
    }
}

#[tokio::test]
async fn session_cap_force_stops_with_reset_false() {
    let api = Arc::new(ScriptedApi::default());
    // No boundary before the cap: segment far larger than max.
    let (session, mut events, _) = build_session(fast_config(5000, 40), Arc::clone(&api));

    session.start().await.unwrap();

    loop {
        match next_event(&mut events).await {
            SessionEvent::Stopped { forced } => {
                assert!(forced, "cap stop reports forced=true");
                break;
            }
            SessionEvent::Started
            | SessionEvent::Transcript { .. }
            | SessionEvent::Metrics(_) => continue,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.stats().elapsed_secs, 0.0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let resets = api.resets.lock().unwrap().clone();
    assert_eq!(resets, vec![false], "force-stop flush carries reset=false");
}

#[tokio::test]
async fn transcript_is_followed_by_reference_scoring() {
    let api = Arc::new(ScriptedApi::default());
    let (session, mut events, _) = build_session(fast_config(5000, 60_000), Arc::clone(&api));

    session.set_reference_text("the quick brown fox").await;
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.stop().await;

    let mut saw_transcript = false;
    loop {
        match next_event(&mut events).await {
            SessionEvent::Transcript { .. } => saw_transcript = true,
            SessionEvent::Metrics(report) => {
                assert!(saw_transcript, "metrics must follow the transcript");
                assert_eq!(report.wer, "0.25");
                break;
            }
            SessionEvent::Started | SessionEvent::Stopped { .. } => continue,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    let scored = api.scored.lock().unwrap().clone();
    assert_eq!(scored, vec!["the quick brown fox".to_string()]);
    assert_eq!(session.stats().segments_uploaded, 1);
}

#[tokio::test]
async fn rejected_segment_surfaces_error_and_skips_scoring() {
    let api = Arc::new(ScriptedApi {
        reject_message: Some("bad audio".to_string()),
        ..ScriptedApi::default()
    });
    let (session, mut events, _) = build_session(fast_config(5000, 60_000), Arc::clone(&api));

    session.set_reference_text("reference").await;
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.stop().await;

    loop {
        match next_event(&mut events).await {
            SessionEvent::UploadFailed { message } => {
                assert_eq!(message, "bad audio");
                break;
            }
            SessionEvent::Started | SessionEvent::Stopped { .. } => continue,
            SessionEvent::Transcript { .. } => panic!("transcript must not change on rejection"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert!(
        api.scored.lock().unwrap().is_empty(),
        "no metrics upload after a rejected segment"
    );
    assert_eq!(
        session.stats().segments_uploaded,
        0,
        "a rejected segment does not count as uploaded"
    );
}

#[tokio::test]
async fn stale_upload_results_are_discarded_after_restart() {
    let api = Arc::new(ScriptedApi {
        delay: Duration::from_millis(80),
        ..ScriptedApi::default()
    });
    let (session, mut events, _) = build_session(fast_config(5000, 60_000), Arc::clone(&api));

    // First run: stop while the flush is still in flight.
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.stop().await;

    // Restart bumps the generation before the old upload resolves.
    session.start().await.unwrap();

    // The stale transcript must never surface.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(200);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(SessionEvent::Transcript { .. })) => {
                panic!("stale transcript applied after session restart")
            }
            Ok(Some(_)) => continue,
            _ => break,
        }
    }

    session.stop().await;
}
