// Microphone capture backend using cpal.
//
// cpal streams are !Send, so the stream lives on a dedicated thread for the
// whole capture run. The audio callback frames samples and hands them to the
// async side over an mpsc channel with try_send, keeping the callback
// non-blocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::backend::{AudioChunk, CaptureBackend, CaptureConfig, CaptureEvent};
use crate::error::CaptureError;

pub struct MicBackend {
    config: CaptureConfig,
    worker: Option<Worker>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
}

impl MicBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::Stream("capture already running".into()));
        }

        let (event_tx, event_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let config = self.config.clone();
        let handle = std::thread::spawn(move || {
            run_capture(config, event_tx, ready_tx, thread_stop);
        });

        // The thread reports whether the device could be acquired.
        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(Worker { stop, handle });
                Ok(event_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::Stream("capture thread exited early".into())),
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        worker.stop.store(true, Ordering::SeqCst);

        // Joining blocks until the stream is dropped and the final chunk is
        // delivered; do it off the async runtime.
        tokio::task::spawn_blocking(move || {
            if worker.handle.join().is_err() {
                warn!("Capture thread panicked during shutdown");
            }
        })
        .await
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "microphone (cpal)"
    }
}

/// Shared between the audio callback and the capture thread so samples still
/// buffered when the stream stops are flushed as a final partial chunk.
struct Framer {
    pending: Vec<i16>,
    frame_len: usize,
    sample_rate: u32,
    channels: u16,
    samples_sent: u64,
}

impl Framer {
    fn push(&mut self, samples: &[i16], tx: &mpsc::Sender<CaptureEvent>) {
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let frame = std::mem::replace(&mut self.pending, rest);
            self.send_chunk(frame, tx);
        }
    }

    fn flush(&mut self, tx: &mpsc::Sender<CaptureEvent>) {
        if !self.pending.is_empty() {
            let frame = std::mem::take(&mut self.pending);
            self.send_chunk(frame, tx);
        }
    }

    fn send_chunk(&mut self, samples: Vec<i16>, tx: &mpsc::Sender<CaptureEvent>) {
        let timestamp_ms =
            self.samples_sent * 1000 / (self.sample_rate as u64 * self.channels as u64);
        self.samples_sent += samples.len() as u64;

        let chunk = AudioChunk {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp_ms,
        };

        // Dropping a chunk is preferable to blocking the audio thread.
        if tx.try_send(CaptureEvent::Chunk(chunk)).is_err() {
            warn!("Capture channel full, dropping audio chunk");
        }
    }
}

fn run_capture(
    config: CaptureConfig,
    event_tx: mpsc::Sender<CaptureEvent>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
    stop: Arc<AtomicBool>,
) {
    let host = cpal::default_host();

    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err(CaptureError::PermissionDenied));
        return;
    };

    let input_config = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            info!("Default input config unavailable: {}", e);
            let _ = ready_tx.send(Err(CaptureError::PermissionDenied));
            return;
        }
    };

    let sample_format = input_config.sample_format();
    let stream_config: cpal::StreamConfig = input_config.into();
    let device_rate = stream_config.sample_rate;
    let device_channels = stream_config.channels;

    // Audio is captured at the device's native rate; the server converts on
    // its side. Stereo input is downmixed when mono is requested.
    let downmix = config.channels == 1 && device_channels == 2;
    let out_channels = if downmix { 1 } else { device_channels };
    let frame_len = (device_rate as u64 * out_channels as u64 * config.buffer_duration_ms / 1000)
        .max(1) as usize;

    let framer = Arc::new(Mutex::new(Framer {
        pending: Vec::with_capacity(frame_len * 2),
        frame_len,
        sample_rate: device_rate,
        channels: out_channels,
        samples_sent: 0,
    }));

    let cb_framer = Arc::clone(&framer);
    let cb_tx = event_tx.clone();
    let on_samples = move |samples: Vec<i16>| {
        let converted = if downmix { stereo_to_mono(&samples) } else { samples };
        if let Ok(mut framer) = cb_framer.lock() {
            framer.push(&converted, &cb_tx);
        }
    };

    let error_callback = |e: cpal::StreamError| {
        warn!("Input stream error: {}", e);
    };

    let stream = match build_input_stream(
        &device,
        &stream_config,
        sample_format,
        on_samples,
        error_callback,
    ) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
        return;
    }

    info!(
        "Microphone capture started ({}Hz, {} channels)",
        device_rate, out_channels
    );
    let _ = ready_tx.send(Ok(()));

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(10));
    }

    // Drop the stream before flushing so no callback races the final chunk.
    drop(stream);

    if let Ok(mut framer) = framer.lock() {
        framer.flush(&event_tx);
    }
    let _ = event_tx.blocking_send(CaptureEvent::Stopped);

    info!("Microphone capture stopped");
}

fn build_input_stream(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mut on_samples: impl FnMut(Vec<i16>) + Send + 'static,
    error_callback: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, CaptureError> {
    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_input_stream(
            stream_config,
            move |data: &[i16], _| on_samples(data.to_vec()),
            error_callback,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            stream_config,
            move |data: &[f32], _| {
                let samples = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                on_samples(samples)
            },
            error_callback,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            stream_config,
            move |data: &[u16], _| {
                let samples = data
                    .iter()
                    .map(|&s| (s as i32 - 1 - i16::MAX as i32) as i16)
                    .collect();
                on_samples(samples)
            },
            error_callback,
            None,
        ),
        other => {
            return Err(CaptureError::Stream(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    };

    stream.map_err(|e| CaptureError::Stream(e.to_string()))
}

/// Downmix interleaved stereo to mono by summing channels, saturating.
fn stereo_to_mono(samples: &[i16]) -> Vec<i16> {
    samples
        .chunks_exact(2)
        .map(|pair| {
            let sum = pair[0] as i32 + pair[1] as i32;
            sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::stereo_to_mono;

    #[test]
    fn stereo_downmix_sums_and_saturates() {
        assert_eq!(stereo_to_mono(&[100, 200, -50, -50]), vec![300, -100]);
        assert_eq!(stereo_to_mono(&[i16::MAX, i16::MAX]), vec![i16::MAX]);
        assert_eq!(stereo_to_mono(&[i16::MIN, i16::MIN]), vec![i16::MIN]);
    }
}
