// Tests for WAV loading on the file-upload path.

use anyhow::Result;
use tempfile::TempDir;

use recite::audio::AudioFile;

fn write_wav(path: &std::path::Path, seconds: f64, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let samples = (seconds * sample_rate as f64) as usize;
    for i in 0..samples {
        writer.write_sample((i % 128) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn open_reports_duration_and_format() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("sample.wav");
    write_wav(&path, 2.0, 16000)?;

    let audio = AudioFile::open(&path)?;

    assert!((audio.duration_seconds - 2.0).abs() < 0.01);
    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.file_name(), "sample.wav");
    assert!(!audio.bytes.is_empty());

    Ok(())
}

#[test]
fn min_length_check_rejects_short_recordings() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("short.wav");
    write_wav(&path, 0.4, 16000)?;

    let audio = AudioFile::open(&path)?;

    assert!(!audio.is_long_enough(1.0));
    assert!(audio.is_long_enough(0.25));

    Ok(())
}

#[test]
fn open_fails_on_a_non_wav_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("not-audio.wav");
    std::fs::write(&path, b"definitely not a RIFF header")?;

    assert!(AudioFile::open(&path).is_err());
    Ok(())
}
