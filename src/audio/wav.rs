use std::io::Cursor;

use crate::error::UploadError;

/// Encode a drained segment buffer as a 16-bit PCM WAV file in memory.
///
/// Each flush uploads one self-contained WAV so the server can decode a
/// segment without context from earlier ones.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>, UploadError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| UploadError::Encode(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| UploadError::Encode(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| UploadError::Encode(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
