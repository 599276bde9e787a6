pub mod backend;
pub mod file;
pub mod mic;
pub mod wav;

pub use backend::{AudioChunk, CaptureBackend, CaptureConfig, CaptureEvent};
pub use file::AudioFile;
pub use mic::MicBackend;
pub use wav::encode_wav;
