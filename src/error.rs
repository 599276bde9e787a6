use reqwest::StatusCode;

/// Errors raised while acquiring or running the capture device.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Microphone access was denied or no input device is available.
    /// The session stays Idle when this is returned from a start attempt.
    #[error("microphone access denied or no input device available")]
    PermissionDenied,

    /// The device exists but the input stream could not be configured.
    #[error("failed to configure input stream: {0}")]
    Stream(String),
}

/// Errors raised by the upload client.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// HTTP 400: the server rejected the payload. Carries the server-provided
    /// message verbatim; the current operation chain is aborted.
    #[error("server rejected upload: {0}")]
    Rejected(String),

    /// Any other non-success response status.
    #[error("unexpected response status: {0}")]
    Status(StatusCode),

    /// Connection, DNS, or body-read failure.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The segment buffer could not be encoded to WAV.
    #[error("failed to encode segment audio: {0}")]
    Encode(String),
}
