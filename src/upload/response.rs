use serde::{Deserialize, Serialize};

/// Success body of the two audio endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub text: String,
}

/// Failure body of all endpoints (HTTP 400).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Accuracy metrics returned by the text-scoring endpoint.
///
/// The server stringifies every value and the client displays them verbatim,
/// so these stay `String` end to end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub wer: String,
    pub wcr: String,
    pub rtf: String,
    pub precision_micro: String,
    pub precision_macro: String,
    pub recall_micro: String,
    pub recall_macro: String,
    pub f1_micro: String,
    pub f1_macro: String,
}
