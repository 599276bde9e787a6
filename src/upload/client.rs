use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::response::{AccuracyReport, ErrorBody, TranscriptResponse};
use crate::error::UploadError;

/// The three server operations the client performs. A trait seam so the
/// session controller can be exercised against a scripted double in tests.
#[async_trait::async_trait]
pub trait TranscriptionApi: Send + Sync {
    /// Upload a flushed segment. `reset` tells the server to discard its
    /// decoding context before processing.
    async fn transcribe_segment(&self, wav: Vec<u8>, reset: bool) -> Result<String, UploadError>;

    /// Upload a complete audio file for transcription.
    async fn transcribe_file(&self, file_name: &str, bytes: Vec<u8>)
        -> Result<String, UploadError>;

    /// Upload reference text to score against the most recent transcript.
    async fn score_reference(&self, text: &str) -> Result<AccuracyReport, UploadError>;
}

/// HTTP implementation over the server's form-POST endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    csrf_token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, csrf_token: impl Into<String>) -> Result<Self, UploadError> {
        // Cookie store keeps the server session, matching the browser's
        // same-origin credential behavior.
        let http = reqwest::Client::builder().cookie_store(true).build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            csrf_token: csrf_token.into(),
        })
    }

    /// All three endpoints share one transport: a multipart form with the
    /// payload under the endpoint's field name, an optional reset flag, and
    /// the anti-forgery token.
    async fn post_form<T: DeserializeOwned>(
        &self,
        field_name: &str,
        part: Part,
        reset: Option<bool>,
    ) -> Result<T, UploadError> {
        let mut form = Form::new().part(field_name.to_string(), part);

        if let Some(reset) = reset {
            form = form.text("reset", reset.to_string());
        }
        form = form.text("csrfmiddlewaretoken", self.csrf_token.clone());

        let url = format!("{}/{}", self.base_url, field_name);
        debug!("POST {} (reset={:?})", url, reset);

        let response = self.http.post(&url).multipart(form).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<T>().await?),
            StatusCode::BAD_REQUEST => {
                let body: ErrorBody = response.json().await?;
                Err(UploadError::Rejected(body.error))
            }
            status => Err(UploadError::Status(status)),
        }
    }
}

#[async_trait::async_trait]
impl TranscriptionApi for ApiClient {
    async fn transcribe_segment(&self, wav: Vec<u8>, reset: bool) -> Result<String, UploadError> {
        info!("Uploading segment ({} bytes, reset={})", wav.len(), reset);

        let part = Part::bytes(wav)
            .file_name("segment.wav")
            .mime_str("audio/wav")?;

        let body: TranscriptResponse = self
            .post_form("audio_recording", part, Some(reset))
            .await?;

        Ok(body.text)
    }

    async fn transcribe_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        info!("Uploading audio file {} ({} bytes)", file_name, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("audio/wav")?;

        let body: TranscriptResponse = self.post_form("audio_upload", part, None).await?;

        Ok(body.text)
    }

    async fn score_reference(&self, text: &str) -> Result<AccuracyReport, UploadError> {
        info!("Uploading reference text ({} chars)", text.len());

        let part = Part::text(text.to_string());
        self.post_form("text_upload", part, None).await
    }
}
