use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::types::{Transcriber, TranscriptionOptions, TranscriptionResponse};

#[derive(Debug, Clone)]
pub struct HttpTranscriberConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Network-level timeout. `None` keeps reqwest's default (no timeout).
    pub request_timeout: Option<Duration>,
}

impl Default for HttpTranscriberConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            request_timeout: None,
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionBody {
    text: String,
}

/// Client for OpenAI-compatible `/v1/audio/transcriptions` endpoints.
#[derive(Clone)]
pub struct HttpTranscriber {
    client: Client,
    config: HttpTranscriberConfig,
}

impl HttpTranscriber {
    pub fn new(config: HttpTranscriberConfig) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            client: builder.build().unwrap_or_default(),
            config,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/audio/transcriptions", self.config.base_url.trim_end_matches('/'))
    }

    fn form(&self, audio: &[u8], options: &TranscriptionOptions) -> Result<Form> {
        let file = Part::bytes(audio.to_vec())
            .file_name("segment.wav")
            .mime_str("audio/wav")?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.config.model.clone())
            .text("response_format", "json");

        if let Some(language) = &options.language {
            form = form.text("language", language.clone());
        }
        if let Some(prompt) = &options.prompt {
            form = form.text("prompt", prompt.clone());
        }
        if let Some(temperature) = options.temperature {
            form = form.text("temperature", temperature.to_string());
        }
        Ok(form)
    }

    async fn request(&self, audio: &[u8], options: &TranscriptionOptions) -> Result<String> {
        let mut request = self.client.post(self.endpoint()).multipart(self.form(audio, options)?);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("transcription request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("transcription server error {}: {}", status, body.trim()));
        }

        let body: TranscriptionBody = response
            .json()
            .await
            .context("unreadable transcription response")?;
        Ok(body.text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8], options: &TranscriptionOptions) -> TranscriptionResponse {
        debug!("Sending {} bytes to {}", audio.len(), self.endpoint());
        match self.request(audio, options).await {
            Ok(text) => TranscriptionResponse::ok(text),
            Err(e) => {
                warn!("Transcription failed: {:#}", e);
                TranscriptionResponse::failure(format!("{:#}", e))
            }
        }
    }
}
