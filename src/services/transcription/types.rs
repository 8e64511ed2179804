use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::kernel::job::JobError;
use crate::kernel::pipeline::SegmentProcessor;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Result shape of the remote speech-to-text call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptionResponse {
    pub fn ok(transcript: impl Into<String>) -> Self {
        Self {
            success: true,
            transcript: Some(transcript.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            transcript: None,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<String, String> {
        if self.success {
            Ok(self.transcript.unwrap_or_default())
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "transcription failed without an error message".to_string()))
        }
    }
}

/// Remote speech-to-text capability. Slow and unreliable by assumption;
/// implementations must not retry internally, the job queue owns retries.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], options: &TranscriptionOptions) -> TranscriptionResponse;
}

/// Adapts a `Transcriber` to the pipeline's per-segment processor.
pub struct TranscriptionProcessor {
    transcriber: Arc<dyn Transcriber>,
    options: TranscriptionOptions,
}

impl TranscriptionProcessor {
    pub fn new(transcriber: Arc<dyn Transcriber>, options: TranscriptionOptions) -> Self {
        Self { transcriber, options }
    }
}

#[async_trait]
impl SegmentProcessor for TranscriptionProcessor {
    async fn process(&self, payload: &[u8], _index: usize) -> Result<String, JobError> {
        self.transcriber
            .transcribe(payload, &self.options)
            .await
            .into_result()
            .map_err(JobError::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_without_message_still_explains_itself() {
        let response = TranscriptionResponse {
            success: false,
            transcript: None,
            error: None,
        };
        assert!(response.into_result().unwrap_err().contains("without an error message"));
    }

    #[test]
    fn success_without_text_is_empty_transcript() {
        let response = TranscriptionResponse {
            success: true,
            transcript: None,
            error: None,
        };
        assert_eq!(response.into_result(), Ok(String::new()));
    }

    #[test]
    fn response_serializes_without_absent_fields() {
        let json = serde_json::to_string(&TranscriptionResponse::ok("hello")).unwrap();
        assert_eq!(json, r#"{"success":true,"transcript":"hello"}"#);
    }
}
