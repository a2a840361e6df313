//! Mock speech services.

use std::path::Path;

use parley_core::error::ParleyError;

use crate::{AudioInput, SynthesisService, SynthesizedAudio, TranscriptionService};

/// Transcription service that returns a fixed transcript.
///
/// Empty audio (or an empty file) fails, mirroring a recognizer that heard
/// nothing.
#[derive(Debug, Clone)]
pub struct MockTranscriptionService {
    transcript: String,
}

impl MockTranscriptionService {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
        }
    }
}

impl TranscriptionService for MockTranscriptionService {
    async fn transcribe(&self, audio: &AudioInput) -> Result<String, ParleyError> {
        let len = match audio {
            AudioInput::Bytes(bytes) => bytes.len(),
            AudioInput::Path(path) => tokio::fs::read(path)
                .await
                .map_err(|e| {
                    ParleyError::Transcription(format!(
                        "Cannot read audio file {}: {}",
                        path.display(),
                        e
                    ))
                })?
                .len(),
        };

        if len == 0 {
            return Err(ParleyError::Transcription(
                "Cannot transcribe empty audio data".to_string(),
            ));
        }
        if self.transcript.trim().is_empty() {
            return Err(ParleyError::Transcription(
                "No speech recognized".to_string(),
            ));
        }

        tracing::debug!(audio_bytes = len, "Mock transcription generated");
        Ok(self.transcript.clone())
    }
}

/// Synthesis service that emits deterministic placeholder audio.
#[derive(Debug, Clone, Default)]
pub struct MockSynthesisService {
    fail: bool,
}

impl MockSynthesisService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A synthesizer whose every call fails.
    pub fn failing() -> Self {
        Self { fail: true }
    }

    /// The bytes produced for `text`.
    pub fn render(text: &str) -> Vec<u8> {
        format!("MOCK-AUDIO:{}", text).into_bytes()
    }
}

impl SynthesisService for MockSynthesisService {
    async fn synthesize(
        &self,
        text: &str,
        output: Option<&Path>,
    ) -> Result<SynthesizedAudio, ParleyError> {
        if self.fail {
            return Err(ParleyError::Synthesis("voice backend unavailable".to_string()));
        }
        if text.is_empty() {
            return Err(ParleyError::Synthesis("Cannot synthesize empty text".to_string()));
        }

        let audio = Self::render(text);
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, &audio).await?;
                tracing::debug!(path = %path.display(), bytes = audio.len(), "Mock audio written");
                Ok(SynthesizedAudio::File(path.to_path_buf()))
            }
            None => Ok(SynthesizedAudio::Bytes(audio)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Transcription ----

    #[tokio::test]
    async fn test_transcribe_bytes() {
        let service = MockTranscriptionService::new("check my order");
        let text = service
            .transcribe(&AudioInput::Bytes(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(text, "check my order");
    }

    #[tokio::test]
    async fn test_transcribe_empty_audio_fails() {
        let service = MockTranscriptionService::new("anything");
        let err = service
            .transcribe(&AudioInput::Bytes(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Transcription(_)));
    }

    #[tokio::test]
    async fn test_transcribe_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let service = MockTranscriptionService::new("hello");
        let text = service.transcribe(&AudioInput::Path(path)).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_transcribe_missing_file_fails() {
        let service = MockTranscriptionService::new("hello");
        let result = service
            .transcribe(&AudioInput::Path("/does/not/exist.wav".into()))
            .await;
        assert!(matches!(result, Err(ParleyError::Transcription(_))));
    }

    #[tokio::test]
    async fn test_blank_transcript_fails() {
        let service = MockTranscriptionService::new("   ");
        let result = service.transcribe(&AudioInput::Bytes(vec![0])).await;
        assert!(result.is_err());
    }

    // ---- Synthesis ----

    #[tokio::test]
    async fn test_synthesize_to_bytes() {
        let audio = MockSynthesisService::new()
            .synthesize("Hi", None)
            .await
            .unwrap();
        assert_eq!(audio, SynthesizedAudio::Bytes(b"MOCK-AUDIO:Hi".to_vec()));
    }

    #[tokio::test]
    async fn test_synthesize_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("reply.mp3");

        let audio = MockSynthesisService::new()
            .synthesize("Goodbye", Some(&path))
            .await
            .unwrap();
        assert_eq!(audio, SynthesizedAudio::File(path.clone()));
        assert_eq!(std::fs::read(&path).unwrap(), MockSynthesisService::render("Goodbye"));
    }

    #[tokio::test]
    async fn test_failing_synthesizer() {
        let result = MockSynthesisService::failing().synthesize("Hi", None).await;
        assert!(matches!(result, Err(ParleyError::Synthesis(_))));
    }
}
