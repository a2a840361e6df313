//! Parley Voice crate - speech collaborator seams.
//!
//! Provides trait-based abstractions for speech-to-text and text-to-speech,
//! along with mock implementations for running the assistant without a
//! cloud speech backend.

use std::future::Future;
use std::path::{Path, PathBuf};

use parley_core::error::ParleyError;

pub mod mock;

pub use mock::{MockSynthesisService, MockTranscriptionService};

// =============================================================================
// Audio payloads
// =============================================================================

/// Audio handed to a transcription service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioInput {
    /// Encoded audio held in memory.
    Bytes(Vec<u8>),
    /// Audio file on disk.
    Path(PathBuf),
}

/// Audio produced by a synthesis service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesizedAudio {
    /// Encoded audio held in memory.
    Bytes(Vec<u8>),
    /// Audio written to the requested file.
    File(PathBuf),
}

// =============================================================================
// Traits
// =============================================================================

/// Service for transcribing audio to text.
pub trait TranscriptionService: Send + Sync {
    /// Transcribe `audio` into text.
    ///
    /// Fails with `ParleyError::Transcription` when no speech could be
    /// recovered.
    fn transcribe(
        &self,
        audio: &AudioInput,
    ) -> impl Future<Output = Result<String, ParleyError>> + Send;
}

/// Service for synthesizing speech from text.
pub trait SynthesisService: Send + Sync {
    /// Synthesize `text`. When `output` is given the audio is written there
    /// and [`SynthesizedAudio::File`] is returned.
    fn synthesize(
        &self,
        text: &str,
        output: Option<&Path>,
    ) -> impl Future<Output = Result<SynthesizedAudio, ParleyError>> + Send;
}
