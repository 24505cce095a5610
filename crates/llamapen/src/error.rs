//! Error types for session and provisioning operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while provisioning assets or talking to the
/// subprocess.
#[derive(Debug, Error)]
pub enum LlamaError {
    /// Model identifier is not one of the supported set.
    #[error("Unsupported model '{0}'. Supported models: 7B, 13B, 30B, 65B")]
    InvalidModel(String),

    /// No prebuilt executable exists for this platform.
    #[error("No prebuilt llama executable for platform '{0}'")]
    UnsupportedPlatform(String),

    /// Asset download failed (network error or non-2xx response).
    #[error("Failed to download {url} to {}: {reason}", dest.display())]
    DownloadFailed {
        url: String,
        dest: PathBuf,
        reason: String,
    },

    /// Downloaded model did not match its expected checksum.
    #[error("Model checksum mismatch. Expected: {expected}, got: {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// A prompt was issued without an open session.
    #[error("Session not initialized. Call open() first")]
    NotInitialized,

    /// The subprocess could not be spawned.
    #[error("Failed to spawn llama process: {0}")]
    SpawnFailed(String),

    /// The readiness marker never appeared on the subprocess output.
    #[error("Timeout waiting for llama process to become ready")]
    StartupTimeout,

    /// The subprocess output pipe failed mid-turn.
    #[error("Subprocess stream error: {0}")]
    StreamError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
