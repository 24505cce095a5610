//! Session configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::LlamaError;
use crate::model::Model;
use crate::paths;

/// Quiescence window: how long the output may stay silent mid-turn before
/// the response is considered complete.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(4000);

/// How long to wait for the readiness marker after spawning the subprocess.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Immutable configuration for one [`Session`](crate::Session).
///
/// The model identifier is validated eagerly: an unrecognized name is a
/// construction error, never a runtime surprise.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Which model to run.
    pub model: Model,
    /// Decoder flags passed verbatim to the executable as `--<key> <value>`.
    pub decoder_options: BTreeMap<String, String>,
    /// Directory holding the executable and model files.
    pub base_dir: PathBuf,
    /// Quiescence window for the end-of-turn heuristic.
    pub idle_timeout: Duration,
    /// Readiness gate timeout for `open()`.
    pub startup_timeout: Duration,
}

impl SessionConfig {
    /// Create a configuration for `model`, validating the identifier.
    pub fn new(
        model: &str,
        decoder_options: BTreeMap<String, String>,
        base_dir: Option<PathBuf>,
    ) -> Result<Self, LlamaError> {
        let model: Model = model.parse()?;
        Ok(Self {
            model,
            decoder_options,
            base_dir: base_dir.unwrap_or_else(paths::default_base_dir),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        })
    }

    /// Override the quiescence window.
    ///
    /// The end-of-turn heuristic is a policy knob, not a protocol guarantee:
    /// a short window may truncate slow completions.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Override the readiness gate timeout.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Path to the executable under this configuration's base directory.
    pub fn executable_path(&self) -> PathBuf {
        paths::executable_path(&self.base_dir)
    }

    /// Path to the model weights under this configuration's base directory.
    pub fn model_path(&self) -> PathBuf {
        paths::model_path(&self.base_dir, self.model)
    }

    /// Launch argument list: `--model <path>` then every decoder option as
    /// `--<key> <value>`, in key order.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--model".to_string(),
            self.model_path().display().to_string(),
        ];
        for (key, value) in &self.decoder_options {
            args.push(format!("--{}", key));
            args.push(value.clone());
        }
        args
    }
}
