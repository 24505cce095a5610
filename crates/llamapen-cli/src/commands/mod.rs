//! CLI commands.

pub mod chat;
pub mod info;
pub mod pull;

use std::collections::BTreeMap;
use std::path::PathBuf;

use llamapen::SessionConfig;

/// Build a session configuration from CLI arguments.
pub(crate) fn session_config(
    model: &str,
    opts: &[String],
    base_dir: Option<PathBuf>,
) -> miette::Result<SessionConfig> {
    let mut decoder_options = BTreeMap::new();
    for opt in opts {
        let (key, value) = opt
            .split_once('=')
            .ok_or_else(|| miette::miette!("Expected key=value, got: {}", opt))?;
        decoder_options.insert(key.to_string(), value.to_string());
    }

    SessionConfig::new(model, decoder_options, base_dir)
        .map_err(|e| miette::miette!("{}", e))
}
