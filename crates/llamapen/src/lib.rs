//! Local llama.cpp chat process manager.
//!
//! This crate provides a self-contained local chat experience: it downloads
//! a prebuilt llama.cpp executable and model weights, spawns the executable
//! as a long-lived interactive subprocess, and exchanges line-oriented
//! prompts and streaming responses with it over stdin/stdout.

mod config;
mod error;
mod model;
pub mod paths;
mod provision;
mod session;
mod turn;

pub use config::{SessionConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_STARTUP_TIMEOUT};
pub use error::LlamaError;
pub use model::Model;
pub use provision::Provisioner;
pub use session::Session;
pub use turn::{Completion, TokenStream, Turn};

/// Sentinel character the subprocess prints when it is idle and awaiting
/// input. Seen once at startup (readiness) and after every completion.
pub const TURN_MARKER: char = '>';
