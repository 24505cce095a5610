//! Process lifecycle for the llama subprocess.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::LlamaError;
use crate::provision::Provisioner;
use crate::turn::{self, RawOutput, Turn};
use crate::TURN_MARKER;

/// Owns at most one live llama subprocess and mediates all I/O with it.
///
/// States are `Closed` (no handle) and `Open` (handle present and past the
/// readiness gate). `open()` and `close()` are the only transitions.
pub struct Session {
    config: SessionConfig,
    process: Option<ProcessHandle>,
}

/// The live subprocess and its pipes. Exactly one exists per open session.
struct ProcessHandle {
    child: Child,
    stdin: ChildStdin,
    output: RawOutput,
}

impl Session {
    /// Create a closed session for `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            process: None,
        }
    }

    /// This session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Download the executable and model weights if they are missing (or
    /// unconditionally when `force` is set).
    pub async fn init(&self, force: bool) -> Result<(), LlamaError> {
        Provisioner::for_config(&self.config)
            .ensure_assets(self.config.model, force)
            .await
    }

    /// Spawn the subprocess and wait for it to signal readiness.
    ///
    /// If a subprocess is already open it is closed first, so two live
    /// processes can never coexist. Fails with `StartupTimeout` when the
    /// readiness marker does not appear within the configured window.
    pub async fn open(&mut self) -> Result<(), LlamaError> {
        if self.process.is_some() {
            debug!("open() on an open session, closing previous process");
            self.close().await?;
        }

        let exe = self.config.executable_path();
        let mut child = Command::new(&exe)
            .args(self.config.launch_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LlamaError::SpawnFailed(format!("{}: {}", exe.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LlamaError::SpawnFailed("stdin pipe missing".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LlamaError::SpawnFailed("stdout pipe missing".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_output(stdout, tx));
        let output: RawOutput = Arc::new(Mutex::new(rx));

        if let Err(e) = wait_ready(&output, self.config.startup_timeout).await {
            let _ = child.kill().await;
            return Err(e);
        }

        info!("llama process ready (PID: {:?})", child.id());
        self.process = Some(ProcessHandle {
            child,
            stdin,
            output,
        });
        Ok(())
    }

    /// Terminate the subprocess, if any. Calling this while closed is a
    /// no-op. Killing the child closes its output pipe, which fails any
    /// still-pending turn instead of leaving it hanging.
    pub async fn close(&mut self) -> Result<(), LlamaError> {
        if let Some(mut handle) = self.process.take() {
            info!("Stopping llama process (PID: {:?})", handle.child.id());

            // Try graceful shutdown first
            #[cfg(unix)]
            if let Some(pid) = handle.child.id() {
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }

            match handle.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("llama exited with status: {:?}", status);
                }
                Ok(None) => {
                    warn!("llama didn't exit gracefully, killing...");
                    let _ = handle.child.kill().await;
                }
                Err(e) => {
                    warn!("Error checking llama status: {}", e);
                    let _ = handle.child.kill().await;
                }
            }
        }
        Ok(())
    }

    /// Whether a subprocess handle is present.
    pub fn is_open(&self) -> bool {
        self.process.is_some()
    }

    /// Whether the subprocess is still alive, reaping it if it has exited.
    pub fn is_running(&mut self) -> bool {
        match self.process {
            Some(ref mut handle) => match handle.child.try_wait() {
                Ok(Some(_)) => {
                    self.process = None;
                    false
                }
                Ok(None) => true,
                Err(_) => false,
            },
            None => false,
        }
    }

    /// PID of the live subprocess, if open.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|h| h.child.id())
    }

    /// Send one prompt line to the subprocess and start a turn over its
    /// response. Fails with `NotInitialized` while closed. Turns are
    /// serialized: a second prompt's stream stays empty until the first
    /// turn finalizes.
    pub async fn prompt(&mut self, text: &str) -> Result<Turn, LlamaError> {
        let handle = self.process.as_mut().ok_or(LlamaError::NotInitialized)?;

        // Discard output that arrived with no turn in flight, so it neither
        // pollutes this turn nor accumulates in the channel forever. A held
        // lock means a previous turn still owns the receiver; leave it be.
        if let Ok(mut rx) = handle.output.try_lock() {
            let mut stale = 0;
            while let Ok(chunk) = rx.try_recv() {
                stale += chunk.len();
            }
            if stale > 0 {
                debug!("Discarded {} bytes of stale output between turns", stale);
            }
        }

        handle.stdin.write_all(text.as_bytes()).await?;
        handle.stdin.write_all(b"\n").await?;
        handle.stdin.flush().await?;
        debug!("Wrote prompt ({} bytes)", text.len());

        Ok(turn::spawn_turn(
            Arc::clone(&handle.output),
            self.config.idle_timeout,
        ))
    }
}

/// Forward subprocess stdout into the raw channel, chunk by chunk, in
/// arrival order. Dropping the sender on EOF or read failure is how pipe
/// closure reaches an in-flight turn.
async fn read_output(mut stdout: ChildStdout, tx: mpsc::UnboundedSender<String>) {
    let mut buf = [0u8; 4096];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(chunk).is_err() {
                    // Session closed; nobody is listening anymore.
                    break;
                }
            }
            Err(e) => {
                warn!("llama stdout read failed: {}", e);
                break;
            }
        }
    }
}

/// Readiness gate: consume startup output until the first marker appears.
async fn wait_ready(output: &RawOutput, startup_timeout: Duration) -> Result<(), LlamaError> {
    let mut rx = output.lock().await;
    let gate = async {
        while let Some(chunk) = rx.recv().await {
            if chunk.contains(TURN_MARKER) {
                return Ok(());
            }
            debug!("Startup output: {} bytes", chunk.len());
        }
        Err(LlamaError::StreamError(
            "output pipe closed before ready".to_string(),
        ))
    };

    match timeout(startup_timeout, gate).await {
        Ok(result) => result,
        Err(_) => Err(LlamaError::StartupTimeout),
    }
}
