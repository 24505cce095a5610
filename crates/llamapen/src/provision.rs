//! Asset download and installation.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::LlamaError;
use crate::model::Model;
use crate::paths;

/// Release tag the prebuilt executables are published under.
const EXECUTABLE_BASE_URL: &str =
    "https://github.com/llamapen/llama-bin/releases/download/v1";

/// Registry the model weights are published under.
const MODEL_BASE_URL: &str = "https://huggingface.co/llamapen/llama-ggml/resolve/main";

/// Resolve `(os, arch)` to the artifact name of a prebuilt executable.
///
/// Kept as a pure function over strings so the table is testable without
/// cross-compiling.
fn executable_artifact(os: &str, arch: &str) -> Result<&'static str, LlamaError> {
    match (os, arch) {
        ("linux", "x86_64") => Ok("llama-linux-x86_64"),
        ("linux", "aarch64") => Ok("llama-linux-aarch64"),
        ("macos", "x86_64") => Ok("llama-macos-x86_64"),
        ("macos", "aarch64") => Ok("llama-macos-aarch64"),
        ("windows", "x86_64") => Ok("llama-windows-x86_64.exe"),
        (os, arch) => Err(LlamaError::UnsupportedPlatform(format!("{}/{}", os, arch))),
    }
}

/// Downloads the executable and model weights into the base directory.
pub struct Provisioner {
    client: reqwest::Client,
    base_dir: PathBuf,
    executable_base_url: String,
    model_base_url: String,
}

impl Provisioner {
    /// Create a provisioner targeting `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_dir: base_dir.into(),
            executable_base_url: EXECUTABLE_BASE_URL.to_string(),
            model_base_url: MODEL_BASE_URL.to_string(),
        }
    }

    /// Create a provisioner for a session's base directory.
    pub fn for_config(config: &SessionConfig) -> Self {
        Self::new(config.base_dir.clone())
    }

    /// Override where the prebuilt executables are fetched from.
    pub fn with_executable_base_url(mut self, url: impl Into<String>) -> Self {
        self.executable_base_url = url.into();
        self
    }

    /// Override where the model weights are fetched from.
    pub fn with_model_base_url(mut self, url: impl Into<String>) -> Self {
        self.model_base_url = url.into();
        self
    }

    /// Ensure both the executable and the weights for `model` are present.
    ///
    /// Each asset is fetched only if missing, or unconditionally when
    /// `force` is set. The two fetches run concurrently; both must succeed.
    pub async fn ensure_assets(&self, model: Model, force: bool) -> Result<(), LlamaError> {
        paths::ensure_dirs(&self.base_dir)?;

        tokio::try_join!(
            self.ensure_executable(force),
            self.ensure_model(model, force)
        )?;
        Ok(())
    }

    /// Fetch the platform executable if missing, then set its exec bit.
    async fn ensure_executable(&self, force: bool) -> Result<(), LlamaError> {
        let dest = paths::executable_path(&self.base_dir);
        if dest.exists() && !force {
            debug!("Executable already present at {:?}", dest);
            return Ok(());
        }

        let artifact = executable_artifact(std::env::consts::OS, std::env::consts::ARCH)?;
        let url = format!("{}/{}", self.executable_base_url, artifact);
        self.download(&url, &dest, None).await?;
        make_executable(&dest).await?;
        Ok(())
    }

    /// Fetch the model weights if missing, verifying the checksum when the
    /// registry publishes one.
    async fn ensure_model(&self, model: Model, force: bool) -> Result<(), LlamaError> {
        let dest = paths::model_path(&self.base_dir, model);
        if dest.exists() && !force {
            debug!("Model '{}' already present at {:?}", model, dest);
            return Ok(());
        }

        let url = format!("{}/{}", self.model_base_url, model.filename());
        self.download(&url, &dest, model.sha256()).await
    }

    /// Stream a URL to a file with progress, hashing as we go.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        sha256: Option<&str>,
    ) -> Result<(), LlamaError> {
        info!("Downloading {} to {:?}", url, dest);

        let failed = |reason: String| LlamaError::DownloadFailed {
            url: url.to_string(),
            dest: dest.to_path_buf(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let pb = progress_bar(response.content_length());

        let mut file = File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;
        pb.finish_with_message("Download complete");

        if let Some(expected) = sha256 {
            let actual = hex::encode(hasher.finalize());
            if actual != expected {
                // Remove corrupted file
                let _ = tokio::fs::remove_file(dest).await;
                return Err(LlamaError::ChecksumMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
            debug!("Checksum verified: {}", actual);
        }

        Ok(())
    }
}

/// Set owner-execute permission on the downloaded binary. The chmod is a
/// blocking native call, so it runs off the event loop.
async fn make_executable(path: &Path) -> Result<(), LlamaError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

fn progress_bar(total_size: Option<u64>) -> ProgressBar {
    if let Some(size) = total_size {
        let pb = ProgressBar::new(size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );
        pb
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {bytes} downloaded")
                .expect("Invalid progress bar template"),
        );
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_supported_platforms_resolve() {
        for (os, arch) in [
            ("linux", "x86_64"),
            ("linux", "aarch64"),
            ("macos", "aarch64"),
            ("windows", "x86_64"),
        ] {
            assert!(executable_artifact(os, arch).is_ok());
        }
    }

    #[test]
    fn test_unsupported_platform_named_in_error() {
        match executable_artifact("freebsd", "riscv64") {
            Err(LlamaError::UnsupportedPlatform(name)) => {
                assert_eq!(name, "freebsd/riscv64")
            }
            other => panic!("expected UnsupportedPlatform, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_present_assets_skip_fetch() {
        // With both files on disk and force off, ensure_assets never touches
        // the network (the URLs here would 404 if it did).
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(paths::executable_path(dir.path()), b"#!/bin/sh\n").unwrap();
        std::fs::write(paths::model_path(dir.path(), Model::SevenB), b"weights").unwrap();

        let provisioner = Provisioner::new(dir.path());
        provisioner.ensure_assets(Model::SevenB, false).await.unwrap();
    }

    /// Minimal HTTP/1.1 responder: answers every request with `body`.
    async fn serve(listener: TcpListener, body: &'static [u8]) {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(respond(socket, body));
        }
    }

    async fn respond(mut socket: TcpStream, body: &'static [u8]) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        let header = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        let _ = socket.write_all(header.as_bytes()).await;
        let _ = socket.write_all(body).await;
    }

    #[tokio::test]
    async fn test_missing_assets_fetch_both() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(listener, b"asset-bytes"));

        let dir = tempfile::tempdir().unwrap();
        let provisioner = Provisioner::new(dir.path())
            .with_executable_base_url(&base_url)
            .with_model_base_url(&base_url);
        provisioner.ensure_assets(Model::SevenB, false).await.unwrap();

        let exe = paths::executable_path(dir.path());
        assert_eq!(std::fs::read(&exe).unwrap(), b"asset-bytes");
        assert_eq!(
            std::fs::read(paths::model_path(dir.path(), Model::SevenB)).unwrap(),
            b"asset-bytes"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&exe).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
