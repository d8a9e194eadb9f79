use super::{AudioExtractor, ExtractError};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Extracts the audio track with an external `ffmpeg` binary.
///
/// The video is written to a private temporary directory because container
/// formats such as MP4 need a seekable input. The directory is removed when
/// the call returns, and the child process is killed if the call is dropped
/// or times out.
///
/// On unix the child runs in its own process group, so a terminal Ctrl+C
/// reaches only the worker, which then finishes the job in flight.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Uses `configured` when given, otherwise looks `ffmpeg` up on `PATH`.
    pub fn locate(configured: Option<&str>, timeout: Duration) -> Result<Self, ExtractError> {
        let binary = match configured {
            Some(path) => PathBuf::from(path),
            None => which::which("ffmpeg").map_err(|e| ExtractError::BinaryNotFound(e.to_string()))?,
        };
        Ok(Self::new(binary, timeout))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Whether this ffmpeg build ships the `libmp3lame` encoder.
    pub async fn has_mp3_encoder(&self) -> Result<bool, ExtractError> {
        let output = detached(&self.binary)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        Ok(String::from_utf8_lossy(&output.stdout).contains("libmp3lame"))
    }

    fn spawn_error(&self, err: io::Error) -> ExtractError {
        match err.kind() {
            io::ErrorKind::NotFound => ExtractError::BinaryNotFound(self.binary.display().to_string()),
            _ => ExtractError::Io(err),
        }
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<(), ExtractError> {
        let child = detached(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "libmp3lame", "-q:a", "2", "-f", "mp3"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let result = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("ffmpeg timed out after {:?}, killing process", self.timeout);
                return Err(ExtractError::Timeout(self.timeout));
            }
        };

        if !result.status.success() {
            return Err(ExtractError::Failed {
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Command killed on drop and, on unix, placed in a new process group so
/// terminal signals aimed at the worker do not reach it.
fn detached(program: &Path) -> Command {
    let mut command = Command::new(program);
    command.kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    command
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, video: Bytes) -> Result<Bytes, ExtractError> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("source");
        let output = workdir.path().join("audio.mp3");

        tokio::fs::write(&input, &video).await?;
        debug!("Running ffmpeg on {} bytes of video", video.len());

        self.run(&input, &output).await?;

        let audio = tokio::fs::read(&output).await?;
        if audio.is_empty() {
            return Err(ExtractError::Failed {
                code: Some(0),
                stderr: "ffmpeg produced an empty audio file".to_string(),
            });
        }

        Ok(Bytes::from(audio))
    }
}
