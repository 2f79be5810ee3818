use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::{spawn_diagnostics, FfmpegProgressParser, FfmpegTools, ProgressParser};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for frame count of {path}: {source}")]
    Wait {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("frame count pass over {path} exited with status {status:?}: {stderr}")]
    Exit {
        path: PathBuf,
        status: Option<i32>,
        stderr: String,
    },
}

/// Decode-only pass that reports how many video frames a file holds. The
/// number is only used as a progress denominator.
#[derive(Clone)]
pub struct FrameCounter {
    tools: FfmpegTools,
    parser: Arc<dyn ProgressParser>,
}

impl std::fmt::Debug for FrameCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCounter")
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl FrameCounter {
    pub fn new(tools: FfmpegTools) -> Self {
        Self::with_parser(tools, Arc::new(FfmpegProgressParser))
    }

    pub fn with_parser(tools: FfmpegTools, parser: Arc<dyn ProgressParser>) -> Self {
        Self { tools, parser }
    }

    /// Last frame index reported by the decoder, or 0 when none was seen.
    pub async fn count(&self, path: &Path) -> Result<u64, ProbeError> {
        let mut command = Command::new(&self.tools.ffmpeg);
        command
            .kill_on_drop(true)
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-i")
            .arg(path)
            .arg("-map")
            .arg("0:v:0")
            .arg("-c")
            .arg("copy")
            .arg("-f")
            .arg("null")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = command.spawn().map_err(|source| ProbeError::Spawn {
            program: self.tools.ffmpeg.clone(),
            source,
        })?;

        let diagnostics = child
            .stderr
            .take()
            .map(|stderr| spawn_diagnostics(stderr, Arc::clone(&self.parser), |_| {}));
        let status = child.wait().await.map_err(|source| ProbeError::Wait {
            path: path.to_path_buf(),
            source,
        })?;
        let summary = match diagnostics {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Default::default(),
        };

        if !status.success() {
            return Err(ProbeError::Exit {
                path: path.to_path_buf(),
                status: status.code(),
                stderr: summary.tail,
            });
        }
        let frames = summary.last_frame.unwrap_or(0);
        debug!(path = %path.display(), frames, "frame count finished");
        Ok(frames)
    }
}
