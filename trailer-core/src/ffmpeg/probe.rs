use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use super::FfmpegTools;

#[derive(Debug, Error)]
pub enum HeightProbeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata probe of {path} exited with status {status:?}: {stderr}")]
    Exit {
        path: PathBuf,
        status: Option<i32>,
        stderr: String,
    },
    #[error("unreadable metadata for {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} has no video stream with a height")]
    MissingHeight { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoDimensions {
    pub width: Option<u32>,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// Metadata probe for the first video stream of a file.
#[derive(Debug, Clone)]
pub struct VideoProbe {
    tools: FfmpegTools,
}

impl VideoProbe {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }

    pub async fn dimensions(&self, path: &Path) -> Result<VideoDimensions, HeightProbeError> {
        let mut command = Command::new(&self.tools.ffprobe);
        command
            .kill_on_drop(true)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height")
            .arg("-of")
            .arg("json")
            .arg(path);
        let output = command
            .output()
            .await
            .map_err(|source| HeightProbeError::Spawn {
                program: self.tools.ffprobe.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(HeightProbeError::Exit {
                path: path.to_path_buf(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_dimensions(path, &output.stdout)
    }
}

fn parse_dimensions(path: &Path, stdout: &[u8]) -> Result<VideoDimensions, HeightProbeError> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|source| HeightProbeError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    parsed
        .streams
        .into_iter()
        .find_map(|stream| {
            stream.height.filter(|height| *height > 0).map(|height| VideoDimensions {
                width: stream.width,
                height,
            })
        })
        .ok_or_else(|| HeightProbeError::MissingHeight {
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_stream_dimensions() {
        let stdout = br#"{"programs": [], "streams": [{"width": 1920, "height": 1080}]}"#;
        let dims = parse_dimensions(Path::new("a.mp4"), stdout).unwrap();
        assert_eq!(
            dims,
            VideoDimensions {
                width: Some(1920),
                height: 1080
            }
        );
    }

    #[test]
    fn empty_stream_list_is_missing_height() {
        let stdout = br#"{"programs": [], "streams": []}"#;
        assert!(matches!(
            parse_dimensions(Path::new("a.mp4"), stdout),
            Err(HeightProbeError::MissingHeight { .. })
        ));
    }

    #[test]
    fn garbage_output_is_a_parse_error() {
        assert!(matches!(
            parse_dimensions(Path::new("a.mp4"), b"not json"),
            Err(HeightProbeError::Parse { .. })
        ));
    }
}
