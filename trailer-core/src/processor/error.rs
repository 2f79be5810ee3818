use std::path::PathBuf;

use thiserror::Error;

use crate::crop::CropError;
use crate::ffmpeg::{ProbeError, TranscodeError};
use crate::fetcher::FetchError;
use crate::manifest::ManifestError;
use crate::selection::SelectionError;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("manifest parse failed: {0}")]
    Parse(#[from] ManifestError),
    #[error("variant selection failed: {0}")]
    Selection(#[from] SelectionError),
    #[error("segment fetch failed: {0}")]
    SegmentFetch(#[from] FetchError),
    #[error("frame count failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("crop pass failed: {0}")]
    Crop(#[from] CropError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("network error: {0}")]
    Network(String),
}

impl ProcessorError {
    /// True when the encoder was killed by the merge deadline rather than
    /// exiting on its own.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProcessorError::Transcode(TranscodeError::TimedOut { .. })
        )
    }
}

impl From<reqwest::Error> for ProcessorError {
    fn from(error: reqwest::Error) -> Self {
        ProcessorError::Network(error.to_string())
    }
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_merge_deadline_counts_as_timeout() {
        let timed_out = ProcessorError::from(TranscodeError::TimedOut {
            output: PathBuf::from("out.mp4"),
            limit: Duration::from_secs(300),
        });
        assert!(timed_out.is_timeout());

        let exited = ProcessorError::from(TranscodeError::Exit {
            output: PathBuf::from("out.mp4"),
            status: Some(1),
            stderr: String::new(),
        });
        assert!(!exited.is_timeout());
        assert!(!ProcessorError::Network("refused".into()).is_timeout());
    }
}
