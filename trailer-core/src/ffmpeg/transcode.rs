use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{spawn_diagnostics, FfmpegProgressParser, FfmpegTools, ProgressParser};
use crate::report::{percent, ProgressReporter};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for encoder writing {output}: {source}")]
    Wait {
        output: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder writing {output} exited with status {status:?}: {stderr}")]
    Exit {
        output: PathBuf,
        status: Option<i32>,
        stderr: String,
    },
    #[error("encoder writing {output} killed after {limit:?}")]
    TimedOut { output: PathBuf, limit: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecPolicy {
    Copy,
    Encode(String),
}

impl CodecPolicy {
    /// `"copy"` means stream copy, anything else names an encoder.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "" | "copy" => CodecPolicy::Copy,
            codec => CodecPolicy::Encode(codec.to_string()),
        }
    }

    fn as_arg(&self) -> &str {
        match self {
            CodecPolicy::Copy => "copy",
            CodecPolicy::Encode(codec) => codec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    /// Input order decides stream indices in the output.
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub video: CodecPolicy,
    pub audio: CodecPolicy,
    pub filter: Option<String>,
    pub total_frames: u64,
    pub timeout: Option<Duration>,
    pub stage: String,
}

impl TranscodeRequest {
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];
        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.clone().into_os_string());
        }
        if let Some(filter) = &self.filter {
            args.push("-vf".into());
            args.push(filter.into());
        }
        args.push("-c:v".into());
        args.push(self.video.as_arg().into());
        args.push("-c:a".into());
        args.push(self.audio.as_arg().into());
        if self.audio == CodecPolicy::Encode("aac".into()) {
            args.push("-strict".into());
            args.push("experimental".into());
        }
        args.push(self.output.clone().into_os_string());
        args
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscodeOutcome {
    pub output: PathBuf,
    pub last_frame: Option<u64>,
    pub elapsed: Duration,
}

/// Runs one encoder process per request and reports frame progress.
#[derive(Clone)]
pub struct TranscodeOrchestrator {
    tools: FfmpegTools,
    parser: Arc<dyn ProgressParser>,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for TranscodeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeOrchestrator")
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl TranscodeOrchestrator {
    pub fn new(tools: FfmpegTools, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self::with_parser(tools, Arc::new(FfmpegProgressParser), reporter)
    }

    pub fn with_parser(
        tools: FfmpegTools,
        parser: Arc<dyn ProgressParser>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            tools,
            parser,
            reporter,
        }
    }

    /// Resolves only on exit status 0. With a timeout, whichever of exit or
    /// deadline comes first decides the outcome; on the deadline the process
    /// is killed and reaped before returning.
    pub async fn run(&self, request: &TranscodeRequest) -> Result<TranscodeOutcome, TranscodeError> {
        let mut command = Command::new(&self.tools.ffmpeg);
        command
            .kill_on_drop(true)
            .args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!(output = %request.output.display(), args = ?request.args(), "spawning encoder");
        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| TranscodeError::Spawn {
            program: self.tools.ffmpeg.clone(),
            source,
        })?;

        let diagnostics = child.stderr.take().map(|stderr| {
            let reporter = Arc::clone(&self.reporter);
            let stage = request.stage.clone();
            let total = request.total_frames;
            let mut last_reported = None;
            spawn_diagnostics(stderr, Arc::clone(&self.parser), move |frame| {
                let Some(pct) = percent(frame, total) else {
                    return;
                };
                if last_reported != Some(pct) {
                    last_reported = Some(pct);
                    reporter.report(&stage, pct);
                }
            })
        });

        let waited = match request.timeout {
            Some(limit) => timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        let status = match waited {
            Some(status) => status.map_err(|source| TranscodeError::Wait {
                output: request.output.clone(),
                source,
            })?,
            None => {
                let limit = request.timeout.unwrap_or_default();
                if let Err(err) = child.kill().await {
                    warn!(output = %request.output.display(), error = %err, "failed to kill encoder");
                }
                if let Some(handle) = diagnostics {
                    handle.abort();
                }
                warn!(output = %request.output.display(), ?limit, "encoder timed out");
                return Err(TranscodeError::TimedOut {
                    output: request.output.clone(),
                    limit,
                });
            }
        };

        let summary = match diagnostics {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Default::default(),
        };
        if !status.success() {
            return Err(TranscodeError::Exit {
                output: request.output.clone(),
                status: status.code(),
                stderr: summary.tail,
            });
        }

        let elapsed = started.elapsed();
        info!(output = %request.output.display(), ?elapsed, "encoder finished");
        Ok(TranscodeOutcome {
            output: request.output.clone(),
            last_frame: summary.last_frame,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(filter: Option<&str>, video: CodecPolicy, audio: CodecPolicy) -> TranscodeRequest {
        TranscodeRequest {
            inputs: vec![PathBuf::from("/tmp/1-video.mp4"), PathBuf::from("/tmp/1-audio.mp4")],
            output: PathBuf::from("/out/trailer.mp4"),
            video,
            audio,
            filter: filter.map(str::to_string),
            total_frames: 100,
            timeout: None,
            stage: "merge".into(),
        }
    }

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn mux_arguments_keep_input_order() {
        let args = as_strings(
            request(
                None,
                CodecPolicy::Encode("libx264".into()),
                CodecPolicy::Encode("aac".into()),
            )
            .args(),
        );
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-nostdin",
                "-y",
                "-i",
                "/tmp/1-video.mp4",
                "-i",
                "/tmp/1-audio.mp4",
                "-c:v",
                "libx264",
                "-c:a",
                "aac",
                "-strict",
                "experimental",
                "/out/trailer.mp4",
            ]
        );
    }

    #[test]
    fn crop_arguments_carry_filter() {
        let args = as_strings(
            request(
                Some("crop=608:1080"),
                CodecPolicy::Encode("libx264".into()),
                CodecPolicy::Copy,
            )
            .args(),
        );
        let filter_at = args.iter().position(|arg| arg == "-vf").unwrap();
        assert_eq!(args[filter_at + 1], "crop=608:1080");
        assert!(!args.contains(&"-strict".to_string()));
        assert_eq!(args.last().unwrap(), "/out/trailer.mp4");
    }

    #[test]
    fn codec_names_map_to_policies() {
        assert_eq!(CodecPolicy::from_name("copy"), CodecPolicy::Copy);
        assert_eq!(
            CodecPolicy::from_name("libx264"),
            CodecPolicy::Encode("libx264".into())
        );
    }
}
