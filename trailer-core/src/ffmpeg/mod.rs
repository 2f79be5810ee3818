mod frames;
mod probe;
mod progress;
mod transcode;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::task::JoinHandle;

use crate::config::ToolsSection;

pub use frames::{FrameCounter, ProbeError};
pub use probe::{HeightProbeError, VideoDimensions, VideoProbe};
pub use progress::{FfmpegProgressParser, ProgressParser};
pub use transcode::{
    CodecPolicy, TranscodeError, TranscodeOrchestrator, TranscodeOutcome, TranscodeRequest,
};

use self::progress::{DiagnosticLines, LineTail};

const STDERR_TAIL_LINES: usize = 40;

/// Locations of the external encoder and metadata probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl From<&ToolsSection> for FfmpegTools {
    fn from(section: &ToolsSection) -> Self {
        Self {
            ffmpeg: PathBuf::from(&section.ffmpeg),
            ffprobe: PathBuf::from(&section.ffprobe),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct DiagnosticSummary {
    pub last_frame: Option<u64>,
    pub tail: String,
}

/// Reads a child's diagnostic stream to the end on a separate task so the
/// pipe never fills up, calling `on_frame` for every frame line.
pub(crate) fn spawn_diagnostics<R, F>(
    stream: R,
    parser: Arc<dyn ProgressParser>,
    mut on_frame: F,
) -> JoinHandle<DiagnosticSummary>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: FnMut(u64) + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = DiagnosticLines::new(stream);
        let mut tail = LineTail::new(STDERR_TAIL_LINES);
        let mut last_frame = None;
        while let Ok(Some(line)) = lines.next_line().await {
            match parser.parse_frame(&line) {
                Some(frame) => {
                    last_frame = Some(frame);
                    on_frame(frame);
                }
                None => tail.push(line),
            }
        }
        DiagnosticSummary {
            last_frame,
            tail: tail.joined(),
        }
    })
}
