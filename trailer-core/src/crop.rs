use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::ffmpeg::{
    CodecPolicy, FrameCounter, HeightProbeError, TranscodeError, TranscodeOrchestrator,
    TranscodeRequest, VideoProbe,
};

#[derive(Debug, Error)]
pub enum CropError {
    #[error("invalid aspect ratio `{0}`, expected W:H with positive integers")]
    Ratio(String),
    #[error("cannot determine source height: {0}")]
    HeightProbe(#[from] HeightProbeError),
    #[error("crop transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub fn parse(raw: &str) -> Result<Self, CropError> {
        let invalid = || CropError::Ratio(raw.to_string());
        let (width, height) = raw.trim().split_once(':').ok_or_else(invalid)?;
        let width: u32 = width.trim().parse().map_err(|_| invalid())?;
        let height: u32 = height.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }

    /// `16:9` becomes `16-9`.
    pub fn file_token(&self) -> String {
        format!("{}-{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = CropError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        AspectRatio::parse(raw)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropPlan {
    pub source_height: u32,
    pub ratio: AspectRatio,
}

impl CropPlan {
    pub fn new(source_height: u32, ratio: AspectRatio) -> Self {
        Self {
            source_height,
            ratio,
        }
    }

    /// `round(source_height * w / h)`, halves rounded up.
    pub fn target_width(&self) -> u32 {
        let numerator = u64::from(self.source_height) * u64::from(self.ratio.width);
        let denominator = u64::from(self.ratio.height);
        ((numerator * 2 + denominator) / (denominator * 2)) as u32
    }

    pub fn target_height(&self) -> u32 {
        self.source_height
    }

    pub fn filter(&self) -> String {
        format!("crop={}:{}", self.target_width(), self.target_height())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CropFailure {
    pub ratio: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoCropReport {
    pub source: PathBuf,
    pub source_height: Option<u32>,
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<CropFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CropReport {
    pub videos: Vec<VideoCropReport>,
}

impl CropReport {
    pub fn failure_count(&self) -> usize {
        self.videos.iter().map(|video| video.failures.len()).sum()
    }

    pub fn output_count(&self) -> usize {
        self.videos.iter().map(|video| video.outputs.len()).sum()
    }
}

/// Crop pass over finished videos. Every video and every ratio is handled on
/// its own; a failure is recorded and the pass moves on.
#[derive(Debug, Clone)]
pub struct CropPlanner {
    probe: VideoProbe,
    counter: FrameCounter,
    orchestrator: TranscodeOrchestrator,
    video_codec: CodecPolicy,
}

impl CropPlanner {
    pub fn new(
        probe: VideoProbe,
        counter: FrameCounter,
        orchestrator: TranscodeOrchestrator,
        video_codec: CodecPolicy,
    ) -> Self {
        Self {
            probe,
            counter,
            orchestrator,
            video_codec,
        }
    }

    /// `.mp4` files directly inside `dir`, sorted by name. Crop outputs live in
    /// per-video subdirectories and are therefore never picked up again.
    pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>, CropError> {
        let mut videos = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|err| CropError::Io {
                path: dir.to_path_buf(),
                source: err.into(),
            })?;
            let is_mp4 = entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("mp4"))
                .unwrap_or(false);
            if entry.file_type().is_file() && is_mp4 {
                videos.push(entry.into_path());
            }
        }
        Ok(videos)
    }

    /// `<dir>/<video stem>/<W-H>.mp4`
    pub fn output_path(video: &Path, ratio: &AspectRatio) -> PathBuf {
        let parent = video.parent().unwrap_or_else(|| Path::new("."));
        let stem = video
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        parent
            .join(stem)
            .join(format!("{}.mp4", ratio.file_token()))
    }

    pub async fn crop_directory(
        &self,
        dir: &Path,
        ratios: &[AspectRatio],
    ) -> Result<CropReport, CropError> {
        let videos = Self::list_videos(dir)?;
        info!(dir = %dir.display(), videos = videos.len(), ratios = ratios.len(), "starting crop pass");
        let mut report = CropReport::default();
        for video in videos {
            report.videos.push(self.crop_video(&video, ratios).await);
        }
        Ok(report)
    }

    pub async fn crop_video(&self, video: &Path, ratios: &[AspectRatio]) -> VideoCropReport {
        let mut report = VideoCropReport {
            source: video.to_path_buf(),
            source_height: None,
            outputs: Vec::new(),
            failures: Vec::new(),
        };

        let dimensions = match self.probe.dimensions(video).await {
            Ok(dimensions) => dimensions,
            Err(err) => {
                warn!(video = %video.display(), error = %err, "skipping video without height");
                report.failures.push(CropFailure {
                    ratio: None,
                    error: CropError::from(err).to_string(),
                });
                return report;
            }
        };
        report.source_height = Some(dimensions.height);

        let total_frames = match self.counter.count(video).await {
            Ok(frames) => frames,
            Err(err) => {
                warn!(video = %video.display(), error = %err, "frame count failed, progress disabled");
                0
            }
        };

        for ratio in ratios {
            let plan = CropPlan::new(dimensions.height, *ratio);
            if let Some(width) = dimensions.width {
                if plan.target_width() > width {
                    warn!(
                        video = %video.display(),
                        ratio = %ratio,
                        target_width = plan.target_width(),
                        source_width = width,
                        "crop wider than source"
                    );
                }
            }
            match self.crop_one(video, &plan, total_frames).await {
                Ok(output) => report.outputs.push(output),
                Err(err) => {
                    warn!(video = %video.display(), ratio = %ratio, error = %err, "crop failed");
                    report.failures.push(CropFailure {
                        ratio: Some(ratio.to_string()),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn crop_one(
        &self,
        video: &Path,
        plan: &CropPlan,
        total_frames: u64,
    ) -> Result<PathBuf, CropError> {
        let output = Self::output_path(video, &plan.ratio);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| CropError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let request = TranscodeRequest {
            inputs: vec![video.to_path_buf()],
            output: output.clone(),
            video: self.video_codec.clone(),
            audio: CodecPolicy::Copy,
            filter: Some(plan.filter()),
            total_frames,
            timeout: None,
            stage: format!("crop {}", plan.ratio),
        };
        self.orchestrator.run(&request).await?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_width_for_common_ratios() {
        let wide = CropPlan::new(1080, AspectRatio::parse("21:9").unwrap());
        assert_eq!(wide.target_width(), 2520);
        assert_eq!(wide.target_height(), 1080);

        let vertical = CropPlan::new(1080, AspectRatio::parse("9:16").unwrap());
        assert_eq!(vertical.target_width(), 608);
        assert_eq!(vertical.filter(), "crop=608:1080");

        let square = CropPlan::new(720, AspectRatio::parse("1:1").unwrap());
        assert_eq!(square.target_width(), 720);
    }

    #[test]
    fn rejects_malformed_ratios() {
        for raw in ["16x9", "16:", ":9", "0:9", "16:0", "a:b", ""] {
            assert!(AspectRatio::parse(raw).is_err(), "{raw} should fail");
        }
        assert_eq!(
            " 4 : 5 ".parse::<AspectRatio>().unwrap(),
            AspectRatio {
                width: 4,
                height: 5
            }
        );
    }

    #[test]
    fn outputs_go_to_per_video_directory() {
        let ratio = AspectRatio::parse("16:9").unwrap();
        assert_eq!(
            CropPlanner::output_path(Path::new("/out/trailer-1.mp4"), &ratio),
            PathBuf::from("/out/trailer-1/16-9.mp4")
        );
    }

    #[test]
    fn lists_only_top_level_mp4_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"").unwrap();
        std::fs::write(dir.path().join("a.MP4"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b").join("16-9.mp4"), b"").unwrap();

        let videos = CropPlanner::list_videos(dir.path()).unwrap();
        let names: Vec<_> = videos
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.MP4", "b.mp4"]);
    }
}
