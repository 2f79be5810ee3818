mod error;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TrailerConfig;
use crate::crop::{AspectRatio, CropPlanner, CropReport};
use crate::fetcher::{parse_url, resolve, DownloadJob, SegmentFetcher};
use crate::ffmpeg::{
    CodecPolicy, FfmpegProgressParser, FfmpegTools, FrameCounter, ProgressParser,
    TranscodeOrchestrator, TranscodeRequest, VideoProbe,
};
use crate::manifest::{Manifest, SegmentList};
use crate::report::ProgressReporter;
use crate::selection::SelectionPolicy;
use crate::temp::{TempPair, TempStorage};

pub use error::{ProcessorError, ProcessorResult};
pub use types::{
    AcquisitionKind, AudioSummary, DirectJob, ManifestInspection, TrailerJob, TrailerReport,
    VariantSummary,
};

#[derive(Debug, Clone)]
struct CodecSettings {
    manifest_video: CodecPolicy,
    direct_video: CodecPolicy,
    audio: CodecPolicy,
    crop_video: CodecPolicy,
    merge_timeout: Option<Duration>,
}

/// Acquisition and assembly pipeline for one trailer at a time.
#[derive(Clone)]
pub struct Processor {
    fetcher: SegmentFetcher,
    tools: FfmpegTools,
    parser: Arc<dyn ProgressParser>,
    reporter: Arc<dyn ProgressReporter>,
    temp: TempStorage,
    policy: SelectionPolicy,
    codecs: CodecSettings,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("tools", &self.tools)
            .field("temp", &self.temp)
            .field("policy", &self.policy)
            .field("codecs", &self.codecs)
            .finish_non_exhaustive()
    }
}

impl Processor {
    pub fn new(
        config: &TrailerConfig,
        reporter: Arc<dyn ProgressReporter>,
    ) -> ProcessorResult<Self> {
        let http_client = Client::builder()
            .user_agent(config.network.user_agent.clone())
            .build()?;
        Ok(Self {
            fetcher: SegmentFetcher::new(http_client, Arc::clone(&reporter)),
            tools: FfmpegTools::from(&config.tools),
            parser: Arc::new(FfmpegProgressParser),
            reporter,
            temp: TempStorage::new(&config.paths.temp_dir),
            policy: SelectionPolicy::from(&config.selection),
            codecs: CodecSettings {
                manifest_video: CodecPolicy::from_name(&config.transcode.manifest_video_codec),
                direct_video: CodecPolicy::from_name(&config.transcode.direct_video_codec),
                audio: CodecPolicy::from_name(&config.transcode.audio_codec),
                crop_video: CodecPolicy::from_name(&config.transcode.crop_video_codec),
                merge_timeout: config.transcode.merge_timeout(),
            },
        })
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp = TempStorage::new(dir);
        self
    }

    pub fn with_tools(mut self, tools: FfmpegTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_progress_parser(mut self, parser: Arc<dyn ProgressParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_merge_timeout(mut self, limit: Option<Duration>) -> Self {
        self.codecs.merge_timeout = limit;
        self
    }

    pub fn temp_storage(&self) -> &TempStorage {
        &self.temp
    }

    pub fn frame_counter(&self) -> FrameCounter {
        FrameCounter::with_parser(self.tools.clone(), Arc::clone(&self.parser))
    }

    pub fn orchestrator(&self) -> TranscodeOrchestrator {
        TranscodeOrchestrator::with_parser(
            self.tools.clone(),
            Arc::clone(&self.parser),
            Arc::clone(&self.reporter),
        )
    }

    pub fn crop_planner(&self) -> CropPlanner {
        CropPlanner::new(
            VideoProbe::new(self.tools.clone()),
            self.frame_counter(),
            self.orchestrator(),
            self.codecs.crop_video.clone(),
        )
    }

    pub async fn fetch_manifest(&self, url: &Url) -> ProcessorResult<Manifest> {
        let contents = self.fetcher.fetch_text(url).await?;
        Ok(Manifest::parse(&contents)?)
    }

    /// Parses and selects without downloading any media.
    pub async fn inspect(&self, manifest_url: &str) -> ProcessorResult<ManifestInspection> {
        let url = parse_url(manifest_url)?;
        let manifest = self.fetch_manifest(&url).await?;
        let selection = self.policy.select(&manifest)?;
        Ok(ManifestInspection::new(
            manifest_url,
            &manifest,
            selection.video,
            selection.audio,
        ))
    }

    pub async fn process_manifest(&self, job: &TrailerJob) -> ProcessorResult<TrailerReport> {
        let manifest_url = parse_url(&job.manifest_url)?;
        let manifest = self.fetch_manifest(&manifest_url).await?;
        let selection = self.policy.select(&manifest)?;
        info!(
            title = %job.title,
            video = %selection.video.uri,
            bandwidth = selection.video.bandwidth,
            width = selection.video.width,
            audio = ?selection.audio.map(|track| track.language.clone()),
            "variants selected"
        );

        let video_url = resolve(&manifest_url, &selection.video.uri)?;
        let video_segments = self.fetch_segment_list(&video_url).await?;
        let audio_source = match selection.audio {
            Some(track) => {
                let url = resolve(&manifest_url, &track.uri)?;
                let segments = self.fetch_segment_list(&url).await?;
                Some((url, segments))
            }
            None => None,
        };

        let pair = self.allocate_temp().await?;
        let video = self
            .fetcher
            .fetch_segments(
                &video_url,
                &video_segments,
                &pair.video,
                &format!("[{}] video", job.title),
            )
            .await?;
        let audio = match &audio_source {
            Some((url, segments)) => Some(
                self.fetcher
                    .fetch_segments(url, segments, &pair.audio, &format!("[{}] audio", job.title))
                    .await?,
            ),
            None => None,
        };

        let mut inputs = vec![pair.video.clone()];
        if audio.is_some() {
            inputs.push(pair.audio.clone());
        }
        let (total_frames, merge_elapsed) = self
            .merge(&job.title, &pair, inputs, &job.output, &self.codecs.manifest_video)
            .await?;
        pair.release().await;

        Ok(TrailerReport {
            title: job.title.clone(),
            kind: AcquisitionKind::Manifest,
            output: job.output.clone(),
            video: Some(VariantSummary::from(selection.video)),
            audio: selection.audio.map(AudioSummary::from),
            video_segments: video.segments,
            audio_segments: audio.map(|download| download.segments).unwrap_or(0),
            total_frames,
            merge_elapsed,
            completed_at: Utc::now(),
        })
    }

    pub async fn process_direct(&self, job: &DirectJob) -> ProcessorResult<TrailerReport> {
        let video_url = parse_url(&job.video_url)?;
        let audio_url = parse_url(&job.audio_url)?;
        let pair = self.allocate_temp().await?;

        self.fetcher
            .download_file(&DownloadJob {
                source: video_url,
                destination: pair.video.clone(),
            })
            .await?;
        self.reporter.report(&format!("[{}] video", job.title), 100);
        self.fetcher
            .download_file(&DownloadJob {
                source: audio_url,
                destination: pair.audio.clone(),
            })
            .await?;
        self.reporter.report(&format!("[{}] audio", job.title), 100);

        let inputs = vec![pair.video.clone(), pair.audio.clone()];
        let (total_frames, merge_elapsed) = self
            .merge(&job.title, &pair, inputs, &job.output, &self.codecs.direct_video)
            .await?;
        pair.release().await;

        Ok(TrailerReport {
            title: job.title.clone(),
            kind: AcquisitionKind::Direct,
            output: job.output.clone(),
            video: None,
            audio: None,
            video_segments: 1,
            audio_segments: 1,
            total_frames,
            merge_elapsed,
            completed_at: Utc::now(),
        })
    }

    pub async fn crop_directory(
        &self,
        dir: &Path,
        ratios: &[AspectRatio],
    ) -> ProcessorResult<CropReport> {
        Ok(self.crop_planner().crop_directory(dir, ratios).await?)
    }

    async fn fetch_segment_list(&self, url: &Url) -> ProcessorResult<SegmentList> {
        let contents = self.fetcher.fetch_text(url).await?;
        let list = SegmentList::parse(&contents)?;
        debug!(url = %url, segments = list.len(), init = list.init.is_some(), "media playlist parsed");
        Ok(list)
    }

    async fn allocate_temp(&self) -> ProcessorResult<TempPair> {
        self.temp
            .allocate()
            .await
            .map_err(|source| ProcessorError::Io {
                path: self.temp.root().to_path_buf(),
                source,
            })
    }

    /// Counts frames on the video intermediate and muxes `inputs` into
    /// `output`. Intermediates are left in place when this fails.
    async fn merge(
        &self,
        title: &str,
        pair: &TempPair,
        inputs: Vec<PathBuf>,
        output: &Path,
        video: &CodecPolicy,
    ) -> ProcessorResult<(u64, Duration)> {
        let total_frames = self.frame_counter().count(&pair.video).await?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ProcessorError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let request = TranscodeRequest {
            inputs,
            output: output.to_path_buf(),
            video: video.clone(),
            audio: self.codecs.audio.clone(),
            filter: None,
            total_frames,
            timeout: self.codecs.merge_timeout,
            stage: format!("[{title}] merge"),
        };
        match self.orchestrator().run(&request).await {
            Ok(outcome) => {
                info!(title, output = %output.display(), frames = total_frames, "trailer assembled");
                Ok((total_frames, outcome.elapsed))
            }
            Err(err) => {
                warn!(
                    title,
                    video = %pair.video.display(),
                    audio = %pair.audio.display(),
                    error = %err,
                    "merge failed, keeping intermediates"
                );
                Err(err.into())
            }
        }
    }
}
