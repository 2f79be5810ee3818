use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::manifest::{AudioTrack, DynamicRange, Manifest, VariantStream};

/// A trailer whose media is described by an adaptive-streaming manifest.
#[derive(Debug, Clone)]
pub struct TrailerJob {
    pub title: String,
    pub manifest_url: String,
    pub output: PathBuf,
}

/// A trailer whose video and audio are already whole files.
#[derive(Debug, Clone)]
pub struct DirectJob {
    pub title: String,
    pub video_url: String,
    pub audio_url: String,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantSummary {
    pub uri: String,
    pub bandwidth: u64,
    pub resolution: String,
    pub dynamic_range: DynamicRange,
}

impl From<&VariantStream> for VariantSummary {
    fn from(variant: &VariantStream) -> Self {
        Self {
            uri: variant.uri.clone(),
            bandwidth: variant.bandwidth,
            resolution: format!("{}x{}", variant.width, variant.height),
            dynamic_range: variant.dynamic_range.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioSummary {
    pub uri: String,
    pub group_id: String,
    pub language: Option<String>,
}

impl From<&AudioTrack> for AudioSummary {
    fn from(track: &AudioTrack) -> Self {
        Self {
            uri: track.uri.clone(),
            group_id: track.group_id.clone(),
            language: track.language.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestInspection {
    pub manifest_url: String,
    pub variants: Vec<VariantSummary>,
    pub audio_groups: Vec<String>,
    pub selected_video: VariantSummary,
    pub selected_audio: Option<AudioSummary>,
}

impl ManifestInspection {
    pub(crate) fn new(
        manifest_url: &str,
        manifest: &Manifest,
        video: &VariantStream,
        audio: Option<&AudioTrack>,
    ) -> Self {
        Self {
            manifest_url: manifest_url.to_string(),
            variants: manifest.variants.iter().map(VariantSummary::from).collect(),
            audio_groups: manifest
                .audio_groups
                .iter()
                .map(|group| group.group_id.clone())
                .collect(),
            selected_video: VariantSummary::from(video),
            selected_audio: audio.map(AudioSummary::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionKind {
    Manifest,
    Direct,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrailerReport {
    pub title: String,
    pub kind: AcquisitionKind,
    pub output: PathBuf,
    pub video: Option<VariantSummary>,
    pub audio: Option<AudioSummary>,
    pub video_segments: usize,
    pub audio_segments: usize,
    pub total_frames: u64,
    pub merge_elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}
