use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::crop::AspectRatio;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrailerConfig {
    pub paths: PathsSection,
    pub tools: ToolsSection,
    pub network: NetworkSection,
    pub selection: SelectionSection,
    pub transcode: TranscodeSection,
    pub crop: CropSection,
}

impl TrailerConfig {
    /// Resolves a configured path against `base` unless it is already absolute.
    pub fn resolve_path<P: AsRef<Path>>(base: &Path, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub temp_dir: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    pub ffmpeg: String,
    pub ffprobe: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionSection {
    pub min_video_width: u32,
    pub preferred_audio_language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscodeSection {
    pub manifest_video_codec: String,
    pub direct_video_codec: String,
    pub audio_codec: String,
    pub crop_video_codec: String,
    pub merge_timeout_seconds: u64,
}

impl TranscodeSection {
    pub fn merge_timeout(&self) -> Option<Duration> {
        (self.merge_timeout_seconds > 0).then(|| Duration::from_secs(self.merge_timeout_seconds))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CropSection {
    pub aspect_ratios: Vec<String>,
}

pub fn load_trailer_config<P: AsRef<Path>>(path: P) -> Result<TrailerConfig> {
    let path = path.as_ref();
    let config: TrailerConfig = load_toml(path)?;
    config.validate(path)?;
    Ok(config)
}

impl TrailerConfig {
    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |field: &'static str, reason: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            field,
            reason,
        };
        let required = [
            ("tools.ffmpeg", &self.tools.ffmpeg),
            ("tools.ffprobe", &self.tools.ffprobe),
            ("transcode.manifest_video_codec", &self.transcode.manifest_video_codec),
            ("transcode.direct_video_codec", &self.transcode.direct_video_codec),
            ("transcode.audio_codec", &self.transcode.audio_codec),
            ("transcode.crop_video_codec", &self.transcode.crop_video_codec),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty".into()));
            }
        }
        for raw in &self.crop.aspect_ratios {
            AspectRatio::parse(raw).map_err(|err| invalid("crop.aspect_ratios", err.to_string()))?;
        }
        Ok(())
    }
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
