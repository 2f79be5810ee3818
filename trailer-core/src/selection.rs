use serde::Serialize;
use thiserror::Error;

use crate::config::SelectionSection;
use crate::manifest::{AudioTrack, DynamicRange, Manifest, VariantStream};

pub const DEFAULT_MIN_WIDTH: u32 = 1900;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("manifest has no SDR video variant ({total} variants inspected)")]
    NoSdrVariant { total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub min_width: u32,
    pub preferred_language: Option<String>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_WIDTH,
            preferred_language: None,
        }
    }
}

impl From<&SelectionSection> for SelectionPolicy {
    fn from(section: &SelectionSection) -> Self {
        let language = section.preferred_audio_language.trim();
        Self {
            min_width: section.min_video_width,
            preferred_language: (!language.is_empty()).then(|| language.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Selection<'a> {
    pub video: &'a VariantStream,
    pub audio: Option<&'a AudioTrack>,
}

impl SelectionPolicy {
    pub fn select<'a>(&self, manifest: &'a Manifest) -> Result<Selection<'a>, SelectionError> {
        Ok(Selection {
            video: self.select_video(&manifest.variants)?,
            audio: self.select_audio(manifest),
        })
    }

    /// SDR only; among variants at least `min_width` wide the highest bandwidth
    /// wins (first declared on ties), otherwise the widest SDR variant.
    pub fn select_video<'a>(
        &self,
        variants: &'a [VariantStream],
    ) -> Result<&'a VariantStream, SelectionError> {
        let sdr: Vec<&VariantStream> = variants
            .iter()
            .filter(|variant| variant.dynamic_range == DynamicRange::Sdr)
            .collect();
        if sdr.is_empty() {
            return Err(SelectionError::NoSdrVariant {
                total: variants.len(),
            });
        }

        let eligible = sdr
            .iter()
            .copied()
            .filter(|variant| variant.width >= self.min_width)
            .fold(None, |best: Option<&VariantStream>, candidate| match best {
                Some(current) if current.bandwidth >= candidate.bandwidth => Some(current),
                _ => Some(candidate),
            });
        if let Some(variant) = eligible {
            return Ok(variant);
        }

        let widest = sdr
            .iter()
            .copied()
            .reduce(|acc, candidate| {
                if candidate.width > acc.width {
                    candidate
                } else {
                    acc
                }
            })
            .ok_or(SelectionError::NoSdrVariant {
                total: variants.len(),
            })?;
        Ok(widest)
    }

    /// Preferred language within the first audio group, else that group's first track.
    pub fn select_audio<'a>(&self, manifest: &'a Manifest) -> Option<&'a AudioTrack> {
        let group = manifest.first_audio_group()?;
        self.preferred_language
            .as_deref()
            .and_then(|language| {
                group
                    .tracks
                    .iter()
                    .find(|track| track.language.as_deref() == Some(language))
            })
            .or_else(|| group.tracks.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::AudioGroup;

    fn variant(uri: &str, bandwidth: u64, width: u32, range: DynamicRange) -> VariantStream {
        VariantStream {
            uri: uri.to_string(),
            bandwidth,
            width,
            height: width * 9 / 16,
            dynamic_range: range,
            audio_group: None,
            codecs: None,
        }
    }

    fn track(uri: &str, language: &str) -> AudioTrack {
        AudioTrack {
            uri: uri.to_string(),
            group_id: "audio".into(),
            language: Some(language.to_string()),
            name: None,
        }
    }

    fn policy(language: Option<&str>) -> SelectionPolicy {
        SelectionPolicy {
            min_width: DEFAULT_MIN_WIDTH,
            preferred_language: language.map(str::to_string),
        }
    }

    #[test]
    fn hdr_only_manifest_is_rejected() {
        let variants = vec![
            variant("a", 9_000_000, 3840, DynamicRange::Hdr),
            variant("b", 5_000_000, 1920, DynamicRange::Other("DV".into())),
        ];
        assert_eq!(
            policy(None).select_video(&variants),
            Err(SelectionError::NoSdrVariant { total: 2 })
        );
    }

    #[test]
    fn highest_bandwidth_wins_above_width_floor() {
        let variants = vec![
            variant("hdr", 20_000_000, 3840, DynamicRange::Hdr),
            variant("sdr-1080-low", 4_000_000, 1920, DynamicRange::Sdr),
            variant("sdr-4k", 12_000_000, 3840, DynamicRange::Sdr),
            variant("sdr-720-huge", 30_000_000, 1280, DynamicRange::Sdr),
        ];
        let chosen = policy(None).select_video(&variants).unwrap();
        assert_eq!(chosen.uri, "sdr-4k");
        let qualifying_max = variants
            .iter()
            .filter(|v| v.dynamic_range == DynamicRange::Sdr && v.width >= DEFAULT_MIN_WIDTH)
            .map(|v| v.bandwidth)
            .max()
            .unwrap();
        assert_eq!(chosen.bandwidth, qualifying_max);
    }

    #[test]
    fn bandwidth_ties_keep_manifest_order() {
        let variants = vec![
            variant("first", 6_000_000, 1920, DynamicRange::Sdr),
            variant("second", 6_000_000, 1920, DynamicRange::Sdr),
        ];
        assert_eq!(policy(None).select_video(&variants).unwrap().uri, "first");
    }

    #[test]
    fn falls_back_to_widest_sdr_when_floor_unmet() {
        let variants = vec![
            variant("sdr-480", 9_000_000, 854, DynamicRange::Sdr),
            variant("hdr-4k", 20_000_000, 3840, DynamicRange::Hdr),
            variant("sdr-720", 1_000_000, 1280, DynamicRange::Sdr),
            variant("sdr-720-b", 2_000_000, 1280, DynamicRange::Sdr),
        ];
        let chosen = policy(None).select_video(&variants).unwrap();
        assert_eq!(chosen.uri, "sdr-720");
    }

    #[test]
    fn preferred_language_within_first_group() {
        let manifest = Manifest {
            variants: vec![variant("v", 1, 1920, DynamicRange::Sdr)],
            audio_groups: vec![
                AudioGroup {
                    group_id: "audio".into(),
                    tracks: vec![track("en.m3u8", "en"), track("pt.m3u8", "pt-BR")],
                },
                AudioGroup {
                    group_id: "audio-51".into(),
                    tracks: vec![track("pt-51.m3u8", "pt-BR")],
                },
            ],
        };
        let chosen = policy(Some("pt-BR")).select_audio(&manifest).unwrap();
        assert_eq!(chosen.uri, "pt.m3u8");

        let fallback = policy(Some("es")).select_audio(&manifest).unwrap();
        assert_eq!(fallback.uri, "en.m3u8");
    }

    #[test]
    fn manifest_without_audio_groups_selects_no_track() {
        let manifest = Manifest {
            variants: vec![variant("v", 1, 1920, DynamicRange::Sdr)],
            audio_groups: Vec::new(),
        };
        let selection = policy(Some("pt-BR")).select(&manifest).unwrap();
        assert_eq!(selection.video.uri, "v");
        assert!(selection.audio.is_none());
    }
}
