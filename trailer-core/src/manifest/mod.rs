mod attributes;

use serde::Serialize;
use thiserror::Error;

use self::attributes::AttributeList;

const HEADER: &str = "#EXTM3U";
const STREAM_INF: &str = "#EXT-X-STREAM-INF:";
const MEDIA: &str = "#EXT-X-MEDIA:";
const MAP: &str = "#EXT-X-MAP:";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("missing #EXTM3U header")]
    MissingHeader,
    #[error("manifest declares no video variants")]
    NoVariants,
    #[error("media playlist declares no segments")]
    NoSegments,
    #[error("{tag} is missing required attribute {attribute}")]
    MissingAttribute { tag: String, attribute: String },
    #[error("invalid {attribute} value `{value}`")]
    InvalidAttribute { attribute: String, value: String },
    #[error("malformed playlist: {0}")]
    Syntax(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicRange {
    Sdr,
    Hdr,
    Other(String),
}

impl DynamicRange {
    /// An absent `VIDEO-RANGE` is SDR, the playlist format's default.
    fn from_attribute(value: Option<&str>) -> Self {
        match value {
            None | Some("SDR") => DynamicRange::Sdr,
            Some("PQ") | Some("HLG") => DynamicRange::Hdr,
            Some(other) => DynamicRange::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantStream {
    pub uri: String,
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    pub dynamic_range: DynamicRange,
    pub audio_group: Option<String>,
    pub codecs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioTrack {
    pub uri: String,
    pub group_id: String,
    pub language: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioGroup {
    pub group_id: String,
    pub tracks: Vec<AudioTrack>,
}

/// Parsed multivariant playlist. Variants and audio groups keep declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub variants: Vec<VariantStream>,
    pub audio_groups: Vec<AudioGroup>,
}

impl Manifest {
    /// Parses retrieved playlist text. The final line of the text is dropped
    /// before parsing, so callers pass the body exactly as downloaded.
    pub fn parse(contents: &str) -> Result<Self, ManifestError> {
        let logical = drop_last_line(contents);
        let mut lines = logical.lines().map(str::trim);
        match lines.by_ref().find(|line| !line.is_empty()) {
            Some(HEADER) => {}
            _ => return Err(ManifestError::MissingHeader),
        }

        let mut variants = Vec::new();
        let mut audio_groups: Vec<AudioGroup> = Vec::new();
        let mut pending: Option<AttributeList> = None;

        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some(raw) = line.strip_prefix(STREAM_INF) {
                pending = Some(AttributeList::parse(raw)?);
            } else if let Some(raw) = line.strip_prefix(MEDIA) {
                let attributes = AttributeList::parse(raw)?;
                if attributes.get("TYPE") == Some("AUDIO") {
                    push_audio_track(&mut audio_groups, &attributes)?;
                }
            } else if line.starts_with('#') {
                continue;
            } else if let Some(attributes) = pending.take() {
                variants.push(build_variant(line, &attributes)?);
            }
        }

        if variants.is_empty() {
            return Err(ManifestError::NoVariants);
        }
        Ok(Self {
            variants,
            audio_groups,
        })
    }

    pub fn first_audio_group(&self) -> Option<&AudioGroup> {
        self.audio_groups.first()
    }
}

fn drop_last_line(contents: &str) -> &str {
    match contents.rfind('\n') {
        Some(index) => &contents[..index],
        None => "",
    }
}

fn build_variant(uri: &str, attributes: &AttributeList) -> Result<VariantStream, ManifestError> {
    let bandwidth_raw = attributes.require("BANDWIDTH", STREAM_INF)?;
    let bandwidth = bandwidth_raw
        .parse::<u64>()
        .map_err(|_| ManifestError::InvalidAttribute {
            attribute: "BANDWIDTH".into(),
            value: bandwidth_raw.to_string(),
        })?;
    let resolution = attributes.require("RESOLUTION", STREAM_INF)?;
    let (width, height) = parse_resolution(resolution)?;
    Ok(VariantStream {
        uri: uri.to_string(),
        bandwidth,
        width,
        height,
        dynamic_range: DynamicRange::from_attribute(attributes.get("VIDEO-RANGE")),
        audio_group: attributes.get("AUDIO").map(str::to_string),
        codecs: attributes.get("CODECS").map(str::to_string),
    })
}

fn push_audio_track(
    groups: &mut Vec<AudioGroup>,
    attributes: &AttributeList,
) -> Result<(), ManifestError> {
    let group_id = attributes.require("GROUP-ID", MEDIA)?.to_string();
    // renditions carried inside the variant stream have no URI of their own
    let Some(uri) = attributes.get("URI") else {
        return Ok(());
    };
    let track = AudioTrack {
        uri: uri.to_string(),
        group_id: group_id.clone(),
        language: attributes.get("LANGUAGE").map(str::to_string),
        name: attributes.get("NAME").map(str::to_string),
    };
    match groups.iter_mut().find(|group| group.group_id == group_id) {
        Some(group) => group.tracks.push(track),
        None => groups.push(AudioGroup {
            group_id,
            tracks: vec![track],
        }),
    }
    Ok(())
}

fn parse_resolution(value: &str) -> Result<(u32, u32), ManifestError> {
    let invalid = || ManifestError::InvalidAttribute {
        attribute: "RESOLUTION".into(),
        value: value.to_string(),
    };
    let (width, height) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = width.trim().parse().map_err(|_| invalid())?;
    let height = height.trim().parse().map_err(|_| invalid())?;
    Ok((width, height))
}

/// Segment URIs of one media playlist, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentList {
    pub init: Option<String>,
    pub segments: Vec<String>,
}

impl SegmentList {
    pub fn parse(contents: &str) -> Result<Self, ManifestError> {
        let mut lines = contents.lines().map(str::trim);
        match lines.by_ref().find(|line| !line.is_empty()) {
            Some(HEADER) => {}
            _ => return Err(ManifestError::MissingHeader),
        }
        let mut init = None;
        let mut segments = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some(raw) = line.strip_prefix(MAP) {
                // only the first map applies; later ones re-declare the same header
                if init.is_none() {
                    let attributes = AttributeList::parse(raw)?;
                    init = Some(attributes.require("URI", MAP)?.to_string());
                }
            } else if !line.starts_with('#') {
                segments.push(line.to_string());
            }
        }
        if segments.is_empty() {
            return Err(ManifestError::NoSegments);
        }
        Ok(Self { init, segments })
    }

    /// Init segment (if any) followed by every numbered segment.
    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.init
            .iter()
            .map(String::as_str)
            .chain(self.segments.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.segments.len() + usize::from(self.init.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
