pub mod config;
pub mod crop;
pub mod error;
pub mod fetcher;
pub mod ffmpeg;
pub mod manifest;
pub mod processor;
pub mod report;
pub mod selection;
pub mod temp;

pub use config::{load_trailer_config, TrailerConfig};
pub use crop::{AspectRatio, CropPlan, CropPlanner, CropReport, VideoCropReport};
pub use error::{ConfigError, Result};
pub use fetcher::{FetchError, SegmentFetcher};
pub use ffmpeg::{
    CodecPolicy, FfmpegProgressParser, FfmpegTools, FrameCounter, ProgressParser,
    TranscodeOrchestrator, TranscodeRequest, VideoProbe,
};
pub use manifest::{Manifest, ManifestError, SegmentList};
pub use processor::{
    DirectJob, ManifestInspection, Processor, ProcessorError, ProcessorResult, TrailerJob,
    TrailerReport,
};
pub use report::{
    AlwaysConfirm, Confirm, NeverConfirm, ProgressReporter, RecordingReporter, SilentReporter,
    TracingReporter,
};
pub use selection::{Selection, SelectionError, SelectionPolicy};
pub use temp::{TempPair, TempStorage};
