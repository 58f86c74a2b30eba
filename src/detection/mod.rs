//! Face detection loop: pipeline sharing, overlay payloads and performance tracking.

mod payload;
mod pipeline;
mod scheduler;
mod window;
#[cfg(test)]
mod tests;

pub use payload::{BoundingBox, DetectedFace, DrawingPayload, FaceOverlay, Keypoint, KEY_LANDMARK_INDICES};
pub use pipeline::{
    DetectionPipeline, MemoryProbe, OverlayRenderer, PipelineLease, PipelineOptions, ReadyState,
    SharedPipeline, VideoFrame, VideoSource,
};
pub use scheduler::{DetectionLoop, DetectionLoopBuilder, DetectionStats, LoopState};
pub use window::{PerformanceWindow, PerformanceWindowBuilder, WindowStatsSnapshot};
