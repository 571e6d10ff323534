use anyhow::Result;

use crate::detect::result::{Detection, DetectionParams};
use crate::frame::Frame;

/// Detector backend trait.
///
/// This is the boundary to the object detector. Model loading, export and
/// inference live behind it; the engine only sees labelled detections.
///
/// Implementations must:
/// - Treat the frame as read-only
/// - Drop detections below `params.confidence()`
/// - Report every label the model produced, known or not (the frame
///   processor decides what an unknown label means)
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame, params: &DetectionParams) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
