//! Frames and what the engine draws on them.
//!
//! - `Frame`: one captured image (RGB24) with its position in the stream.
//! - `Overlay`: presentational annotation (boxes, labels, status panel).
//!   Drawing it onto pixels is a rendering collaborator's job; the engine
//!   only describes it and never reads it back.
//! - `FrameStep`: "process every k-th frame" schedule.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroU64;

use crate::detect::BoundingBox;

/// A captured frame.
///
/// Pixels are private and read-only once captured; detectors and sinks
/// borrow them through `pixels()`.
#[derive(Clone, Debug)]
pub struct Frame {
    /// 1-based position in the source stream.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            pixels,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.pixels))
    }
}

/// One labelled box.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverlayBox {
    pub label: String,
    pub bbox: BoundingBox,
}

/// Status panel drawn in the corner when a required set is configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusPanel {
    pub complete: bool,
    pub headline: String,
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Overlay {
    pub boxes: Vec<OverlayBox>,
    pub panel: Option<StatusPanel>,
}

/// A frame on its way to a sink. Skipped frames carry no overlay.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub overlay: Option<Overlay>,
}

impl AnnotatedFrame {
    /// Pass-through for frames that were not processed.
    pub fn untouched(frame: Frame) -> Self {
        Self {
            frame,
            overlay: None,
        }
    }

    pub fn is_annotated(&self) -> bool {
        self.overlay.is_some()
    }
}

/// Frame-skipping schedule: frame `n` (1-based) is processed iff `n % k == 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStep(NonZeroU64);

impl FrameStep {
    /// Process every frame.
    pub const EVERY: FrameStep = FrameStep(NonZeroU64::MIN);

    /// Returns `None` for `k == 0`.
    pub fn new(k: u64) -> Option<Self> {
        NonZeroU64::new(k).map(FrameStep)
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }

    pub fn should_process(&self, frame_number: u64) -> bool {
        frame_number % self.0.get() == 0
    }
}

impl Default for FrameStep {
    fn default() -> Self {
        FrameStep::EVERY
    }
}
