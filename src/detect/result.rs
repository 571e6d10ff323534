use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIDENCE: f32 = 0.25;
pub const MIN_CONFIDENCE: f32 = 0.1;
pub const MAX_CONFIDENCE: f32 = 1.0;

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const MIN_INPUT_SIZE: u32 = 320;
pub const MAX_INPUT_SIZE: u32 = 1280;
pub const INPUT_SIZE_STRIDE: u32 = 32;

/// Bounding box in normalized 0..1 coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// One detected object. `class` is the detector's raw label; it is checked
/// against the class registry by the frame processor, not here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    #[serde(default)]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f32) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox: BoundingBox::default(),
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }
}

/// Inference parameters handed to a backend.
///
/// The caller normalizes these; backends may assume both are in range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParams {
    confidence: f32,
    input_size: u32,
}

impl DetectionParams {
    /// Clamp confidence to [0.1, 1.0] and round the input size down to a
    /// multiple of 32 within [320, 1280].
    pub fn new(confidence: f32, input_size: u32) -> Self {
        Self {
            confidence: clamp_confidence(confidence),
            input_size: round_input_size(input_size),
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE, DEFAULT_INPUT_SIZE)
    }
}

pub fn clamp_confidence(confidence: f32) -> f32 {
    if !confidence.is_finite() {
        return DEFAULT_CONFIDENCE;
    }
    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

pub fn round_input_size(size: u32) -> u32 {
    ((size / INPUT_SIZE_STRIDE) * INPUT_SIZE_STRIDE).clamp(MIN_INPUT_SIZE, MAX_INPUT_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(DetectionParams::new(0.05, 640).confidence(), 0.1);
        assert_eq!(DetectionParams::new(1.5, 640).confidence(), 1.0);
        assert_eq!(DetectionParams::new(0.4, 640).confidence(), 0.4);
        assert_eq!(DetectionParams::new(f32::NAN, 640).confidence(), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn input_size_rounds_down_to_stride() {
        assert_eq!(round_input_size(640), 640);
        assert_eq!(round_input_size(700), 672);
        assert_eq!(round_input_size(100), 320);
        assert_eq!(round_input_size(5000), 1280);
        assert_eq!(round_input_size(351), 320);
    }

    #[test]
    fn detection_parses_without_bbox() {
        let det: Detection =
            serde_json::from_str(r#"{"class": "Hardhat", "confidence": 0.9}"#).unwrap();
        assert_eq!(det, Detection::new("Hardhat", 0.9));
    }
}
