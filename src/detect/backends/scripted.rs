use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionParams};
use crate::frame::Frame;

const SCRIPTED_CONFIDENCE: f32 = 0.9;

/// Scripted backend for tests and synthetic runs.
///
/// Returns one scripted detection list per call, in order. A cycling script
/// wraps around; a one-shot script returns nothing once exhausted.
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
    cycle: bool,
}

impl ScriptedBackend {
    /// Cycle through `script` forever.
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            cursor: 0,
            cycle: true,
        }
    }

    /// Play `script` once, then report empty frames.
    pub fn once(script: Vec<Vec<Detection>>) -> Self {
        Self {
            cycle: false,
            ..Self::new(script)
        }
    }

    /// Build a one-shot script from labels, one slice per frame.
    pub fn from_labels(frames: &[&[&str]]) -> Self {
        let script = frames
            .iter()
            .map(|labels| {
                labels
                    .iter()
                    .enumerate()
                    .map(|(i, label)| {
                        Detection::new(*label, SCRIPTED_CONFIDENCE).with_bbox(BoundingBox {
                            x: 0.1 + 0.2 * i as f32,
                            y: 0.1,
                            w: 0.15,
                            h: 0.3,
                        })
                    })
                    .collect()
            })
            .collect();
        Self::once(script)
    }

    /// A worker walking up to the gate, missing a vest, then fully equipped.
    pub fn demo() -> Self {
        let scene: &[&[&str]] = &[
            &[],
            &["Person"],
            &["Person", "Hardhat", "NO-Safety Vest"],
            &["Person", "Hardhat", "NO-Safety Vest"],
            &["Person", "Hardhat", "Safety Vest"],
            &["Person", "Hardhat", "Safety Vest", "Gloves"],
            &["Person", "Hardhat", "Safety Vest"],
            &["Person"],
        ];
        let mut backend = Self::from_labels(scene);
        backend.cycle = true;
        backend
    }

    pub fn calls(&self) -> usize {
        self.cursor
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::demo()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame, params: &DetectionParams) -> Result<Vec<Detection>> {
        let entry = if self.script.is_empty() {
            None
        } else if self.cycle {
            self.script.get(self.cursor % self.script.len())
        } else {
            self.script.get(self.cursor)
        };
        self.cursor += 1;

        Ok(entry
            .map(|detections| {
                detections
                    .iter()
                    .filter(|d| d.confidence >= params.confidence())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
