//! Frame processor.
//!
//! Turns one frame plus its detections into a completeness verdict, the
//! per-class counts for that frame, and an annotated frame. Annotation is
//! presentational: it is computed after the verdict and cannot change it.

use std::collections::BTreeMap;

use crate::classes::{ClassName, ClassRegistry};
use crate::detect::Detection;
use crate::error::AccessError;
use crate::frame::{AnnotatedFrame, Frame, Overlay, OverlayBox, StatusPanel};
use crate::selector::TargetSet;

/// Per-class detection counts for one frame (every box counts).
pub type ClassTally = BTreeMap<ClassName, u64>;

/// Completeness verdict for one processed frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameVerdict {
    /// Required classes seen at least once (registry order in `ALL` mode,
    /// target order otherwise).
    pub detected: Vec<ClassName>,
    /// Required classes not seen, in target order. Always empty in `ALL` mode.
    pub missing: Vec<ClassName>,
    pub complete: bool,
}

impl FrameVerdict {
    /// Compute the verdict for already-validated classes.
    pub fn evaluate(
        targets: &TargetSet,
        registry: &ClassRegistry,
        seen: &[&ClassName],
    ) -> FrameVerdict {
        match targets {
            TargetSet::All => FrameVerdict {
                detected: registry
                    .all_classes()
                    .iter()
                    .filter(|c| seen.contains(c))
                    .cloned()
                    .collect(),
                missing: Vec::new(),
                complete: true,
            },
            TargetSet::Classes(required) => {
                let (detected, missing): (Vec<ClassName>, Vec<ClassName>) = required
                    .iter()
                    .cloned()
                    .partition(|class| seen.contains(&class));
                FrameVerdict {
                    complete: missing.is_empty(),
                    detected,
                    missing,
                }
            }
        }
    }
}

/// Result of processing one frame.
#[derive(Clone, Debug)]
pub struct ProcessedFrame {
    pub annotated: AnnotatedFrame,
    pub verdict: FrameVerdict,
    pub tally: ClassTally,
}

/// Rendering collaborator that describes what to draw on a frame.
pub trait Annotator: Send {
    fn annotate(
        &self,
        frame: Frame,
        detections: &[Detection],
        verdict: &FrameVerdict,
        targets: &TargetSet,
    ) -> AnnotatedFrame;
}

/// Boxes for every detection plus, when a required set is configured, a
/// status panel naming up to two missing classes.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusOverlay;

impl Annotator for StatusOverlay {
    fn annotate(
        &self,
        frame: Frame,
        detections: &[Detection],
        verdict: &FrameVerdict,
        targets: &TargetSet,
    ) -> AnnotatedFrame {
        let boxes = detections
            .iter()
            .map(|d| OverlayBox {
                label: format!("{} {:.2}", d.class, d.confidence),
                bbox: d.bbox,
            })
            .collect();

        let panel = if targets.is_all() {
            None
        } else {
            let headline = if verdict.complete {
                "ALL PRESENT"
            } else {
                "SEARCHING..."
            };
            let detail = if verdict.missing.is_empty() {
                None
            } else {
                let names: Vec<&str> = verdict.missing.iter().take(2).map(|c| c.as_str()).collect();
                Some(format!("Missing: {}", names.join(", ")))
            };
            Some(StatusPanel {
                complete: verdict.complete,
                headline: headline.to_string(),
                detail,
            })
        };

        AnnotatedFrame {
            frame,
            overlay: Some(Overlay { boxes, panel }),
        }
    }
}

pub struct FrameProcessor<'a> {
    registry: &'a ClassRegistry,
    targets: &'a TargetSet,
    annotator: Box<dyn Annotator + 'a>,
}

impl<'a> FrameProcessor<'a> {
    pub fn new(registry: &'a ClassRegistry, targets: &'a TargetSet) -> Self {
        Self::with_annotator(registry, targets, Box::new(StatusOverlay))
    }

    pub fn with_annotator(
        registry: &'a ClassRegistry,
        targets: &'a TargetSet,
        annotator: Box<dyn Annotator + 'a>,
    ) -> Self {
        Self {
            registry,
            targets,
            annotator,
        }
    }

    pub fn targets(&self) -> &TargetSet {
        self.targets
    }

    /// Process one frame.
    ///
    /// Fails with `UnknownClass` if any detection carries a label outside the
    /// registry; the frame then yields no verdict and no counts. The frame is
    /// handed back so the caller can still forward it.
    pub fn process(
        &self,
        frame: Frame,
        detections: &[Detection],
    ) -> Result<ProcessedFrame, (AccessError, Frame)> {
        let mut classes = Vec::with_capacity(detections.len());
        for detection in detections {
            match self.registry.resolve(&detection.class) {
                Ok(class) => classes.push(class),
                Err(err) => return Err((err, frame)),
            }
        }

        let mut tally = ClassTally::new();
        let mut seen: Vec<&ClassName> = Vec::new();
        for class in classes {
            if !self.targets.contains(class) {
                continue;
            }
            *tally.entry(class.clone()).or_insert(0) += 1;
            if !seen.contains(&class) {
                seen.push(class);
            }
        }

        let verdict = FrameVerdict::evaluate(self.targets, self.registry, &seen);
        let annotated = self
            .annotator
            .annotate(frame, detections, &verdict, self.targets);

        Ok(ProcessedFrame {
            annotated,
            verdict,
            tally,
        })
    }
}
