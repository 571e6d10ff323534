//! Run aggregator.
//!
//! Accumulates per-class counts and completeness over the processed frames
//! of one run and produces an end-of-run `RunReport`.

use serde::Serialize;
use std::fmt::Write as _;

use crate::classes::{ClassName, ClassRegistry};
use crate::processor::{ClassTally, FrameVerdict};
use crate::selector::TargetSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassCount {
    pub class: ClassName,
    pub count: u64,
}

/// End-of-run snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub targets: TargetSet,
    /// Every in-scope class, in scope order, including zero counts.
    pub per_class: Vec<ClassCount>,
    pub frames_processed: u64,
    pub frames_complete: u64,
    /// Frames excluded from verdicts (unknown class, detector failure).
    pub frames_rejected: u64,
    /// `frames_complete / frames_processed`; `None` when nothing was processed.
    pub completion_rate: Option<f64>,
}

impl RunReport {
    pub fn count(&self, class: &str) -> Option<u64> {
        self.per_class
            .iter()
            .find(|c| c.class.as_str() == class)
            .map(|c| c.count)
    }

    /// Operator-facing summary. In `ALL` mode only classes that were seen
    /// are listed.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Targets: {}", self.targets.summary());
        let _ = writeln!(out, "Frames processed: {}", self.frames_processed);
        if self.frames_rejected > 0 {
            let _ = writeln!(out, "Frames rejected: {}", self.frames_rejected);
        }
        let _ = writeln!(out, "Detections per class:");
        let all = self.targets.is_all();
        let mut listed = 0;
        for entry in &self.per_class {
            if all && entry.count == 0 {
                continue;
            }
            let _ = writeln!(out, "  {:<16} {}", entry.class, entry.count);
            listed += 1;
        }
        if listed == 0 {
            let _ = writeln!(out, "  (none)");
        }
        if !all {
            match self.completion_rate {
                Some(rate) => {
                    let _ = writeln!(
                        out,
                        "Frames with all targets: {}/{} ({:.1}%)",
                        self.frames_complete,
                        self.frames_processed,
                        rate * 100.0
                    );
                }
                None => {
                    let _ = writeln!(out, "Frames with all targets: N/A");
                }
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct RunStatistics {
    targets: TargetSet,
    counts: Vec<ClassCount>,
    frames_processed: u64,
    frames_complete: u64,
    frames_rejected: u64,
}

impl RunStatistics {
    /// Seed a zero count for every class in scope.
    pub fn new(targets: &TargetSet, registry: &ClassRegistry) -> Self {
        let counts = targets
            .scope(registry)
            .into_iter()
            .map(|class| ClassCount { class, count: 0 })
            .collect();
        Self {
            targets: targets.clone(),
            counts,
            frames_processed: 0,
            frames_complete: 0,
            frames_rejected: 0,
        }
    }

    /// Record one processed frame.
    pub fn record(&mut self, verdict: &FrameVerdict, tally: &ClassTally) {
        self.frames_processed += 1;
        if verdict.complete {
            self.frames_complete += 1;
        }
        for entry in self.counts.iter_mut() {
            if let Some(n) = tally.get(&entry.class) {
                entry.count += n;
            }
        }
    }

    /// Note a frame that was selected for processing but yielded no verdict.
    pub fn reject(&mut self) {
        self.frames_rejected += 1;
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn report(&self) -> RunReport {
        let completion_rate = if self.frames_processed == 0 {
            None
        } else {
            Some(self.frames_complete as f64 / self.frames_processed as f64)
        };
        RunReport {
            targets: self.targets.clone(),
            per_class: self.counts.clone(),
            frames_processed: self.frames_processed,
            frames_complete: self.frames_complete,
            frames_rejected: self.frames_rejected,
            completion_rate,
        }
    }
}
