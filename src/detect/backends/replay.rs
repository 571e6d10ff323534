use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::io::BufRead;
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionParams};
use crate::frame::Frame;

#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Replays recorded detector output, one JSON object per frame:
///
/// ```text
/// {"detections": [{"class": "Hardhat", "confidence": 0.91, "bbox": {"x": 0.1, "y": 0.2, "w": 0.1, "h": 0.1}}]}
/// ```
///
/// Each `detect` call consumes the next line. Once the recording is
/// exhausted every frame reports no detections.
pub struct ReplayBackend {
    frames: Vec<Vec<Detection>>,
    cursor: usize,
}

impl ReplayBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open detection replay {}", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file), &path.display().to_string())
    }

    pub fn from_reader<R: BufRead>(reader: R, origin: &str) -> Result<Self> {
        let mut frames = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", origin))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(trimmed).map_err(|e| {
                anyhow!("invalid replay line {} in {}: {}", line_no + 1, origin, e)
            })?;
            frames.push(parsed.detections);
        }
        log::info!("ReplayBackend: loaded {} frames from {}", frames.len(), origin);
        Ok(Self { frames, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.cursor)
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, _frame: &Frame, params: &DetectionParams) -> Result<Vec<Detection>> {
        let detections = self
            .frames
            .get(self.cursor)
            .map(|detections| {
                detections
                    .iter()
                    .filter(|d| d.confidence >= params.confidence())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        self.cursor += 1;
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_lines_in_order_and_skips_blanks() {
        let data = r#"{"detections": [{"class": "Hardhat", "confidence": 0.9}]}

{"detections": []}
{"detections": [{"class": "Person", "confidence": 0.2}, {"class": "Mask", "confidence": 0.7}]}
"#;
        let mut backend = ReplayBackend::from_reader(data.as_bytes(), "inline").unwrap();
        assert_eq!(backend.len(), 3);

        let frame = Frame::new(1, 1, 1, vec![0, 0, 0]);
        let params = DetectionParams::default();
        assert_eq!(backend.detect(&frame, &params).unwrap().len(), 1);
        assert!(backend.detect(&frame, &params).unwrap().is_empty());
        let third = backend.detect(&frame, &params).unwrap();
        assert_eq!(third, vec![Detection::new("Mask", 0.7)]);
        assert_eq!(backend.remaining(), 0);
        assert!(backend.detect(&frame, &params).unwrap().is_empty());
    }

    #[test]
    fn malformed_line_reports_position() {
        let data = "{\"detections\": []}\nnot json\n";
        let err = ReplayBackend::from_reader(data.as_bytes(), "inline")
            .err()
            .unwrap();
        assert!(err.to_string().contains("line 2"));
    }
}
