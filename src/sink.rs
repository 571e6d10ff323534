//! Video sink boundary.
//!
//! A sink receives every frame the source produced, annotated or not, in
//! stream order. `OverlayLogSink` persists one JSON line per frame: the
//! frame index, whether it was processed, the SHA-256 of its pixels and the
//! overlay that a renderer would draw.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::AccessError;
use crate::frame::{AnnotatedFrame, Overlay};

pub trait VideoSink: Send {
    fn write(&mut self, frame: &AnnotatedFrame) -> Result<(), AccessError>;

    /// Flush and close. Called exactly once, on every exit path.
    fn release(&mut self) -> Result<(), AccessError>;
}

#[derive(Serialize)]
struct OverlayRecord<'a> {
    frame: u64,
    processed: bool,
    width: u32,
    height: u32,
    sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    overlay: Option<&'a Overlay>,
}

pub struct OverlayLogSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl OverlayLogSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("create overlay log {}", path.display()))?;
        log::info!("OverlayLogSink: writing {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl VideoSink for OverlayLogSink {
    fn write(&mut self, frame: &AnnotatedFrame) -> Result<(), AccessError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| AccessError::SinkWrite("sink already released".to_string()))?;
        let record = OverlayRecord {
            frame: frame.frame.index,
            processed: frame.is_annotated(),
            width: frame.frame.width,
            height: frame.frame.height,
            sha256: frame.frame.digest(),
            overlay: frame.overlay.as_ref(),
        };
        serde_json::to_writer(&mut *writer, &record)
            .map_err(|e| AccessError::SinkWrite(e.to_string()))?;
        writer
            .write_all(b"\n")
            .map_err(|e| AccessError::SinkWrite(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<(), AccessError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| AccessError::SinkWrite(e.to_string()))?;
            log::info!(
                "OverlayLogSink: closed {} ({} frames)",
                self.path.display(),
                self.written
            );
        }
        Ok(())
    }
}
