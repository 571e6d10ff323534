//! Frame ingestion sources.
//!
//! This module provides sources for raw frames:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` source (testing, demos)
//!
//! Every source implements `FrameSource`. Sources are opened before the
//! run starts; an open failure is a `SourceUnavailable` error and the run
//! never reaches hardware initialization.
//!
//! Only local paths are accepted; URLs are refused at open time.

use anyhow::Result;

use crate::frame::Frame;

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{FileConfig, FileSource, FileStats};

/// Lazy, possibly infinite, sequence of frames.
pub trait FrameSource: Send {
    /// Human-readable location (path or `stub://` name).
    fn location(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Next frame, or `None` at end of stream. Blocks until a frame is
    /// available on live sources.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Close the source. Further reads return `None`.
    fn release(&mut self);
}
