//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file (ffmpeg feature) or
//! generates them synthetically for `stub://` paths. Frame indices start at 1.

use anyhow::Result;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;
use crate::error::AccessError;
use crate::frame::Frame;

pub const STUB_SCHEME: &str = "stub://";

const SYNTHETIC_WIDTH: u32 = 320;
const SYNTHETIC_HEIGHT: u32 = 240;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/var/lib/gate/shift.mp4") or `stub://<name>`.
    pub path: String,
    /// Stop after this many frames. `None` reads until the file ends; a
    /// synthetic source without a limit never ends.
    pub frame_limit: Option<u64>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: "stub://gate_camera".to_string(),
            frame_limit: None,
        }
    }
}

impl FileConfig {
    pub fn synthetic(name: &str, frame_limit: Option<u64>) -> Self {
        Self {
            path: format!("{}{}", STUB_SCHEME, name),
            frame_limit,
            ..Self::default()
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    location: String,
    frame_limit: Option<u64>,
    frames_read: u64,
    open: bool,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open the source. Every failure is reported as `SourceUnavailable`.
    pub fn open(config: FileConfig) -> Result<Self, AccessError> {
        let unavailable = |reason: String| AccessError::SourceUnavailable {
            location: config.path.clone(),
            reason,
        };
        if !is_local_file_path(&config.path) {
            return Err(unavailable(
                "file ingestion only supports local paths (no URL schemes)".to_string(),
            ));
        }

        let backend = if config.path.starts_with(STUB_SCHEME) {
            FileBackend::Synthetic(SyntheticFileSource::new())
        } else {
            if !std::path::Path::new(&config.path).is_file() {
                return Err(unavailable("no such file".to_string()));
            }
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                FileBackend::Ffmpeg(
                    FfmpegFileSource::new(&config).map_err(|e| unavailable(format!("{:#}", e)))?,
                )
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                return Err(unavailable(
                    "file ingestion requires the ingest-file-ffmpeg feature".to_string(),
                ));
            }
        };

        log::info!(
            "FileSource: opened {} ({})",
            config.path,
            match backend {
                FileBackend::Synthetic(_) => "synthetic",
                #[cfg(feature = "ingest-file-ffmpeg")]
                FileBackend::Ffmpeg(_) => "ffmpeg",
            }
        );
        Ok(Self {
            location: config.path,
            frame_limit: config.frame_limit,
            frames_read: 0,
            open: true,
            backend,
        })
    }

    pub fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frames_read,
            path: self.location.clone(),
        }
    }
}

impl FrameSource for FileSource {
    fn location(&self) -> &str {
        &self.location
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Ok(None);
        }
        if self.frame_limit.is_some_and(|limit| self.frames_read >= limit) {
            return Ok(None);
        }
        let index = self.frames_read + 1;
        let frame = match &mut self.backend {
            FileBackend::Synthetic(source) => Some(source.next_frame(index)),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(index)?,
        };
        if frame.is_some() {
            self.frames_read = index;
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            log::info!(
                "FileSource: released {} after {} frames",
                self.location,
                self.frames_read
            );
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    scene_state: u8,
}

impl SyntheticFileSource {
    fn new() -> Self {
        Self { scene_state: 0 }
    }

    fn next_frame(&mut self, index: u64) -> Frame {
        if index % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixel_count = (SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + index + self.scene_state as u64) % 256) as u8;
        }
        Frame::new(index, SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, pixels)
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_honours_limit() {
        let mut source = FileSource::open(FileConfig::synthetic("test", Some(3))).unwrap();
        let mut indices = Vec::new();
        while let Some(frame) = source.read().unwrap() {
            indices.push(frame.index);
        }
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(source.stats().frames_captured, 3);
        assert!(source.is_open());
        source.release();
        assert!(!source.is_open());
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn synthetic_frames_differ() {
        let mut source = FileSource::open(FileConfig::synthetic("test", None)).unwrap();
        let a = source.read().unwrap().unwrap();
        let b = source.read().unwrap().unwrap();
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.byte_len(), (SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT * 3) as usize);
    }

    #[test]
    fn remote_and_missing_paths_are_unavailable() {
        let remote = FileSource::open(FileConfig {
            path: "rtsp://camera/stream".to_string(),
            ..FileConfig::default()
        });
        assert!(matches!(remote, Err(AccessError::SourceUnavailable { .. })));

        let missing = FileSource::open(FileConfig {
            path: "/nonexistent/gate.mp4".to_string(),
            ..FileConfig::default()
        });
        match missing {
            Err(AccessError::SourceUnavailable { location, .. }) => {
                assert_eq!(location, "/nonexistent/gate.mp4")
            }
            other => panic!("unexpected: {:?}", other.err()),
        }

        assert!(FileSource::open(FileConfig {
            path: "  ".to_string(),
            ..FileConfig::default()
        })
        .is_err());
    }
}
