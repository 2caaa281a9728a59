//! 关键帧输出

use super::error::KeyframeError;
use super::frame::Frame;
use log::{debug, error, info};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub fn keyframe_file_name(index: u64) -> String {
    format!("keyframe_{}.jpg", index)
}

pub trait FrameSink {
    /// Persists one selected frame and returns its identifier.
    fn persist(&mut self, frame: &Frame, index: u64) -> Result<String, KeyframeError>;
}

/// Writes `keyframe_<index>.jpg` files into one directory.
pub struct JpegDirSink {
    dir: PathBuf,
    quality: u8,
}

impl JpegDirSink {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, KeyframeError> {
        Self::with_quality(dir, DEFAULT_JPEG_QUALITY)
    }

    pub fn with_quality(dir: impl AsRef<Path>, quality: u8) -> Result<Self, KeyframeError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quality: quality.clamp(1, 100),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes keyframe files left by an earlier run. Returns how many were deleted.
    pub fn clear_previous(&self) -> Result<usize, KeyframeError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_keyframe = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("keyframe_") && n.ends_with(".jpg"))
                .unwrap_or(false);

            if is_keyframe && path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("🧹 Removed {} stale keyframes from {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}

impl FrameSink for JpegDirSink {
    fn persist(&mut self, frame: &Frame, index: u64) -> Result<String, KeyframeError> {
        let path = self.dir.join(keyframe_file_name(index));

        let write = || -> Result<(), KeyframeError> {
            let jpeg = frame.encode_jpeg(self.quality)?;
            fs::write(&path, jpeg)?;
            Ok(())
        };

        write().map_err(|e| {
            error!("❌ Failed to save keyframe {}: {}", path.display(), e);
            KeyframeError::WriteFailure {
                index,
                reason: e.to_string(),
            }
        })?;

        debug!("💾 Saved keyframe: {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

/// JPEG 编码后留在内存中
pub struct MemorySink {
    quality: u8,
    frames: Vec<EncodedKeyframe>,
}

#[derive(Debug, Clone)]
pub struct EncodedKeyframe {
    pub index: u64,
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
    pub jpeg_data: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_quality(DEFAULT_JPEG_QUALITY)
    }

    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            frames: Vec::new(),
        }
    }

    pub fn frames(&self) -> &[EncodedKeyframe] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<EncodedKeyframe> {
        self.frames
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for MemorySink {
    fn persist(&mut self, frame: &Frame, index: u64) -> Result<String, KeyframeError> {
        let jpeg_data = frame
            .encode_jpeg(self.quality)
            .map_err(|e| KeyframeError::WriteFailure {
                index,
                reason: e.to_string(),
            })?;

        self.frames.push(EncodedKeyframe {
            index,
            timestamp_ms: frame.timestamp.as_millis() as u64,
            width: frame.width,
            height: frame.height,
            jpeg_data,
        });
        Ok(keyframe_file_name(index))
    }
}
