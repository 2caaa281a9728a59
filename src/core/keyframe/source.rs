//! 帧来源：内存帧序列 / ffmpeg 子进程解码

use super::error::KeyframeError;
use super::frame::{Frame, PixelFormat};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

pub const FFMPEG_BIN: &str = "ffmpeg";
pub const FFPROBE_BIN: &str = "ffprobe";

/// Lines of decoder stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 8;

/// Stream properties, used for diagnostics only.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: Option<u64>,
}

impl SourceInfo {
    pub fn duration(&self) -> Option<Duration> {
        match self.total_frames {
            Some(total) if self.fps > 0.0 => Some(Duration::from_secs_f64(total as f64 / self.fps)),
            _ => None,
        }
    }
}

pub trait FrameSource {
    fn info(&self) -> &SourceInfo;

    /// Next frame in presentation order, `Ok(None)` at end of stream.
    /// A frame with no pixels stands for one the decoder could not produce.
    fn next_frame(&mut self) -> Result<Option<Frame>, KeyframeError>;
}

/// 已解码帧序列
pub struct MemorySource {
    info: SourceInfo,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Self {
        let (width, height) = frames
            .iter()
            .find(|f| !f.is_empty())
            .map(|f| (f.width, f.height))
            .unwrap_or((0, 0));

        Self {
            info: SourceInfo {
                width,
                height,
                fps,
                total_frames: Some(frames.len() as u64),
            },
            frames: frames.into(),
        }
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, KeyframeError> {
        Ok(self.frames.pop_front())
    }
}

/// Splits a packed rgb24 byte stream into frames.
pub struct RawVideoReader<R> {
    reader: R,
    width: u32,
    height: u32,
    fps: f64,
    decoded: u64,
}

impl<R: Read> RawVideoReader<R> {
    pub fn new(reader: R, width: u32, height: u32, fps: f64) -> Self {
        Self {
            reader,
            width,
            height,
            fps,
            decoded: 0,
        }
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * PixelFormat::Rgb8.channels()
    }

    pub fn read_frame(&mut self) -> Result<Option<Frame>, KeyframeError> {
        let mut buffer = vec![0u8; self.frame_size()];
        let filled = read_full(&mut self.reader, &mut buffer)?;

        if filled == 0 {
            return Ok(None);
        }
        if filled < buffer.len() {
            return Err(KeyframeError::DecodeFailure(format!(
                "truncated frame {}: {} of {} bytes",
                self.decoded,
                filled,
                buffer.len()
            )));
        }

        let timestamp_ms = if self.fps > 0.0 {
            (self.decoded as f64 * 1000.0 / self.fps) as u64
        } else {
            0
        };
        let frame = Frame::new(
            self.width,
            self.height,
            PixelFormat::Rgb8,
            buffer,
            timestamp_ms,
            self.decoded,
        );
        self.decoded += 1;
        Ok(Some(frame))
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[derive(Debug, Default, Deserialize)]
struct StreamListing {
    #[serde(default)]
    streams: Vec<StreamEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamEntry {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    side_data_list: Vec<StreamSideData>,
    #[serde(default)]
    tags: StreamTags,
}

#[derive(Debug, Default, Deserialize)]
struct StreamSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}

impl StreamEntry {
    /// Display rotation in degrees; the display matrix wins over the legacy tag.
    fn rotation(&self) -> i64 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .map(|r| r.round() as i64)
            .unwrap_or(0)
    }
}

/// Reads the first video stream out of `ffprobe -of json` output.
///
/// ffmpeg autorotates on decode, so a quarter-turn display rotation swaps
/// the reported width and height to match the decoded frames.
pub fn parse_stream_info(json: &str, path: &str) -> Result<SourceInfo, KeyframeError> {
    let listing: StreamListing = serde_json::from_str(json)?;
    let stream = listing
        .streams
        .into_iter()
        .find(|s| s.width > 0 && s.height > 0)
        .ok_or_else(|| KeyframeError::UnopenableSource(path.to_string()))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .map(parse_rate)
        .filter(|r| *r > 0.0)
        .or_else(|| stream.r_frame_rate.as_deref().map(parse_rate))
        .unwrap_or(0.0);

    let (width, height) = if stream.rotation().rem_euclid(180) == 90 {
        (stream.height, stream.width)
    } else {
        (stream.width, stream.height)
    };

    Ok(SourceInfo {
        width,
        height,
        fps,
        total_frames: stream.nb_frames.and_then(|n| n.parse().ok()),
    })
}

fn parse_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => rate.trim().parse().unwrap_or(0.0),
    }
}

/// ffmpeg 子进程解码器，rgb24 原始帧走 stdout
///
/// The child process is killed and reaped on drop.
pub struct FfmpegSource {
    info: SourceInfo,
    child: Child,
    reader: RawVideoReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    path: String,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KeyframeError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        if !path.is_file() {
            return Err(KeyframeError::SourceNotFound(display));
        }

        let info = Self::inspect(path)?;
        info!(
            "🎬 FfmpegSource: {} ({}x{}, fps={:.2}, frames={:?})",
            display, info.width, info.height, info.fps, info.total_frames
        );

        let mut child = Command::new(FFMPEG_BIN)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| KeyframeError::UnopenableSource(format!("{}: failed to spawn {}: {}", display, FFMPEG_BIN, e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(KeyframeError::UnopenableSource(format!(
                    "{}: decoder stdout unavailable",
                    display
                )));
            }
        };

        // drained on its own thread so a chatty decoder never blocks on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        Ok(Self {
            reader: RawVideoReader::new(stdout, info.width, info.height, info.fps),
            info,
            child,
            stderr,
            path: display,
            finished: false,
        })
    }

    fn inspect(path: &Path) -> Result<SourceInfo, KeyframeError> {
        let display = path.display().to_string();
        let output = Command::new(FFPROBE_BIN)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames:stream_side_data=rotation:stream_tags=rotate",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| KeyframeError::UnopenableSource(format!("{}: failed to run {}: {}", display, FFPROBE_BIN, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("⚠️ ffprobe rejected {} ({}): {}", display, output.status, stderr_tail(&stderr, STDERR_TAIL_LINES));
            return Err(KeyframeError::UnopenableSource(display));
        }

        parse_stream_info(&String::from_utf8_lossy(&output.stdout), &display)
    }

    /// Waits for the decoder and collects what it wrote to stderr.
    fn reap(&mut self) -> Result<(std::process::ExitStatus, String), KeyframeError> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        Ok((status, stderr_tail(&stderr, STDERR_TAIL_LINES)))
    }
}

/// Last `max_lines` non-blank lines of `text`, joined with " | ".
pub(crate) fn stderr_tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines[lines.len().saturating_sub(max_lines)..].join(" | ")
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, KeyframeError> {
        if self.finished {
            return Ok(None);
        }

        let frame = match self.reader.read_frame() {
            Ok(frame) => frame,
            Err(KeyframeError::DecodeFailure(reason)) => {
                let _ = self.child.kill();
                let (_, stderr) = self.reap()?;
                return Err(KeyframeError::DecodeFailure(format!(
                    "{}: {}; ffmpeg: {}",
                    self.path, reason, stderr
                )));
            }
            Err(e) => return Err(e),
        };

        match frame {
            Some(frame) => Ok(Some(frame)),
            None => {
                let (status, stderr) = self.reap()?;
                if !status.success() {
                    return Err(KeyframeError::DecodeFailure(format!(
                        "{}: decoder exited with {} after {} frames; ffmpeg: {}",
                        self.path,
                        status,
                        self.reader.decoded(),
                        stderr
                    )));
                }
                debug!("FfmpegSource: end of stream after {} frames", self.reader.decoded());
                Ok(None)
            }
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
        info!("🗑️ FfmpegSource: released decoder for {}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_memory_source_order() {
        let frames = (0..3)
            .map(|i| Frame::gray(4, 4, vec![i as u8; 16], i))
            .collect();
        let mut source = MemorySource::new(frames, 25.0);

        assert_eq!(source.info().width, 4);
        assert_eq!(source.info().total_frames, Some(3));
        for i in 0..3 {
            assert_eq!(source.next_frame().unwrap().unwrap().frame_number, i);
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_source_info_duration() {
        let info = SourceInfo {
            width: 1,
            height: 1,
            fps: 25.0,
            total_frames: Some(100),
        };
        assert_eq!(info.duration(), Some(Duration::from_secs(4)));

        let unknown = SourceInfo {
            total_frames: None,
            ..info
        };
        assert_eq!(unknown.duration(), None);
    }

    #[test]
    fn test_raw_reader_splits_frames() {
        let bytes: Vec<u8> = (0..2 * 2 * 3 * 2).map(|i| i as u8).collect();
        let mut reader = RawVideoReader::new(Cursor::new(bytes), 2, 2, 10.0);

        let first = reader.read_frame().unwrap().unwrap();
        assert_eq!(first.data, (0..12).collect::<Vec<u8>>());
        assert_eq!(first.frame_number, 0);

        let second = reader.read_frame().unwrap().unwrap();
        assert_eq!(second.frame_number, 1);
        assert_eq!(second.timestamp.as_millis(), 100);

        assert!(reader.read_frame().unwrap().is_none());
        assert_eq!(reader.decoded(), 2);
    }

    #[test]
    fn test_raw_reader_truncated_frame() {
        let mut reader = RawVideoReader::new(Cursor::new(vec![0u8; 12 + 5]), 2, 2, 10.0);
        assert!(reader.read_frame().unwrap().is_some());
        assert!(matches!(
            reader.read_frame(),
            Err(KeyframeError::DecodeFailure(_))
        ));
    }

    #[test]
    fn test_parse_stream_info() {
        let json = r#"{"streams":[{"width":1280,"height":720,"r_frame_rate":"30/1","avg_frame_rate":"30000/1001","nb_frames":"300"}]}"#;
        let info = parse_stream_info(json, "clip.mp4").unwrap();

        assert_eq!((info.width, info.height), (1280, 720));
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.total_frames, Some(300));
    }

    #[test]
    fn test_parse_stream_info_fallbacks() {
        let json = r#"{"streams":[{"width":640,"height":480,"r_frame_rate":"25/1","avg_frame_rate":"0/0"}]}"#;
        let info = parse_stream_info(json, "clip.mkv").unwrap();
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.total_frames, None);
    }

    #[test]
    fn test_parse_stream_info_portrait_display_matrix() {
        let json = r#"{"streams":[{"width":1920,"height":1080,"r_frame_rate":"30/1","avg_frame_rate":"30/1","nb_frames":"90","side_data_list":[{"side_data_type":"Display Matrix","rotation":-90}]}]}"#;
        let info = parse_stream_info(json, "portrait.mp4").unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));
    }

    #[test]
    fn test_parse_stream_info_rotate_tag() {
        let json = r#"{"streams":[{"width":1280,"height":720,"r_frame_rate":"30/1","tags":{"rotate":"270"}}]}"#;
        let info = parse_stream_info(json, "legacy.mov").unwrap();
        assert_eq!((info.width, info.height), (720, 1280));
    }

    #[test]
    fn test_parse_stream_info_half_turn_keeps_size() {
        let json = r#"{"streams":[{"width":1280,"height":720,"r_frame_rate":"30/1","side_data_list":[{"rotation":180}]}]}"#;
        let info = parse_stream_info(json, "upside_down.mp4").unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
    }

    #[test]
    fn test_parse_stream_info_without_video() {
        assert!(matches!(
            parse_stream_info(r#"{"streams":[]}"#, "audio.mp3"),
            Err(KeyframeError::UnopenableSource(_))
        ));
        assert!(matches!(
            parse_stream_info("{}", "empty.bin"),
            Err(KeyframeError::UnopenableSource(_))
        ));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let log = "header\n\n[h264 @ 0x1] error while decoding MB 3 4\nconcealing 10 errors\nConversion failed!\n";
        assert_eq!(
            stderr_tail(log, 2),
            "concealing 10 errors | Conversion failed!"
        );
        assert_eq!(stderr_tail(log, 10).split(" | ").count(), 4);
        assert_eq!(stderr_tail("", 3), "");
    }

    #[test]
    fn test_open_missing_file() {
        let path = std::env::temp_dir().join("keyframe_lib_missing_video.mp4");
        assert!(matches!(
            FfmpegSource::open(&path),
            Err(KeyframeError::SourceNotFound(_))
        ));
    }
}
