//! 视频关键帧提取 - 基于场景切换检测
//!
//! 核心策略：
//! 1. 三项指标 - 像素差、Canny 边缘差、灰度直方图卡方距离，任一超阈值即视为切换
//! 2. 最小间隔 - 两次选帧之间至少间隔 `min_gap` 帧
//! 3. 首尾保底 - 首帧必选，尾部距上次选帧足够远时补选最后一帧

pub mod config;
pub mod decision;
pub mod edge;
pub mod error;
pub mod events;
pub mod frame;
pub mod metrics;
pub mod processor;
pub mod selector;
pub mod sink;
pub mod source;

pub use config::DetectorConfig;
pub use decision::is_scene_change;
pub use error::KeyframeError;
pub use events::{EventHook, LogEventHook, RecordingHook, SelectorEvent};
pub use frame::{Frame, GrayFrame, PixelFormat, RawFrame};
pub use metrics::{compute_metrics, MetricSet};
pub use processor::{CancelToken, ExtractionStats, KeyframeProcessor, KeyframeRecord, ProcessingResult};
pub use selector::{FrameSelector, SelectReason, SelectorPhase, SelectorState, StepAction};
pub use sink::{EncodedKeyframe, FrameSink, JpegDirSink, MemorySink};
pub use source::{FfmpegSource, FrameSource, MemorySource, SourceInfo};
