//! 视频关键帧提取器

use crate::core::keyframe::{
    DetectorConfig, Frame, KeyframeError, KeyframeProcessor, MemorySink, MemorySource,
    PixelFormat, ProcessingResult, RawFrame,
};
use flutter_rust_bridge::frb;
use log::info;

/// Y 平面帧数据（调用方已解码）
#[derive(Debug, Clone)]
pub struct GrayFrameData {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

#[derive(Debug, Clone)]
pub struct ExtractedKeyframe {
    pub index: u64,
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
    pub jpeg_data: Vec<u8>,
}

/// 关键帧提取器 - 场景切换检测 + JPEG 输出
///
/// ```dart
/// final extractor = KeyframeExtractor.create(config: DetectorConfig(...));
/// final result = await extractor.processVideo(videoPath: path, outputDir: dir);
/// ```
#[frb(opaque)]
pub struct KeyframeExtractor {
    processor: KeyframeProcessor,
}

impl KeyframeExtractor {
    #[frb(sync)]
    pub fn create(config: DetectorConfig) -> Result<Self, KeyframeError> {
        crate::init_logging();
        let processor = KeyframeProcessor::new(config)?;
        info!("🎬 KeyframeExtractor: created with {:?}", processor.config());
        Ok(Self { processor })
    }

    /// 解码视频文件并将关键帧写入 output_dir
    #[frb]
    pub fn process_video(&self, video_path: String, output_dir: String) -> ProcessingResult {
        info!("🎬 Processing video: {} -> {}", video_path, output_dir);
        self.processor.process_video(&video_path, &output_dir)
    }

    /// 处理调用方已解码的 Y 平面帧，关键帧以 JPEG 字节返回
    #[frb]
    pub fn process_gray_frames(
        &self,
        frames: Vec<GrayFrameData>,
        fps: f64,
    ) -> Result<Vec<ExtractedKeyframe>, KeyframeError> {
        let frames = frames
            .into_iter()
            .map(|f| {
                Frame::new(
                    f.width,
                    f.height,
                    PixelFormat::Gray8,
                    f.y_plane,
                    f.timestamp_ms,
                    f.frame_number,
                )
            })
            .collect();

        self.extract_from_frames(frames, fps)
    }

    /// 处理原生层传来的 YUV420 帧（如 CameraX / MediaCodec 输出）
    #[frb]
    pub fn process_yuv_frames(
        &self,
        frames: Vec<RawFrame>,
        fps: f64,
    ) -> Result<Vec<ExtractedKeyframe>, KeyframeError> {
        let frames = frames.iter().map(RawFrame::to_rgb).collect();
        self.extract_from_frames(frames, fps)
    }

    fn extract_from_frames(
        &self,
        frames: Vec<Frame>,
        fps: f64,
    ) -> Result<Vec<ExtractedKeyframe>, KeyframeError> {
        let mut source = MemorySource::new(frames, fps);
        let mut sink = MemorySink::new();
        self.processor.extract_keyframes(&mut source, &mut sink)?;

        Ok(sink
            .into_frames()
            .into_iter()
            .map(|k| ExtractedKeyframe {
                index: k.index,
                timestamp_ms: k.timestamp_ms,
                width: k.width,
                height: k.height,
                jpeg_data: k.jpeg_data,
            })
            .collect())
    }

    /// 取消正在进行的提取，下一帧生效
    #[frb(sync)]
    pub fn cancel(&self) {
        self.processor.cancel_token().cancel();
    }

    /// 清除取消标记
    #[frb(sync)]
    pub fn reset(&self) {
        self.processor.cancel_token().reset();
    }

    #[frb(sync, getter)]
    pub fn config(&self) -> DetectorConfig {
        self.processor.config().clone()
    }
}

impl Drop for KeyframeExtractor {
    fn drop(&mut self) {
        info!("🗑️ KeyframeExtractor: released");
    }
}
