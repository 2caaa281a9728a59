use super::error::KeyframeError;
use image::{GrayImage, ImageOutputFormat, RgbImage};
use std::io::Cursor;
use std::time::Duration;

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// 解码后的视频帧
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    pub timestamp: Duration,
    /// Decode-order position reported by the source. The selector assigns
    /// its own keyframe index and never reads this.
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            format,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    pub fn gray(width: u32, height: u32, data: Vec<u8>, frame_number: u64) -> Self {
        Self::new(width, height, PixelFormat::Gray8, data, 0, frame_number)
    }

    pub fn rgb(width: u32, height: u32, data: Vec<u8>, frame_number: u64) -> Self {
        Self::new(width, height, PixelFormat::Rgb8, data, 0, frame_number)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// A frame the decoder handed back without usable pixels.
    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0 || self.data.len() < self.pixel_count() * self.format.channels()
    }

    pub fn to_gray(&self) -> GrayFrame {
        let data = match self.format {
            PixelFormat::Gray8 => self.data[..self.pixel_count()].to_vec(),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => self
                .data
                .chunks_exact(self.format.channels())
                .take(self.pixel_count())
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
        };

        GrayFrame {
            width: self.width,
            height: self.height,
            data,
        }
    }

    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        match self.format {
            PixelFormat::Gray8 => {
                for &y in &self.data[..self.pixel_count()] {
                    rgb.extend_from_slice(&[y, y, y]);
                }
            }
            PixelFormat::Rgb8 => rgb.extend_from_slice(&self.data[..self.pixel_count() * 3]),
            PixelFormat::Rgba8 => {
                for chunk in self.data.chunks_exact(4).take(self.pixel_count()) {
                    rgb.extend_from_slice(&chunk[..3]);
                }
            }
        }
        rgb
    }

    /// JPEG 编码（灰度帧保持单通道）
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, KeyframeError> {
        if self.is_empty() {
            return Err(KeyframeError::DecodeFailure(format!(
                "frame {} has no pixel data",
                self.frame_number
            )));
        }

        let mut buffer = Cursor::new(Vec::new());
        let format = ImageOutputFormat::Jpeg(quality);
        match self.format {
            PixelFormat::Gray8 => {
                let img = GrayImage::from_raw(self.width, self.height, self.to_gray().data)
                    .ok_or_else(|| invalid_buffer(self))?;
                img.write_to(&mut buffer, format)?;
            }
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
                let img = RgbImage::from_raw(self.width, self.height, self.to_rgb())
                    .ok_or_else(|| invalid_buffer(self))?;
                img.write_to(&mut buffer, format)?;
            }
        }
        Ok(buffer.into_inner())
    }
}

fn invalid_buffer(frame: &Frame) -> KeyframeError {
    KeyframeError::DecodeFailure(format!(
        "frame {} buffer does not match {}x{}",
        frame.frame_number, frame.width, frame.height
    ))
}

/// BT.601 luma, rounded.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

/// 单通道灰度帧（指标计算的输入）
#[derive(Debug, Clone, PartialEq)]
pub struct GrayFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl GrayFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::new(width, height, vec![value; width as usize * height as usize])
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// 从原生层传递的 YUV420 平面数据
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub u_plane: Vec<u8>,
    pub v_plane: Vec<u8>,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl RawFrame {
    /// BT.601 full-range conversion. A short luma plane yields an empty
    /// frame, which the selector treats as undecodable.
    pub fn to_rgb(&self) -> Frame {
        let w = self.width as usize;
        let h = self.height as usize;
        if self.y_plane.len() < w * h {
            return Frame::new(
                self.width,
                self.height,
                PixelFormat::Rgb8,
                Vec::new(),
                self.timestamp_ms,
                self.frame_number,
            );
        }
        let chroma_w = w.div_ceil(2);
        let mut rgb = Vec::with_capacity(w * h * 3);

        for y in 0..h {
            for x in 0..w {
                let uv_idx = (y / 2) * chroma_w + x / 2;

                let y_val = self.y_plane.get(y * w + x).copied().unwrap_or(0) as f32;
                let u_val = self.u_plane.get(uv_idx).copied().unwrap_or(128) as f32 - 128.0;
                let v_val = self.v_plane.get(uv_idx).copied().unwrap_or(128) as f32 - 128.0;

                rgb.push((y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8);
                rgb.push((y_val - 0.344136 * u_val - 0.714136 * v_val).clamp(0.0, 255.0) as u8);
                rgb.push((y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8);
            }
        }

        Frame::new(
            self.width,
            self.height,
            PixelFormat::Rgb8,
            rgb,
            self.timestamp_ms,
            self.frame_number,
        )
    }
}
