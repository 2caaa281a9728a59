//! Canny 边缘图（OpenCV imgproc）

use super::error::KeyframeError;
use super::frame::GrayFrame;
use opencv::{core, imgproc, prelude::*};

/// Hysteresis thresholds, tuned together with the default `edge_threshold`.
pub const CANNY_LOW_THRESHOLD: f64 = 100.0;
pub const CANNY_HIGH_THRESHOLD: f64 = 200.0;
const SOBEL_APERTURE: i32 = 3;

pub const EDGE: u8 = 255;

/// Binary edge map (0 / 255) of the same size as `frame`.
pub fn canny(frame: &GrayFrame, low: f64, high: f64) -> Result<GrayFrame, KeyframeError> {
    if frame.pixel_count() == 0 {
        return Ok(GrayFrame::new(frame.width, frame.height, Vec::new()));
    }

    let src = to_mat(frame)?;
    let mut edges = Mat::default();
    imgproc::canny(&src, &mut edges, low, high, SOBEL_APERTURE, false)?;

    if !edges.is_continuous() {
        return Err(KeyframeError::DecodeFailure(
            "edge map is not continuous".to_string(),
        ));
    }
    Ok(GrayFrame::new(
        frame.width,
        frame.height,
        edges.data_bytes()?.to_vec(),
    ))
}

pub(crate) fn to_mat(frame: &GrayFrame) -> Result<Mat, KeyframeError> {
    let mut mat = Mat::zeros(frame.height as i32, frame.width as i32, core::CV_8UC1)?.to_mat()?;
    mat.data_bytes_mut()?.copy_from_slice(&frame.data[..frame.pixel_count()]);
    Ok(mat)
}
