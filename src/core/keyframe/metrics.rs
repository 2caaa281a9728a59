//! 三项帧间差异指标：像素差、边缘差、直方图卡方距离

use super::edge::{canny, CANNY_HIGH_THRESHOLD, CANNY_LOW_THRESHOLD};
use super::error::KeyframeError;
use super::frame::GrayFrame;
use serde::{Deserialize, Serialize};

pub const HISTOGRAM_BINS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub mean_abs_diff: f64,
    pub edge_score: f64,
    pub hist_distance: f64,
}

/// Computes all three dissimilarity scores of `current` against `previous`.
///
/// The metrics are independent and are evaluated on the rayon pool; the
/// result is identical to a sequential evaluation.
pub fn compute_metrics(
    current: &GrayFrame,
    previous: &GrayFrame,
) -> Result<MetricSet, KeyframeError> {
    if current.dimensions() != previous.dimensions()
        || current.data.len() != previous.data.len()
    {
        return Err(KeyframeError::DimensionMismatch {
            expected: previous.dimensions(),
            actual: current.dimensions(),
        });
    }

    let (mean_abs_diff, (edge_score, hist_distance)) = rayon::join(
        || mean_abs_diff(current, previous),
        || {
            rayon::join(
                || edge_score(current, previous),
                || chi_square(&histogram(current), &histogram(previous)),
            )
        },
    );

    Ok(MetricSet {
        mean_abs_diff,
        edge_score: edge_score?,
        hist_distance,
    })
}

pub fn mean_abs_diff(a: &GrayFrame, b: &GrayFrame) -> f64 {
    if a.data.is_empty() {
        return 0.0;
    }
    let sum: u64 = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    sum as f64 / a.data.len() as f64
}

pub fn edge_score(a: &GrayFrame, b: &GrayFrame) -> Result<f64, KeyframeError> {
    let (edges_a, edges_b) = rayon::join(
        || canny(a, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD),
        || canny(b, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD),
    );
    Ok(mean_abs_diff(&edges_a?, &edges_b?))
}

pub fn histogram(frame: &GrayFrame) -> [u32; HISTOGRAM_BINS] {
    let mut hist = [0u32; HISTOGRAM_BINS];
    for &val in &frame.data {
        hist[val as usize] += 1;
    }
    hist
}

/// Σ (a − b)² / a over bins where the reference bin `a` is non-zero.
///
/// Raw counts, not normalised: the magnitude scales with frame area.
pub fn chi_square(reference: &[u32; HISTOGRAM_BINS], other: &[u32; HISTOGRAM_BINS]) -> f64 {
    reference
        .iter()
        .zip(other.iter())
        .filter(|&(&a, _)| a > 0)
        .map(|(&a, &b)| {
            let diff = a as f64 - b as f64;
            diff * diff / a as f64
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_frame(width: u32, height: u32, seed: u32) -> GrayFrame {
        let data = (0..width * height)
            .map(|i| ((i.wrapping_mul(2654435761).wrapping_add(seed * 97)) >> 7) as u8)
            .collect();
        GrayFrame::new(width, height, data)
    }

    fn checkerboard(width: u32, height: u32, cell: u32) -> GrayFrame {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(if (x / cell + y / cell) % 2 == 0 { 0 } else { 255 });
            }
        }
        GrayFrame::new(width, height, data)
    }

    #[test]
    fn test_identical_frames_score_zero() {
        let frame = pattern_frame(40, 30, 1);
        let metrics = compute_metrics(&frame, &frame.clone()).unwrap();
        assert_eq!(metrics, MetricSet::default());
    }

    #[test]
    fn test_mean_abs_diff_uniform() {
        let a = GrayFrame::filled(10, 10, 40);
        let b = GrayFrame::filled(10, 10, 200);
        assert_eq!(mean_abs_diff(&a, &b), 160.0);
    }

    #[test]
    fn test_metric_symmetry() {
        let a = pattern_frame(48, 32, 3);
        let b = checkerboard(48, 32, 4);

        let ab = compute_metrics(&a, &b).unwrap();
        let ba = compute_metrics(&b, &a).unwrap();
        assert_eq!(ab.mean_abs_diff, ba.mean_abs_diff);
        assert_eq!(ab.edge_score, ba.edge_score);
    }

    #[test]
    fn test_deterministic() {
        let a = pattern_frame(64, 48, 5);
        let b = pattern_frame(64, 48, 9);
        let first = compute_metrics(&a, &b).unwrap();
        for _ in 0..5 {
            assert_eq!(compute_metrics(&a, &b).unwrap(), first);
        }
    }

    #[test]
    fn test_edge_score_detects_structure_change() {
        let flat = GrayFrame::filled(32, 32, 128);
        let board = checkerboard(32, 32, 8);

        let score = edge_score(&board, &flat).unwrap();
        assert!(score > 0.0);
        assert_eq!(edge_score(&flat, &flat).unwrap(), 0.0);
    }

    #[test]
    fn test_histogram_counts() {
        let hist = histogram(&checkerboard(8, 8, 1));
        assert_eq!(hist[0], 32);
        assert_eq!(hist[255], 32);
        assert_eq!(hist.iter().sum::<u32>(), 64);
    }

    #[test]
    fn test_chi_square_zero_reference_bins() {
        let mut reference = [0u32; HISTOGRAM_BINS];
        let mut other = [0u32; HISTOGRAM_BINS];
        reference[10] = 4;
        other[10] = 2;
        other[200] = 50;

        // bin 200 has no reference count and contributes nothing
        assert_eq!(chi_square(&reference, &other), 1.0);
    }

    #[test]
    fn test_chi_square_uses_current_as_reference() {
        let dark = GrayFrame::filled(10, 10, 0);
        let bright = GrayFrame::filled(10, 10, 255);
        let metrics = compute_metrics(&bright, &dark).unwrap();

        // bin 255: (100 - 0)^2 / 100
        assert_eq!(metrics.hist_distance, 100.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = GrayFrame::filled(10, 10, 0);
        let b = GrayFrame::filled(10, 12, 0);
        assert!(matches!(
            compute_metrics(&a, &b),
            Err(KeyframeError::DimensionMismatch { .. })
        ));
    }
}
