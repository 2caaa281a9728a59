use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyframeError {
    #[error("Video source not found: {0}")]
    SourceNotFound(String),
    #[error("No decodable video stream in: {0}")]
    UnopenableSource(String),
    #[error("Decode failure: {0}")]
    DecodeFailure(String),
    #[error("Failed to write keyframe {index}: {reason}")]
    WriteFailure { index: u64, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Frame size changed mid-stream: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Selector already finished, no more frames accepted")]
    SelectorClosed,
    #[error("Processing cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
