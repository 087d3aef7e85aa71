use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the analysis library
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to access detection cache {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed detection cache {path}: {source}")]
    CacheFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected at least {expected} court keypoints, got {actual}")]
    InsufficientKeypoints { expected: usize, actual: usize },

    #[error("detection cache {path} covers {cached} frames but the video has more; refresh it without --read-cache")]
    StaleCache { path: PathBuf, cached: usize },

    #[error("court keypoints do not define an invertible homography")]
    DegenerateHomography,

    #[error("player detections cover {players} frames but ball detections cover {balls}")]
    FrameCountMismatch { players: usize, balls: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
