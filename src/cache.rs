use crate::detection::Detection;
use crate::error::AnalysisError;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-frame detector output for a whole video
pub type VideoDetections = Vec<Vec<Detection>>;

/// Whole-video memoization of raw detector output, keyed by a caller-supplied path
#[derive(Debug, Clone)]
pub struct DetectionCache {
    path: PathBuf,
}

impl DetectionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached detections of every frame, or `None` on a miss
    pub fn read(&self) -> Result<Option<VideoDetections>, AnalysisError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AnalysisError::CacheIo {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let detections = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            AnalysisError::CacheFormat {
                path: self.path.clone(),
                source,
            }
        })?;
        Ok(Some(detections))
    }

    /// Persists the detections of every frame, replacing any previous entry
    pub fn write(&self, detections: &VideoDetections) -> Result<(), AnalysisError> {
        let io_err = |source| AnalysisError::CacheIo {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let file = File::create(&self.path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, detections).map_err(|source| {
            AnalysisError::CacheFormat {
                path: self.path.clone(),
                source,
            }
        })?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }

    /// Returns the cached detections when reading is enabled and the entry exists.
    /// A hit covers the whole video; callers skip the detector entirely.
    pub fn lookup(&self, use_cached: bool) -> Result<Option<VideoDetections>, AnalysisError> {
        if !use_cached {
            return Ok(None);
        }
        let cached = self.read()?;
        match &cached {
            Some(detections) => info!(
                "Loaded {} frames of detections from {}",
                detections.len(),
                self.path.display()
            ),
            None => info!("No cached detections at {}", self.path.display()),
        }
        Ok(cached)
    }
}
