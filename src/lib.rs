pub mod ball;
pub mod cache;
pub mod cli;
pub mod config;
pub mod court;
pub mod detection;
pub mod detector;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod resolver;
pub mod stats;
pub mod tracking;
pub mod video;

pub use error::AnalysisError;
