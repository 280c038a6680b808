pub mod config;
pub mod finder;
pub mod kernel;
pub mod segmentation;

pub use config::DetectionConfig;
pub use finder::{detect_sources, DetectedSource, DetectionResult};
