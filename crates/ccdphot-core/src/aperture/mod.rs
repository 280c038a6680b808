pub mod geometry;
pub mod photometry;
pub mod sampling;

pub use geometry::{ApertureGeometry, ApertureMethod};
pub use photometry::{measure, AnnulusMeasurement, PhotometryResult, PhotometryRow};
pub use sampling::{AnnulusStatistic, ApertureOptions, SamplingMethod};
