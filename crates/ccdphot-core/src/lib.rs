pub mod aperture;
pub mod background;
pub mod calibration;
pub mod centroid;
pub mod combine;
pub mod consts;
pub mod detection;
pub mod error;
pub mod frame;
pub mod io;
pub mod pipeline;
