pub mod calibrate;
pub mod combine;
pub mod config;
pub mod info;
pub mod photometry;
pub mod run;
pub mod scan;
