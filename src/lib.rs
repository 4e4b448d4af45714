//! Dual-energy X-ray radiography simulation: spectra, attenuation, detector
//! response, image formation, material decomposition and image-quality
//! figures of merit.

pub mod error;
pub use error::{DesimError, Result};

pub mod types;
pub mod grid;
pub mod material;
pub mod attenuation;
pub mod spectrum;
pub mod detector;
pub mod phantom;
pub mod imaging;
pub mod decomposition;
pub mod subtraction;
pub mod fom;
pub mod config;
pub mod orchestrator;
pub mod utils;

pub use config::scenario::Scenario;
pub use orchestrator::{run, MetricReport};
