//! Service layer
//!
//! This module contains services that separate infrastructure concerns
//! (image I/O, progress reporting) from the pipeline logic.

pub mod io;
pub mod progress;

pub use io::{ImageIOService, IntoRaster};
pub use progress::{
    AcquisitionStage, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker,
    TracingProgressReporter,
};
