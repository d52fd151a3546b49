//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic.
//! Acquisition reports a fraction in `0.0..=1.0` plus a short label; the
//! `ProgressTracker` keeps the reported fractions non-decreasing within one call
//! so reporters never have to.

/// Stages of a model acquisition call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStage {
    /// Downloading the package (archive or individual files)
    Downloading,
    /// Unpacking the downloaded archive
    Extracting,
    /// Compiling the package into an executable artifact
    Compiling,
    /// Compiled artifact is ready
    Ready,
}

impl AcquisitionStage {
    /// Get a human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            AcquisitionStage::Downloading => "Downloading model",
            AcquisitionStage::Extracting => "Extracting model",
            AcquisitionStage::Compiling => "Compiling model",
            AcquisitionStage::Ready => "Model ready",
        }
    }

    /// Fraction range the stage occupies within one acquisition call
    #[must_use]
    pub fn fraction_range(&self) -> (f32, f32) {
        match self {
            AcquisitionStage::Downloading => (0.0, 0.7),
            AcquisitionStage::Extracting => (0.7, 0.8),
            AcquisitionStage::Compiling => (0.8, 0.95),
            AcquisitionStage::Ready => (1.0, 1.0),
        }
    }
}

/// Stages of a single image pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Ensuring the model is compiled and loaded
    Initialization,
    /// Encoding the image into the input tensor
    Preprocessing,
    /// Running the execution engine
    Inference,
    /// Decoding and resizing the mask
    MaskGeneration,
    /// Writing the mask into the alpha channel
    BackgroundRemoval,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Initialization => "Initializing model and backend",
            ProcessingStage::Preprocessing => "Preprocessing image",
            ProcessingStage::Inference => "Running inference",
            ProcessingStage::MaskGeneration => "Generating segmentation mask",
            ProcessingStage::BackgroundRemoval => "Removing background",
            ProcessingStage::Completed => "Processing completed",
        }
    }
}

/// Receives advisory progress updates
///
/// Implemented for any `Fn(f32, &str)` closure.
pub trait ProgressReporter: Send + Sync {
    /// Report a fraction in `0.0..=1.0` with a short label
    fn report(&self, fraction: f32, label: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(f32, &str) + Send + Sync,
{
    fn report(&self, fraction: f32, label: &str) {
        self(fraction, label);
    }
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report(&self, _fraction: f32, _label: &str) {}
}

/// Progress reporter that forwards updates to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressReporter;

impl ProgressReporter for TracingProgressReporter {
    fn report(&self, fraction: f32, label: &str) {
        tracing::info!(progress = %format!("{:.0}%", fraction * 100.0), "{}", label);
    }
}

/// Monotonic view over a reporter for the duration of one call
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    last: f32,
    reports: usize,
}

impl<'a> ProgressTracker<'a> {
    #[must_use]
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            reporter,
            last: 0.0,
            reports: 0,
        }
    }

    /// Report a fraction, raised to the last reported value if it would regress
    pub fn report(&mut self, fraction: f32, label: &str) {
        let fraction = if fraction.is_nan() {
            self.last
        } else {
            fraction.clamp(0.0, 1.0).max(self.last)
        };
        self.last = fraction;
        self.reports += 1;
        self.reporter.report(fraction, label);
    }

    /// Report the start of a stage
    pub fn enter(&mut self, stage: AcquisitionStage) {
        let (start, _) = stage.fraction_range();
        self.report(start, stage.description());
    }

    /// Report progress inside a stage, `inner` being the stage-local fraction
    pub fn within(&mut self, stage: AcquisitionStage, inner: f32, label: &str) {
        let (start, end) = stage.fraction_range();
        self.report(start + (end - start) * inner.clamp(0.0, 1.0), label);
    }

    /// Report completion
    pub fn finish(&mut self) {
        self.report(1.0, AcquisitionStage::Ready.description());
    }

    /// Last fraction handed to the reporter
    #[must_use]
    pub fn last_fraction(&self) -> f32 {
        self.last
    }

    /// Number of reports issued through this tracker
    #[must_use]
    pub fn report_count(&self) -> usize {
        self.reports
    }
}
