//! Test utilities and mocks for the acquisition pipeline and inference
//!
//! These mocks stand in for the network, the model compiler and the execution
//! engine so the state machine and the tensor pipeline can be tested without
//! model files or ONNX Runtime.

use crate::{
    compile::ModelCompiler,
    config::ComputeProfile,
    download::{ArtifactTransport, ByteProgress, FetchOutcome},
    error::{BgRemovalError, Result},
    inference::{BackendFactory, EngineOutputs, InferenceBackend},
    models::MASK_OUTPUT_NAME,
};
use async_trait::async_trait;
use instant::Duration;
use ndarray::Array4;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    Status(u16),
}

/// In-memory transport keyed by URL; unknown URLs answer "not found"
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, MockResponse>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`
    pub fn serve<S: Into<String>>(&self, url: S, body: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.into(), MockResponse::Body(body));
    }

    /// Answer `url` with an HTTP failure status
    pub fn fail_with_status<S: Into<String>>(&self, url: S, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.into(), MockResponse::Status(status));
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactTransport for MockTransport {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        on_bytes: ByteProgress<'_>,
    ) -> Result<FetchOutcome> {
        self.requests.lock().unwrap().push(url.to_string());
        let response = self.responses.lock().unwrap().get(url).cloned();

        match response {
            None => Ok(FetchOutcome::NotFound),
            Some(MockResponse::Status(status)) => {
                Err(BgRemovalError::http_status_error(url, status))
            },
            Some(MockResponse::Body(body)) => {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(destination, &body)?;
                let len = body.len() as u64;
                on_bytes(len / 2, Some(len));
                on_bytes(len, Some(len));
                Ok(FetchOutcome::Completed { bytes: len })
            },
        }
    }
}

/// Compiler that writes a small marker file instead of an optimized graph
#[derive(Debug, Default)]
pub struct MockCompiler {
    failure: Option<String>,
    compiled: Mutex<Vec<PathBuf>>,
}

impl MockCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler that rejects every package with `cause`
    #[must_use]
    pub fn failing(cause: &str) -> Self {
        Self {
            failure: Some(cause.to_string()),
            compiled: Mutex::new(Vec::new()),
        }
    }

    /// Packages compiled so far, in order
    pub fn compiled_packages(&self) -> Vec<PathBuf> {
        self.compiled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelCompiler for MockCompiler {
    async fn compile(&self, package: &Path, scratch_dir: &Path) -> Result<PathBuf> {
        self.compiled.lock().unwrap().push(package.to_path_buf());
        tokio::task::yield_now().await;

        if let Some(cause) = &self.failure {
            return Err(BgRemovalError::compilation_failed(package, cause.clone()));
        }

        let output = scratch_dir.join("compiled.ort");
        std::fs::write(&output, format!("compiled:{}", package.display()))?;
        Ok(output)
    }
}

/// Mock execution engine returning a constant mask
#[derive(Debug, Clone)]
pub struct MockBackend {
    output_size: usize,
    mask_value: f32,
    initialized: bool,
    fail_inference: bool,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Backend producing an `output_size` square mask filled with `mask_value`
    #[must_use]
    pub fn new(output_size: usize, mask_value: f32) -> Self {
        Self {
            output_size,
            mask_value,
            initialized: false,
            fail_inference: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Backend whose every inference fails
    #[must_use]
    pub fn failing_inference(output_size: usize) -> Self {
        let mut backend = Self::new(output_size, 0.0);
        backend.fail_inference = true;
        backend
    }

    /// Get the call history for verification in tests
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, call: String) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call);
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, model_path: &Path, profile: ComputeProfile) -> Result<Duration> {
        self.record_call(format!("initialize:{}:{}", model_path.display(), profile));
        self.initialized = true;
        Ok(Duration::from_millis(1))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<EngineOutputs> {
        self.record_call(format!("infer:{:?}", input.dim()));

        if !self.initialized {
            return Err(BgRemovalError::inference("Backend not initialized"));
        }
        if self.fail_inference {
            return Err(BgRemovalError::inference("Mock inference failure"));
        }

        let mask = Array4::from_elem(
            (1, 1, self.output_size, self.output_size),
            self.mask_value,
        );
        let mut outputs = HashMap::new();
        outputs.insert(MASK_OUTPUT_NAME.to_string(), mask);
        outputs.insert(
            "output_image_quarter".to_string(),
            Array4::zeros((1, 1, self.output_size / 4, self.output_size / 4)),
        );
        Ok(outputs)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out clones of one mock backend
#[derive(Debug, Clone)]
pub struct MockBackendFactory {
    backend: MockBackend,
    created: Arc<Mutex<usize>>,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(backend: MockBackend) -> Self {
        Self {
            backend,
            created: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of backends created
    pub fn created_count(&self) -> usize {
        *self.created.lock().unwrap()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self) -> Result<Box<dyn InferenceBackend>> {
        *self.created.lock().unwrap() += 1;
        Ok(Box::new(self.backend.clone()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Build an in-memory zip archive from `(path, contents)` pairs
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    for (path, contents) in entries {
        writer.start_file(*path, options).unwrap();
        writer.write_all(contents).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

/// Gradient test image
pub fn create_test_image(width: u32, height: u32) -> image::DynamicImage {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            ((x * 255) / width.max(1)) as u8,
            ((y * 255) / height.max(1)) as u8,
            128,
        ])
    });
    image::DynamicImage::ImageRgb8(image)
}
