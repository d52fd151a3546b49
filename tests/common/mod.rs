//! Shared helpers for integration tests
//!
//! `HttpStub` is an axum server on a loopback port. Every request goes through
//! one fallback handler that answers from a route table and records the
//! requested path; unknown paths get a 404.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use imgly_bgremove_pipeline::{
    BackendFactory, ComputeProfile, EngineOutputs, InferenceBackend, ModelCompiler,
    ModelRepository, ModelVariant, ProgressReporter, Result,
};
use ndarray::Array4;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const MANIFEST_JSON: &str =
    r#"{"format_version":1,"model_path":"Data/model.onnx","weights":["Data/weights/weight.bin"]}"#;

#[derive(Clone, Default)]
struct StubState {
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

async fn serve_route(State(state): State<StubState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    state.hits.lock().unwrap().push(path.clone());

    let route = state.routes.lock().unwrap().get(&path).cloned();
    match route {
        Some((status, body)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, body).into_response()
        },
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

pub struct HttpStub {
    base_url: String,
    state: StubState,
    handle: JoinHandle<()>,
}

impl HttpStub {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = StubState::default();

        let app = Router::new()
            .fallback(serve_route)
            .with_state(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            handle,
        }
    }

    /// Repository whose URLs point at this stub
    pub fn repository(&self) -> ModelRepository {
        ModelRepository::new(self.base_url.clone(), "imgly", "test-models")
    }

    /// Serve `body` with status 200 at an absolute URL of this stub
    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.respond(url, 200, body);
    }

    pub fn respond(&self, url: &str, status: u16, body: Vec<u8>) {
        let path = self.path_of(url);
        self.state.routes.lock().unwrap().insert(path, (status, body));
    }

    /// Paths requested so far
    pub fn hits(&self) -> Vec<String> {
        self.state.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, url: &str) -> usize {
        let path = self.path_of(url);
        self.hits().iter().filter(|hit| **hit == path).count()
    }

    fn path_of(&self, url: &str) -> String {
        url.strip_prefix(&self.base_url).unwrap_or(url).to_string()
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Zip archive from `(name, contents)` pairs, stored without compression
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Bulk archive of a complete package nested under its directory name
pub fn package_archive(variant: ModelVariant) -> Vec<u8> {
    let package = variant.package_file_name();
    let manifest = format!("{package}/Manifest.json");
    let model = format!("{package}/Data/model.onnx");
    let weights = format!("{package}/Data/weights/weight.bin");
    build_zip(&[
        (manifest.as_str(), MANIFEST_JSON.as_bytes()),
        (model.as_str(), b"graph"),
        (weights.as_str(), b"weights"),
    ])
}

/// Compiler that copies the package's graph into `scratch/compiled.ort`
#[derive(Debug, Default)]
pub struct CountingCompiler {
    calls: AtomicUsize,
}

impl CountingCompiler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelCompiler for CountingCompiler {
    async fn compile(&self, package: &Path, scratch_dir: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let source = if package.is_dir() {
            package.join("Data/model.onnx")
        } else {
            package.to_path_buf()
        };
        let output = scratch_dir.join("compiled.ort");
        let mut contents = b"compiled:".to_vec();
        contents.extend(std::fs::read(&source)?);
        std::fs::write(&output, contents)?;
        Ok(output)
    }
}

/// Records every reported fraction
#[derive(Debug, Default)]
pub struct RecordingReporter {
    fractions: Mutex<Vec<f32>>,
}

impl RecordingReporter {
    pub fn fractions(&self) -> Vec<f32> {
        self.fractions.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, fraction: f32, _label: &str) {
        self.fractions.lock().unwrap().push(fraction);
    }
}

/// Engine that returns a constant mask of the input's spatial size
pub struct ConstantMaskBackend {
    value: f32,
    initialized: bool,
}

impl InferenceBackend for ConstantMaskBackend {
    fn initialize(
        &mut self,
        _model_path: &Path,
        _profile: ComputeProfile,
    ) -> Result<instant::Duration> {
        self.initialized = true;
        Ok(instant::Duration::ZERO)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<EngineOutputs> {
        let (_, _, h, w) = input.dim();
        let mut outputs = EngineOutputs::new();
        outputs.insert(
            "output_image".to_string(),
            Array4::from_elem((1, 1, h, w), self.value),
        );
        Ok(outputs)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

pub struct ConstantMaskFactory {
    pub value: f32,
}

impl BackendFactory for ConstantMaskFactory {
    fn create_backend(&self) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(ConstantMaskBackend {
            value: self.value,
            initialized: false,
        }))
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}
