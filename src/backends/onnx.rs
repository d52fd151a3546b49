//! ONNX Runtime engine and compiler
//!
//! The compiler runs the package's graph through ORT's Level3 graph optimizer and
//! serializes the optimized graph in ORT format (`.ort`). The backend loads that
//! artifact with execution providers chosen from the compute profile.

use crate::compile::ModelCompiler;
use crate::config::ComputeProfile;
use crate::error::{BgRemovalError, Result};
use crate::inference::{BackendFactory, EngineOutputs, InferenceBackend};
use crate::models::{PackageManifest, INPUT_TENSOR_NAME};
use async_trait::async_trait;
use instant::{Duration, Instant};
use ndarray::{Array4, Ix4};
use ort::execution_providers::{
    CoreML as CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch, CUDA as CUDAExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::{Path, PathBuf};

/// File name of the compiled artifact inside the scratch directory
const COMPILED_OUTPUT_NAME: &str = "model.ort";

/// ONNX Runtime backend for running the segmentation model
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
}

impl OnnxBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List ONNX Runtime execution providers with availability status
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool)> {
        vec![
            ("CPU".to_string(), true),
            (
                "CUDA".to_string(),
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                    .unwrap_or(false),
            ),
            (
                "CoreML".to_string(),
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false),
            ),
        ]
    }

    fn execution_providers(profile: ComputeProfile) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();

        let cuda_provider = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false);

        match profile {
            ComputeProfile::PreferAccelerator => {
                let coreml_provider = CoreMLExecutionProvider::default();
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    tracing::info!("CoreML execution provider available");
                    providers.push(coreml_provider.with_subgraphs(true).build());
                }
                if cuda_available {
                    tracing::info!("CUDA execution provider available");
                    providers.push(cuda_provider.build());
                }
            },
            ComputeProfile::CpuAndGpu => {
                if cuda_available {
                    tracing::info!("Using CUDA execution provider");
                    providers.push(cuda_provider.build());
                } else {
                    tracing::warn!("GPU requested but CUDA is not available, falling back to CPU");
                }
            },
            ComputeProfile::CpuOnly => {
                tracing::info!("Using CPU execution provider");
            },
        }

        if providers.is_empty() && profile != ComputeProfile::CpuOnly {
            tracing::warn!("No hardware acceleration available, running on CPU");
        }
        providers
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, model_path: &Path, profile: ComputeProfile) -> Result<Duration> {
        let start = Instant::now();

        let mut builder = Session::builder()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::execution_providers(profile);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                BgRemovalError::inference(format!("Failed to set execution providers: {e}"))
            })?;
        }

        let threads = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(4);
        let session = builder
            .with_intra_threads(threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                BgRemovalError::inference(format!(
                    "Failed to load model '{}': {e}",
                    model_path.display()
                ))
            })?;

        self.session = Some(session);

        let elapsed = start.elapsed();
        tracing::info!(
            model = %model_path.display(),
            %profile,
            elapsed_ms = elapsed.as_millis() as u64,
            "ONNX Runtime session created"
        );
        Ok(elapsed)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<EngineOutputs> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::inference("Backend not initialized"))?;

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session
            .run(ort::inputs![INPUT_TENSOR_NAME => input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let names: Vec<String> = outputs.keys().map(ToString::to_string).collect();
        let mut result = EngineOutputs::new();

        for name in names {
            let Some(value) = outputs.get(name.as_str()) else {
                continue;
            };
            let array = value.try_extract_array::<f32>().map_err(|e| {
                BgRemovalError::inference(format!("Failed to extract output '{name}': {e}"))
            })?;

            match array.to_owned().into_dimensionality::<Ix4>() {
                Ok(tensor) => {
                    result.insert(name, tensor);
                },
                Err(_) => {
                    tracing::debug!(output = %name, shape = ?array.shape(), "Skipping non-4D output");
                },
            }
        }

        Ok(result)
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

/// Factory creating ONNX Runtime backends
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxBackendFactory;

impl BackendFactory for OnnxBackendFactory {
    fn create_backend(&self) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(OnnxBackend::new()))
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

/// Compiles packages into optimized ORT-format models
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxCompiler;

impl OnnxCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn compile_blocking(package: &Path, scratch_dir: &Path) -> Result<PathBuf> {
        let model_file = PackageManifest::resolve_model_file(package)?;
        let output = scratch_dir.join(COMPILED_OUTPUT_NAME);
        let fail = |e: &dyn std::fmt::Display| BgRemovalError::compilation_failed(package, e.to_string());

        let session = Session::builder()
            .map_err(|e| fail(&e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| fail(&e))?
            .with_optimized_model_path(output.to_string_lossy().to_string())
            .map_err(|e| fail(&e))?
            .commit_from_file(&model_file)
            .map_err(|e| fail(&e))?;
        drop(session);

        if !output.is_file() {
            return Err(BgRemovalError::compilation_failed(
                package,
                "optimizer produced no output",
            ));
        }
        Ok(output)
    }
}

#[async_trait]
impl ModelCompiler for OnnxCompiler {
    async fn compile(&self, package: &Path, scratch_dir: &Path) -> Result<PathBuf> {
        let package_path = package.to_path_buf();
        let scratch_path = scratch_dir.to_path_buf();
        let start = Instant::now();

        let output = tokio::task::spawn_blocking(move || {
            Self::compile_blocking(&package_path, &scratch_path)
        })
        .await
        .map_err(|e| {
            BgRemovalError::compilation_failed(package, format!("compilation task failed: {e}"))
        })??;

        tracing::info!(
            package = %package.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Compiled model package"
        );
        Ok(output)
    }
}
