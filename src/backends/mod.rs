//! Engine implementations
//!
//! The ONNX Runtime backend provides both the inference engine and the
//! package compiler used by model acquisition.

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxBackend, OnnxBackendFactory, OnnxCompiler};
