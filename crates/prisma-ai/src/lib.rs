//! Inference layer: classifier backends and the selection-to-prediction pipeline.

pub mod classifier;
pub mod pipeline;
pub mod xgboost;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

pub use classifier::{ClassLabel, Classifier, PredictionResult};
pub use pipeline::{Pipeline, PipelineError};
pub use xgboost::{ModelLoadError, XgbClassifier};
