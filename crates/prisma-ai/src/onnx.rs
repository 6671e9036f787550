//! ONNX Runtime backend for classifiers exported with `onnxmltools` /
//! `skl2onnx`.
//!
//! Expects a single float input of shape `[batch, n_features]`, a label
//! output (`int64`, first) and a probability output (`float [batch, 2]`,
//! second), which is what the XGBoost and scikit-learn converters emit
//! with `zipmap` disabled.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use prisma_core::Code;
use tracing::info;

use crate::classifier::Classifier;

/// Binary classifier evaluated by ONNX Runtime.
pub struct OnnxClassifier {
    // Session::run needs exclusive access.
    session: Mutex<Session>,
    input_name: String,
    width: Option<usize>,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path) -> anyhow::Result<Self> {
        anyhow::ensure!(model_path.exists(), "{model_path:?} not found");

        let session = Session::builder()?.commit_from_file(model_path)?;
        anyhow::ensure!(
            session.inputs().len() == 1,
            "expected one model input, found {}",
            session.inputs().len()
        );
        anyhow::ensure!(
            session.outputs().len() >= 2,
            "expected label and probability outputs, found {}",
            session.outputs().len()
        );

        let input_name = session.inputs()[0].name().to_string();
        let width = infer_width(session.inputs()[0].dtype());

        info!(
            model = %model_path.display(),
            input = %input_name,
            width = ?width,
            "loaded ONNX classifier"
        );
        Ok(Self {
            session: Mutex::new(session),
            input_name,
            width,
        })
    }

    /// Run the model on one row, returning `(label, [p0, p1])`.
    fn run(&self, row: &[Code]) -> anyhow::Result<(i64, [f64; 2])> {
        if let Some(width) = self.width {
            anyhow::ensure!(
                row.len() == width,
                "model expects {width} features, got {}",
                row.len()
            );
        }

        let values: Vec<f32> = row.iter().map(|&c| c as f32).collect();
        let shape = [1i64, row.len() as i64];
        let input = Tensor::from_array((shape, values.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("ONNX session lock poisoned"))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;

        let (_, labels) = outputs[0].try_extract_tensor::<i64>()?;
        let label = *labels
            .first()
            .ok_or_else(|| anyhow::anyhow!("empty label output"))?;

        let (proba_shape, proba) = outputs[1].try_extract_tensor::<f32>()?;
        let dims: &[i64] = proba_shape;
        anyhow::ensure!(
            dims.last() == Some(&2) && proba.len() >= 2,
            "unexpected probability shape: {dims:?}, expected [1, 2]"
        );

        Ok((label, [f64::from(proba[0]), f64::from(proba[1])]))
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, row: &[Code]) -> anyhow::Result<i64> {
        Ok(self.run(row)?.0)
    }

    fn predict_proba(&self, row: &[Code]) -> anyhow::Result<[f64; 2]> {
        Ok(self.run(row)?.1)
    }

    fn classify(&self, row: &[Code]) -> anyhow::Result<(i64, [f64; 2])> {
        self.run(row)
    }
}

/// Number of features from the model input type, when it is fixed.
fn infer_width(input_type: &ort::value::ValueType) -> Option<usize> {
    match input_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
