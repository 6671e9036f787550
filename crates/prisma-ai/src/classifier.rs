//! Classifier capability and the value it produces.
//!
//! The pipeline only needs two operations from a trained model: the raw
//! binary class for one row and the class probabilities for that row. Any
//! backend (XGBoost JSON, ONNX Runtime, a test stub) plugs in through
//! [`Classifier`].

use std::fmt;
use std::sync::Arc;

use prisma_core::Code;
use serde::Serialize;

/// A trained binary classifier over one integer-coded row.
pub trait Classifier: Send + Sync {
    /// Raw class for the row. Expected to be `0` or `1`.
    fn predict(&self, row: &[Code]) -> anyhow::Result<i64>;

    /// `[p0, p1]` for the row, where `p1` is the positive-class probability.
    fn predict_proba(&self, row: &[Code]) -> anyhow::Result<[f64; 2]>;

    /// Class and probabilities from one evaluation of the model.
    ///
    /// Backends that compute both together should override this.
    fn classify(&self, row: &[Code]) -> anyhow::Result<(i64, [f64; 2])> {
        Ok((self.predict(row)?, self.predict_proba(row)?))
    }

    /// Column names the model was trained with, when the artifact records them.
    fn feature_names(&self) -> Option<&[String]> {
        None
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn predict(&self, row: &[Code]) -> anyhow::Result<i64> {
        (**self).predict(row)
    }

    fn predict_proba(&self, row: &[Code]) -> anyhow::Result<[f64; 2]> {
        (**self).predict_proba(row)
    }

    fn classify(&self, row: &[Code]) -> anyhow::Result<(i64, [f64; 2])> {
        (**self).classify(row)
    }

    fn feature_names(&self) -> Option<&[String]> {
        (**self).feature_names()
    }
}

impl<C: Classifier + ?Sized> Classifier for Arc<C> {
    fn predict(&self, row: &[Code]) -> anyhow::Result<i64> {
        (**self).predict(row)
    }

    fn predict_proba(&self, row: &[Code]) -> anyhow::Result<[f64; 2]> {
        (**self).predict_proba(row)
    }

    fn classify(&self, row: &[Code]) -> anyhow::Result<(i64, [f64; 2])> {
        (**self).classify(row)
    }

    fn feature_names(&self) -> Option<&[String]> {
        (**self).feature_names()
    }
}

/// Predicted class, rendered the way the risk form shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassLabel {
    #[serde(rename = "Yes")]
    Positive,
    #[serde(rename = "No")]
    Negative,
}

impl ClassLabel {
    /// Map the classifier's raw output. Anything but 0 or 1 is rejected.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Self::Positive),
            0 => Some(Self::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "Yes",
            Self::Negative => "No",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single inference call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    class_label: ClassLabel,
    /// Positive-class probability in `[0, 1]`.
    probability: f64,
}

impl PredictionResult {
    pub fn new(class_label: ClassLabel, probability: f64) -> Self {
        Self {
            class_label,
            probability,
        }
    }

    pub fn class_label(&self) -> ClassLabel {
        self.class_label
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Probability with four decimal digits, e.g. `"0.8000"`.
    pub fn probability_display(&self) -> String {
        format!("{:.4}", self.probability)
    }
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.4})", self.class_label, self.probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_class_mapping() {
        assert_eq!(ClassLabel::from_raw(1), Some(ClassLabel::Positive));
        assert_eq!(ClassLabel::from_raw(0), Some(ClassLabel::Negative));
        assert_eq!(ClassLabel::from_raw(2), None);
        assert_eq!(ClassLabel::from_raw(-1), None);
        assert_eq!(ClassLabel::Positive.as_str(), "Yes");
        assert_eq!(ClassLabel::Negative.to_string(), "No");
    }

    #[test]
    fn probability_has_four_digits() {
        let r = PredictionResult::new(ClassLabel::Positive, 0.8);
        assert_eq!(r.probability_display(), "0.8000");
        assert_eq!(r.to_string(), "Yes (0.8000)");

        let r = PredictionResult::new(ClassLabel::Negative, 0.123456);
        assert_eq!(r.probability_display(), "0.1235");
    }

    #[test]
    fn serializes_with_display_labels() {
        let r = PredictionResult::new(ClassLabel::Negative, 0.25);
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["class_label"], "No");
        assert_eq!(json["probability"], 0.25);
    }
}
