//! Selection → feature vector → prediction.
//!
//! The pipeline owns the contract between the category registry and the
//! trained model: labels are encoded through the registry and laid out in
//! [`FeatureOrder`], never in registry iteration order.

use std::sync::Arc;

use prisma_core::{FeatureOrder, FeatureVector, Registry, RegistryError, Selection};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::classifier::{ClassLabel, Classifier, PredictionResult};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("selection is missing feature {0}")]
    MissingFeature(String),

    #[error("invalid feature order: {0}")]
    InvalidFeatureOrder(String),

    #[error("feature order {order} does not match model feature names [{}]", .model.join(", "))]
    FeatureOrderMismatch {
        order: FeatureOrder,
        model: Vec<String>,
    },

    #[error("model invocation failed: {0:#}")]
    ModelInvocation(anyhow::Error),
}

impl PipelineError {
    /// True for errors the user can fix by resubmitting different input.
    ///
    /// Everything else means the mapping, the model, or their pairing is
    /// broken.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_input_error(),
            Self::MissingFeature(_) => true,
            Self::InvalidFeatureOrder(_)
            | Self::FeatureOrderMismatch { .. }
            | Self::ModelInvocation(_) => false,
        }
    }
}

/// Encodes selections and runs the classifier on them.
pub struct Pipeline<C> {
    registry: Arc<Registry>,
    order: FeatureOrder,
    classifier: C,
}

impl<C: Classifier> Pipeline<C> {
    /// Pipeline over the trained model's column order.
    pub fn new(registry: Arc<Registry>, classifier: C) -> Result<Self, PipelineError> {
        Self::with_order(registry, FeatureOrder::default(), classifier)
    }

    /// Pipeline over an explicit column order.
    ///
    /// Every ordered feature must be registered, and when the model records
    /// its own column names they must match the order exactly.
    pub fn with_order(
        registry: Arc<Registry>,
        order: FeatureOrder,
        classifier: C,
    ) -> Result<Self, PipelineError> {
        if order.is_empty() {
            return Err(PipelineError::InvalidFeatureOrder("no features".to_string()));
        }
        if let Some(dup) = order.first_duplicate() {
            return Err(PipelineError::InvalidFeatureOrder(format!(
                "{dup} appears more than once"
            )));
        }
        if let Some(missing) = order.iter().find(|name| !registry.contains(name)) {
            return Err(PipelineError::InvalidFeatureOrder(format!(
                "{missing} is not in the category registry"
            )));
        }
        if let Some(model) = classifier.feature_names()
            && !order.matches(model)
        {
            return Err(PipelineError::FeatureOrderMismatch {
                order,
                model: model.to_vec(),
            });
        }

        info!(
            features = order.len(),
            model_names = classifier.feature_names().is_some(),
            "inference pipeline ready"
        );
        Ok(Self {
            registry,
            order,
            classifier,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn order(&self) -> &FeatureOrder {
        &self.order
    }

    /// Encode a selection into a row in model column order.
    ///
    /// Keys outside the order are ignored; every ordered feature must be
    /// present.
    pub fn encode_selection(&self, selection: &Selection) -> Result<FeatureVector, PipelineError> {
        let codes = self
            .order
            .iter()
            .map(|name| {
                let label = selection
                    .get(name)
                    .ok_or_else(|| PipelineError::MissingFeature(name.to_string()))?;
                Ok(self.registry.encode(name, label)?)
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        debug!(row = ?codes, "encoded selection");
        Ok(FeatureVector::new(codes))
    }

    /// Run the classifier on one encoded row.
    ///
    /// Classifier failures and out-of-contract outputs become
    /// [`PipelineError::ModelInvocation`]. Nothing is retried.
    pub fn predict(&self, vector: &FeatureVector) -> Result<PredictionResult, PipelineError> {
        let row = vector.as_slice();

        let (raw, [_, p1]) = self.classifier.classify(row).map_err(invocation_failed)?;

        let class_label = ClassLabel::from_raw(raw).ok_or_else(|| {
            invocation_failed(anyhow::anyhow!(
                "classifier returned class {raw}, expected 0 or 1"
            ))
        })?;
        if !(0.0..=1.0).contains(&p1) {
            return Err(invocation_failed(anyhow::anyhow!(
                "classifier returned positive-class probability {p1}, expected a value in [0, 1]"
            )));
        }

        debug!(class = class_label.as_str(), probability = p1, "prediction");
        Ok(PredictionResult::new(class_label, p1))
    }

    /// Encode and predict in one step.
    pub fn run(&self, selection: &Selection) -> Result<PredictionResult, PipelineError> {
        let vector = self.encode_selection(selection)?;
        self.predict(&vector)
    }
}

fn invocation_failed(err: anyhow::Error) -> PipelineError {
    error!(error = %format!("{err:#}"), "model invocation failed");
    PipelineError::ModelInvocation(err)
}
