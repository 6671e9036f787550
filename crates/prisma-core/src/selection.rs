//! Per-request values: the label chosen for each feature, and the encoded
//! row handed to the classifier.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::registry::{Code, Registry};

/// Feature name → chosen label, as supplied by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(HashMap<String, String>);

impl Selection {
    /// Every registered feature set to its first label, as a fresh form
    /// would show it.
    pub fn with_defaults(registry: &Registry) -> Self {
        registry
            .features()
            .map(|f| (f.name(), f.default_label()))
            .collect()
    }

    /// Set the label for a feature, returning the previous one.
    pub fn insert(&mut self, feature: impl Into<String>, label: impl Into<String>) -> Option<String> {
        self.0.insert(feature.into(), label.into())
    }

    pub fn remove(&mut self, feature: &str) -> Option<String> {
        self.0.remove(feature)
    }

    pub fn get(&self, feature: &str) -> Option<&str> {
        self.0.get(feature).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Selection {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One encoded model input row, in model column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<Code>);

impl FeatureVector {
    pub fn new(codes: Vec<Code>) -> Self {
        Self(codes)
    }

    pub fn as_slice(&self) -> &[Code] {
        &self.0
    }

    pub fn get(&self, column: usize) -> Option<Code> {
        self.0.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
