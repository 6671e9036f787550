//! Model input schema: the column order the classifier was trained with.

use std::fmt;

/// Column order of the trained PRISMA model.
///
/// Part of the model's interface. Reordering it without retraining corrupts
/// every prediction.
pub const MODEL_FEATURE_ORDER: [&str; 10] = [
    "gender",
    "education",
    "spouse_edu",
    "category",
    "religion",
    "occupation_skillScore",
    "marital_status",
    "age_bin",
    "family_history",
    "hhold_asset_bin",
];

/// Ordered feature names making up one model input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureOrder(Vec<String>);

impl Default for FeatureOrder {
    fn default() -> Self {
        Self::new(MODEL_FEATURE_ORDER)
    }
}

impl FeatureOrder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero-based column of a feature.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }

    /// First name that appears more than once, if any.
    pub fn first_duplicate(&self) -> Option<&str> {
        self.0
            .iter()
            .enumerate()
            .find(|&(i, n)| self.0[..i].contains(n))
            .map(|(_, n)| n.as_str())
    }

    /// True when `names` lists exactly these features in this order.
    pub fn matches(&self, names: &[String]) -> bool {
        self.0 == names
    }
}

impl fmt::Display for FeatureOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_is_model_order() {
        let order = FeatureOrder::default();
        assert_eq!(order.len(), 10);
        assert_eq!(order.position("gender"), Some(0));
        assert_eq!(order.position("occupation_skillScore"), Some(5));
        assert_eq!(order.position("family_history"), Some(8));
        assert_eq!(order.position("hhold_asset_bin"), Some(9));
        assert!(order.first_duplicate().is_none());
    }

    #[test]
    fn matches_is_order_sensitive() {
        let order = FeatureOrder::new(["a", "b"]);
        assert!(order.matches(&["a".to_string(), "b".to_string()]));
        assert!(!order.matches(&["b".to_string(), "a".to_string()]));
        assert!(!order.matches(&["a".to_string()]));
    }

    #[test]
    fn detects_duplicates() {
        let order = FeatureOrder::new(["a", "b", "a"]);
        assert_eq!(order.first_duplicate(), Some("a"));
    }

    #[test]
    fn displays_as_list() {
        assert_eq!(FeatureOrder::new(["a", "b"]).to_string(), "[a, b]");
    }
}
