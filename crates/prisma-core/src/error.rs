use thiserror::Error;

use crate::registry::Code;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed category mapping: {0}")]
    MalformedMapping(String),

    #[error("failed to read category mapping {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("unknown label {label:?} for feature {feature}")]
    UnknownLabel { feature: String, label: String },

    #[error("unknown code {code} for feature {feature}")]
    UnknownCode { feature: String, code: Code },
}

impl RegistryError {
    /// True for errors caused by a caller-supplied identifier rather than a
    /// broken mapping source.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownFeature(_) | Self::UnknownLabel { .. } | Self::UnknownCode { .. }
        )
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedMapping(err.to_string())
    }
}
