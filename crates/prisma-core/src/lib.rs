pub mod error;
pub mod registry;
pub mod schema;
pub mod selection;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::RegistryError;
pub use registry::{CATEGORY_OVERRIDES, Code, Codec, Feature, OverrideConflict, Registry};
pub use schema::{FeatureOrder, MODEL_FEATURE_ORDER};
pub use selection::{FeatureVector, Selection};
