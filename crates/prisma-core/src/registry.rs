//! Category registry: the bijection between human-readable category labels
//! and the integer codes the classifier was trained on.
//!
//! Built once from a JSON mapping document of the form
//! `{"gender": {"1": "Male", "2": "Female"}, ...}` and read-only afterwards.
//! Codes arrive as JSON object keys and are coerced to integers on load.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RegistryError;

/// Integer code of a category, as seen by the model.
pub type Code = i64;

/// Canonical codecs that replace whatever the mapping source holds for the
/// same feature. Applied after the generic load, in this order.
pub const CATEGORY_OVERRIDES: &[(&str, &[(Code, &str)])] = &[
    (
        "occupation_skillScore",
        &[(1, "Low"), (2, "Medium"), (3, "High")],
    ),
    ("family_history", &[(1, "Yes"), (2, "No")]),
];

/// Validated bijection between codes and labels of one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    by_code: BTreeMap<Code, String>,
    by_label: HashMap<String, Code>,
}

impl Codec {
    /// Build a codec from `(code, label)` pairs.
    ///
    /// Rejects repeated codes, labels shared by two codes, and empty input.
    pub fn new<I, L>(feature: &str, pairs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (Code, L)>,
        L: Into<String>,
    {
        let mut by_code = BTreeMap::new();
        let mut by_label = HashMap::new();

        for (code, label) in pairs {
            let label = label.into();
            if by_code.contains_key(&code) {
                return Err(malformed(feature, format!("code {code} appears more than once")));
            }
            if let Some(prev) = by_label.get(&label) {
                return Err(malformed(
                    feature,
                    format!("label {label:?} is shared by codes {prev} and {code}"),
                ));
            }
            by_label.insert(label.clone(), code);
            by_code.insert(code, label);
        }

        if by_code.is_empty() {
            return Err(malformed(feature, "no categories".to_string()));
        }

        Ok(Self { by_code, by_label })
    }

    pub fn encode(&self, label: &str) -> Option<Code> {
        self.by_label.get(label).copied()
    }

    pub fn decode(&self, code: Code) -> Option<&str> {
        self.by_code.get(&code).map(String::as_str)
    }

    /// Labels in ascending code order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.by_code.values().map(String::as_str)
    }

    /// `(code, label)` pairs in ascending code order.
    pub fn pairs(&self) -> impl Iterator<Item = (Code, &str)> {
        self.by_code.iter().map(|(&c, l)| (c, l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// A named categorical input of the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    name: String,
    codec: Codec,
}

impl Feature {
    pub fn new(name: impl Into<String>, codec: Codec) -> Self {
        Self {
            name: name.into(),
            codec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// The label a form should preselect: the one with the lowest code.
    pub fn default_label(&self) -> &str {
        // Codec::new guarantees at least one category.
        self.codec.labels().next().unwrap_or_default()
    }
}

/// The mapping source disagreed with a canonical override.
///
/// The override is applied regardless; this records what was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideConflict {
    pub feature: String,
    /// Entries the source held for the feature, as raw `(code, label)` text.
    pub source_entries: Vec<(String, String)>,
}

/// Process-wide feature → code → label mapping.
///
/// Immutable once built. Share it with `Arc<Registry>`.
#[derive(Debug)]
pub struct Registry {
    features: Vec<Feature>,
    index: HashMap<String, usize>,
    conflicts: Vec<OverrideConflict>,
}

impl Registry {
    /// Load a mapping document from disk.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let file = std::fs::File::open(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_reader(std::io::BufReader::new(file))?;
        info!(
            path = %path.display(),
            features = registry.len(),
            conflicts = registry.conflicts.len(),
            "loaded category mappings"
        );
        Ok(registry)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RegistryError> {
        let doc: OrderedMap<OrderedMap<Value>> = serde_json::from_reader(reader)?;
        Self::from_document(doc)
    }

    pub fn from_json_str(source: &str) -> Result<Self, RegistryError> {
        let doc: OrderedMap<OrderedMap<Value>> = serde_json::from_str(source)?;
        Self::from_document(doc)
    }

    fn from_document(doc: OrderedMap<OrderedMap<Value>>) -> Result<Self, RegistryError> {
        // Generic load. Overridden features keep their slot in document order
        // but their source entries are set aside for the override pass.
        let mut slots: Vec<(String, Option<Codec>)> = Vec::with_capacity(doc.0.len());
        let mut shadowed: HashMap<String, Vec<(String, Value)>> = HashMap::new();

        for (name, entries) in doc.0 {
            if slots.iter().any(|(n, _)| *n == name) {
                return Err(malformed(&name, "feature appears more than once".to_string()));
            }
            if is_overridden(&name) {
                // Codes must still be integers; labels and bijection are not checked.
                if let Some((key, _)) = entries
                    .0
                    .iter()
                    .find(|(key, _)| key.trim().parse::<Code>().is_err())
                {
                    return Err(malformed(&name, format!("code {key:?} is not an integer")));
                }
                shadowed.insert(name.clone(), entries.0);
                slots.push((name, None));
                continue;
            }

            let pairs = entries
                .0
                .into_iter()
                .map(|(key, value)| coerce_entry(&name, &key, value))
                .collect::<Result<Vec<_>, _>>()?;
            let codec = Codec::new(&name, pairs)?;
            debug!(feature = %name, categories = codec.len(), "registered feature");
            slots.push((name, Some(codec)));
        }

        let conflicts = apply_overrides(&mut slots, &mut shadowed)?;

        let mut features = Vec::with_capacity(slots.len());
        let mut index = HashMap::with_capacity(slots.len());
        for (name, codec) in slots {
            let codec = codec.ok_or_else(|| malformed(&name, "no codec after overrides".into()))?;
            index.insert(name.clone(), features.len());
            features.push(Feature::new(name, codec));
        }

        Ok(Self {
            features,
            index,
            conflicts,
        })
    }

    /// Features in mapping-document order; overrides absent from the
    /// document come last.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(Feature::name)
    }

    pub fn feature(&self, name: &str) -> Result<&Feature, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.features[i])
            .ok_or_else(|| RegistryError::UnknownFeature(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Valid labels for a feature, in code order.
    pub fn labels_for(&self, feature: &str) -> Result<Vec<&str>, RegistryError> {
        Ok(self.feature(feature)?.codec.labels().collect())
    }

    pub fn encode(&self, feature: &str, label: &str) -> Result<Code, RegistryError> {
        self.feature(feature)?
            .codec
            .encode(label)
            .ok_or_else(|| RegistryError::UnknownLabel {
                feature: feature.to_string(),
                label: label.to_string(),
            })
    }

    pub fn decode(&self, feature: &str, code: Code) -> Result<&str, RegistryError> {
        self.feature(feature)?
            .codec
            .decode(code)
            .ok_or_else(|| RegistryError::UnknownCode {
                feature: feature.to_string(),
                code,
            })
    }

    /// Overrides that replaced a differing source mapping.
    pub fn override_conflicts(&self) -> &[OverrideConflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// ── Overrides ──

fn is_overridden(name: &str) -> bool {
    CATEGORY_OVERRIDES.iter().any(|(n, _)| *n == name)
}

fn apply_overrides(
    slots: &mut Vec<(String, Option<Codec>)>,
    shadowed: &mut HashMap<String, Vec<(String, Value)>>,
) -> Result<Vec<OverrideConflict>, RegistryError> {
    let mut conflicts = Vec::new();

    for &(name, canonical) in CATEGORY_OVERRIDES {
        let codec = Codec::new(name, canonical.iter().map(|&(c, l)| (c, l)))?;

        if let Some(entries) = shadowed.remove(name)
            && !source_agrees(&entries, &codec)
        {
            warn!(
                feature = name,
                source_categories = entries.len(),
                "mapping source disagrees with canonical categories; using canonical"
            );
            conflicts.push(OverrideConflict {
                feature: name.to_string(),
                source_entries: entries
                    .into_iter()
                    .map(|(k, v)| (k, label_text(&v)))
                    .collect(),
            });
        }

        match slots.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = Some(codec),
            None => slots.push((name.to_string(), Some(codec))),
        }
    }

    Ok(conflicts)
}

/// True when the source entries coerce to exactly the canonical pairs.
fn source_agrees(entries: &[(String, Value)], canonical: &Codec) -> bool {
    if entries.len() != canonical.len() {
        return false;
    }
    let mut seen = BTreeMap::new();
    for (key, value) in entries {
        let (Ok(code), Value::String(label)) = (key.trim().parse::<Code>(), value) else {
            return false;
        };
        if seen.insert(code, label.as_str()).is_some() {
            return false;
        }
    }
    seen.into_iter().eq(canonical.pairs())
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Source parsing ──

fn coerce_entry(feature: &str, key: &str, value: Value) -> Result<(Code, String), RegistryError> {
    let code = key
        .trim()
        .parse::<Code>()
        .map_err(|_| malformed(feature, format!("code {key:?} is not an integer")))?;
    match value {
        Value::String(label) => Ok((code, label)),
        other => Err(malformed(
            feature,
            format!("label for code {key:?} is not a string: {other}"),
        )),
    }
}

fn malformed(feature: &str, reason: String) -> RegistryError {
    RegistryError::MalformedMapping(format!("feature {feature}: {reason}"))
}

/// JSON object read as a list of entries, keeping document order and
/// repeated keys so that collisions can be reported instead of collapsed.
struct OrderedMap<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            entries.push((key, value));
        }
        Ok(OrderedMap(entries))
    }
}
