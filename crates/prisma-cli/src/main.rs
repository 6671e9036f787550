use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use prisma_ai::{Classifier, Pipeline, PipelineError, PredictionResult, XgbClassifier};
use prisma_core::{FeatureOrder, FeatureVector, OverrideConflict, Registry, RegistryError, Selection};
use tracing::{error, info, warn};

mod display;

/// Preventable Factors-based Risk Indicator for Screening and Measurement
/// of Alzheimer's.
#[derive(Parser)]
#[command(name = "prisma", version)]
struct Cli {
    /// Category mapping document (feature → code → label).
    #[arg(long, env = "PRISMA_MAPPINGS", default_value = "mappings.json", global = true)]
    mappings: PathBuf,

    /// Trained classifier: XGBoost JSON, or `.onnx` when built with the `onnx` feature.
    #[arg(long, env = "PRISMA_MODEL", default_value = "xgb_model.json", global = true)]
    model: PathBuf,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every feature and its labels in code order.
    Features,

    /// Predict risk from a selection. Features not set take their first label.
    Predict {
        /// Choose a label for a feature, e.g. `--set age_bin=60-69`.
        #[arg(long = "set", value_name = "FEATURE=LABEL", value_parser = parse_assignment)]
        set: Vec<(String, String)>,

        /// Print the encoded row and prediction as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Load mapping and model, and check that they agree.
    Check,
}

/// Exit status for errors the user can fix by changing their input.
const INPUT_ERROR: u8 = 2;
/// Exit status for a broken mapping, model, or environment.
const SYSTEM_ERROR: u8 = 1;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let status = exit_status(&err);
            if status == INPUT_ERROR {
                eprintln!("error: {err:#}");
            } else {
                error!("{err:#}");
            }
            ExitCode::from(status)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Features => {
            let registry = Registry::load(&cli.mappings)?;
            display::print_features(&registry);
        }
        Command::Predict { set, json } => {
            let outcome = predict(&cli.mappings, &cli.model, set)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            } else {
                display::print_input(&outcome.order, &outcome.registry, &outcome.vector)?;
                display::print_prediction(&outcome.result);
            }
        }
        Command::Check => {
            let report = check(&cli.mappings, &cli.model)?;
            for conflict in &report.conflicts {
                let entries: Vec<String> = conflict
                    .source_entries
                    .iter()
                    .map(|(code, label)| format!("{code}={label}"))
                    .collect();
                println!(
                    "override: {} replaced source categories [{}]",
                    conflict.feature,
                    entries.join(", ")
                );
            }
            println!("ok: {} features {}", report.order.len(), report.order);
        }
    }
    Ok(())
}

/// Everything one `predict` request produced.
struct PredictOutcome {
    registry: Arc<Registry>,
    order: FeatureOrder,
    selection: Selection,
    vector: FeatureVector,
    result: PredictionResult,
}

impl PredictOutcome {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "selection": self.selection,
            "features": self.order.names(),
            "row": self.vector,
            "prediction": {
                "class_label": self.result.class_label(),
                "probability": self.result.probability(),
                "probability_display": self.result.probability_display(),
            },
        })
    }
}

/// Load mapping and model, fill unset features with their first label,
/// apply the assignments, and predict.
fn predict(
    mappings: &Path,
    model: &Path,
    assignments: Vec<(String, String)>,
) -> anyhow::Result<PredictOutcome> {
    let registry = Arc::new(Registry::load(mappings)?);
    let pipeline = Pipeline::new(registry.clone(), load_classifier(model)?)?;

    let mut selection = Selection::with_defaults(&registry);
    for (feature, label) in assignments {
        if !registry.contains(&feature) {
            warn!(feature = %feature, "not a model feature, ignoring");
        }
        selection.insert(feature, label);
    }

    let vector = pipeline.encode_selection(&selection)?;
    let result = pipeline.predict(&vector)?;

    Ok(PredictOutcome {
        registry,
        order: pipeline.order().clone(),
        selection,
        vector,
        result,
    })
}

struct CheckReport {
    conflicts: Vec<OverrideConflict>,
    order: FeatureOrder,
}

/// Load mapping and model and confirm the pipeline accepts the pair.
fn check(mappings: &Path, model: &Path) -> anyhow::Result<CheckReport> {
    let registry = Arc::new(Registry::load(mappings)?);
    let conflicts = registry.override_conflicts().to_vec();
    let classifier = load_classifier(model)?;
    let named = classifier.feature_names().is_some();
    let pipeline = Pipeline::new(registry, classifier)?;
    info!(
        features = pipeline.order().len(),
        validated_against_model = named,
        "mapping and model agree"
    );
    Ok(CheckReport {
        conflicts,
        order: pipeline.order().clone(),
    })
}

fn load_classifier(path: &Path) -> anyhow::Result<Box<dyn Classifier>> {
    if path.extension().is_some_and(|ext| ext == "onnx") {
        #[cfg(feature = "onnx")]
        {
            let model = prisma_ai::OnnxClassifier::load(path)
                .with_context(|| format!("loading ONNX model {}", path.display()))?;
            return Ok(Box::new(model));
        }
        #[cfg(not(feature = "onnx"))]
        anyhow::bail!(
            "{} is an ONNX model; rebuild with `--features onnx`",
            path.display()
        );
    }

    let model = XgbClassifier::load(path)
        .with_context(|| format!("loading XGBoost model {}", path.display()))?;
    Ok(Box::new(model))
}

/// Parse `feature=label`. The label may itself contain `=`.
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (feature, label) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FEATURE=LABEL, got {s:?}"))?;
    let feature = feature.trim();
    if feature.is_empty() {
        return Err(format!("missing feature name in {s:?}"));
    }
    Ok((feature.to_string(), label.trim().to_string()))
}

fn exit_status(err: &anyhow::Error) -> u8 {
    if is_input_error(err) {
        INPUT_ERROR
    } else {
        SYSTEM_ERROR
    }
}

/// Errors the user can fix by changing their input.
fn is_input_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<PipelineError>()
            .is_some_and(PipelineError::is_input_error)
            || cause
                .downcast_ref::<RegistryError>()
                .is_some_and(RegistryError::is_input_error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prisma_ai::ClassLabel;
    use prisma_core::testing::SAMPLE_MAPPINGS;

    /// One stump on `age_bin` (column 7): codes 1-2 → -0.5, codes 3-4 → 1.0.
    fn age_model(feature_names: &str) -> String {
        format!(
            r#"{{
                "learner": {{
                    {feature_names}
                    "gradient_booster": {{
                        "name": "gbtree",
                        "model": {{
                            "trees": [{{
                                "left_children": [1, -1, -1],
                                "right_children": [2, -1, -1],
                                "split_indices": [7, 0, 0],
                                "split_conditions": [2.5, -0.5, 1.0],
                                "base_weights": [0.0, -0.5, 1.0],
                                "split_type": [0, 0, 0]
                            }}]
                        }}
                    }},
                    "objective": {{"name": "binary:logistic"}},
                    "learner_model_param": {{"base_score": "5E-1", "num_feature": "10"}}
                }}
            }}"#
        )
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        mappings: PathBuf,
        model: PathBuf,
    }

    fn fixture(model_json: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mappings = dir.path().join("mappings.json");
        let model = dir.path().join("xgb_model.json");
        std::fs::write(&mappings, SAMPLE_MAPPINGS).unwrap();
        std::fs::write(&model, model_json).unwrap();
        Fixture {
            _dir: dir,
            mappings,
            model,
        }
    }

    fn set(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|&(f, l)| (f.to_string(), l.to_string()))
            .collect()
    }

    fn names_json() -> String {
        let names: Vec<String> = prisma_core::MODEL_FEATURE_ORDER
            .iter()
            .map(|n| format!("{n:?}"))
            .collect();
        format!(r#""feature_names": [{}],"#, names.join(", "))
    }

    #[test]
    fn unset_features_take_their_first_label() {
        let fx = fixture(&age_model(""));
        let out = predict(&fx.mappings, &fx.model, Vec::new()).unwrap();

        assert_eq!(out.selection.get("gender"), Some("Male"));
        assert_eq!(out.selection.get("occupation_skillScore"), Some("Low"));
        assert_eq!(out.selection.get("family_history"), Some("Yes"));
        assert_eq!(out.vector.as_slice(), &[1; 10]);
        assert_eq!(out.result.class_label(), ClassLabel::Negative);
        assert_eq!(out.result.probability_display(), "0.3775");
    }

    #[test]
    fn set_overrides_the_default() {
        let fx = fixture(&age_model(""));
        let out = predict(
            &fx.mappings,
            &fx.model,
            set(&[("age_bin", "70-79"), ("family_history", "No")]),
        )
        .unwrap();

        assert_eq!(out.selection.get("age_bin"), Some("70-79"));
        assert_eq!(out.vector.as_slice(), &[1, 1, 1, 1, 1, 1, 1, 3, 2, 1]);
        assert_eq!(out.result.class_label(), ClassLabel::Positive);
        assert_eq!(out.result.probability_display(), "0.7311");
    }

    #[test]
    fn unknown_set_key_is_ignored() {
        let fx = fixture(&age_model(""));
        let plain = predict(&fx.mappings, &fx.model, Vec::new()).unwrap();
        let extra = predict(&fx.mappings, &fx.model, set(&[("foo", "bar")])).unwrap();

        assert_eq!(extra.vector, plain.vector);
        assert_eq!(extra.result, plain.result);
    }

    #[test]
    fn json_output_shape() {
        let fx = fixture(&age_model(""));
        let out = predict(&fx.mappings, &fx.model, set(&[("age_bin", "80+")])).unwrap();
        let json = out.to_json();

        assert_eq!(json["selection"]["age_bin"], "80+");
        assert_eq!(json["features"].as_array().unwrap().len(), 10);
        assert_eq!(json["features"][7], "age_bin");
        assert_eq!(json["row"][7], 4);
        assert_eq!(json["prediction"]["class_label"], "Yes");
        assert_eq!(json["prediction"]["probability_display"], "0.7311");
        assert!(json["prediction"]["probability"].is_f64());
    }

    #[test]
    fn check_reports_override_conflicts() {
        let fx = fixture(&age_model(&names_json()));
        let report = check(&fx.mappings, &fx.model).unwrap();

        let features: Vec<&str> = report.conflicts.iter().map(|c| c.feature.as_str()).collect();
        assert_eq!(features, vec!["occupation_skillScore", "family_history"]);
        assert_eq!(report.order, FeatureOrder::default());
    }

    #[test]
    fn input_errors_exit_with_two() {
        let fx = fixture(&age_model(""));
        let err = predict(&fx.mappings, &fx.model, set(&[("gender", "Other")]))
            .err()
            .unwrap();
        assert_eq!(exit_status(&err), INPUT_ERROR);
    }

    #[test]
    fn system_errors_exit_with_one() {
        let fx = fixture(&age_model(""));

        let err = predict(&fx.mappings, &fx.mappings.with_file_name("absent.json"), Vec::new())
            .err()
            .unwrap();
        assert_eq!(exit_status(&err), SYSTEM_ERROR);

        let err = check(&fx.model, &fx.model).err().unwrap();
        assert_eq!(exit_status(&err), SYSTEM_ERROR);

        // Model columns in a different order than the pipeline's.
        let swapped = names_json().replacen(
            r#""gender", "education""#,
            r#""education", "gender""#,
            1,
        );
        let fx = fixture(&age_model(&swapped));
        let err = check(&fx.mappings, &fx.model).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::FeatureOrderMismatch { .. })
        ));
        assert_eq!(exit_status(&err), SYSTEM_ERROR);
    }

    #[test]
    fn run_dispatches_predict_from_arguments() {
        let fx = fixture(&age_model(""));
        let args = |label: &str| {
            let argv: Vec<std::ffi::OsString> = vec![
                "prisma".into(),
                "--mappings".into(),
                fx.mappings.clone().into(),
                "--model".into(),
                fx.model.clone().into(),
                "predict".into(),
                "--set".into(),
                label.into(),
                "--json".into(),
            ];
            Cli::try_parse_from(argv).unwrap()
        };

        assert!(run(args("age_bin=60-69")).is_ok());
        let err = run(args("age_bin=20-29")).unwrap_err();
        assert_eq!(exit_status(&err), INPUT_ERROR);
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(
            parse_assignment("age_bin=60-69").unwrap(),
            ("age_bin".to_string(), "60-69".to_string())
        );
        assert_eq!(
            parse_assignment(" marital_status = Never married ").unwrap(),
            ("marital_status".to_string(), "Never married".to_string())
        );
        assert_eq!(
            parse_assignment("category=A=B").unwrap(),
            ("category".to_string(), "A=B".to_string())
        );
        assert!(parse_assignment("age_bin").is_err());
        assert!(parse_assignment("=60-69").is_err());
    }

    #[test]
    fn classifies_errors_for_exit_status() {
        let input: anyhow::Error = PipelineError::MissingFeature("religion".into()).into();
        assert!(is_input_error(&input));

        let input: anyhow::Error = PipelineError::from(RegistryError::UnknownLabel {
            feature: "gender".into(),
            label: "Other".into(),
        })
        .into();
        assert!(is_input_error(&input));

        let system: anyhow::Error =
            PipelineError::ModelInvocation(anyhow::anyhow!("expected 10 features")).into();
        assert!(!is_input_error(&system));

        let system: anyhow::Error = RegistryError::MalformedMapping("bad".into()).into();
        assert!(!is_input_error(&system));
    }

    #[test]
    fn cli_reads_repeated_sets() {
        let cli = Cli::try_parse_from([
            "prisma",
            "--mappings",
            "m.json",
            "predict",
            "--set",
            "gender=Female",
            "--set",
            "age_bin=70-79",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.mappings, PathBuf::from("m.json"));
        match cli.command {
            Command::Predict { set, json } => {
                assert!(json);
                assert_eq!(set.len(), 2);
                assert_eq!(set[1], ("age_bin".to_string(), "70-79".to_string()));
            }
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn onnx_path_without_feature_is_reported() {
        if cfg!(feature = "onnx") {
            return;
        }
        let err = load_classifier(Path::new("model.onnx")).err().unwrap();
        assert!(err.to_string().contains("--features onnx"));
    }
}
