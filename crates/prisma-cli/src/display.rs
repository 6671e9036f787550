//! Terminal rendering of the category form, the encoded input row, and the
//! prediction.

use std::sync::Arc;

use arrow::array::{Int64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use prisma_ai::PredictionResult;
use prisma_core::{FeatureOrder, FeatureVector, Registry};

// ── Form ──

/// Print every feature with its labels in code order, marking the default.
pub fn print_features(registry: &Registry) {
    for (i, feature) in registry.features().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", feature.name());
        for (code, label) in feature.codec().pairs() {
            let marker = if label == feature.default_label() {
                "  (default)"
            } else {
                ""
            };
            println!("  {code:>3}  {label}{marker}");
        }
    }
}

// ── Input row ──

/// One row per model column: position, feature, chosen label, and code.
pub fn input_batch(
    order: &FeatureOrder,
    registry: &Registry,
    vector: &FeatureVector,
) -> anyhow::Result<RecordBatch> {
    anyhow::ensure!(
        order.len() == vector.len(),
        "row has {} codes for {} columns",
        vector.len(),
        order.len()
    );

    let labels = order
        .iter()
        .zip(vector.as_slice())
        .map(|(name, &code)| registry.decode(name, code))
        .collect::<Result<Vec<_>, _>>()?;

    let schema = Schema::new(vec![
        Field::new("column", DataType::UInt32, false),
        Field::new("feature", DataType::Utf8, false),
        Field::new("label", DataType::Utf8, false),
        Field::new("code", DataType::Int64, false),
    ]);

    Ok(RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(UInt32Array::from_iter_values(0..order.len() as u32)),
            Arc::new(StringArray::from_iter_values(order.iter())),
            Arc::new(StringArray::from(labels)),
            Arc::new(Int64Array::from(vector.as_slice().to_vec())),
        ],
    )?)
}

pub fn print_input(
    order: &FeatureOrder,
    registry: &Registry,
    vector: &FeatureVector,
) -> anyhow::Result<()> {
    let batch = input_batch(order, registry, vector)?;
    println!("User input:");
    println!("{}", arrow::util::pretty::pretty_format_batches(&[batch])?);
    Ok(())
}

// ── Prediction ──

pub fn prediction_lines(result: &PredictionResult) -> [String; 2] {
    [
        format!("The model predicts: {}", result.class_label()),
        format!(
            "The probability of the prediction being 'Yes' is: {}",
            result.probability_display()
        ),
    ]
}

pub fn print_prediction(result: &PredictionResult) {
    println!();
    for line in prediction_lines(result) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use prisma_ai::ClassLabel;
    use prisma_core::testing::sample_registry;

    #[test]
    fn input_batch_has_one_row_per_column() {
        let reg = sample_registry();
        let order = FeatureOrder::default();
        let vector = FeatureVector::new(vec![1, 2, 1, 1, 1, 1, 1, 2, 1, 1]);

        let batch = input_batch(&order, &reg, &vector).unwrap();
        assert_eq!(batch.num_rows(), 10);
        assert_eq!(batch.num_columns(), 4);

        let labels = batch
            .column_by_name("label")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(labels.value(0), "Male");
        assert_eq!(labels.value(5), "Low");
        assert_eq!(labels.value(7), "60-69");
        assert_eq!(labels.value(8), "Yes");

        let codes = batch
            .column_by_name("code")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(codes.len(), 10);
        assert_eq!(codes.value(1), 2);
    }

    #[test]
    fn input_batch_rejects_mismatched_row() {
        let reg = sample_registry();
        let vector = FeatureVector::new(vec![1, 2]);
        assert!(input_batch(&FeatureOrder::default(), &reg, &vector).is_err());

        let vector = FeatureVector::new(vec![9, 2, 1, 1, 1, 1, 1, 2, 1, 1]);
        assert!(input_batch(&FeatureOrder::default(), &reg, &vector).is_err());
    }

    #[test]
    fn prediction_text() {
        let result = PredictionResult::new(ClassLabel::Positive, 0.8);
        let [predicts, probability] = prediction_lines(&result);
        assert_eq!(predicts, "The model predicts: Yes");
        assert_eq!(
            probability,
            "The probability of the prediction being 'Yes' is: 0.8000"
        );
    }
}
