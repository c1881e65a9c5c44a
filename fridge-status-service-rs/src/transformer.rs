//! Fitted column transformer.
//!
//! Evaluates a column transformer exported as JSON: an ordered list of steps
//! (numeric passthrough, standard scaling, one-hot encoding) applied to named
//! columns, followed by a remainder policy for unnamed columns. The output
//! layout is fixed at load time.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ArtifactError;
use crate::schema::{self, AdaptedFeatureRecord, FeatureValue};

/// Numeric input of the classifier, laid out by the transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Raised when a record falls outside what the transformer was fitted on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureTransformError {
    #[error("column '{0}' is missing from the record")]
    MissingColumn(String),

    #[error("column '{column}' expects a {expected} value, got {found}")]
    WrongType {
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("found unknown category '{value}' in column '{column}' during transform")]
    UnknownCategory { column: String, value: String },
}

/// Transformation from an adapted record to a feature vector.
pub trait FeatureTransformer: Send + Sync {
    /// Width of every vector this transformer produces
    fn n_features_out(&self) -> usize;

    fn transform(&self, record: &AdaptedFeatureRecord) -> Result<FeatureVector, FeatureTransformError>;
}

/// Policy for unseen categories in a one-hot step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    #[default]
    Error,
    /// Encode an unseen category as an all-zero block
    Ignore,
}

/// Treatment of columns no step names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remainder {
    #[default]
    Drop,
    Passthrough,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    Passthrough,
    StandardScaler {
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    OneHot {
        categories: Vec<Vec<String>>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformerStep {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(flatten)]
    pub kind: StepKind,
}

/// Exported form of a fitted column transformer
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnTransformerSpec {
    pub transformers: Vec<TransformerStep>,
    #[serde(default)]
    pub remainder: Remainder,
}

/// A validated, immutable column transformer.
#[derive(Debug, Clone)]
pub struct ColumnTransformer {
    steps: Vec<TransformerStep>,
    remainder_columns: Vec<&'static str>,
    n_features_out: usize,
}

impl ColumnTransformer {
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let spec: ColumnTransformerSpec = serde_json::from_str(json)?;
        Self::from_spec(spec)
    }

    /// Validate an exported transformer against the request schema.
    pub fn from_spec(spec: ColumnTransformerSpec) -> Result<Self, ArtifactError> {
        if spec.transformers.is_empty() {
            return Err(ArtifactError::Invalid("transformer has no steps".to_string()));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut n_features_out = 0;

        for step in &spec.transformers {
            for column in &step.columns {
                if schema::field_by_column(column).is_none() {
                    return Err(ArtifactError::Invalid(format!(
                        "step '{}' references unknown column '{}'",
                        step.name, column
                    )));
                }
                if !seen.insert(column.as_str()) {
                    return Err(ArtifactError::Invalid(format!(
                        "column '{}' is claimed by more than one step",
                        column
                    )));
                }
            }

            n_features_out += match &step.kind {
                StepKind::Passthrough => step.columns.len(),
                StepKind::StandardScaler { mean, scale } => {
                    if mean.len() != step.columns.len() || scale.len() != step.columns.len() {
                        return Err(ArtifactError::Invalid(format!(
                            "step '{}' has {} columns but {} means and {} scales",
                            step.name,
                            step.columns.len(),
                            mean.len(),
                            scale.len()
                        )));
                    }
                    if mean.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
                        return Err(ArtifactError::Invalid(format!(
                            "step '{}' has non-finite scaling parameters",
                            step.name
                        )));
                    }
                    step.columns.len()
                }
                StepKind::OneHot { categories, .. } => {
                    if categories.len() != step.columns.len() {
                        return Err(ArtifactError::Invalid(format!(
                            "step '{}' has {} columns but {} category lists",
                            step.name,
                            step.columns.len(),
                            categories.len()
                        )));
                    }
                    if let Some(pos) = categories.iter().position(|c| c.is_empty()) {
                        return Err(ArtifactError::Invalid(format!(
                            "step '{}' has no categories for column '{}'",
                            step.name, step.columns[pos]
                        )));
                    }
                    categories.iter().map(Vec::len).sum::<usize>()
                }
            };
        }

        let remainder_columns: Vec<&'static str> = match spec.remainder {
            Remainder::Drop => Vec::new(),
            Remainder::Passthrough => schema::FIELDS
                .iter()
                .map(|f| f.column)
                .filter(|c| !seen.contains(c))
                .collect(),
        };
        n_features_out += remainder_columns.len();

        Ok(Self {
            steps: spec.transformers,
            remainder_columns,
            n_features_out,
        })
    }
}

fn lookup<'a>(
    record: &'a AdaptedFeatureRecord,
    column: &str,
) -> Result<&'a FeatureValue, FeatureTransformError> {
    record
        .get(column)
        .ok_or_else(|| FeatureTransformError::MissingColumn(column.to_string()))
}

fn numeric(record: &AdaptedFeatureRecord, column: &str) -> Result<f64, FeatureTransformError> {
    match lookup(record, column)? {
        FeatureValue::Number(n) => Ok(*n),
        other => Err(FeatureTransformError::WrongType {
            column: column.to_string(),
            expected: "numeric",
            found: other.to_string(),
        }),
    }
}

impl FeatureTransformer for ColumnTransformer {
    fn n_features_out(&self) -> usize {
        self.n_features_out
    }

    fn transform(&self, record: &AdaptedFeatureRecord) -> Result<FeatureVector, FeatureTransformError> {
        let mut out = Vec::with_capacity(self.n_features_out);

        for step in &self.steps {
            match &step.kind {
                StepKind::Passthrough => {
                    for column in &step.columns {
                        out.push(numeric(record, column)?);
                    }
                }
                StepKind::StandardScaler { mean, scale } => {
                    for (i, column) in step.columns.iter().enumerate() {
                        let x = numeric(record, column)?;
                        // zero-variance columns are centred only
                        let s = if scale[i] == 0.0 { 1.0 } else { scale[i] };
                        out.push((x - mean[i]) / s);
                    }
                }
                StepKind::OneHot {
                    categories,
                    handle_unknown,
                } => {
                    for (column, fitted) in step.columns.iter().zip(categories) {
                        let value = match lookup(record, column)? {
                            FeatureValue::Text(s) => s,
                            other => {
                                return Err(FeatureTransformError::WrongType {
                                    column: column.clone(),
                                    expected: "categorical",
                                    found: other.to_string(),
                                })
                            }
                        };

                        let hit = fitted.iter().position(|c| c == value);
                        if hit.is_none() && *handle_unknown == HandleUnknown::Error {
                            return Err(FeatureTransformError::UnknownCategory {
                                column: column.clone(),
                                value: value.clone(),
                            });
                        }
                        out.extend((0..fitted.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
                    }
                }
            }
        }

        for column in &self.remainder_columns {
            out.push(numeric(record, column)?);
        }

        Ok(FeatureVector(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{adapt, RawRequestRecord};

    const FIXTURE: &str = include_str!("../tests/fixtures/column_transformer.json");

    fn record() -> RawRequestRecord {
        RawRequestRecord {
            taux_remplissage_pct: Some(72.5),
            temperature_c: Some(4.2),
            lineaire_val: Some(1.0),
            tension_v: Some(220.0),
            intensite_avant_entretien_a: Some(3.1),
            technicien_gfi: Some("T01".into()),
            division: Some("D1".into()),
            secteur: Some("S1".into()),
            partenaire: Some("P1".into()),
            ville: Some("Casablanca".into()),
            quartier: Some("Maarif".into()),
            type_frigo: Some("Vertical".into()),
            af_nf: Some("AF".into()),
            branding: Some("CocaCola".into()),
            securite: Some("Disjoncteur".into()),
            eclairage: Some("O".into()),
            purge_circuit_eaux: Some("Oui".into()),
            soufflage_parties_actives: Some("Oui".into()),
            date: Some("2024-05-01".into()),
        }
    }

    #[test]
    fn test_fixture_layout() {
        let transformer = ColumnTransformer::from_json(FIXTURE).unwrap();
        assert_eq!(transformer.n_features_out(), 34);

        let vector = transformer.transform(&adapt(&record()).unwrap()).unwrap();
        assert_eq!(vector.len(), 34);

        let v = vector.as_slice();
        // scaled numeric block
        assert!((v[0] - 0.25).abs() < 1e-12);
        assert!((v[1] - (-0.4)).abs() < 1e-12);
        assert!((v[2] - 1.0).abs() < 1e-12);
        assert!((v[3] - 0.0).abs() < 1e-12);
        assert!((v[4] - 0.1).abs() < 1e-9);
        // one indicator per one-hot column
        assert_eq!(v[5..].iter().filter(|x| **x == 1.0).count(), 13);
        assert_eq!(v[5], 1.0); // T01
        assert_eq!(v[20], 1.0); // Vertical
        assert_eq!(v[28], 0.0); // Eclairage N
        assert_eq!(v[29], 1.0); // Eclairage O
        assert_eq!(v[31], 1.0); // Purge Oui
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let transformer = ColumnTransformer::from_json(FIXTURE).unwrap();
        let mut raw = record();
        raw.ville = Some("Atlantis".into());

        let err = transformer.transform(&adapt(&raw).unwrap()).unwrap_err();
        assert_eq!(
            err,
            FeatureTransformError::UnknownCategory {
                column: "Ville".into(),
                value: "Atlantis".into(),
            }
        );
    }

    #[test]
    fn test_ignore_encodes_unknown_as_zeros() {
        let json = r#"{
            "transformers": [
                {"name": "cat", "kind": "one_hot", "columns": ["Ville"],
                 "categories": [["Casablanca", "Rabat"]], "handle_unknown": "ignore"}
            ]
        }"#;
        let transformer = ColumnTransformer::from_json(json).unwrap();
        let mut raw = record();
        raw.ville = Some("Atlantis".into());

        let vector = transformer.transform(&adapt(&raw).unwrap()).unwrap();
        assert_eq!(vector.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_remainder_passthrough_requires_numbers() {
        let json = r#"{
            "transformers": [
                {"name": "num", "kind": "passthrough", "columns": ["Tension (V)"]}
            ],
            "remainder": "passthrough"
        }"#;
        let transformer = ColumnTransformer::from_json(json).unwrap();
        assert_eq!(transformer.n_features_out(), 19);

        let err = transformer.transform(&adapt(&record()).unwrap()).unwrap_err();
        assert!(matches!(err, FeatureTransformError::WrongType { expected: "numeric", .. }));
    }

    #[test]
    fn test_numeric_step_rejects_text_column() {
        let json = r#"{
            "transformers": [
                {"name": "num", "kind": "passthrough", "columns": ["Branding"]}
            ]
        }"#;
        let transformer = ColumnTransformer::from_json(json).unwrap();
        let err = transformer.transform(&adapt(&record()).unwrap()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "column 'Branding' expects a numeric value, got 'CocaCola'"
        );
    }

    #[test]
    fn test_zero_scale_only_centres() {
        let json = r#"{
            "transformers": [
                {"name": "num", "kind": "standard_scaler", "columns": ["Tension (V)"],
                 "mean": [200.0], "scale": [0.0]}
            ]
        }"#;
        let transformer = ColumnTransformer::from_json(json).unwrap();
        let vector = transformer.transform(&adapt(&record()).unwrap()).unwrap();
        assert_eq!(vector.as_slice(), &[20.0]);
    }

    #[test]
    fn test_invalid_specs_are_rejected() {
        let unknown_column = r#"{"transformers": [
            {"name": "num", "kind": "passthrough", "columns": ["Humidity"]}]}"#;
        assert!(matches!(
            ColumnTransformer::from_json(unknown_column),
            Err(ArtifactError::Invalid(_))
        ));

        let duplicate = r#"{"transformers": [
            {"name": "a", "kind": "passthrough", "columns": ["Tension (V)"]},
            {"name": "b", "kind": "passthrough", "columns": ["Tension (V)"]}]}"#;
        assert!(ColumnTransformer::from_json(duplicate).is_err());

        let short_scale = r#"{"transformers": [
            {"name": "num", "kind": "standard_scaler", "columns": ["Tension (V)"],
             "mean": [], "scale": [1.0]}]}"#;
        assert!(ColumnTransformer::from_json(short_scale).is_err());

        assert!(matches!(
            ColumnTransformer::from_json("{not json"),
            Err(ArtifactError::Parse(_))
        ));
    }
}
