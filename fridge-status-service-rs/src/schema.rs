//! Request schema and the adapter onto the fitted column names.
//!
//! The fitted artifacts are bound to the column names of the historical
//! maintenance spreadsheet. Clients use ASCII-friendly keys instead; this
//! module is the only place where the two conventions meet.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::Deserialize;

/// Value type carried by a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    /// Integer restricted to 0 or 1
    Indicator,
    Text,
}

/// One required field: its external key, fitted column name and type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub external: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

const fn field(external: &'static str, column: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { external, column, kind }
}

pub const TAUX_REMPLISSAGE: FieldSpec =
    field("Taux_remplissage_pct", "Taux_remplissage (en %)", FieldKind::Float);
pub const TEMPERATURE: FieldSpec = field("Temperature_C", "Température (en °C)", FieldKind::Float);
pub const LINEAIRE: FieldSpec = field("Lineaire_val", "Linéaire (1 / 0)", FieldKind::Indicator);
pub const TENSION: FieldSpec = field("Tension_V", "Tension (V)", FieldKind::Float);
pub const INTENSITE_AVANT: FieldSpec = field(
    "Intensite_avant_entretien_A",
    "Intensité avant entretien (en A)",
    FieldKind::Float,
);
pub const TECHNICIEN: FieldSpec = field("Technicien_GFI", "Technicien_GFI", FieldKind::Text);
pub const DIVISION: FieldSpec = field("Division", "Division", FieldKind::Text);
pub const SECTEUR: FieldSpec = field("Secteur", "Secteur", FieldKind::Text);
pub const PARTENAIRE: FieldSpec = field("Partenaire", "Partenaire", FieldKind::Text);
pub const VILLE: FieldSpec = field("Ville", "Ville", FieldKind::Text);
pub const QUARTIER: FieldSpec = field("Quartier", "Quartier", FieldKind::Text);
pub const TYPE_FRIGO: FieldSpec = field("Type_Frigo", "Type_Frigo", FieldKind::Text);
pub const AF_NF: FieldSpec = field("AF_NF", "AF / NF", FieldKind::Text);
pub const BRANDING: FieldSpec = field("Branding", "Branding", FieldKind::Text);
pub const SECURITE: FieldSpec =
    field("Securite", "Securité ( Disjoncteur / Régulateur )", FieldKind::Text);
pub const ECLAIRAGE: FieldSpec = field("Eclairage", "Eclairage (O / N )", FieldKind::Text);
pub const PURGE_CIRCUIT_EAUX: FieldSpec = field(
    "Purge_circuit_eaux",
    "Purge du circuit d'évaluation des eaux",
    FieldKind::Text,
);
pub const SOUFFLAGE_PARTIES_ACTIVES: FieldSpec = field(
    "Soufflage_parties_actives",
    "Soufflage des parties actives à l'air",
    FieldKind::Text,
);
pub const DATE: FieldSpec = field("Date", "Date", FieldKind::Text);

/// Every required field, in the column order the artifacts were fitted with.
pub static FIELDS: [FieldSpec; 19] = [
    TAUX_REMPLISSAGE,
    TEMPERATURE,
    LINEAIRE,
    TENSION,
    INTENSITE_AVANT,
    TECHNICIEN,
    DIVISION,
    SECTEUR,
    PARTENAIRE,
    VILLE,
    QUARTIER,
    TYPE_FRIGO,
    AF_NF,
    BRANDING,
    SECURITE,
    ECLAIRAGE,
    PURGE_CIRCUIT_EAUX,
    SOUFFLAGE_PARTIES_ACTIVES,
    DATE,
];

/// Look up a field by its fitted column name.
pub fn field_by_column(column: &str) -> Option<&'static FieldSpec> {
    COLUMN_INDEX.get(column).copied()
}

static COLUMN_INDEX: Lazy<HashMap<&'static str, &'static FieldSpec>> =
    Lazy::new(|| FIELDS.iter().map(|f| (f.column, f)).collect());

/// One maintenance observation as sent by clients.
///
/// Every field is optional at the deserialization layer so that an absent key
/// is reported by the adapter, naming the field, instead of by the JSON
/// decoder. `null` counts as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRequestRecord {
    #[serde(rename = "Taux_remplissage_pct")]
    pub taux_remplissage_pct: Option<f64>,
    #[serde(rename = "Temperature_C")]
    pub temperature_c: Option<f64>,
    /// Integral floats such as `1.0` are accepted
    #[serde(rename = "Lineaire_val")]
    pub lineaire_val: Option<f64>,
    #[serde(rename = "Tension_V")]
    pub tension_v: Option<f64>,
    #[serde(rename = "Intensite_avant_entretien_A")]
    pub intensite_avant_entretien_a: Option<f64>,
    #[serde(rename = "Technicien_GFI")]
    pub technicien_gfi: Option<String>,
    #[serde(rename = "Division")]
    pub division: Option<String>,
    #[serde(rename = "Secteur")]
    pub secteur: Option<String>,
    #[serde(rename = "Partenaire")]
    pub partenaire: Option<String>,
    #[serde(rename = "Ville")]
    pub ville: Option<String>,
    #[serde(rename = "Quartier")]
    pub quartier: Option<String>,
    #[serde(rename = "Type_Frigo")]
    pub type_frigo: Option<String>,
    #[serde(rename = "AF_NF")]
    pub af_nf: Option<String>,
    #[serde(rename = "Branding")]
    pub branding: Option<String>,
    #[serde(rename = "Securite")]
    pub securite: Option<String>,
    #[serde(rename = "Eclairage")]
    pub eclairage: Option<String>,
    #[serde(rename = "Purge_circuit_eaux")]
    pub purge_circuit_eaux: Option<String>,
    #[serde(rename = "Soufflage_parties_actives")]
    pub soufflage_parties_actives: Option<String>,
    #[serde(rename = "Date")]
    pub date: Option<String>,
}

/// A single cell of the adapted record
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            FeatureValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s),
            FeatureValue::Number(_) => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(n) => write!(f, "{}", n),
            FeatureValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// The request values keyed by fitted column name, in [`FIELDS`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedFeatureRecord {
    columns: Vec<(&'static str, FeatureValue)>,
}

impl AdaptedFeatureRecord {
    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(FeatureValue::as_number)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FeatureValue::as_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FeatureValue)> {
        self.columns.iter().map(|(name, value)| (*name, value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Raised when a request cannot be projected onto the fitted columns.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaMappingError {
    #[error("missing required field '{external}' (column '{column}')")]
    MissingField {
        external: &'static str,
        column: &'static str,
    },

    #[error("invalid value for field '{external}' (column '{column}'): {reason}")]
    InvalidField {
        external: &'static str,
        column: &'static str,
        reason: String,
    },
}

impl SchemaMappingError {
    /// Fitted column name of the offending field
    pub fn column(&self) -> &'static str {
        match self {
            Self::MissingField { column, .. } | Self::InvalidField { column, .. } => column,
        }
    }

    fn missing(spec: &FieldSpec) -> Self {
        Self::MissingField {
            external: spec.external,
            column: spec.column,
        }
    }
}

type Cell = (&'static str, FeatureValue);

fn float(spec: &FieldSpec, value: Option<f64>) -> Result<Cell, SchemaMappingError> {
    let value = value.ok_or_else(|| SchemaMappingError::missing(spec))?;
    Ok((spec.column, FeatureValue::Number(value)))
}

fn indicator(spec: &FieldSpec, value: Option<f64>) -> Result<Cell, SchemaMappingError> {
    match value {
        None => Err(SchemaMappingError::missing(spec)),
        Some(v) if v == 0.0 || v == 1.0 => Ok((spec.column, FeatureValue::Number(v))),
        Some(other) => Err(SchemaMappingError::InvalidField {
            external: spec.external,
            column: spec.column,
            reason: format!("expected 0 or 1, got {}", other),
        }),
    }
}

fn text(spec: &FieldSpec, value: Option<&String>) -> Result<Cell, SchemaMappingError> {
    let value = value.ok_or_else(|| SchemaMappingError::missing(spec))?;
    Ok((spec.column, FeatureValue::Text(value.clone())))
}

/// Project a raw request onto the fitted column names.
///
/// Values are copied verbatim. Fields are checked in [`FIELDS`] order, so the
/// first absent field is the one reported.
pub fn adapt(raw: &RawRequestRecord) -> Result<AdaptedFeatureRecord, SchemaMappingError> {
    let columns = vec![
        float(&TAUX_REMPLISSAGE, raw.taux_remplissage_pct)?,
        float(&TEMPERATURE, raw.temperature_c)?,
        indicator(&LINEAIRE, raw.lineaire_val)?,
        float(&TENSION, raw.tension_v)?,
        float(&INTENSITE_AVANT, raw.intensite_avant_entretien_a)?,
        text(&TECHNICIEN, raw.technicien_gfi.as_ref())?,
        text(&DIVISION, raw.division.as_ref())?,
        text(&SECTEUR, raw.secteur.as_ref())?,
        text(&PARTENAIRE, raw.partenaire.as_ref())?,
        text(&VILLE, raw.ville.as_ref())?,
        text(&QUARTIER, raw.quartier.as_ref())?,
        text(&TYPE_FRIGO, raw.type_frigo.as_ref())?,
        text(&AF_NF, raw.af_nf.as_ref())?,
        text(&BRANDING, raw.branding.as_ref())?,
        text(&SECURITE, raw.securite.as_ref())?,
        text(&ECLAIRAGE, raw.eclairage.as_ref())?,
        text(&PURGE_CIRCUIT_EAUX, raw.purge_circuit_eaux.as_ref())?,
        text(&SOUFFLAGE_PARTIES_ACTIVES, raw.soufflage_parties_actives.as_ref())?,
        text(&DATE, raw.date.as_ref())?,
    ];

    Ok(AdaptedFeatureRecord { columns })
}
