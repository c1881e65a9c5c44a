#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use config_rs::ArtifactPaths;
use fridge_status::api::{self, AppState};
use fridge_status::artifacts;
use fridge_status::service::{Pipeline, PredictionService};
use fridge_status::sink::PersistenceSink;
use serde_json::{json, Value};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn fixture_pipeline() -> Pipeline {
    artifacts::load_pipeline(&ArtifactPaths {
        model: fixture("random_forest.json"),
        preprocessor: fixture("column_transformer.json"),
    })
    .expect("fixture artifacts load")
}

pub fn fixture_labels() -> Vec<&'static str> {
    vec!["A surveiller", "En panne", "Fonctionnel"]
}

/// The maintenance visit used throughout the tests.
pub fn sample_request() -> Value {
    json!({
        "Taux_remplissage_pct": 72.5,
        "Temperature_C": 4.2,
        "Lineaire_val": 1,
        "Tension_V": 220.0,
        "Intensite_avant_entretien_A": 3.1,
        "Technicien_GFI": "T01",
        "Division": "D1",
        "Secteur": "S1",
        "Partenaire": "P1",
        "Ville": "Casablanca",
        "Quartier": "Maarif",
        "Type_Frigo": "Vertical",
        "AF_NF": "AF",
        "Branding": "CocaCola",
        "Securite": "Disjoncteur",
        "Eclairage": "O",
        "Purge_circuit_eaux": "Oui",
        "Soufflage_parties_actives": "Oui",
        "Date": "2024-05-01"
    })
}

pub fn router(pipeline: Option<Pipeline>, sink: Option<Arc<dyn PersistenceSink>>) -> axum::Router {
    let state = Arc::new(AppState::new(
        "fridge-status",
        PredictionService::new(pipeline, sink),
    ));
    let origins = vec!["http://localhost:8080".to_string()];
    api::create_router(state, &origins)
}
