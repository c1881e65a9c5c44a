//! Startup loading of the fitted artifacts.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use config_rs::ArtifactPaths;

use crate::classifier::{Classifier, RandomForest};
use crate::error::ArtifactError;
use crate::service::Pipeline;
use crate::transformer::{ColumnTransformer, FeatureTransformer};

fn read(path: &Path) -> Result<String, ArtifactError> {
    fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_transformer(path: &Path) -> Result<ColumnTransformer, ArtifactError> {
    ColumnTransformer::from_json(&read(path)?)
}

pub fn load_classifier(path: &Path) -> Result<RandomForest, ArtifactError> {
    RandomForest::from_json(&read(path)?)
}

/// Load both artifacts and check that they compose.
pub fn load_pipeline(paths: &ArtifactPaths) -> Result<Pipeline, ArtifactError> {
    let classifier = load_classifier(&paths.model)?;
    let transformer = load_transformer(&paths.preprocessor)?;

    tracing::info!(
        classes = ?classifier.classes(),
        trees = classifier.n_trees(),
        features = transformer.n_features_out(),
        "fitted artifacts loaded"
    );

    Pipeline::new(Arc::new(transformer), Arc::new(classifier))
}
