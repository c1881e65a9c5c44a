use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

use crate::classifier::ClassificationError;
use crate::schema::SchemaMappingError;
use crate::transformer::FeatureTransformError;

/// Failure to read or validate a fitted artifact at startup.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("transformer produces {transformer} features but the classifier expects {classifier}")]
    ShapeMismatch { transformer: usize, classifier: usize },
}

/// Which side of the connection a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Client,
    Server,
}

/// Terminal failure of one prediction request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Internal error: model or preprocessor not loaded")]
    PipelineUnavailable,

    #[error("Input mapping error: {0}")]
    Schema(#[from] SchemaMappingError),

    #[error("Preprocessing error, check the columns, types or values of the input: {0}")]
    Transform(#[from] FeatureTransformError),

    #[error("Model prediction error: {0}")]
    Classification(#[from] ClassificationError),
}

impl PredictionError {
    pub fn fault(&self) -> Fault {
        match self {
            PredictionError::Schema(_) | PredictionError::Transform(_) => Fault::Client,
            PredictionError::PipelineUnavailable | PredictionError::Classification(_) => Fault::Server,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.fault() {
            Fault::Client => StatusCode::BAD_REQUEST,
            Fault::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.fault() {
            Fault::Client => tracing::Level::WARN,
            Fault::Server => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_attribution() {
        let schema = PredictionError::from(SchemaMappingError::MissingField {
            external: "Ville",
            column: "Ville",
        });
        assert_eq!(schema.status_code(), StatusCode::BAD_REQUEST);

        let transform = PredictionError::from(FeatureTransformError::UnknownCategory {
            column: "Ville".into(),
            value: "Atlantis".into(),
        });
        assert_eq!(transform.fault(), Fault::Client);
        assert!(transform.to_string().contains("Atlantis"));

        let classify = PredictionError::from(ClassificationError::EmptyDistribution);
        assert_eq!(classify.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            PredictionError::PipelineUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(PredictionError::PipelineUnavailable.log_level(), tracing::Level::ERROR);
    }
}
