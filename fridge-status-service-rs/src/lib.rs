//! # Fridge Status Service
//!
//! Predicts the post-maintenance status of a refrigeration unit from the
//! attributes recorded during the visit, using a fitted column transformer
//! and a fitted random forest, and optionally records each prediction in a
//! Supabase table.

pub mod api;
pub mod artifacts;
pub mod classifier;
pub mod error;
pub mod logging;
pub mod schema;
pub mod service;
pub mod sink;
pub mod transformer;

pub use classifier::{ClassProbabilities, Classifier, PredictionResult, RandomForest};
pub use error::{ArtifactError, Fault, PredictionError};
pub use schema::{adapt, AdaptedFeatureRecord, RawRequestRecord, SchemaMappingError};
pub use service::{Pipeline, PredictionService};
pub use sink::{PersistenceRecord, PersistenceSink, SinkError, SupabaseSink};
pub use transformer::{ColumnTransformer, FeatureTransformError, FeatureTransformer, FeatureVector};
