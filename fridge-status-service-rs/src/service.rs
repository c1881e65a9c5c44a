//! Prediction orchestration.
//!
//! One call runs adapt -> transform -> classify and then hands the result to
//! the persistence sink without waiting for it. Every failure is terminal and
//! attributed to the first stage that detects it.

use std::sync::Arc;

use tracing::Instrument;

use crate::classifier::{Classifier, PredictionResult};
use crate::error::{ArtifactError, Fault, PredictionError};
use crate::schema::{self, AdaptedFeatureRecord, RawRequestRecord};
use crate::sink::{PersistenceRecord, PersistenceSink, PersistenceStats};
use crate::transformer::FeatureTransformer;

/// A transformer and classifier known to agree on the feature layout.
#[derive(Clone)]
pub struct Pipeline {
    transformer: Arc<dyn FeatureTransformer>,
    classifier: Arc<dyn Classifier>,
}

impl Pipeline {
    pub fn new(
        transformer: Arc<dyn FeatureTransformer>,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, ArtifactError> {
        if transformer.n_features_out() != classifier.n_features() {
            return Err(ArtifactError::ShapeMismatch {
                transformer: transformer.n_features_out(),
                classifier: classifier.n_features(),
            });
        }
        Ok(Self {
            transformer,
            classifier,
        })
    }

    pub fn classes(&self) -> &[String] {
        self.classifier.classes()
    }

    /// Adapt, transform and classify one record.
    pub fn run(
        &self,
        raw: &RawRequestRecord,
    ) -> Result<(AdaptedFeatureRecord, PredictionResult), PredictionError> {
        let record = schema::adapt(raw)?;
        let features = self.transformer.transform(&record)?;
        let result = self.classifier.predict(&features)?;
        Ok((record, result))
    }
}

/// Serves predictions from an optional pipeline with optional persistence.
///
/// A missing pipeline means the artifacts failed to load; every request then
/// fails with [`PredictionError::PipelineUnavailable`].
pub struct PredictionService {
    pipeline: Option<Pipeline>,
    sink: Option<Arc<dyn PersistenceSink>>,
    stats: Arc<PersistenceStats>,
}

impl PredictionService {
    pub fn new(pipeline: Option<Pipeline>, sink: Option<Arc<dyn PersistenceSink>>) -> Self {
        Self {
            pipeline,
            sink,
            stats: Arc::new(PersistenceStats::default()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn persistence_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn stats(&self) -> &PersistenceStats {
        &self.stats
    }

    pub fn predict(&self, raw: &RawRequestRecord) -> Result<PredictionResult, PredictionError> {
        let outcome = self
            .pipeline
            .as_ref()
            .ok_or(PredictionError::PipelineUnavailable)
            .and_then(|pipeline| pipeline.run(raw));

        match outcome {
            Ok((record, result)) => {
                tracing::info!(predicted_status = %result.predicted_status, "prediction served");
                self.dispatch_persistence(&record, &result);
                Ok(result)
            }
            Err(err) => {
                match err.fault() {
                    Fault::Client => tracing::warn!(error = %err, "prediction rejected"),
                    Fault::Server => tracing::error!(error = %err, "prediction failed"),
                }
                Err(err)
            }
        }
    }

    /// Spawn the best-effort write; the caller never waits on it.
    fn dispatch_persistence(&self, record: &AdaptedFeatureRecord, result: &PredictionResult) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let stats = Arc::clone(&self.stats);

        let Some(row) = PersistenceRecord::from_prediction(result, record) else {
            tracing::warn!("prediction record lacks persisted fields, skipping write");
            stats.record_failure();
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime available, skipping persistence");
            stats.record_failure();
            return;
        };

        runtime.spawn(
            async move {
                match sink.append(&row).await {
                    Ok(()) => {
                        stats.record_success();
                        tracing::debug!(sink = sink.name(), "prediction persisted");
                    }
                    Err(err) => {
                        stats.record_failure();
                        tracing::warn!(sink = sink.name(), error = %err, "failed to persist prediction");
                    }
                }
            }
            .in_current_span(),
        );
    }
}
