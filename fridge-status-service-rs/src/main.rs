// fridge-status-service-rs/src/main.rs
// Fridge Status Service - post-maintenance status prediction over HTTP
// Port 8000

use std::sync::Arc;

use anyhow::Context;
use config_rs::{LogSettings, ServiceConfig};
use fridge_status::api::{self, AppState};
use fridge_status::artifacts;
use fridge_status::logging;
use fridge_status::service::PredictionService;
use fridge_status::sink::{PersistenceSink, SupabaseSink};

const SERVICE_NAME: &str = "fridge-status";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_loaded = config_rs::load_dotenv();
    logging::init_logging(&LogSettings::from_env())?;
    let config = ServiceConfig::from_env(SERVICE_NAME);

    if dotenv_loaded {
        tracing::debug!("loaded environment from .env");
    }

    // A failed load leaves the service up but unable to predict.
    let pipeline = match artifacts::load_pipeline(&config.artifacts) {
        Ok(pipeline) => Some(pipeline),
        Err(err) => {
            tracing::error!(
                model = %config.artifacts.model.display(),
                preprocessor = %config.artifacts.preprocessor.display(),
                error = %err,
                "failed to load fitted artifacts, predictions unavailable"
            );
            None
        }
    };

    let sink: Option<Arc<dyn PersistenceSink>> = match &config.supabase {
        None => {
            tracing::warn!("SUPABASE_URL or SUPABASE_KEY not set, predictions will not be persisted");
            None
        }
        Some(supabase) => match SupabaseSink::new(supabase) {
            Ok(sink) => {
                tracing::info!(endpoint = %sink.endpoint(), "Supabase client initialized");
                Some(Arc::new(sink))
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to initialize Supabase client, predictions will not be persisted");
                None
            }
        },
    };

    let state = Arc::new(AppState::new(
        config.service_name.clone(),
        PredictionService::new(pipeline, sink),
    ));
    let app = api::create_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;

    tracing::info!(address = %config.bind_address, origins = ?config.cors_origins, "Fridge status service starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Fridge status service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
