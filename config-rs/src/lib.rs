//! config-rs/lib.rs
//! Shared configuration utilities for the fridge status service.
//! Every setting comes from the process environment (optionally seeded from a
//! `.env` file); invalid values fall back to defaults with a warning.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default HTTP port of the prediction service
pub const DEFAULT_PORT: u16 = 8000;

/// Default file name of the exported classifier
pub const DEFAULT_MODEL_PATH: &str = "random_forest_model.json";

/// Default file name of the exported column transformer
pub const DEFAULT_PREPROCESSOR_PATH: &str = "column_transformer_preprocessor.json";

/// Default table receiving persisted predictions
pub const DEFAULT_SUPABASE_TABLE: &str = "fridge_status_predictions";

/// Origins allowed to call the API from a browser when nothing is configured
pub const DEFAULT_CORS_ORIGINS: [&str; 3] = [
    "http://localhost",
    "http://localhost:8080",
    "https://gulfmaintain-insight-hub.lovable.app",
];

/// Load a `.env` file from the working directory if one exists.
///
/// Returns true when a file was found and applied.
pub fn load_dotenv() -> bool {
    dotenv::dotenv().is_ok()
}

/// Paths of the two fitted artifacts read at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub preprocessor: PathBuf,
}

/// Credentials and target of the prediction datastore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
    pub table: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging settings consumed by the service's subscriber setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl LogSettings {
    /// Read `LOG_LEVEL` and `LOG_FORMAT` from the process environment.
    ///
    /// Needed before any logger exists, so the rest of the configuration can
    /// be read once logging is up and its fallback warnings are kept.
    pub fn from_env() -> Self {
        log_settings_from(&env_lookup)
    }
}

/// Complete configuration snapshot of the prediction service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub bind_address: SocketAddr,
    pub artifacts: ArtifactPaths,
    /// `None` when credentials are absent; the service then predicts without persisting.
    pub supabase: Option<SupabaseConfig>,
    pub cors_origins: Vec<String>,
    pub log: LogSettings,
}

impl ServiceConfig {
    /// Build a configuration snapshot from the process environment.
    ///
    /// Invalid values are reported through `log`; install the logger first.
    pub fn from_env(service_name: &str) -> Self {
        Self::from_lookup(service_name, env_lookup)
    }

    /// Build a configuration snapshot from an arbitrary key lookup.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let artifacts = ArtifactPaths {
            model: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            preprocessor: lookup("PREPROCESSOR_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PREPROCESSOR_PATH)),
        };

        Self {
            service_name: service_name.to_string(),
            bind_address: bind_address_from(&lookup, service_name, DEFAULT_PORT),
            artifacts,
            supabase: supabase_from(&lookup),
            cors_origins: cors_origins_from(&lookup),
            log: log_settings_from(&lookup),
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Normalize a service name into its environment variable prefix.
fn env_prefix(service_name: &str) -> String {
    service_name.replace('-', "_").to_uppercase()
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn port_from<F>(lookup: &F, service_name: &str, default_port: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    let var_name = format!("{}_SERVICE_PORT", env_prefix(service_name));
    match lookup(&var_name) {
        Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
            log::warn!("Invalid port in {}, using default {}", var_name, default_port);
            default_port
        }),
        None => default_port,
    }
}

fn bind_address_from<F>(lookup: &F, service_name: &str, default_port: u16) -> SocketAddr
where
    F: Fn(&str) -> Option<String>,
{
    let var_name = format!("{}_SERVICE_ADDR", env_prefix(service_name));

    if let Some(addr_str) = lookup(&var_name) {
        let stripped = addr_str
            .trim()
            .trim_start_matches("http://")
            .trim_start_matches("https://");
        if let Ok(addr) = stripped.parse::<SocketAddr>() {
            return addr;
        }
        log::warn!("Invalid address format in {}, using default", var_name);
    }

    let port = port_from(lookup, service_name, default_port);
    SocketAddr::from(([0, 0, 0, 0], port))
}

fn supabase_from<F>(lookup: &F) -> Option<SupabaseConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let url = non_empty(lookup, "SUPABASE_URL");
    let key = non_empty(lookup, "SUPABASE_KEY");

    match (url, key) {
        (Some(url), Some(key)) => Some(SupabaseConfig {
            url,
            key,
            table: non_empty(lookup, "SUPABASE_TABLE")
                .unwrap_or_else(|| DEFAULT_SUPABASE_TABLE.to_string()),
        }),
        _ => None,
    }
}

fn cors_origins_from<F>(lookup: &F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let configured: Vec<String> = non_empty(lookup, "CORS_ALLOWED_ORIGINS")
        .map(|raw| {
            raw.split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if configured.is_empty() {
        DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect()
    } else {
        configured
    }
}

fn log_settings_from<F>(lookup: &F) -> LogSettings
where
    F: Fn(&str) -> Option<String>,
{
    let format = match non_empty(lookup, "LOG_FORMAT")
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        None | Some("text") | Some("pretty") => LogFormat::Text,
        Some("json") => LogFormat::Json,
        Some(other) => {
            log::warn!("Unknown LOG_FORMAT '{}', using text", other);
            LogFormat::Text
        }
    };

    LogSettings {
        level: non_empty(lookup, "LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        format,
    }
}
