//! Runtime configuration.

use serde::Deserialize;
use std::path::Path;

/// Runtime settings, read once at startup. Every knob has a default.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind address, `host:port`.
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/timeless").
    pub data_dir: String,

    /// JWT validation base URL; JWKS is served at
    /// `{auth_base_url}/.well-known/jwks.json` and the same URL is the
    /// expected issuer.
    pub auth_base_url: String,

    /// Expected JWT audience (default: "timeless").
    pub auth_audience: String,

    /// Key trusted backends present in `x-api-key`. Service-auth endpoints
    /// reject everything when unset.
    pub service_api_key: Option<String>,

    /// Fal.ai API key.
    pub fal_api_key: Option<String>,

    /// Kie.ai API key.
    pub kie_api_key: Option<String>,

    /// Base URL for synchronous Fal.ai calls (default: `<https://fal.run>`).
    pub fal_base_url: String,

    /// Base URL for queued Fal.ai calls (default: `<https://queue.fal.run>`).
    pub fal_queue_url: String,

    /// Base URL for Kie.ai calls (default: `<https://api.kie.ai>`).
    pub kie_base_url: String,

    /// Credits granted to a newly provisioned profile.
    pub starting_credits: i64,

    /// Origins allowed by CORS, `*` for any.
    pub cors_origins: Vec<String>,

    /// Request body cap in bytes.
    pub max_body_bytes: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Interval between background reconciliation sweeps, in seconds.
    pub sweep_interval_seconds: u64,

    /// Minutes a generation may stay `processing` before the sweeper fails
    /// it and refunds its credits.
    pub pending_timeout_minutes: i64,
}

/// Provider secrets file structure.
#[derive(Debug, Deserialize)]
struct ProviderSecrets {
    #[serde(default)]
    fal_api_key: Option<String>,
    #[serde(default)]
    kie_api_key: Option<String>,
}

impl ServiceConfig {
    /// Read configuration from the environment, with a secrets-file
    /// fallback for the provider keys.
    #[must_use]
    pub fn from_env() -> Self {
        let (fal_api_key, kie_api_key) = load_provider_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/timeless".into()),
            auth_base_url: std::env::var("AUTH_BASE_URL")
                .unwrap_or_else(|_| "https://auth.timeless.app".into()),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or_else(|_| "timeless".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            fal_api_key,
            kie_api_key,
            fal_base_url: std::env::var("FAL_BASE_URL")
                .unwrap_or_else(|_| "https://fal.run".into()),
            fal_queue_url: std::env::var("FAL_QUEUE_URL")
                .unwrap_or_else(|_| "https://queue.fal.run".into()),
            kie_base_url: std::env::var("KIE_BASE_URL")
                .unwrap_or_else(|_| "https://api.kie.ai".into()),
            starting_credits: std::env::var("STARTING_CREDITS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            sweep_interval_seconds: std::env::var("SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            pending_timeout_minutes: std::env::var("PENDING_TIMEOUT_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

/// Load provider secrets from file or environment.
fn load_provider_secrets() -> (Option<String>, Option<String>) {
    // The secrets file lives in a few places depending on how the
    // service is launched
    let secret_paths = [
        ".secrets/providers.json",
        "timeless/.secrets/providers.json",
        "../.secrets/providers.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<ProviderSecrets>(path) {
            tracing::info!(path = %path, "Loaded provider secrets from file");
            return (secrets.fal_api_key, secrets.kie_api_key);
        }
    }

    tracing::debug!("Provider secrets file not found, using environment variables");
    (
        std::env::var("FAL_API_KEY").ok(),
        std::env::var("KIE_API_KEY").ok(),
    )
}

/// Parse one JSON secrets file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/timeless".into(),
            auth_base_url: "https://auth.timeless.app".into(),
            auth_audience: "timeless".into(),
            service_api_key: None,
            fal_api_key: None,
            kie_api_key: None,
            fal_base_url: "https://fal.run".into(),
            fal_queue_url: "https://queue.fal.run".into(),
            kie_base_url: "https://api.kie.ai".into(),
            starting_credits: 10,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 60,
            sweep_interval_seconds: 60,
            pending_timeout_minutes: 30,
        }
    }
}
