//! Authentication extractors.
//!
//! Two credentials exist:
//! - `AuthUser` - end users, via a bearer JWT validated against the auth
//!   provider's JWKS
//! - `ServiceAuth` - trusted backend services, via the `x-api-key` header

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use timeless_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// How long cached JWKS keys stay valid before a refresh.
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Timeout for JWKS fetch requests.
const JWKS_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated end user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            // Test tokens are only honored in testing builds.
            #[cfg(any(test, feature = "test-auth"))]
            if let Some(user_id_str) = token.strip_prefix("test-token:") {
                let user_id = user_id_str
                    .parse::<UserId>()
                    .map_err(|_| ApiError::Unauthorized)?;

                return Ok(AuthUser { user_id });
            }

            let claims = validate_jwt(token, state).await?;

            let user_id = claims
                .sub
                .parse::<UserId>()
                .map_err(|_| ApiError::Unauthorized)?;

            Ok(AuthUser { user_id })
        })
    }
}

/// Service authentication via API key.
///
/// Used for profile provisioning, credit grants, and subscription updates
/// driven by trusted backend systems.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The calling service's name, for audit logging.
    pub service_name: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let api_key = parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .service_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if api_key != expected_key {
                return Err(ApiError::Unauthorized);
            }

            let service_name = parts
                .headers
                .get("x-service-name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            Ok(ServiceAuth { service_name })
        })
    }
}

/// JWT claims we validate.
#[derive(Debug, Clone, Deserialize)]
struct JwtClaims {
    /// Subject (user ID).
    sub: String,
}

/// JWKS (JSON Web Key Set) response structure.
#[derive(Debug, Clone, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

/// Single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    /// Key type (e.g., "RSA").
    kty: String,
    /// Key ID.
    kid: Option<String>,
    /// RSA public key modulus (base64url encoded).
    n: Option<String>,
    /// RSA public key exponent (base64url encoded).
    e: Option<String>,
}

/// Decoding keys parsed from the last JWKS fetch.
struct JwksCache {
    /// Keys by kid.
    keys: HashMap<String, DecodingKey>,
    /// Fallback for tokens whose header carries no kid.
    default_key: Option<DecodingKey>,
    fetched_at: Option<Instant>,
}

impl JwksCache {
    fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            default_key: None,
            fetched_at: None,
        }
    }

    fn is_stale(&self) -> bool {
        self.fetched_at.map_or(true, |at| at.elapsed() >= JWKS_TTL)
    }

    /// Replace the cached keys with a freshly fetched set. The first usable
    /// key doubles as the default.
    fn install(&mut self, jwks: &Jwks) {
        self.keys.clear();
        self.default_key = None;
        self.fetched_at = Some(Instant::now());

        for jwk in &jwks.keys {
            if let Some(key) = rsa_decoding_key(jwk) {
                if self.default_key.is_none() {
                    self.default_key = Some(key.clone());
                }
                if let Some(kid) = &jwk.kid {
                    self.keys.insert(kid.clone(), key);
                }
            }
        }
    }

    fn key_for(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self.keys.get(kid).cloned(),
            None => self.default_key.clone(),
        }
    }
}

static JWKS_CACHE: OnceLock<RwLock<JwksCache>> = OnceLock::new();

fn jwks_cache() -> &'static RwLock<JwksCache> {
    JWKS_CACHE.get_or_init(|| RwLock::new(JwksCache::empty()))
}

/// Shared client for JWKS fetches, so refreshes reuse one connection pool.
fn jwks_http() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(JWKS_HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Validate a JWT token against the JWKS.
async fn validate_jwt(token: &str, state: &AppState) -> Result<JwtClaims, ApiError> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "Failed to decode JWT header");
        ApiError::Unauthorized
    })?;

    let decoding_key = resolve_key(header.kid.as_deref(), state).await?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[&state.config.auth_audience]);
    validation.set_issuer(&[&state.config.auth_base_url]);

    let token_data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })?;

    Ok(token_data.claims)
}

/// Look up the decoding key for a kid, refreshing the JWKS when the cache
/// is cold, stale, or missing that kid.
async fn resolve_key(kid: Option<&str>, state: &AppState) -> Result<DecodingKey, ApiError> {
    {
        let cached = jwks_cache().read().await;
        if !cached.is_stale() {
            if let Some(key) = cached.key_for(kid) {
                return Ok(key);
            }
        }
    }

    let jwks = load_jwks(state).await?;

    let mut cache = jwks_cache().write().await;
    cache.install(&jwks);
    cache.key_for(kid).ok_or(ApiError::Unauthorized)
}

/// Fetch the key set from the auth provider.
async fn load_jwks(state: &AppState) -> Result<Jwks, ApiError> {
    let jwks_url = format!("{}/.well-known/jwks.json", state.config.auth_base_url);

    tracing::debug!(url = %jwks_url, "Fetching JWKS");

    let response = jwks_http().get(&jwks_url).send().await.map_err(|e| {
        tracing::error!(error = %e, url = %jwks_url, "Failed to fetch JWKS");
        ApiError::Internal("Failed to fetch authentication keys".into())
    })?;

    if !response.status().is_success() {
        tracing::error!(
            status = %response.status(),
            url = %jwks_url,
            "JWKS fetch returned non-success status"
        );
        return Err(ApiError::Internal(
            "Failed to fetch authentication keys".into(),
        ));
    }

    let jwks: Jwks = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse JWKS response");
        ApiError::Internal("Failed to parse authentication keys".into())
    })?;

    tracing::info!(keys_count = %jwks.keys.len(), "JWKS fetched");

    Ok(jwks)
}

/// Build a `DecodingKey` from a JWK. Non-RSA keys are skipped.
fn rsa_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        tracing::debug!(kty = %jwk.kty, "Skipping non-RSA JWK");
        return None;
    }

    let n = jwk.n.as_ref()?;
    let e = jwk.e.as_ref()?;

    DecodingKey::from_rsa_components(n, e).ok()
}
