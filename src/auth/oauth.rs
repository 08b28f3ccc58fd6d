use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::repo_types::Provider;

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
static GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const APPLE_JWKS_URL: &str = "https://appleid.apple.com/auth/keys";
static APPLE_ISSUERS: [&str; 1] = ["https://appleid.apple.com"];
const JWKS_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Identity asserted by a provider's signed id token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: Provider,
    pub provider_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, provider: Provider, token: &str) -> anyhow::Result<ExternalIdentity>;
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    #[serde(default, deserialize_with = "bool_or_string")]
    email_verified: bool,
    given_name: Option<String>,
    family_name: Option<String>,
}

// Apple sends `"true"` as a string, Google as a bool.
fn bool_or_string<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Str(String),
    }
    Ok(match Option::<Flag>::deserialize(de)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Str(s)) => s.eq_ignore_ascii_case("true"),
        None => false,
    })
}

struct CachedKeys {
    keys: JwkSet,
    fetched: Instant,
}

/// Verifies Google and Apple id tokens against the providers' published JWKS.
pub struct JwksVerifier {
    http: reqwest::Client,
    google_client_id: Option<String>,
    apple_client_id: Option<String>,
    google_keys: RwLock<Option<CachedKeys>>,
    apple_keys: RwLock<Option<CachedKeys>>,
}

impl JwksVerifier {
    pub fn new(google_client_id: Option<String>, apple_client_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            google_client_id,
            apple_client_id,
            google_keys: RwLock::new(None),
            apple_keys: RwLock::new(None),
        }
    }

    async fn jwks(&self, provider: Provider) -> anyhow::Result<JwkSet> {
        let (cache, url) = match provider {
            Provider::Google => (&self.google_keys, GOOGLE_JWKS_URL),
            Provider::Apple => (&self.apple_keys, APPLE_JWKS_URL),
            Provider::Email => anyhow::bail!("email is not an external provider"),
        };
        if let Some(c) = cache.read().await.as_ref() {
            if c.fetched.elapsed() < JWKS_CACHE_TTL {
                return Ok(c.keys.clone());
            }
        }
        let keys: JwkSet = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetch jwks {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("parse jwks")?;
        debug!(provider = ?provider, keys = keys.keys.len(), "jwks refreshed");
        *cache.write().await = Some(CachedKeys {
            keys: keys.clone(),
            fetched: Instant::now(),
        });
        Ok(keys)
    }
}

#[async_trait]
impl IdentityVerifier for JwksVerifier {
    async fn verify(&self, provider: Provider, token: &str) -> anyhow::Result<ExternalIdentity> {
        let (audience, issuers): (&Option<String>, &[&str]) = match provider {
            Provider::Google => (&self.google_client_id, &GOOGLE_ISSUERS[..]),
            Provider::Apple => (&self.apple_client_id, &APPLE_ISSUERS[..]),
            Provider::Email => anyhow::bail!("email is not an external provider"),
        };
        let audience = audience
            .as_deref()
            .with_context(|| format!("{provider:?} sign-in is not configured"))?;

        let header = decode_header(token).context("malformed id token")?;
        let kid = header.kid.context("id token has no key id")?;
        let jwks = self.jwks(provider).await?;
        let jwk = jwks.find(&kid).context("unknown signing key")?;
        let key = DecodingKey::from_jwk(jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(issuers);
        let claims = decode::<IdTokenClaims>(token, &key, &validation)?.claims;

        Ok(ExternalIdentity {
            provider,
            provider_id: claims.sub,
            email: claims.email.map(|e| e.trim().to_lowercase()),
            email_verified: claims.email_verified,
            first_name: claims.given_name,
            last_name: claims.family_name,
        })
    }
}
