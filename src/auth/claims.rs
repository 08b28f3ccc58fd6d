use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of JWT: a session access token or an upload grant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Upload,
}

/// JWT payload used for authentication and upload grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,      // user ID
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>, // object key, upload grants only
}
