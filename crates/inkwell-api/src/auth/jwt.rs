//! Token issuance and verification
//!
//! HS256-signed JWTs carrying the subject id, role and token kind. The
//! signing secret is passed to [`TokenService::new`]; nothing is read from
//! globals, so services with different secrets can coexist.

use std::time::Duration;

use inkwell_core::{JwtConfig, Role};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Token class. Access tokens authenticate requests; refresh tokens only
/// mint new access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user id in decimal
    pub sub: String,
    /// Unique token id
    pub jti: String,
    /// Issued at (seconds since epoch)
    pub iat: u64,
    /// Expires at (seconds since epoch)
    pub exp: u64,
    pub role: Role,
    pub kind: TokenKind,
}

impl Claims {
    pub fn subject_id(&self) -> Result<u64, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

/// Token errors
///
/// Verification failures collapse into a single `Invalid` so callers cannot
/// tell which check failed.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,

    #[error("token lifetime must be greater than zero")]
    ZeroTtl,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// A freshly signed token with its claims
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedToken {
    /// Remaining lifetime as issued
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.claims.exp.saturating_sub(self.claims.iat))
    }
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

impl TokenService {
    pub fn new(
        secret: &str,
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(
            &config.secret,
            config.issuer.clone(),
            config.access_ttl(),
            config.refresh_ttl(),
        )
    }

    /// Configured lifetime for a token class
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Issue a token of the given class with its configured lifetime
    pub fn issue(&self, subject_id: u64, role: Role, kind: TokenKind) -> Result<IssuedToken, TokenError> {
        self.issue_with_ttl(subject_id, role, kind, self.ttl(kind))
    }

    pub fn issue_with_ttl(
        &self,
        subject_id: u64,
        role: Role,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject_id, role, kind, ttl, now_secs())
    }

    /// Issue as if the current time were `now`
    pub fn issue_at(
        &self,
        subject_id: u64,
        role: Role,
        kind: TokenKind,
        ttl: Duration,
        now: u64,
    ) -> Result<IssuedToken, TokenError> {
        let ttl_secs = ttl.as_secs();
        if ttl_secs == 0 {
            return Err(TokenError::ZeroTtl);
        }

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
            role,
            kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify signature, algorithm, issuer and expiry
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, now_secs())
    }

    /// Verify and require a specific token class
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    /// Verify as if the current time were `now`. Valid only while `now < exp`.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<Claims, TokenError> {
        // Parsing fails for `none` and any algorithm jsonwebtoken does not know.
        let header = decode_header(token).map_err(|_| TokenError::Invalid)?;
        if header.alg != Algorithm::HS256 {
            return Err(TokenError::Invalid);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        // expiry is checked below against `now`
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;

        if claims.exp <= claims.iat || now >= claims.exp {
            return Err(TokenError::Invalid);
        }
        claims.subject_id()?;

        Ok(claims)
    }
}
