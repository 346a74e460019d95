//! Token material: opaque refresh tokens and signed access tokens.
//!
//! Refresh tokens are random URL-safe strings; only their SHA-256 digest
//! is ever persisted or compared. Access tokens are HS256 JWTs with a
//! typed `token_use` discriminator so nothing but an access token can
//! pass verification.

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Error;
use crate::user::{Role, UserRecord};

const REFRESH_TOKEN_BYTES: usize = 32;

pub(crate) const INVALID_ACCESS_TOKEN: &str = "Invalid or expired access token";

/// Create a new refresh token. The raw value goes to the client once; the
/// database stores only its hash.
pub(crate) fn generate_refresh_token() -> Result<String> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a refresh token so raw values never touch the database.
pub(crate) fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Claim-set discriminator. A closed enum rather than a free string: a
/// token whose `token_use` is anything but `access` fails deserialization
/// before any claim is read.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub token_use: TokenUse,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signer/verifier for access tokens.
///
/// Expiry is checked against a caller-supplied instant so the authority's
/// injected clock stays the single source of time.
pub struct AccessTokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AccessTokenSigner {
    /// Secret strength is enforced by [`crate::AuthorityConfig::new`]
    /// before a signer is ever built.
    pub(crate) fn new(secret: &SecretString) -> Self {
        let secret = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub(crate) fn sign(
        &self,
        user: &UserRecord,
        issued_at: DateTime<Utc>,
        ttl_seconds: i64,
    ) -> Result<String, Error> {
        let claims = AccessTokenClaims {
            sub: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            token_use: TokenUse::Access,
            iat: issued_at.timestamp(),
            exp: issued_at.timestamp() + ttl_seconds,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| Error::internal(anyhow::Error::new(err).context("failed to sign access token")))
    }

    /// Verify signature, shape, and expiry. Every failure collapses into
    /// the same `Unauthorized` message.
    pub(crate) fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, Error> {
        let claims = jsonwebtoken::decode::<AccessTokenClaims>(
            token,
            &self.decoding_key,
            &self.validation,
        )
        .map_err(|_| Error::Unauthorized(INVALID_ACCESS_TOKEN))?
        .claims;

        if claims.exp <= now.timestamp() {
            return Err(Error::Unauthorized(INVALID_ACCESS_TOKEN));
        }
        Ok(claims)
    }
}
