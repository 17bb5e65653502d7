//! JWT issuance and validation
//!
//! Two token families pass through here: admin session tokens we sign
//! ourselves, and access tokens issued by Supabase auth.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Subject of every admin session token (there is a single shared admin)
pub const ADMIN_SUBJECT: &str = "admin";

/// Clock skew tolerance in seconds
const LEEWAY_SECONDS: u64 = 60;

/// JWT claims for admin session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Subject (always "admin")
    pub sub: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// JWT ID (jti), unique per login
    pub jti: String,
}

/// JWT claims structure for Supabase-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseClaims {
    /// Subject (user ID as string, will be parsed to UUID)
    pub sub: String,
    /// Email (may be in top-level or in user_metadata)
    pub email: Option<String>,
    /// Role (authenticated, anon, etc.)
    pub role: Option<String>,
    /// Audience
    pub aud: Option<String>,
    /// Issued at
    pub iat: Option<i64>,
    /// Expiration
    pub exp: i64,
}

/// Signs and validates admin session tokens
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_hours: i64,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    /// Issue an admin session token with a unique JTI
    pub fn issue_admin_token(&self) -> Result<(String, AdminClaims), JwtError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::hours(self.ttl_hours);

        let claims = AdminClaims {
            sub: ADMIN_SUBJECT.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        // Explicit algorithm prevents algorithm confusion attacks
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))?;

        Ok((token, claims))
    }

    /// Validate and decode an admin session token
    pub fn validate_admin_token(&self, token: &str) -> Result<AdminClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECONDS;

        let claims = decode::<AdminClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(map_jwt_error)?;

        if claims.sub != ADMIN_SUBJECT {
            return Err(JwtError::Invalid);
        }
        Ok(claims)
    }

    /// Session lifetime in seconds
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_hours * 3600
    }
}

/// Validates Supabase access tokens with the project's JWT secret
#[derive(Clone)]
pub struct SupabaseTokenValidator {
    decoding_key: DecodingKey,
}

impl SupabaseTokenValidator {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
        }
    }

    /// Validate a Supabase-issued JWT token
    /// Explicit algorithm and audience validation
    pub fn validate(&self, token: &str) -> Result<SupabaseClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECONDS;
        // Supabase uses "authenticated" as the audience
        validation.set_audience(&["authenticated"]);

        decode::<SupabaseClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::InvalidAudience) {
                    // Reject tokens with invalid audience - no fallback
                    tracing::warn!("Supabase JWT audience validation failed - rejecting token");
                }
                map_jwt_error(e)
            })
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> JwtError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm
        | jsonwebtoken::errors::ErrorKind::InvalidAudience => JwtError::Invalid,
        _ => JwtError::Validation(e.to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}
