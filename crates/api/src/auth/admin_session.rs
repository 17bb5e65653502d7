//! Shared-password admin sessions
//!
//! The legacy admin area is protected by one password stored as an Argon2id
//! hash in `admin_settings`. A successful login yields an `admin_session`
//! cookie holding a signed JWT; the session slides forward once less than
//! half of its lifetime remains.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::{
    cookies::{CookieJar, SetCookie},
    identity::{IdentityError, IdentityProvider, Principal, PrincipalKind, Session},
    jwt::{JwtError, JwtManager},
    password::{verify_password, PasswordError},
};

/// Cookie carrying the admin session token
pub const ADMIN_SESSION_COOKIE: &str = "admin_session";

/// Password-backed identity provider
#[derive(Clone)]
pub struct PasswordIdentity {
    jwt: JwtManager,
    secure_cookies: bool,
}

impl PasswordIdentity {
    pub fn new(jwt: JwtManager, secure_cookies: bool) -> Self {
        Self {
            jwt,
            secure_cookies,
        }
    }

    /// Check a login attempt against the stored admin password hash.
    ///
    /// A missing `admin_settings` row means no password was ever set and every
    /// attempt fails.
    pub async fn verify_admin_password(
        &self,
        pool: &PgPool,
        password: &str,
    ) -> Result<bool, AdminLoginError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM admin_settings WHERE id = 1")
                .fetch_optional(pool)
                .await?;

        let Some((hash,)) = row else {
            tracing::warn!("Admin login attempted but no admin password is configured");
            return Ok(false);
        };

        Ok(verify_password(password, &hash)?)
    }

    /// Start a new session: the cookie to set on the login response
    pub fn issue_session_cookie(&self) -> Result<SetCookie, JwtError> {
        let (token, _claims) = self.jwt.issue_admin_token()?;
        Ok(self.session_cookie(token))
    }

    /// Cookie that ends the session
    pub fn clear_session_cookie(&self) -> SetCookie {
        SetCookie::removal(ADMIN_SESSION_COOKIE)
            .http_only(true)
            .secure(self.secure_cookies)
    }

    fn session_cookie(&self, token: String) -> SetCookie {
        SetCookie::new(ADMIN_SESSION_COOKIE, token)
            .max_age(self.jwt.ttl_seconds())
            .http_only(true)
            .secure(self.secure_cookies)
    }

    fn admin_principal() -> Principal {
        Principal {
            subject: super::jwt::ADMIN_SUBJECT.to_string(),
            user_id: None,
            email: None,
            kind: PrincipalKind::PlatformAdmin,
        }
    }
}

#[async_trait]
impl IdentityProvider for PasswordIdentity {
    fn name(&self) -> &'static str {
        "password"
    }

    async fn get_session(&self, cookies: &CookieJar) -> Result<Option<Session>, IdentityError> {
        let Some(token) = cookies.get(ADMIN_SESSION_COOKIE).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let claims = match self.jwt.validate_admin_token(token) {
            Ok(claims) => claims,
            // Expired or forged cookies are simply "no session"
            Err(JwtError::Expired | JwtError::Invalid) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut session = Session::new(Self::admin_principal());

        let remaining = claims.exp - OffsetDateTime::now_utc().unix_timestamp();
        if remaining <= self.jwt.ttl_seconds() / 2 {
            let (token, _) = self.jwt.issue_admin_token()?;
            tracing::debug!("Sliding admin session forward");
            session.refreshed_cookies.push(self.session_cookie(token));
        }

        Ok(Some(session))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdminLoginError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderMap, HeaderValue};

    const SECRET: &str = "test-admin-secret-must-be-at-least-32-characters";

    fn jar_with(token: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{ADMIN_SESSION_COOKIE}={token}")).unwrap(),
        );
        CookieJar::from_headers(&headers)
    }

    #[tokio::test]
    async fn test_login_cookie_grants_session() {
        let identity = PasswordIdentity::new(JwtManager::new(SECRET, 24), true);
        let cookie = identity.issue_session_cookie().unwrap();

        assert_eq!(cookie.name, ADMIN_SESSION_COOKIE);
        assert_eq!(cookie.max_age, Some(24 * 3600));
        assert!(cookie.http_only);
        assert!(cookie.secure);

        let session = identity
            .get_session(&jar_with(&cookie.value))
            .await
            .unwrap()
            .expect("session");
        assert!(session.principal.is_platform_admin());
        // Fresh token, nothing to slide yet
        assert!(session.refreshed_cookies.is_empty());
    }

    #[tokio::test]
    async fn test_missing_or_forged_cookie_is_no_session() {
        let identity = PasswordIdentity::new(JwtManager::new(SECRET, 24), false);

        assert!(identity.get_session(&CookieJar::default()).await.unwrap().is_none());
        assert!(identity.get_session(&jar_with("not-a-jwt")).await.unwrap().is_none());

        let other = PasswordIdentity::new(
            JwtManager::new("a-completely-different-secret-value-here", 24),
            false,
        );
        let forged = other.issue_session_cookie().unwrap();
        assert!(identity.get_session(&jar_with(&forged.value)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_slides_when_half_spent() {
        // A zero-hour TTL puts every token past its half-life while the
        // 60 second validation leeway keeps it acceptable.
        let identity = PasswordIdentity::new(JwtManager::new(SECRET, 0), false);
        let cookie = identity.issue_session_cookie().unwrap();

        let session = identity
            .get_session(&jar_with(&cookie.value))
            .await
            .unwrap()
            .expect("session within leeway");
        assert_eq!(session.refreshed_cookies.len(), 1);
        assert_eq!(session.refreshed_cookies[0].name, ADMIN_SESSION_COOKIE);
    }

    #[test]
    fn test_clear_cookie() {
        let identity = PasswordIdentity::new(JwtManager::new(SECRET, 24), false);
        let cookie = identity.clear_session_cookie();
        assert!(cookie.is_removal());
        assert_eq!(cookie.name, ADMIN_SESSION_COOKIE);
    }
}
