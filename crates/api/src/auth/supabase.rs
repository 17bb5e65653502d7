//! Supabase cookie sessions
//!
//! The browser side stores the Supabase session in `sb-{project_ref}-auth-token`,
//! either as one cookie or split into `.0`, `.1`, ... chunks. The value is the
//! session JSON, usually `base64-` prefixed and base64url encoded.
//!
//! Verification is local when the project JWT secret is configured, otherwise
//! the access token is checked against `/auth/v1/user`. An expired access token
//! triggers one refresh-token exchange; the new session is written back as
//! cookies on the response.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    cookies::{CookieJar, SetCookie},
    identity::{IdentityError, IdentityProvider, Principal, PrincipalKind, Session},
    jwt::{JwtError, SupabaseTokenValidator},
};
use crate::config::Config;

/// Largest value written to a single cookie before chunking
pub const MAX_CHUNK_SIZE: usize = 3180;

/// Lifetime of refreshed session cookies (400 days, the browser maximum)
pub const SESSION_COOKIE_MAX_AGE: i64 = 400 * 24 * 60 * 60;

const BASE64_PREFIX: &str = "base64-";

/// Tokens expiring this close to now are refreshed instead of verified
const EXPIRY_MARGIN_SECONDS: i64 = 10;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Session JSON as stored in the auth cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<SupabaseUser>,
}

impl StoredSession {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now + EXPIRY_MARGIN_SECONDS)
    }
}

/// Subset of the Supabase user object we rely on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl SupabaseUser {
    fn principal(&self) -> Principal {
        Principal {
            subject: self.id.clone(),
            user_id: Uuid::parse_str(&self.id).ok(),
            email: self.email.clone(),
            kind: PrincipalKind::User,
        }
    }
}

/// Result of checking an access token
enum TokenCheck {
    Valid(Principal),
    Expired,
    Rejected,
}

/// Supabase-backed identity provider
pub struct SupabaseIdentity {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    cookie_name: String,
    validator: Option<SupabaseTokenValidator>,
    secure_cookies: bool,
}

impl SupabaseIdentity {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        jwt_secret: Option<&str>,
        secure_cookies: bool,
    ) -> Result<Self, IdentityError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let project_ref = project_ref(&base_url).ok_or_else(|| {
            IdentityError::Misconfigured(format!("cannot derive project ref from {base_url}"))
        })?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Misconfigured(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.to_string(),
            cookie_name: format!("sb-{project_ref}-auth-token"),
            validator: jwt_secret
                .filter(|s| !s.is_empty())
                .map(SupabaseTokenValidator::new),
            secure_cookies,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, IdentityError> {
        Self::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            Some(config.supabase_jwt_secret.as_str()),
            config.environment.is_production(),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Reassemble the raw cookie value, joining chunks in order
    fn read_cookie(&self, cookies: &CookieJar) -> Option<String> {
        if let Some(value) = cookies.get(&self.cookie_name) {
            return Some(value.to_string());
        }

        let mut joined = String::new();
        for index in 0.. {
            match cookies.get(&chunk_name(&self.cookie_name, index)) {
                Some(chunk) => joined.push_str(chunk),
                None => break,
            }
        }
        (!joined.is_empty()).then_some(joined)
    }

    async fn check_token(&self, access_token: &str) -> Result<TokenCheck, IdentityError> {
        match &self.validator {
            Some(validator) => match validator.validate(access_token) {
                Ok(claims) => Ok(TokenCheck::Valid(Principal {
                    user_id: Uuid::parse_str(&claims.sub).ok(),
                    subject: claims.sub,
                    email: claims.email,
                    kind: PrincipalKind::User,
                })),
                Err(JwtError::Expired) => Ok(TokenCheck::Expired),
                Err(e) => {
                    tracing::debug!(error = %e, "Supabase access token rejected");
                    Ok(TokenCheck::Rejected)
                }
            },
            None => self.fetch_user(access_token).await,
        }
    }

    /// Remote verification against the auth server
    async fn fetch_user(&self, access_token: &str) -> Result<TokenCheck, IdentityError> {
        let url = format!("{}/auth/v1/user", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to verify Supabase token: {}", e);
                IdentityError::Unreachable(e.to_string())
            })?;

        match response.status() {
            status if status.is_success() => {
                let user: SupabaseUser = response.json().await.map_err(|e| {
                    IdentityError::MalformedSession(format!("user response: {e}"))
                })?;
                Ok(TokenCheck::Valid(user.principal()))
            }
            // The auth server does not distinguish expired from revoked; let the
            // refresh token decide.
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(TokenCheck::Expired),
            status => Err(IdentityError::UpstreamStatus(status.as_u16())),
        }
    }

    /// Exchange a refresh token for a new session. Not retried.
    async fn refresh(&self, refresh_token: &str) -> Result<Option<StoredSession>, IdentityError> {
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Supabase token refresh failed: {}", e);
                IdentityError::Unreachable(e.to_string())
            })?;

        match response.status() {
            status if status.is_success() => {
                let session: StoredSession = response.json().await.map_err(|e| {
                    IdentityError::MalformedSession(format!("refresh response: {e}"))
                })?;
                Ok(Some(session))
            }
            // Refresh token used, revoked, or unknown
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Ok(None),
            status => Err(IdentityError::UpstreamStatus(status.as_u16())),
        }
    }

    fn principal_for_refreshed(&self, session: &StoredSession) -> Result<Principal, IdentityError> {
        if let Some(user) = &session.user {
            return Ok(user.principal());
        }
        match &self.validator {
            Some(validator) => {
                let claims = validator.validate(&session.access_token)?;
                Ok(Principal {
                    user_id: Uuid::parse_str(&claims.sub).ok(),
                    subject: claims.sub,
                    email: claims.email,
                    kind: PrincipalKind::User,
                })
            }
            None => Err(IdentityError::MalformedSession(
                "refresh response carried no user".to_string(),
            )),
        }
    }

    /// Cookies that store `session`, clearing any chunk layout left over from
    /// the previous value.
    fn session_cookies(
        &self,
        session: &StoredSession,
        existing: &CookieJar,
    ) -> Result<Vec<SetCookie>, IdentityError> {
        let encoded = encode_session(session)?;
        let mut cookies = Vec::new();

        if encoded.len() <= MAX_CHUNK_SIZE {
            cookies.push(self.session_cookie(self.cookie_name.clone(), encoded));
            cookies.extend(
                (0..)
                    .map(|i| chunk_name(&self.cookie_name, i))
                    .take_while(|name| existing.contains(name))
                    .map(|name| self.expired_cookie(name)),
            );
            return Ok(cookies);
        }

        let chunks = split_chunks(&encoded, MAX_CHUNK_SIZE);
        let count = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            cookies.push(self.session_cookie(chunk_name(&self.cookie_name, index), chunk));
        }
        if existing.contains(&self.cookie_name) {
            cookies.push(self.expired_cookie(self.cookie_name.clone()));
        }
        cookies.extend(
            (count..)
                .map(|i| chunk_name(&self.cookie_name, i))
                .take_while(|name| existing.contains(name))
                .map(|name| self.expired_cookie(name)),
        );
        Ok(cookies)
    }

    fn session_cookie(&self, name: String, value: String) -> SetCookie {
        SetCookie::new(name, value)
            .max_age(SESSION_COOKIE_MAX_AGE)
            .secure(self.secure_cookies)
    }

    fn expired_cookie(&self, name: String) -> SetCookie {
        SetCookie::removal(name).secure(self.secure_cookies)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn get_session(&self, cookies: &CookieJar) -> Result<Option<Session>, IdentityError> {
        let Some(raw) = self.read_cookie(cookies) else {
            return Ok(None);
        };

        let stored = decode_session(&raw)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let check = if stored.is_expired(now) {
            TokenCheck::Expired
        } else {
            self.check_token(&stored.access_token).await?
        };

        match check {
            TokenCheck::Valid(principal) => Ok(Some(Session::new(principal))),
            TokenCheck::Rejected => Ok(None),
            TokenCheck::Expired => {
                let Some(refresh_token) = stored.refresh_token.as_deref().filter(|t| !t.is_empty())
                else {
                    return Ok(None);
                };

                let Some(mut refreshed) = self.refresh(refresh_token).await? else {
                    tracing::debug!("Supabase refresh token rejected");
                    return Ok(None);
                };

                if refreshed.expires_at.is_none() {
                    refreshed.expires_at = refreshed.expires_in.map(|secs| now + secs);
                }

                let principal = self.principal_for_refreshed(&refreshed)?;
                tracing::debug!(subject = %principal.subject, "Refreshed Supabase session");

                Ok(Some(Session {
                    principal,
                    refreshed_cookies: self.session_cookies(&refreshed, cookies)?,
                }))
            }
        }
    }
}

/// First DNS label of the Supabase URL host (`abcd` for `https://abcd.supabase.co`)
pub fn project_ref(base_url: &str) -> Option<String> {
    let url = url::Url::parse(base_url).ok()?;
    let host = url.host_str()?;
    host.split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

/// Decode a cookie value into the stored session
pub fn decode_session(raw: &str) -> Result<StoredSession, IdentityError> {
    let json = match raw.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD
                .decode(encoded.trim_end_matches('='))
                .map_err(|e| IdentityError::MalformedSession(format!("base64: {e}")))?;
            String::from_utf8(bytes)
                .map_err(|e| IdentityError::MalformedSession(format!("utf-8: {e}")))?
        }
        None if raw.starts_with('%') => percent_decode(raw),
        None => raw.to_string(),
    };

    serde_json::from_str(&json).map_err(|e| IdentityError::MalformedSession(format!("json: {e}")))
}

/// Encode a session in the `base64-` cookie form
pub fn encode_session(session: &StoredSession) -> Result<String, IdentityError> {
    let json = serde_json::to_string(session)
        .map_err(|e| IdentityError::MalformedSession(format!("json: {e}")))?;
    Ok(format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

fn chunk_name(base: &str, index: usize) -> String {
    format!("{base}.{index}")
}

// Encoded values are ASCII, so byte chunks are valid strings
fn split_chunks(value: &str, size: usize) -> Vec<String> {
    value
        .as_bytes()
        .chunks(size)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

fn percent_decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use mockito::Matcher;

    const SECRET: &str = "supabase-test-jwt-secret-32-chars!";

    fn access_token(exp_offset: i64) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = serde_json::json!({
            "sub": "6f1c1d5e-7a43-4d0b-9f8e-2c1a9d1b7e55",
            "email": "owner@acme.test",
            "role": "authenticated",
            "aud": "authenticated",
            "iat": now,
            "exp": now + exp_offset,
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn stored(access: String, expires_at: Option<i64>) -> StoredSession {
        StoredSession {
            access_token: access,
            refresh_token: Some("refresh-1".into()),
            expires_at,
            expires_in: Some(3600),
            token_type: Some("bearer".into()),
            user: None,
        }
    }

    fn jar(pairs: &[(String, String)]) -> CookieJar {
        let header = pairs
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&header).unwrap());
        CookieJar::from_headers(&headers)
    }

    fn refresh_body() -> String {
        serde_json::json!({
            "access_token": access_token(3600),
            "refresh_token": "refresh-2",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": { "id": "6f1c1d5e-7a43-4d0b-9f8e-2c1a9d1b7e55", "email": "owner@acme.test" }
        })
        .to_string()
    }

    #[test]
    fn test_project_ref() {
        assert_eq!(project_ref("https://abcdefgh.supabase.co").as_deref(), Some("abcdefgh"));
        assert_eq!(project_ref("http://127.0.0.1:54321").as_deref(), Some("127"));
        assert_eq!(project_ref("not a url"), None);
    }

    #[test]
    fn test_decode_cookie_forms() {
        let session = stored("tok".into(), Some(42));

        let encoded = encode_session(&session).unwrap();
        assert!(encoded.starts_with("base64-"));
        assert_eq!(decode_session(&encoded).unwrap().access_token, "tok");

        let raw = serde_json::to_string(&session).unwrap();
        assert_eq!(decode_session(&raw).unwrap().expires_at, Some(42));

        let escaped = "%7B%22access_token%22%3A%22tok%22%7D";
        assert_eq!(decode_session(escaped).unwrap().access_token, "tok");

        assert!(matches!(
            decode_session("base64-@@@"),
            Err(IdentityError::MalformedSession(_))
        ));
    }

    #[tokio::test]
    async fn test_chunked_cookie_verified_locally() {
        let identity =
            SupabaseIdentity::new("https://abcdefgh.supabase.co", "anon", Some(SECRET), false)
                .unwrap();
        assert_eq!(identity.cookie_name(), "sb-abcdefgh-auth-token");

        let encoded = encode_session(&stored(access_token(3600), None)).unwrap();
        let (head, tail) = encoded.split_at(encoded.len() / 2);
        let cookies = jar(&[
            (format!("{}.1", identity.cookie_name()), tail.to_string()),
            (format!("{}.0", identity.cookie_name()), head.to_string()),
        ]);

        let session = identity.get_session(&cookies).await.unwrap().expect("session");
        assert_eq!(session.principal.email.as_deref(), Some("owner@acme.test"));
        assert!(session.principal.user_id.is_some());
        assert!(session.refreshed_cookies.is_empty());
    }

    #[tokio::test]
    async fn test_no_cookie_is_no_session() {
        let identity = SupabaseIdentity::new("http://127.0.0.1:1", "anon", None, false).unwrap();
        assert!(identity.get_session(&CookieJar::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_verification() {
        let mut server = mockito::Server::new_async().await;
        let user = server
            .mock("GET", "/auth/v1/user")
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer opaque-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"6f1c1d5e-7a43-4d0b-9f8e-2c1a9d1b7e55","email":"owner@acme.test"}"#)
            .create_async()
            .await;

        let identity = SupabaseIdentity::new(&server.url(), "anon", None, false).unwrap();
        let encoded = encode_session(&stored("opaque-token".into(), None)).unwrap();
        let cookies = jar(&[(identity.cookie_name().to_string(), encoded)]);

        let session = identity.get_session(&cookies).await.unwrap().expect("session");
        assert_eq!(session.principal.subject, "6f1c1d5e-7a43-4d0b-9f8e-2c1a9d1b7e55");
        user.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .match_header("apikey", "anon")
            .match_body(Matcher::Json(serde_json::json!({ "refresh_token": "refresh-1" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(refresh_body())
            .expect(1)
            .create_async()
            .await;

        let identity = SupabaseIdentity::new(&server.url(), "anon", Some(SECRET), true).unwrap();
        let name = identity.cookie_name().to_string();
        let encoded = encode_session(&stored(access_token(-3600), None)).unwrap();
        let cookies = jar(&[(format!("{name}.0"), encoded)]);

        let session = identity.get_session(&cookies).await.unwrap().expect("session");
        refresh.assert_async().await;

        let written = &session.refreshed_cookies[0];
        assert_eq!(written.name, name);
        assert_eq!(written.max_age, Some(SESSION_COOKIE_MAX_AGE));
        assert!(written.secure);
        let decoded = decode_session(&written.value).unwrap();
        assert_eq!(decoded.refresh_token.as_deref(), Some("refresh-2"));
        assert!(decoded.expires_at.is_some());

        // The old chunk is cleared
        let cleared = &session.refreshed_cookies[1];
        assert_eq!(cleared.name, format!("{name}.0"));
        assert!(cleared.is_removal());
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_no_session() {
        let mut server = mockito::Server::new_async().await;
        let _refresh = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let identity = SupabaseIdentity::new(&server.url(), "anon", None, false).unwrap();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let encoded = encode_session(&stored("stale".into(), Some(now - 60))).unwrap();
        let cookies = jar(&[(identity.cookie_name().to_string(), encoded)]);

        assert!(identity.get_session(&cookies).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _user = server
            .mock("GET", "/auth/v1/user")
            .with_status(503)
            .create_async()
            .await;

        let identity = SupabaseIdentity::new(&server.url(), "anon", None, false).unwrap();
        let encoded = encode_session(&stored("opaque".into(), None)).unwrap();
        let cookies = jar(&[(identity.cookie_name().to_string(), encoded)]);

        assert!(matches!(
            identity.get_session(&cookies).await,
            Err(IdentityError::UpstreamStatus(503))
        ));
    }

    #[test]
    fn test_large_session_is_chunked() {
        let identity =
            SupabaseIdentity::new("https://abcdefgh.supabase.co", "anon", None, false).unwrap();
        let mut session = stored("x".repeat(MAX_CHUNK_SIZE * 2), None);
        session.user = Some(SupabaseUser {
            id: "u".into(),
            email: None,
        });
        let name = identity.cookie_name().to_string();
        let existing = jar(&[(name.clone(), "old".into())]);

        let cookies = identity.session_cookies(&session, &existing).unwrap();
        let written: Vec<_> = cookies.iter().filter(|c| !c.is_removal()).collect();
        assert!(written.len() >= 3);
        assert!(written.iter().all(|c| c.value.len() <= MAX_CHUNK_SIZE));
        assert_eq!(written[0].name, format!("{name}.0"));

        let joined: String = written.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(decode_session(&joined).unwrap().access_token.len(), MAX_CHUNK_SIZE * 2);

        // The unchunked cookie is cleared
        assert!(cookies.iter().any(|c| c.name == name && c.is_removal()));
    }
}
