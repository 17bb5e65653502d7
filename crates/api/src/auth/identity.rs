//! Identity provider interface
//!
//! Every session check in the application goes through [`IdentityProvider`].
//! Which implementation backs it (Supabase cookies or the shared admin
//! password) is a deployment choice made once at startup.

use async_trait::async_trait;
use uuid::Uuid;

use super::{cookies::CookieJar, jwt::JwtError, SetCookie};

/// What kind of principal a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    /// A user account managed by the identity provider
    User,
    /// The platform operator (legacy shared admin password)
    PlatformAdmin,
}

/// Authenticated principal behind a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Provider subject (user UUID for Supabase, "admin" for the password strategy)
    pub subject: String,
    /// Parsed user ID, when the subject is one
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn is_platform_admin(&self) -> bool {
        self.kind == PrincipalKind::PlatformAdmin
    }
}

/// A valid session plus any cookies the provider wants rewritten
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    /// Refreshed session cookies to write on the response
    pub refreshed_cookies: Vec<SetCookie>,
}

impl Session {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            refreshed_cookies: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity provider unreachable: {0}")]
    Unreachable(String),
    #[error("Identity provider returned status {0}")]
    UpstreamStatus(u16),
    #[error("Session token expired")]
    Expired,
    #[error("Malformed session: {0}")]
    MalformedSession(String),
    #[error("Invalid session token: {0}")]
    Token(#[from] JwtError),
    #[error("Identity provider misconfigured: {0}")]
    Misconfigured(String),
}

/// Source of truth for "does this request carry a valid session"
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Look up the session carried by `cookies`.
    ///
    /// `Ok(None)` means no session; `Err` means the lookup itself failed.
    async fn get_session(&self, cookies: &CookieJar) -> Result<Option<Session>, IdentityError>;
}

/// Outcome of [`authenticate`]
#[derive(Debug)]
pub enum Authentication {
    Authenticated(Session),
    Unauthenticated,
}

/// Authenticate a request, failing closed.
///
/// Provider errors are logged and reported as `Unauthenticated`; callers never
/// have to decide what a failed lookup means.
pub async fn authenticate(provider: &dyn IdentityProvider, cookies: &CookieJar) -> Authentication {
    match provider.get_session(cookies).await {
        Ok(Some(session)) => Authentication::Authenticated(session),
        Ok(None) => Authentication::Unauthenticated,
        Err(e) => {
            tracing::warn!(provider = provider.name(), error = %e, "Session lookup failed, treating as unauthenticated");
            Authentication::Unauthenticated
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted identity provider for router tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub enum Script {
        Session(Session),
        NoSession,
        Fail,
    }

    pub struct FakeIdentity {
        script: Script,
        calls: AtomicUsize,
    }

    impl FakeIdentity {
        pub fn new(script: Script) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn user_principal() -> Principal {
        let id = Uuid::new_v4();
        Principal {
            subject: id.to_string(),
            user_id: Some(id),
            email: Some("owner@acme.test".into()),
            kind: PrincipalKind::User,
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn get_session(&self, _cookies: &CookieJar) -> Result<Option<Session>, IdentityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Session(session) => Ok(Some(session.clone())),
                Script::NoSession => Ok(None),
                Script::Fail => Err(IdentityError::Unreachable("connection refused".into())),
            }
        }
    }
}
