//! Authentication for TipJar
//!
//! Session checks go through one [`IdentityProvider`], chosen at startup by
//! `AUTH_STRATEGY`.

pub mod admin_session;
pub mod cookies;
pub mod extract;
pub mod identity;
pub mod jwt;
pub mod password;
pub mod supabase;

use std::sync::Arc;

use crate::config::{AuthStrategy, Config};

pub use admin_session::{PasswordIdentity, ADMIN_SESSION_COOKIE};
pub use cookies::{CookieJar, ResponseCookies, SameSite, SetCookie};
pub use extract::CurrentPrincipal;
pub use identity::{
    authenticate, Authentication, IdentityError, IdentityProvider, Principal, PrincipalKind,
    Session,
};
pub use jwt::{JwtError, JwtManager, SupabaseTokenValidator};
pub use password::{hash_password, verify_password, PasswordError};
pub use supabase::SupabaseIdentity;

/// Identity provider for the configured strategy.
///
/// The password strategy also hands back its concrete provider so the login
/// routes can issue and clear session cookies.
pub fn build_identity_provider(
    config: &Config,
) -> Result<(Arc<dyn IdentityProvider>, Option<Arc<PasswordIdentity>>), IdentityError> {
    match config.auth_strategy {
        AuthStrategy::Supabase => {
            let supabase = SupabaseIdentity::from_config(config)?;
            tracing::info!(cookie = supabase.cookie_name(), "Using Supabase identity provider");
            Ok((Arc::new(supabase), None))
        }
        AuthStrategy::Password => {
            let jwt = JwtManager::new(&config.admin_session_secret, config.admin_session_ttl_hours);
            let password = Arc::new(PasswordIdentity::new(
                jwt,
                config.environment.is_production(),
            ));
            tracing::info!("Using shared admin password identity provider");
            Ok((password.clone(), Some(password)))
        }
    }
}
