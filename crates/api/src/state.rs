//! Application state shared by every handler

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    auth::{IdentityProvider, PasswordIdentity},
    config::Config,
    directory::TenantDirectory,
    routing::{GateState, HostClassifier},
};

/// Built once in `main` and cloned into each request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub identity: Arc<dyn IdentityProvider>,
    /// Present only for the shared-password strategy
    pub admin_sessions: Option<Arc<PasswordIdentity>>,
    pub directory: Arc<dyn TenantDirectory>,
    pub classifier: Arc<HostClassifier>,
}

impl AppState {
    pub fn new(
        config: Config,
        pool: PgPool,
        identity: Arc<dyn IdentityProvider>,
        admin_sessions: Option<Arc<PasswordIdentity>>,
        directory: Arc<dyn TenantDirectory>,
    ) -> Self {
        let classifier = Arc::new(HostClassifier::from_config(&config));
        Self {
            config: Arc::new(config),
            pool,
            identity,
            admin_sessions,
            directory,
            classifier,
        }
    }

    /// State for the tenant gate middleware
    pub fn gate_state(&self) -> GateState {
        GateState {
            classifier: self.classifier.clone(),
            identity: self.identity.clone(),
        }
    }
}
