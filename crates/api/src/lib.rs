//! TipJar API Library
//!
//! Tenant & session resolution for the TipJar multi-tenant tipping service,
//! plus the JSON API behind it.

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod routes;
pub mod routing;
pub mod security;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routing::{HostClassifier, RequestContext, SubdomainType};
pub use state::AppState;
