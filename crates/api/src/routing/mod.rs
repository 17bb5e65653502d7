//! Host-based tenant resolution
//!
//! Every request passes through [`tenant_gate`], which classifies the Host
//! header into one of three areas:
//! - Marketing: example.com, www.example.com
//! - Platform operator: admin.example.com
//! - Tenant: acme.example.com (or localhost:3000/?org=acme in development)
//!
//! and sends requests for session-only paths without a session to `/login`.

mod assets;
mod classifier;
mod context;
mod gate;

pub use assets::is_static_asset;
pub use classifier::{HostClassifier, DEV_ORG_PARAM, SUPERADMIN_SUBDOMAIN};
pub use context::{
    strip_context_headers, RequestContext, SubdomainType, LOGIN_PATH, ORGANIZATION_SLUG_HEADER,
    SUBDOMAIN_HEADER, SUBDOMAIN_TYPE_HEADER, TENANT_PROTECTED_PREFIX,
};
pub use gate::{tenant_gate, GateState};
