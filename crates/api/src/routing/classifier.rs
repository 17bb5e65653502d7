//! Host-to-tenant classification
//!
//! Derives the tenant context of a request from its Host header:
//! - Root or www: example.com, www.example.com -> marketing
//! - Platform operator: admin.example.com -> superadmin
//! - Tenant subdomains: acme.example.com -> tenant "acme"
//! - Local development: localhost:3000/?org=acme -> tenant "acme"

use crate::config::{Config, Environment};

use super::RequestContext;

/// Subdomain reserved for the platform operator area
pub const SUPERADMIN_SUBDOMAIN: &str = "admin";

/// Query parameter standing in for the subdomain on the development host
pub const DEV_ORG_PARAM: &str = "org";

/// Pure classifier from (host, query) to [`RequestContext`]
#[derive(Debug, Clone)]
pub struct HostClassifier {
    root_domain: String,
    root_label: String,
    dev_host: String,
    dev_fallback: bool,
}

impl HostClassifier {
    /// Create a classifier for a root domain such as `example.com`
    pub fn new(root_domain: &str, dev_host: &str, environment: Environment) -> Self {
        let root_domain = root_domain.trim_start_matches('.').to_ascii_lowercase();
        let root_label = root_domain
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            root_domain,
            root_label,
            dev_host: dev_host.to_ascii_lowercase(),
            dev_fallback: !environment.is_production(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.app_domain, &config.dev_host, config.environment)
    }

    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }

    /// Classify a request.
    ///
    /// `host` is the raw Host header (port allowed) and `query` the raw query
    /// string. Missing or malformed hosts classify as marketing.
    pub fn classify(&self, host: Option<&str>, query: Option<&str>) -> RequestContext {
        let subdomain = host.and_then(|raw| self.extract_subdomain(raw, query));

        match subdomain {
            Some(sub) if sub == SUPERADMIN_SUBDOMAIN => RequestContext::Superadmin,
            Some(sub) => RequestContext::Tenant { slug: sub },
            None => RequestContext::Marketing,
        }
    }

    /// Cookie `Domain` attribute for cookies written on this host.
    ///
    /// Hosts under the root domain share one session across every subdomain,
    /// so cookies are scoped to `.{root}`. Other hosts (development) get
    /// host-only cookies.
    pub fn cookie_domain(&self, host: Option<&str>) -> Option<String> {
        let host = normalize_host(host?);
        self.is_under_root(&host)
            .then(|| format!(".{}", self.root_domain))
    }

    fn extract_subdomain(&self, raw_host: &str, query: Option<&str>) -> Option<String> {
        let host = normalize_host(raw_host);

        if self.is_under_root(&host) {
            let base_suffix = format!(".{}", self.root_domain);
            let remainder = host.strip_suffix(&base_suffix).unwrap_or(&host);
            let label = remainder.split('.').next().unwrap_or_default();

            if label.is_empty() || label == "www" || label == self.root_label {
                return None;
            }
            return sanitize_label(label);
        }

        if self.dev_fallback && raw_host.trim().eq_ignore_ascii_case(&self.dev_host) {
            let value = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
                .find(|(key, _)| key == DEV_ORG_PARAM)
                .map(|(_, value)| value.trim().to_ascii_lowercase())?;
            return sanitize_label(&value);
        }

        None
    }

    fn is_under_root(&self, host: &str) -> bool {
        host == self.root_domain
            || host
                .strip_suffix(&self.root_domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Normalize a host header value
fn normalize_host(host: &str) -> String {
    // Remove port if present
    let host = host.trim().split(':').next().unwrap_or_default();
    // Lowercase, ignore a trailing root dot
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// A subdomain must be usable as a slug and a header value; anything else is
/// treated as no subdomain at all.
fn sanitize_label(label: &str) -> Option<String> {
    let valid = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| label.to_string())
}
