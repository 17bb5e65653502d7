//! Slug rules for organizations (subdomains) and locations

/// Slugs an organization may not claim; each one is either a platform
/// subdomain or a first-level route on the marketing site.
pub const RESERVED_SLUGS: &[&str] = &[
    "admin",
    "api",
    "www",
    "app",
    "dashboard",
    "login",
    "signup",
    "auth",
];

/// Maximum organization slug length (one DNS label stays well under 63)
pub const MAX_ORG_SLUG_LEN: usize = 50;

/// Why an organization slug was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlugError {
    #[error("URL slug is required")]
    Empty,
    #[error("URL slug must be at most {MAX_ORG_SLUG_LEN} characters")]
    TooLong,
    #[error("URL can only contain lowercase letters, numbers, and hyphens")]
    InvalidCharacters,
    #[error("This URL is not available")]
    Reserved,
}

/// Validate a requested organization slug
pub fn validate_org_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::Empty);
    }

    if slug.len() > MAX_ORG_SLUG_LEN {
        return Err(SlugError::TooLong);
    }

    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(SlugError::InvalidCharacters);
    }

    if is_reserved_slug(slug) {
        return Err(SlugError::Reserved);
    }

    Ok(())
}

pub fn is_reserved_slug(slug: &str) -> bool {
    RESERVED_SLUGS.contains(&slug)
}

/// Derive a URL slug from a display name.
///
/// Lowercases, collapses every run of non `[a-z0-9]` characters into a single
/// hyphen and trims hyphens from both ends: `"Main St. Café"` → `"main-st-caf"`.
pub fn generate_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}
