//! Static asset exclusion
//!
//! Asset requests never reach the resolver: they carry no tenant semantics and
//! must not trigger session lookups.

/// Framework-internal asset prefixes
const ASSET_PREFIXES: &[&str] = &["/_next/static/", "/_next/image", "/static/", "/assets/"];

/// Exact asset paths
const ASSET_PATHS: &[&str] = &["/favicon.ico", "/robots.txt"];

/// Image and font extensions served as plain files
const ASSET_EXTENSIONS: &[&str] = &[
    "svg", "png", "jpg", "jpeg", "gif", "webp", "ico", "woff", "woff2", "ttf", "otf",
];

/// Check if a request path is a static asset
pub fn is_static_asset(path: &str) -> bool {
    if ASSET_PATHS.contains(&path) || ASSET_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return true;
    }

    let file_name = path.rsplit('/').next().unwrap_or_default();
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ASSET_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}
