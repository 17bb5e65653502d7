//! TipJar Shared Types and Utilities
//!
//! Domain rows, slug rules and database plumbing used by the API server.

pub mod db;
pub mod slug;
pub mod types;

pub use db::*;
pub use slug::{generate_slug, is_reserved_slug, validate_org_slug, SlugError, RESERVED_SLUGS};
pub use types::*;
