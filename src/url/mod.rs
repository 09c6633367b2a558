//! URL handling module for metacrawl
//!
//! This module resolves discovered hrefs, strips fragments to produce the
//! canonical frontier key, and decides domain-scope membership.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, in_scope};
pub use normalize::{canonicalize, normalize_links, parse_seed};
