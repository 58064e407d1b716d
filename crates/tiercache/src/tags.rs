//! Tag conventions
//!
//! Explicit tags are attached by application code at write time. Implicit
//! tags are derived by the host framework from the route being rendered and
//! carry the [`IMPLICIT_TAG_PREFIX`].

use crate::{CacheError, Result};

/// Prefix marking framework-internal tags.
pub const IMPLICIT_TAG_PREFIX: &str = "_N_T_";

/// Longest accepted tag, in characters.
pub const MAX_TAG_LENGTH: usize = 256;

/// Whether `tag` is framework-supplied rather than user-supplied.
pub fn is_implicit_tag(tag: &str) -> bool {
    tag.starts_with(IMPLICIT_TAG_PREFIX)
}

/// Implicit tag naming a single path.
pub fn implicit_tag_for_path(path: &str) -> String {
    format!("{IMPLICIT_TAG_PREFIX}{path}")
}

/// Implicit tags of a rendered path: one layout tag per path segment,
/// followed by the path itself.
///
/// `/blog/1` yields `_N_T_/layout`, `_N_T_/blog/layout`,
/// `_N_T_/blog/1/layout` and `_N_T_/blog/1`.
pub fn implicit_tags_for_path(path: &str) -> Vec<String> {
    let mut tags = vec![implicit_tag_for_path("/layout")];
    let mut prefix = String::new();

    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        prefix.push('/');
        prefix.push_str(segment);
        tags.push(implicit_tag_for_path(&format!("{prefix}/layout")));
    }

    let normalized = if prefix.is_empty() { "/" } else { prefix.as_str() };
    let page_tag = implicit_tag_for_path(normalized);
    if !tags.contains(&page_tag) {
        tags.push(page_tag);
    }
    tags
}

/// Reject empty or over-long tags.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(CacheError::InvalidTag {
            message: "tag must not be empty".to_string(),
        });
    }
    if tag.chars().count() > MAX_TAG_LENGTH {
        return Err(CacheError::InvalidTag {
            message: format!("tag exceeds {MAX_TAG_LENGTH} characters"),
        });
    }
    Ok(())
}
