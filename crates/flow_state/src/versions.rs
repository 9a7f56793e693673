//! Version disambiguation for search results

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::SearchResult;

static VERSION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*v\d+(\.\d+)?$").expect("version suffix pattern is valid"));

/// Strip a trailing version suffix (`v2`, ` V1.3`) and lower-case the rest.
pub fn base_title(title: &str) -> String {
    VERSION_SUFFIX.replace(title, "").to_lowercase()
}

/// True when two or more results share a base title.
pub fn check_multiple_versions(results: &[SearchResult]) -> bool {
    let mut seen = HashSet::with_capacity(results.len());
    results
        .iter()
        .any(|result| !seen.insert(base_title(&result.title)))
}
