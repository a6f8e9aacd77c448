//! URL building helpers.
//!
//! Origins and base paths are joined to logical paths with exactly one
//! separating slash.

/// Strip trailing slashes from an origin.
pub fn trim_origin(origin: &str) -> &str {
    origin.trim().trim_end_matches('/')
}

/// Join a base (origin or local base path) and a logical path.
pub fn join(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Normalize a local fallback base path to a leading slash and no trailing
/// slash. The root path normalizes to the empty string so joined URLs start
/// with a single `/`.
pub fn normalize_base_path(base: &str) -> String {
    let trimmed = base.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if base.contains("://") {
        trim_origin(base).to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Whether `path` is already an absolute URL the resolver must not touch.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("//")
        || path.starts_with("data:")
        || path.starts_with("blob:")
}
