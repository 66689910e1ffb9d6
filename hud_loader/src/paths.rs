/// Join a site `prefix` and a `path`.
///
/// Only root-relative paths are rewritten: absolute `http(s)://` URLs and
/// relative paths are returned untouched, and so is everything when the
/// prefix is the site root `/`.
#[must_use]
pub fn join(prefix: &str, path: &str) -> String {
    if path.is_empty()
        || prefix == "/"
        || path.starts_with("http://")
        || path.starts_with("https://")
        || !path.starts_with('/')
    {
        return path.to_string();
    }

    format!("{}{}", prefix.trim_end_matches('/'), path)
}

/// Site prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = ".";

/// Normalise a configured prefix: empty means [`DEFAULT_PREFIX`].
#[must_use]
pub fn prefix_or_default(prefix: &str) -> &str {
    let prefix = prefix.trim();
    if prefix.is_empty() { DEFAULT_PREFIX } else { prefix }
}
