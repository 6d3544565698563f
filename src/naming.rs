//! Mapping from resource URLs to file names inside the cache directory

use std::fmt;
use std::sync::Arc;
use url::Url;
use xxhash_rust::xxh3::xxh3_128;

/// Suffix appended to a resource's base name to form its sidecar file
pub const SIDECAR_SUFFIX: &str = ".cfg";

/// Suffix of the scratch file a sidecar is written to before being renamed
pub const SIDECAR_TMP_SUFFIX: &str = ".cfg.tmp";

/// Strategy that turns a resource URL into a filesystem-safe base name
///
/// Implementations must be deterministic: the same URL always yields the
/// same name, otherwise previously cached bytes become unreachable.
pub trait NamingStrategy: Send + Sync {
    fn name_for(&self, url: &str) -> String;
}

/// Default strategy: 128-bit XXH3 digest of the canonical URL, hex encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct HashNaming;

impl HashNaming {
    /// Canonical form of a URL string
    ///
    /// Parsing normalizes scheme/host case, default ports and empty paths,
    /// so `HTTP://Example.com:80` and `http://example.com/` share a name.
    /// Strings that do not parse as URLs are used as-is, trimmed.
    pub fn canonicalize(url: &str) -> String {
        let trimmed = url.trim();
        match Url::parse(trimmed) {
            Ok(parsed) => parsed.to_string(),
            Err(_) => trimmed.to_string(),
        }
    }
}

impl NamingStrategy for HashNaming {
    fn name_for(&self, url: &str) -> String {
        let digest = xxh3_128(Self::canonicalize(url).as_bytes());
        format!("{:032x}", digest)
    }
}

/// Strategy backed by a caller-supplied closure
pub struct FnNaming<F>(pub F);

impl<F> NamingStrategy for FnNaming<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn name_for(&self, url: &str) -> String {
        sanitize((self.0)(url))
    }
}

impl<F> fmt::Debug for FnNaming<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnNaming(..)")
    }
}

/// Shared handle to an installed naming strategy
pub type SharedNaming = Arc<dyn NamingStrategy>;

/// Keep custom names inside the cache directory
///
/// Path separators and parent references are replaced so that a rule
/// cannot escape the root, and names that would collide with sidecar
/// artifacts get a marker appended.
fn sanitize(name: String) -> String {
    let mut name: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    if name.is_empty() || name == "." || name == ".." {
        name = format!("_{}", name);
    }
    if name.ends_with(SIDECAR_SUFFIX) || name.ends_with(SIDECAR_TMP_SUFFIX) {
        name.push('_');
    }
    name
}

/// Name of the sidecar belonging to a base name
pub fn sidecar_name(base: &str) -> String {
    format!("{}{}", base, SIDECAR_SUFFIX)
}

/// Name of the scratch sidecar belonging to a base name
pub fn sidecar_tmp_name(base: &str) -> String {
    format!("{}{}", base, SIDECAR_TMP_SUFFIX)
}

/// Split a cache directory entry name into its base name and whether it is
/// a sidecar artifact
pub fn classify(file_name: &str) -> (&str, bool) {
    if let Some(base) = file_name.strip_suffix(SIDECAR_TMP_SUFFIX) {
        (base, true)
    } else if let Some(base) = file_name.strip_suffix(SIDECAR_SUFFIX) {
        (base, true)
    } else {
        (file_name, false)
    }
}
