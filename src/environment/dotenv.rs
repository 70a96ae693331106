//! Minimal `.env` parsing with modification-time caching.
//!
//! Supports `KEY=VALUE` lines, `#` comments, an optional `export ` prefix,
//! and one layer of matching single or double quotes. No shell expansion or
//! command substitution is performed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use super::cache::StampedCache;

/// Parsed dotenv contents.
pub type DotenvVars = HashMap<String, String>;

/// Parse dotenv text into a key/value mapping; later keys win.
#[must_use]
pub fn parse_dotenv(content: &str) -> DotenvVars {
    let mut vars = DotenvVars::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("export ") {
            line = rest.trim_start();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_owned(), unquote(value.trim()).to_owned());
    }
    vars
}

/// Strip one layer of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Dotenv loader caching parse results by file path and modification time.
#[derive(Debug, Default)]
pub struct DotenvLoader {
    cache: StampedCache<PathBuf, SystemTime, DotenvVars>,
}

impl DotenvLoader {
    /// Loader with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path`, serving the cached parse while its mtime is unchanged.
    ///
    /// A missing or unreadable file yields an empty mapping and evicts any
    /// stale cache entry.
    pub fn load(&self, path: &Path) -> DotenvVars {
        let key = path.to_path_buf();
        let mtime = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(mtime) => mtime,
            Err(err) => {
                debug!(path = %path.display(), %err, "dotenv file unavailable");
                self.cache.invalidate(&key);
                return DotenvVars::new();
            }
        };

        let loaded = self.cache.get_or_load(key.clone(), mtime, || {
            fs::read(path).map(|bytes| {
                let vars = parse_dotenv(&String::from_utf8_lossy(&bytes));
                debug!(path = %path.display(), count = vars.len(), "dotenv file parsed");
                vars
            })
        });
        loaded.unwrap_or_else(|err| {
            warn!(path = %path.display(), %err, "failed to read dotenv file");
            self.cache.invalidate(&key);
            DotenvVars::new()
        })
    }

    /// Number of cached files.
    #[must_use]
    pub fn cached_files(&self) -> usize {
        self.cache.len()
    }
}
