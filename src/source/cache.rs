//! Last-known-good cache for source feeds
//!
//! One newline-delimited text file per source URL, overwritten on every
//! successful fetch and read back only when all fetch retries are exhausted.
//! There is no cross-process locking; the tool is expected to run as a
//! single sequential pass.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

/// Filesystem cache of last successfully fetched feeds
#[derive(Debug, Clone)]
pub struct FeedCache {
    dir: PathBuf,
}

impl FeedCache {
    /// Create a cache rooted at the given directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Cache directory root
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache entry for a source URL
    ///
    /// The filename is derived from the last path segment of the URL, with
    /// any query string stripped and unsafe characters replaced.
    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(derive_filename(url))
    }

    /// Overwrite the cache entry for a source URL
    pub async fn store(&self, url: &str, members: &HashSet<String>) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let mut lines: Vec<&str> = members.iter().map(String::as_str).collect();
        lines.sort_unstable();
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        let path = self.entry_path(url);
        fs::write(&path, content).await?;

        debug!(path = %path.display(), members = members.len(), "Cache entry written");
        Ok(())
    }

    /// Read the cache entry for a source URL, if one exists
    pub async fn load(&self, url: &str) -> Option<HashSet<String>> {
        let path = self.entry_path(url);

        match fs::read_to_string(&path).await {
            Ok(content) => {
                let members: HashSet<String> = content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect();
                debug!(path = %path.display(), members = members.len(), "Cache entry loaded");
                Some(members)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read cache entry");
                None
            }
        }
    }
}

/// Derive a safe cache filename from a source URL
fn derive_filename(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query);

    let sanitized: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "feed".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Filename comes from the last path segment
    #[test]
    fn test_filename_from_last_segment() {
        assert_eq!(
            derive_filename("https://feeds.example.com/lists/bad-ips.txt"),
            "bad-ips.txt"
        );
        assert_eq!(
            derive_filename("https://example.com/ranges.json"),
            "ranges.json"
        );
    }

    // Test 2: Query strings and fragments are stripped
    #[test]
    fn test_filename_strips_query() {
        assert_eq!(
            derive_filename("https://example.com/feed.txt?token=abc&v=2"),
            "feed.txt"
        );
        assert_eq!(derive_filename("https://example.com/feed.txt#top"), "feed.txt");
    }

    // Test 3: Unsafe characters are replaced and empty segments get a fallback
    #[test]
    fn test_filename_sanitized() {
        assert_eq!(derive_filename("https://example.com/a b:c"), "a_b_c");
        assert_eq!(derive_filename("https://example.com/"), "example.com");
        assert_eq!(derive_filename(""), "feed");
    }

    // Test 4: Store then load round-trips the member set
    #[tokio::test]
    async fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path());

        let members: HashSet<String> = ["1.1.1.1", "2.2.2.2", "10.0.0.0/8"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let url = "https://example.com/feed.txt";
        cache.store(url, &members).await.unwrap();

        let loaded = cache.load(url).await.unwrap();
        assert_eq!(loaded, members);
    }

    // Test 5: Store overwrites the previous entry
    #[tokio::test]
    async fn test_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path());
        let url = "https://example.com/feed.txt";

        let first: HashSet<String> = ["1.1.1.1"].iter().map(|s| s.to_string()).collect();
        cache.store(url, &first).await.unwrap();

        let second: HashSet<String> = ["2.2.2.2", "3.3.3.3"].iter().map(|s| s.to_string()).collect();
        cache.store(url, &second).await.unwrap();

        assert_eq!(cache.load(url).await.unwrap(), second);
    }

    // Test 6: Loading a missing entry returns None
    #[tokio::test]
    async fn test_load_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path());

        assert!(cache.load("https://example.com/absent.txt").await.is_none());
    }

    // Test 7: Different URLs with the same filename share an entry
    #[tokio::test]
    async fn test_same_filename_shares_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path());

        assert_eq!(
            cache.entry_path("https://a.example.com/feed.txt"),
            cache.entry_path("https://b.example.com/feed.txt")
        );
    }
}
