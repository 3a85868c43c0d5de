//! On-disk asset cache for the rendered strategy.
//!
//! Assets are keyed by the basename of their resolved URL path and kept for
//! the lifetime of the process. Two URLs sharing a basename share one slot:
//! the first to claim it owns the file, and a hit is only served for that
//! exact source URL. The other URL always goes upstream.

use std::path::PathBuf;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use url::Url;

use crate::observability::metrics;

/// Extensions that name documents rather than static assets.
const DOCUMENT_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "jsp", "cgi"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    /// Claimed by a fetch in flight.
    Pending,
    /// Written to disk from this source URL.
    Stored(Url),
}

/// A cache hit.
#[derive(Debug, Clone)]
pub struct CachedAsset {
    pub body: Bytes,
    pub content_type: String,
}

/// Basename-keyed, write-once asset store.
#[derive(Debug)]
pub struct AssetCache {
    dir: PathBuf,
    index: DashMap<String, Slot>,
}

impl AssetCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index: DashMap::new(),
        }
    }

    /// Cache key for `url`: the last path segment, restricted to a safe
    /// filename alphabet.
    pub fn key(url: &Url) -> Option<String> {
        let name = url.path_segments()?.next_back()?;
        if name.is_empty() || name.starts_with('.') {
            return None;
        }
        let safe = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        safe.then(|| name.to_string())
    }

    /// True when the URL path ends in a non-document file extension.
    pub fn is_asset_path(url: &Url) -> bool {
        let Some(name) = url.path_segments().and_then(|mut s| s.next_back()) else {
            return false;
        };
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                !DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
            }
            _ => false,
        }
    }

    /// Reserve `url` for fetching. Returns false if it is already stored or
    /// another task holds the claim.
    pub fn claim(&self, url: &Url) -> bool {
        let Some(key) = Self::key(url) else {
            return false;
        };
        match self.index.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Slot::Pending);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Drop a claim whose fetch failed so a later request may retry.
    pub fn release(&self, url: &Url) {
        if let Some(key) = Self::key(url) {
            self.index.remove_if(&key, |_, slot| *slot == Slot::Pending);
        }
    }

    /// Read a stored asset.
    pub async fn load(&self, url: &Url) -> Option<CachedAsset> {
        let key = Self::key(url)?;
        let stored = self
            .index
            .get(&key)
            .is_some_and(|slot| matches!(&*slot, Slot::Stored(source) if source == url));
        metrics::record_asset_cache(stored);
        if !stored {
            return None;
        }

        match tokio::fs::read(self.dir.join(&key)).await {
            Ok(body) => Some(CachedAsset {
                body: Bytes::from(body),
                content_type: mime_guess::from_path(&key)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
            }),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cached asset unreadable, evicting");
                self.index.remove(&key);
                None
            }
        }
    }

    /// Write `body` for `url`. Concurrent writers of the same key race and
    /// the last write wins; the slot then names the last writer's URL.
    pub async fn store(&self, url: &Url, body: &[u8]) -> std::io::Result<()> {
        let Some(key) = Self::key(url) else {
            return Ok(());
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&key), body).await?;
        self.index.insert(key, Slot::Stored(url.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_key_is_basename() {
        assert_eq!(AssetCache::key(&url("https://e.com/static/js/app.min.js?v=3")), Some("app.min.js".into()));
        assert_eq!(AssetCache::key(&url("https://e.com/dir/")), None);
        assert_eq!(AssetCache::key(&url("https://e.com/a/%2E%2E%2Fetc")), None);
        assert_eq!(AssetCache::key(&url("https://e.com/.env")), None);
    }

    #[test]
    fn test_asset_path_detection() {
        assert!(AssetCache::is_asset_path(&url("https://e.com/img/logo.png")));
        assert!(AssetCache::is_asset_path(&url("https://e.com/app.js")));
        assert!(!AssetCache::is_asset_path(&url("https://e.com/index.html")));
        assert!(!AssetCache::is_asset_path(&url("https://e.com/about")));
        assert!(!AssetCache::is_asset_path(&url("https://e.com/")));
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::new(dir.path().join("assets"));
        let u = url("https://e.com/css/site.css");

        assert!(cache.load(&u).await.is_none());
        assert!(cache.claim(&u));
        assert!(!cache.claim(&u), "second claim must lose");

        cache.store(&u, b"body{}").await.unwrap();
        let hit = cache.load(&u).await.unwrap();
        assert_eq!(&hit.body[..], b"body{}");
        assert_eq!(hit.content_type, "text/css");
        assert!(!cache.claim(&u));
    }

    #[tokio::test]
    async fn test_release_allows_retry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::new(dir.path());
        let u = url("https://e.com/font.woff2");

        assert!(cache.claim(&u));
        cache.release(&u);
        assert!(cache.claim(&u));
    }

    #[tokio::test]
    async fn test_shared_basename_served_only_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::new(dir.path());
        let site_a = url("https://site-a.test/js/app.js");
        let site_b = url("https://site-b.test/static/app.js");

        assert!(cache.claim(&site_a));
        cache.store(&site_a, b"SITE_A").await.unwrap();

        assert!(cache.load(&site_b).await.is_none());
        assert!(!cache.claim(&site_b), "slot stays with the first source");
        assert_eq!(&cache.load(&site_a).await.unwrap().body[..], b"SITE_A");
    }

    #[tokio::test]
    async fn test_unindexed_file_is_not_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.js"), b"x").unwrap();
        let cache = AssetCache::new(dir.path());
        assert!(cache.load(&url("https://e.com/old.js")).await.is_none());
    }
}
