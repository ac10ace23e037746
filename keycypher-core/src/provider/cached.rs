use crate::cache::{Cache, MemoryCache};
use crate::key_provider::{CachedKeyProvider, FramedKeyProvider, KeyFrame, KeyProvider};
use crate::key_version::KeyVersion;
use keycypher_spec::key_path::{remove_suffix, split_version, PUBLIC_SEGMENT};
use keycypher_spec::{KeyReference, KeyResult};
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache in front of another [`KeyProvider`].
///
/// Entries are keyed by the reference path as given, so `keys/db` and
/// `keys/db@2` are cached separately. References that carry a password are
/// always forwarded so the backing store checks the password on every call.
///
/// A cached version the inner provider no longer considers valid (revoked, or
/// its store closed) is scrubbed and resolved again. For a framed store the
/// cache is released once the last frame opened through it closes.
pub struct CachingKeyProvider<P> {
    inner: P,
    cache: MemoryCache<Arc<KeyVersion>>,
}

impl<P> CachingKeyProvider<P>
where
    P: KeyProvider,
{
    /// Unbounded cache without expiry.
    pub fn new(inner: P) -> Self {
        Self::with_cache(inner, MemoryCache::unbounded())
    }

    pub fn bounded(inner: P, capacity: usize, ttl: Option<Duration>) -> Self {
        Self::with_cache(inner, MemoryCache::new(capacity, ttl))
    }

    pub fn with_cache(inner: P, cache: MemoryCache<Arc<KeyVersion>>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached version and scrub its material.
    ///
    /// Unlike [`CachedKeyProvider::clear`], outstanding holders lose access
    /// to the material too.
    pub fn release(&self) {
        let drained = self.cache.drain();
        let count = drained.len();
        for version in drained {
            version.destroy();
        }
        tracing::debug!(count, "released cached key versions");
    }
}

impl<P> KeyProvider for CachingKeyProvider<P>
where
    P: KeyProvider,
{
    fn is_supported(&self, key_ref: &KeyReference) -> bool {
        self.inner.is_supported(key_ref)
    }

    fn resolve_key(&self, key_ref: &KeyReference) -> KeyResult<Arc<KeyVersion>> {
        if key_ref.password().is_some() {
            return self.inner.resolve_key(key_ref);
        }
        let fetch = || {
            tracing::debug!(key = %key_ref.path(), "key cache miss");
            self.inner.resolve_key(key_ref)
        };
        let cached = self.cache.or_else(key_ref.path(), fetch)?;
        if self.inner.is_valid(&cached) {
            return Ok(cached);
        }
        self.cache.evict(key_ref.path());
        cached.destroy();
        tracing::debug!(key = %key_ref.path(), version = cached.version(), "dropped stale cached key version");
        self.cache.or_else(key_ref.path(), fetch)
    }

    fn is_valid(&self, version: &KeyVersion) -> bool {
        self.inner.is_valid(version)
    }
}

impl<P> CachedKeyProvider for CachingKeyProvider<P>
where
    P: KeyProvider,
{
    fn evict(&self, path: &str) {
        let (target, _) = split_version(path);
        let target = remove_suffix(Some(target), Some(PUBLIC_SEGMENT)).unwrap_or_default();
        let dropped = self.cache.evict_where(|key| {
            let (unversioned, _) = split_version(key);
            remove_suffix(Some(unversioned), Some(PUBLIC_SEGMENT)).as_deref() == Some(target.as_str())
        });
        tracing::debug!(key = %path, dropped, "evicted cached key versions");
    }

    fn clear(&self) {
        self.cache.clear();
    }
}

impl<P> FramedKeyProvider for CachingKeyProvider<P>
where
    P: FramedKeyProvider,
{
    fn has_frame(&self) -> bool {
        self.inner.has_frame()
    }

    fn open_frame(&self) -> KeyResult<KeyFrame<'_>> {
        let frame = self.inner.open_frame()?;
        Ok(KeyFrame::new(move || {
            frame.close();
            if !self.inner.has_frame() {
                self.release();
            }
        }))
    }
}
