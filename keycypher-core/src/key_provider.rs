use crate::key_version::KeyVersion;
use keycypher_spec::key_path::{split_version, PATH_SEPARATOR};
use keycypher_spec::{KeyReference, KeyResult};
use std::fmt;
use std::sync::Arc;

/// Resolves key references to key material.
pub trait KeyProvider: Send + Sync {
    /// Whether this provider can resolve `key_ref`. Never fails.
    fn is_supported(&self, key_ref: &KeyReference) -> bool;

    /// Resolve `key_ref` to a concrete key version.
    fn resolve_key(&self, key_ref: &KeyReference) -> KeyResult<Arc<KeyVersion>>;

    /// Whether `version`, resolved earlier by this provider, may still be used.
    ///
    /// Caches check this before serving a stored copy.
    fn is_valid(&self, _version: &KeyVersion) -> bool {
        true
    }
}

/// Key provider that keeps resolved versions around between calls.
pub trait CachedKeyProvider: KeyProvider {
    /// Drop cached versions of `path` so the next resolution re-fetches.
    ///
    /// Values already handed out stay usable.
    fn evict(&self, path: &str);

    fn clear(&self);
}

/// Key provider backed by a store that must be opened before use.
pub trait FramedKeyProvider: KeyProvider {
    fn has_frame(&self) -> bool;

    /// Open (or join) a frame over the backing store.
    ///
    /// The frame is released when the returned guard is dropped.
    fn open_frame(&self) -> KeyResult<KeyFrame<'_>>;

    /// Run `f` with a frame held for its whole duration.
    fn with_frame<R>(&self, f: impl FnOnce(&Self) -> R) -> KeyResult<R>
    where
        Self: Sized,
    {
        let _frame = self.open_frame()?;
        Ok(f(self))
    }
}

/// Scoped session over a framed key store.
#[must_use = "the frame closes as soon as it is dropped"]
pub struct KeyFrame<'a> {
    release: Option<Box<dyn FnOnce() + Send + 'a>>,
}

impl<'a> KeyFrame<'a> {
    /// Frame whose release runs `release` exactly once.
    pub fn new(release: impl FnOnce() + Send + 'a) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release the frame now.
    pub fn close(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for KeyFrame<'_> {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for KeyFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFrame")
            .field("open", &self.release.is_some())
            .finish()
    }
}

/// Whether `path` lives under `root`, ignoring any version suffix.
///
/// An empty root matches every path.
pub fn is_under_root(root: &str, path: &str) -> bool {
    if root.is_empty() {
        return true;
    }
    let (unversioned, _) = split_version(path);
    unversioned
        .strip_prefix(root)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(PATH_SEPARATOR))
}

impl<T> KeyProvider for Arc<T>
where
    T: KeyProvider + ?Sized,
{
    fn is_supported(&self, key_ref: &KeyReference) -> bool {
        (**self).is_supported(key_ref)
    }

    fn resolve_key(&self, key_ref: &KeyReference) -> KeyResult<Arc<KeyVersion>> {
        (**self).resolve_key(key_ref)
    }

    fn is_valid(&self, version: &KeyVersion) -> bool {
        (**self).is_valid(version)
    }
}

impl<T> KeyProvider for Box<T>
where
    T: KeyProvider + ?Sized,
{
    fn is_supported(&self, key_ref: &KeyReference) -> bool {
        (**self).is_supported(key_ref)
    }

    fn resolve_key(&self, key_ref: &KeyReference) -> KeyResult<Arc<KeyVersion>> {
        (**self).resolve_key(key_ref)
    }

    fn is_valid(&self, version: &KeyVersion) -> bool {
        (**self).is_valid(version)
    }
}

impl<T> CachedKeyProvider for Arc<T>
where
    T: CachedKeyProvider + ?Sized,
{
    fn evict(&self, path: &str) {
        (**self).evict(path)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

impl<T> FramedKeyProvider for Arc<T>
where
    T: FramedKeyProvider + ?Sized,
{
    fn has_frame(&self) -> bool {
        (**self).has_frame()
    }

    fn open_frame(&self) -> KeyResult<KeyFrame<'_>> {
        (**self).open_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn root_matching_is_segment_aligned() {
        assert!(is_under_root("keys", "keys/db"));
        assert!(is_under_root("keys", "keys/db@3"));
        assert!(is_under_root("keys", "keys"));
        assert!(!is_under_root("keys", "keystore/db"));
        assert!(!is_under_root("keys", "other/db"));
        assert!(is_under_root("", "anything/at/all"));
    }

    #[test]
    fn frame_releases_once() {
        let released = AtomicUsize::new(0);
        {
            let _frame = KeyFrame::new(|| {
                released.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let frame = KeyFrame::new(|| {
            released.fetch_add(1, Ordering::SeqCst);
        });
        frame.close();
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
