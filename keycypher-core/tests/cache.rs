use keycypher_core::cache::{Cache, MemoryCache};
use keycypher_core::{CachedKeyProvider, CachingKeyProvider, KeyProvider, KeyVersion};
use keycypher_spec::{KeyProviderError, KeyReference, KeyResult, KeyType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_misses_compute_once() {
    let cache: Arc<MemoryCache<u64>> = Arc::new(MemoryCache::unbounded());
    let computed = Arc::new(AtomicUsize::new(0));
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computed = Arc::clone(&computed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .or_else::<(), _>("shared", || {
                        computed.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Ok(7)
                    })
                    .expect("compute")
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("join"), 7);
    }
    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn failed_compute_is_not_cached() {
    let cache: MemoryCache<u64> = MemoryCache::unbounded();
    let err = cache
        .or_else("flaky", || Err::<u64, _>("backend down"))
        .unwrap_err();
    assert_eq!(err, "backend down");
    assert!(cache.get("flaky").is_none());

    let value = cache.or_else::<&str, _>("flaky", || Ok(3)).expect("retry");
    assert_eq!(value, 3);
}

struct CountingStore {
    resolves: AtomicUsize,
}

impl KeyProvider for CountingStore {
    fn is_supported(&self, key_ref: &KeyReference) -> bool {
        key_ref.path().starts_with("keys/")
    }

    fn resolve_key(&self, key_ref: &KeyReference) -> KeyResult<Arc<KeyVersion>> {
        if !self.is_supported(key_ref) {
            return Err(KeyProviderError::Unsupported {
                path: key_ref.path().to_string(),
            });
        }
        let version = self.resolves.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        Ok(Arc::new(KeyVersion::new(
            key_ref.path(),
            version,
            KeyType::Secret,
            "AES",
            vec![version as u8; 32],
        )))
    }
}

#[test]
fn eviction_forces_a_refetch() {
    let provider = CachingKeyProvider::new(CountingStore {
        resolves: AtomicUsize::new(0),
    });
    let key_ref = KeyReference::from("keys/db");

    let first = provider.resolve_key(&key_ref).expect("first");
    let second = provider.resolve_key(&key_ref).expect("second");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(provider.inner().resolves.load(Ordering::SeqCst), 1);

    provider.evict("keys/db");
    let third = provider.resolve_key(&key_ref).expect("third");
    assert_eq!(third.version(), 2);
    assert_eq!(provider.inner().resolves.load(Ordering::SeqCst), 2);

    // Evicted values handed out earlier stay usable.
    assert_eq!(first.key(KeyType::Secret).expect("key")[0], 1);
}

#[test]
fn password_references_always_reach_the_store() {
    let provider = CachingKeyProvider::new(CountingStore {
        resolves: AtomicUsize::new(0),
    });
    for _ in 0..3 {
        provider
            .resolve_key(&KeyReference::with_password("keys/sealed", "pw"))
            .expect("resolve");
    }
    assert_eq!(provider.inner().resolves.load(Ordering::SeqCst), 3);
    assert_eq!(provider.cached_len(), 0);
}

#[test]
fn release_destroys_cached_versions() {
    let provider = CachingKeyProvider::new(CountingStore {
        resolves: AtomicUsize::new(0),
    });
    let held = provider
        .resolve_key(&KeyReference::from("keys/db"))
        .expect("resolve");
    provider.release();
    assert!(held.is_destroyed());
    assert!(matches!(
        held.key(KeyType::Secret),
        Err(KeyProviderError::Destroyed { .. })
    ));
}
