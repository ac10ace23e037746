use keycypher_core::crypto::{
    Aes256GcmTemplate, CypherNamespace, CypherPlugin, TemplateRegistration, AEAD_NAMESPACE,
};
use keycypher_core::{CypherProvider, CypherTemplate, KeyProvider, MemoryKeyProvider};
use keycypher_spec::{CypherEncryption, CypherError, CypherResult, CypherSpecification, KeyReference};
use std::sync::Arc;

fn store() -> Arc<MemoryKeyProvider> {
    let store = Arc::new(MemoryKeyProvider::new("keys"));
    store.add_key("k256", "AES", vec![0x11; 32]);
    store.add_key("k128", "AES", vec![0x22; 16]);
    store.add_key("chacha", "ChaCha20", vec![0x33; 32]);
    store
}

fn registry(store: Arc<MemoryKeyProvider>) -> CypherProvider {
    CypherProvider::discover(store, &[&AEAD_NAMESPACE])
}

fn key_for(algorithm: &str) -> &'static str {
    match algorithm {
        "A128GCM" | "AES-128-GCM" => "keys/k128",
        "C20P" | "ChaCha20-Poly1305" | "XC20P" | "XChaCha20-Poly1305" => "keys/chacha",
        _ => "keys/k256",
    }
}

#[test]
fn every_discovered_algorithm_round_trips() {
    let provider = registry(store());
    let algorithms: Vec<String> = provider.algorithms().into_iter().map(str::to_string).collect();
    assert!(algorithms.iter().any(|name| name == "A256GCM"));
    assert!(algorithms.iter().any(|name| name == "C20P"));

    for algorithm in &algorithms {
        let cypher = provider
            .cypher(&CypherSpecification::new(algorithm.as_str()), key_for(algorithm).into())
            .expect("cypher");
        for plaintext in [&b""[..], &b"attack at dawn"[..], &[0u8; 1024][..]] {
            let sealed = cypher
                .encrypt_bytes(Some(plaintext))
                .expect("encrypt")
                .expect("sealed");
            let descriptor = cypher.template().cypher_descriptor();
            assert_eq!(
                sealed.len(),
                descriptor.iv_len + plaintext.len() + descriptor.tag_len,
                "{algorithm}"
            );
            let opened = cypher
                .decrypt_bytes(Some(sealed.as_slice()))
                .expect("decrypt")
                .expect("opened");
            assert_eq!(opened, plaintext, "{algorithm}");
        }
    }
}

#[test]
fn absent_input_passes_through() {
    let provider = registry(store());
    let cypher = provider
        .cypher(&CypherSpecification::new("A256GCM"), "keys/k256".into())
        .expect("cypher");
    assert_eq!(cypher.encrypt_bytes(None).expect("encrypt"), None);
    assert_eq!(cypher.decrypt_bytes(None).expect("decrypt"), None);
    assert!(cypher.encrypt(None, None, None).expect("encrypt").is_none());
}

#[test]
fn random_ivs_differ_between_calls() {
    let provider = registry(store());
    let cypher = provider
        .cypher(&CypherSpecification::new("A256GCM"), "keys/k256".into())
        .expect("cypher");
    let first = cypher.encrypt_bytes(Some(&b"same"[..])).expect("first");
    let second = cypher.encrypt_bytes(Some(&b"same"[..])).expect("second");
    assert_ne!(first, second);
}

#[test]
fn tampering_fails_authentication() {
    let provider = registry(store());
    let cypher = provider
        .cypher(&CypherSpecification::new("C20P"), "keys/chacha".into())
        .expect("cypher");
    let mut sealed = cypher
        .encrypt_bytes(Some(&b"ledger entry"[..]))
        .expect("encrypt")
        .expect("sealed");
    let last = sealed.len() - 1;
    sealed[last] ^= 0x01;
    assert_eq!(
        cypher.decrypt_bytes(Some(sealed.as_slice())).unwrap_err(),
        CypherError::AuthenticationFailed
    );
}

#[test]
fn aad_must_match() {
    let provider = registry(store());
    let cypher = provider
        .cypher(&CypherSpecification::new("A256GCM"), "keys/k256".into())
        .expect("cypher");
    let iv = [7u8; 12];
    let sealed = cypher
        .encrypt(Some(&b"payload"[..]), Some(&iv[..]), Some(&b"tenant-a"[..]))
        .expect("encrypt")
        .expect("sealed");
    assert_eq!(sealed.iv(), Some(&iv[..]));
    assert_eq!(sealed.authentication_tag().map(<[u8]>::len), Some(16));
    assert_eq!(sealed.secure_data().len(), b"payload".len());

    let opened = cypher
        .decrypt(&sealed, Some(&b"tenant-a"[..]))
        .expect("decrypt");
    assert_eq!(opened, b"payload");
    assert_eq!(
        cypher.decrypt(&sealed, Some(&b"tenant-b"[..])).unwrap_err(),
        CypherError::AuthenticationFailed
    );
}

#[test]
fn wrong_iv_length_is_rejected() {
    let provider = registry(store());
    let cypher = provider
        .cypher(&CypherSpecification::new("A256GCM"), "keys/k256".into())
        .expect("cypher");
    let err = cypher
        .encrypt(Some(&b"payload"[..]), Some(&[0u8; 8][..]), None)
        .unwrap_err();
    assert!(matches!(
        err,
        CypherError::InvalidIv {
            expected: 12,
            actual: 8,
            ..
        }
    ));
}

#[test]
fn key_of_the_wrong_size_is_rejected() {
    let provider = registry(store());
    let cypher = provider
        .cypher(&CypherSpecification::new("A256GCM"), "keys/k128".into())
        .expect("cypher");
    assert!(matches!(
        cypher.encrypt_bytes(Some(&b"x"[..])).unwrap_err(),
        CypherError::InvalidKey { .. }
    ));
}

#[test]
fn unknown_and_missing_algorithms_are_unsupported() {
    let provider = registry(store());
    assert_eq!(
        provider
            .cypher(&CypherSpecification::new("ROT13"), "keys/k256".into())
            .unwrap_err(),
        CypherError::UnsupportedAlgorithm(Some("ROT13".into()))
    );
    assert_eq!(
        provider.cypher_template(None).err(),
        Some(CypherError::UnsupportedAlgorithm(None))
    );
}

#[test]
fn algorithm_names_are_case_sensitive() {
    let provider = registry(store());
    assert!(provider.cypher_template(Some("A256GCM")).is_ok());
    assert!(provider.cypher_template(Some("a256gcm")).is_err());
}

#[test]
fn registered_template_is_returned_as_is() {
    let mut provider = registry(store());
    let template: Arc<dyn CypherTemplate> =
        Arc::new(Aes256GcmTemplate::create().expect("template"));
    assert!(provider.add_cypher("X", Arc::clone(&template)).is_none());
    let found = provider.cypher_template(Some("X")).expect("found");
    assert!(Arc::ptr_eq(&found, &template));
}

struct Refuses;

impl CypherTemplate for Refuses {
    fn key_descriptor(&self) -> keycypher_spec::KeyDescriptor {
        keycypher_spec::KeyDescriptor::new("none", 0)
    }

    fn cypher_descriptor(&self) -> keycypher_spec::CypherDescriptor {
        keycypher_spec::CypherDescriptor {
            transformation: "none",
            iv_len: 0,
            tag_len: 0,
        }
    }

    fn encrypt(
        &self,
        _ctx: &dyn KeyProvider,
        _key_ref: &KeyReference,
        _plaintext: &[u8],
        _iv: Option<&[u8]>,
        _aad: Option<&[u8]>,
    ) -> CypherResult<CypherEncryption> {
        Err(CypherError::unsupported(Some("REFUSE")))
    }

    fn decrypt(
        &self,
        _ctx: &dyn KeyProvider,
        _key_ref: &KeyReference,
        _encryption: &CypherEncryption,
        _aad: Option<&[u8]>,
    ) -> CypherResult<Vec<u8>> {
        Err(CypherError::unsupported(Some("REFUSE")))
    }
}

impl CypherPlugin for Refuses {
    const ALGORITHMS: &'static [&'static str] = &["REFUSE"];

    fn create() -> CypherResult<Self> {
        Err(CypherError::Plugin {
            algorithm: "REFUSE".into(),
            reason: "hardware token missing".into(),
        })
    }
}

static FLAKY_PLUGINS: &[TemplateRegistration] = &[TemplateRegistration::of::<Refuses>()];

static FLAKY_NAMESPACE: CypherNamespace = CypherNamespace {
    name: "flaky",
    plugins: FLAKY_PLUGINS,
};

#[test]
fn broken_plugins_are_skipped_during_discovery() {
    let provider = CypherProvider::discover(store(), &[&FLAKY_NAMESPACE, &AEAD_NAMESPACE]);
    assert!(provider.cypher_template(Some("REFUSE")).is_err());
    assert!(provider.cypher_template(Some("A256GCM")).is_ok());
}

#[test]
fn string_cypher_round_trips_unicode() {
    let provider = registry(store());
    let strings = provider
        .string_cypher(&CypherSpecification::new("A256GCM"), "keys/k256".into())
        .expect("string cypher");
    let text = "pâté, 東京, 🔐";
    let sealed = strings.encrypt(Some(text)).expect("encrypt").expect("sealed");
    assert!(sealed.is_ascii());
    assert_eq!(
        strings.decrypt(Some(sealed.as_str())).expect("decrypt").as_deref(),
        Some(text)
    );
    assert!(matches!(
        strings.decrypt(Some("not base64!")).unwrap_err(),
        CypherError::Encoding(_)
    ));
    assert_eq!(strings.encrypt(None).expect("none"), None);
}
