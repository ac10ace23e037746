use crate::state::ServiceState;
use crate::types::KeyType;
use thiserror::Error;

/// Result alias for keycypher operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Result alias for key resolution.
pub type KeyResult<T> = core::result::Result<T, KeyProviderError>;

/// Result alias for cypher operations.
pub type CypherResult<T> = core::result::Result<T, CypherError>;

/// Result alias for lifecycle checks.
pub type LifecycleResult<T> = core::result::Result<T, LifecycleError>;

/// Key path grammar failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyPathError {
    #[error("malformed key path `{path}`: version `{version}` is not an unsigned integer")]
    MalformedVersion { path: String, version: String },
}

/// Failures raised while resolving a [`crate::KeyReference`].
///
/// Variants carry the offending path for diagnosis. Passwords and key
/// material never appear in the rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyProviderError {
    #[error("key path `{path}` is not supported by this provider")]
    Unsupported { path: String },
    #[error("key `{path}` not found")]
    NotFound { path: String },
    #[error("wrong password for key `{path}`")]
    BadPassword { path: String },
    #[error("no key frame is open; cannot resolve `{path}`")]
    FrameNotOpen { path: String },
    #[error("key `{path}` has been revoked")]
    Revoked { path: String },
    #[error("key `{path}` is a {actual} key, expected {expected}")]
    TypeMismatch {
        path: String,
        expected: KeyType,
        actual: KeyType,
    },
    #[error("key material for `{path}` has been destroyed")]
    Destroyed { path: String },
    #[error("key store error for `{path}`: {message}")]
    Storage { path: String, message: String },
    #[error(transparent)]
    MalformedPath(#[from] KeyPathError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl KeyProviderError {
    pub fn storage(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True when the failure originates from a compromised service.
    pub fn is_compromised(&self) -> bool {
        matches!(self, Self::Lifecycle(err) if err.is_compromised())
    }
}

/// Cypher configuration and operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CypherError {
    #[error("cypher algorithm not supported: {}", .0.as_deref().unwrap_or("<none>"))]
    UnsupportedAlgorithm(Option<String>),
    #[error("invalid key for {algorithm}: {reason}")]
    InvalidKey {
        algorithm: &'static str,
        reason: String,
    },
    #[error("invalid iv for {algorithm}: expected {expected} bytes, got {actual}")]
    InvalidIv {
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid ciphertext for {algorithm}: {reason}")]
    InvalidCiphertext {
        algorithm: &'static str,
        reason: String,
    },
    #[error("message authentication failed")]
    AuthenticationFailed,
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("cypher plugin {algorithm} failed to initialise: {reason}")]
    Plugin { algorithm: String, reason: String },
    #[error(transparent)]
    Key(#[from] KeyProviderError),
}

impl CypherError {
    pub fn unsupported(algorithm: Option<&str>) -> Self {
        Self::UnsupportedAlgorithm(algorithm.map(str::to_string))
    }

    pub fn is_compromised(&self) -> bool {
        match self {
            Self::Key(err) => err.is_compromised(),
            _ => false,
        }
    }
}

impl From<LifecycleError> for CypherError {
    fn from(err: LifecycleError) -> Self {
        Self::Key(KeyProviderError::Lifecycle(err))
    }
}

/// Lifecycle state machine violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("{service} is {current}, expected {expected}")]
    StateMismatch {
        service: &'static str,
        current: ServiceState,
        expected: ServiceState,
    },
    #[error("{service} is compromised: {reason}")]
    Compromised {
        service: &'static str,
        reason: String,
    },
}

impl LifecycleError {
    pub fn is_compromised(&self) -> bool {
        matches!(self, Self::Compromised { .. })
    }
}

/// Top-level error surface for callers that mix key, cypher and lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    KeyPath(#[from] KeyPathError),
    #[error(transparent)]
    Key(#[from] KeyProviderError),
    #[error(transparent)]
    Cypher(#[from] CypherError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn is_compromised(&self) -> bool {
        match self {
            Self::Key(err) => err.is_compromised(),
            Self::Cypher(err) => err.is_compromised(),
            Self::Lifecycle(err) => err.is_compromised(),
            _ => false,
        }
    }
}
