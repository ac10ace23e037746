use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Owned secret buffer for key passwords.
///
/// The bytes are wiped on drop and on [`Password::clear`]. `Clone` is not
/// implemented; move the value into the reference that needs it.
#[derive(Default)]
pub struct Password(Zeroizing<Vec<u8>>);

impl Password {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Take ownership of a string, scrubbing its buffer on drop.
    pub fn from_string(value: String) -> Self {
        Self::new(value.into_bytes())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scrub the buffer now, leaving an empty password behind.
    pub fn clear(&mut self) {
        self.0.zeroize();
    }
}

impl Zeroize for Password {
    fn zeroize(&mut self) {
        self.clear();
    }
}

impl ZeroizeOnDrop for Password {}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

/// Input to key resolution: a key path plus an optional password.
#[derive(Debug)]
pub struct KeyReference {
    path: String,
    password: Option<Password>,
}

impl KeyReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            password: None,
        }
    }

    pub fn with_password(path: impl Into<String>, password: impl Into<Password>) -> Self {
        Self {
            path: path.into(),
            password: Some(password.into()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn password(&self) -> Option<&Password> {
        self.password.as_ref()
    }

    /// Scrub and drop the password, keeping the path.
    pub fn clear_password(&mut self) {
        if let Some(mut password) = self.password.take() {
            password.clear();
        }
    }

    /// Copy of the reference without its password.
    pub fn to_unprotected(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl From<&str> for KeyReference {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for KeyReference {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_password() {
        let key_ref = KeyReference::with_password("keys/db", "hunter2");
        let rendered = format!("{key_ref:?}");
        assert!(rendered.contains("keys/db"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn clear_password_scrubs_and_drops() {
        let mut key_ref = KeyReference::with_password("keys/db", "hunter2");
        assert_eq!(key_ref.password().unwrap().expose(), b"hunter2");
        key_ref.clear_password();
        assert!(key_ref.password().is_none());
        assert_eq!(key_ref.path(), "keys/db");
    }

    #[test]
    fn password_clear_empties_buffer() {
        let mut password = Password::from("secret");
        password.clear();
        assert!(password.is_empty());
    }
}
