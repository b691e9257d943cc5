//! Secure Types Module
//!
//! Credential storage that zeroes sensitive data from memory when dropped
//! and never prints it through `Debug` or `Display`.

use serde::{Deserialize, Deserializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secure string that automatically zeros its contents when dropped.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(s: String) -> Self {
        Self { inner: s }
    }

    /// Temporarily exposes the secret as a string slice.
    ///
    /// The returned reference should be used immediately and not stored.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecureString::new)
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Bind credentials. An empty username means an anonymous bind.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: SecureString,
}

impl Credentials {
    pub fn new(username: String, password: SecureString) -> Self {
        Self { username, password }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Use only for the bind call; do not store the returned reference.
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string_new() {
        let secret = SecureString::new("my_password".to_string());
        assert_eq!(secret.expose_secret(), "my_password");
        assert_eq!(secret.len(), 11);
        assert!(!secret.is_empty());
        assert!(SecureString::default().is_empty());
    }

    #[test]
    fn test_secure_string_is_redacted() {
        let secret = SecureString::new("password123".to_string());
        assert_eq!(format!("{:?}", secret), "SecureString([REDACTED])");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_secure_string_deserializes_from_plain_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            password: SecureString,
        }
        let wrapper: Wrapper = toml::from_str(r#"password = "hunter2""#).unwrap();
        assert_eq!(wrapper.password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_credentials_debug() {
        let creds = Credentials::new(
            "CORP\\auditor".to_string(),
            SecureString::new("testpass".to_string()),
        );
        let debug_output = format!("{:?}", creds);
        assert!(debug_output.contains("auditor"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("testpass"));
        assert_eq!(creds.password(), "testpass");
        assert!(!creds.is_anonymous());
    }

    #[test]
    fn test_anonymous_credentials() {
        let creds = Credentials::new(String::new(), SecureString::default());
        assert!(creds.is_anonymous());
    }
}
