//! Error handling module
//!
//! Structured error types for the privileged group audit. Recoverable audit
//! conditions (missing groups, cycles, odd member types) are not errors; they
//! go to the [`crate::warnings::Warnings`] collector. Everything here aborts
//! the run.

use thiserror::Error;

/// Main error type for directory and audit operations
#[derive(Error, Debug)]
pub enum AuditError {
    /// LDAP connection error
    #[error("LDAP connection failed: {0}")]
    ConnectionError(String),

    /// LDAP query/search error
    #[error("LDAP query failed: {0}")]
    QueryError(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// A directory object expected to exist could not be read
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Parse error
    #[error("Failed to parse data: {0}")]
    ParseError(String),

    /// Malformed attribute catalog. A programmer error, never recovered.
    #[error("Attribute schema configuration error: {0}")]
    SchemaConfiguration(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Report sink failure
    #[error("Report output failed: {0}")]
    SinkError(String),
}

impl From<ldap3::LdapError> for AuditError {
    fn from(err: ldap3::LdapError) -> Self {
        match err {
            ldap3::LdapError::LdapResult { result } => {
                match result.rc {
                    // 49 = Invalid credentials
                    49 => AuditError::AuthError(format!(
                        "Invalid credentials: {}",
                        result.text
                    )),
                    // 32 = No such object
                    32 => AuditError::NotFound(format!(
                        "Object not found: {}",
                        result.text
                    )),
                    // 50 = Insufficient access rights
                    50 => AuditError::PermissionDenied(format!(
                        "Insufficient access rights: {}",
                        result.text
                    )),
                    // 51 = Busy
                    51 => AuditError::Timeout(format!(
                        "Server is busy: {}",
                        result.text
                    )),
                    // 52 = Unavailable
                    52 => AuditError::ConnectionError(format!(
                        "Server unavailable: {}",
                        result.text
                    )),
                    // 53 = Unwilling to perform
                    53 => AuditError::PermissionDenied(format!(
                        "Server unwilling to perform operation: {}",
                        result.text
                    )),
                    _ => AuditError::QueryError(format!(
                        "LDAP error code {}: {}",
                        result.rc, result.text
                    )),
                }
            }
            ldap3::LdapError::EndOfStream => {
                AuditError::ConnectionError("Connection closed unexpectedly".to_string())
            }
            ldap3::LdapError::Io { source } => {
                AuditError::ConnectionError(format!("I/O error: {}", source))
            }
            ldap3::LdapError::Timeout { elapsed: _ } => {
                AuditError::Timeout("LDAP operation timed out".to_string())
            }
            _ => AuditError::QueryError(format!("LDAP error: {}", err)),
        }
    }
}

impl From<anyhow::Error> for AuditError {
    fn from(err: anyhow::Error) -> Self {
        AuditError::QueryError(err.to_string())
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::SinkError(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for AuditError {
    fn from(err: toml::de::Error) -> Self {
        AuditError::ConfigError(format!("Invalid TOML: {}", err))
    }
}

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ldap3::LdapResult;

    fn ldap_result(rc: u32, text: &str) -> ldap3::LdapError {
        ldap3::LdapError::LdapResult {
            result: LdapResult {
                rc,
                matched: String::new(),
                text: text.to_string(),
                refs: Vec::new(),
                ctrls: Vec::new(),
            },
        }
    }

    #[test]
    fn test_error_display() {
        let err = AuditError::ConnectionError("test".to_string());
        assert_eq!(err.to_string(), "LDAP connection failed: test");

        let err = AuditError::SchemaConfiguration("empty tree".to_string());
        assert_eq!(
            err.to_string(),
            "Attribute schema configuration error: empty tree"
        );
    }

    #[test]
    fn test_ldap_result_code_mapping() {
        assert!(matches!(AuditError::from(ldap_result(49, "bad")), AuditError::AuthError(_)));
        assert!(matches!(AuditError::from(ldap_result(32, "gone")), AuditError::NotFound(_)));
        assert!(matches!(
            AuditError::from(ldap_result(50, "denied")),
            AuditError::PermissionDenied(_)
        ));
        assert!(matches!(AuditError::from(ldap_result(51, "busy")), AuditError::Timeout(_)));
        assert!(matches!(
            AuditError::from(ldap_result(52, "down")),
            AuditError::ConnectionError(_)
        ));
        assert!(matches!(AuditError::from(ldap_result(1, "other")), AuditError::QueryError(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: AuditError = io_err.into();
        assert!(matches!(err, AuditError::SinkError(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= nope").unwrap_err();
        let err: AuditError = toml_err.into();
        assert!(matches!(err, AuditError::ConfigError(_)));
    }
}
