//! Audit configuration
//!
//! Loaded from a TOML file; every field has a default so a partial file is
//! valid. Command-line flags are applied on top by the binary.
//!
//! ```toml
//! [connection]
//! server = "dc01.corp.local:636"
//! base_dn = "DC=corp,DC=local"
//! bind_user = "CORP\\auditor"
//!
//! [audit]
//! groups = [{ name = "Domain Admins" }, { name = "Tier0 Operators", sid = "S-1-5-21-1-2-3-1105" }]
//!
//! [logging]
//! level = "debug"
//! log_dir = "/var/log/ad-audit"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AuditError, Result};
use crate::privileged_groups::{default_requests, PrivilegedGroupRequest};
use crate::schema_catalog::SchemaCatalog;
use crate::secure_types::{Credentials, SecureString};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub connection: ConnectionConfig,
    pub audit: AuditSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Host, host:port or full ldap:// / ldaps:// URL
    pub server: String,
    pub base_dn: String,
    /// Empty for an anonymous session
    pub bind_user: String,
    pub bind_password: SecureString,
    pub connect_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub no_tls_verify: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            base_dn: String::new(),
            bind_user: String::new(),
            bind_password: SecureString::default(),
            connect_timeout_secs: 15,
            search_timeout_secs: 30,
            no_tls_verify: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Discovered from the base DN when absent
    pub domain_sid: Option<String>,
    /// Replaces the built-in privileged group table when present
    pub groups: Option<Vec<GroupEntry>>,
    /// JSON attribute tree replacing the built-in one
    pub catalog_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    #[serde(default)]
    pub sid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Also log to `ad-privilege-audit.log` in this directory
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl AuditConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AuditError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection.server.trim().is_empty() {
            return Err(AuditError::ConfigError(
                "connection.server is required".to_string(),
            ));
        }
        if self.connection.base_dn.trim().is_empty() {
            return Err(AuditError::ConfigError(
                "connection.base_dn is required".to_string(),
            ));
        }
        if let Some(groups) = &self.audit.groups {
            if let Some(blank) = groups.iter().position(|g| g.name.trim().is_empty()) {
                return Err(AuditError::ConfigError(format!(
                    "audit.groups[{}] has an empty name",
                    blank
                )));
            }
        }
        Ok(())
    }

    /// Server as an LDAP URL. Port 636 or an explicit `ldaps://` selects LDAPS.
    pub fn ldap_url(&self) -> String {
        let server = self.connection.server.trim();
        let explicit_ldaps = server.starts_with("ldaps://");
        let host = server
            .strip_prefix("ldaps://")
            .or_else(|| server.strip_prefix("ldap://"))
            .unwrap_or(server);

        // Port 636 is LDAPS whatever scheme was typed
        if explicit_ldaps || host.ends_with(":636") {
            format!("ldaps://{}", host)
        } else {
            format!("ldap://{}", host)
        }
    }

    pub fn uses_ldaps(&self) -> bool {
        self.ldap_url().starts_with("ldaps://")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.connect_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.search_timeout_secs)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.connection.bind_user.clone(),
            self.connection.bind_password.clone(),
        )
    }

    /// Ordered group requests: the configured list, or the built-in table
    /// expanded against `domain_sid`.
    pub fn group_requests(&self, domain_sid: &str) -> Vec<PrivilegedGroupRequest> {
        match &self.audit.groups {
            Some(groups) => groups
                .iter()
                .map(|g| PrivilegedGroupRequest::new(g.name.clone(), g.sid.clone()))
                .collect(),
            None => default_requests(domain_sid),
        }
    }

    pub fn load_catalog(&self) -> Result<SchemaCatalog> {
        match &self.audit.catalog_file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AuditError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
                })?;
                SchemaCatalog::from_json(&text)
            }
            None => Ok(SchemaCatalog::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = AuditConfig::from_toml_str("").unwrap();
        assert_eq!(config.connection.connect_timeout_secs, 15);
        assert_eq!(config.connection.search_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert!(config.audit.groups.is_none());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[connection]
server = "dc01.corp.local:636"
base_dn = "DC=corp,DC=local"
bind_user = "CORP\\auditor"
bind_password = "s3cret"

[audit]
groups = [{{ name = "Domain Admins" }}, {{ name = "Tier0", sid = "S-1-5-21-1-2-3-1105" }}]
"#
        )
        .unwrap();

        let config = AuditConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ldap_url(), "ldaps://dc01.corp.local:636");
        assert!(config.uses_ldaps());
        assert_eq!(config.credentials().username(), "CORP\\auditor");
        assert!(!format!("{:?}", config).contains("s3cret"));

        let requests = config.group_requests("S-1-5-21-9-9-9");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].expected_sid, None);
        assert_eq!(requests[1].expected_sid.as_deref(), Some("S-1-5-21-1-2-3-1105"));
    }

    #[test]
    fn test_ldap_url_normalisation() {
        let mut config = AuditConfig::default();
        config.connection.server = "dc01.corp.local".to_string();
        assert_eq!(config.ldap_url(), "ldap://dc01.corp.local");

        config.connection.server = "ldap://dc01.corp.local:389".to_string();
        assert_eq!(config.ldap_url(), "ldap://dc01.corp.local:389");

        config.connection.server = "ldaps://dc01.corp.local".to_string();
        assert_eq!(config.ldap_url(), "ldaps://dc01.corp.local");

        config.connection.server = "ldap://dc01.corp.local:636".to_string();
        assert_eq!(config.ldap_url(), "ldaps://dc01.corp.local:636");
        assert!(config.uses_ldaps());

        config.connection.server = "dc01.corp.local:636".to_string();
        assert_eq!(config.ldap_url(), "ldaps://dc01.corp.local:636");
    }

    #[test]
    fn test_default_group_table_used_without_groups() {
        let config = AuditConfig::default();
        let requests = config.group_requests("S-1-5-21-1-2-3");
        assert_eq!(requests[0].display_name, "Domain Admins");
        assert_eq!(requests[0].expected_sid.as_deref(), Some("S-1-5-21-1-2-3-512"));
    }

    #[test]
    fn test_blank_group_name_rejected() {
        let config = AuditConfig::from_toml_str(
            r#"
[connection]
server = "dc01"
base_dn = "DC=corp,DC=local"

[audit]
groups = [{ name = " " }]
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(AuditError::ConfigError(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(
            AuditConfig::from_toml_str("[connection\nserver = 1"),
            Err(AuditError::ConfigError(_))
        ));
    }

    #[test]
    fn test_catalog_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"kind": "attribute", "name": "sAMAccountName"}}]"#).unwrap();

        let mut config = AuditConfig::default();
        config.audit.catalog_file = Some(file.path().to_path_buf());
        let catalog = config.load_catalog().unwrap();
        assert_eq!(catalog.all_output(), &["sAMAccountName".to_string()]);
    }
}
