//! Privileged group definitions
//!
//! The well-known Active Directory groups whose membership confers
//! administrative rights, keyed by display name with their expected SID.
//!
//! | Tier | Groups |
//! |------|--------|
//! | Tier 0 | Domain Admins, Enterprise Admins, Schema Admins, Administrators, Domain Controllers, Key Admins |
//! | Tier 1 | Account/Backup/Server/Print Operators, Group Policy Creator Owners, DnsAdmins |
//!
//! Domain-relative groups carry the domain SID as prefix
//! (`S-1-5-21-x-y-z-512`); builtin groups live under `S-1-5-32`.

use serde::{Deserialize, Serialize};

/// Prefix of the BUILTIN domain
pub const BUILTIN_SID_PREFIX: &str = "S-1-5-32";

/// Well-known identifier of a privileged group
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WellKnownSid {
    /// RID relative to the audited domain's SID
    DomainRelative(u32),
    /// RID under the BUILTIN domain (S-1-5-32)
    Builtin(u32),
    /// No standardized SID; looked up by name only
    None,
}

impl WellKnownSid {
    /// Full textual SID for a domain, or `None` for name-only groups.
    pub fn expected_sid(&self, domain_sid: &str) -> Option<String> {
        match self {
            WellKnownSid::DomainRelative(rid) => {
                Some(format!("{}-{}", domain_sid.trim_end_matches('-'), rid))
            }
            WellKnownSid::Builtin(rid) => Some(format!("{}-{}", BUILTIN_SID_PREFIX, rid)),
            WellKnownSid::None => None,
        }
    }
}

/// A privileged group to audit: display name plus optional expected SID
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivilegedGroupRequest {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_sid: Option<String>,
}

impl PrivilegedGroupRequest {
    pub fn new(display_name: impl Into<String>, expected_sid: Option<String>) -> Self {
        Self {
            display_name: display_name.into(),
            expected_sid,
        }
    }
}

/// Ordered table of well-known privileged groups
pub fn default_privileged_groups() -> Vec<(&'static str, WellKnownSid)> {
    use WellKnownSid::*;

    vec![
        ("Domain Admins", DomainRelative(512)),
        ("Enterprise Admins", DomainRelative(519)),
        ("Schema Admins", DomainRelative(518)),
        ("Administrators", Builtin(544)),
        ("Account Operators", Builtin(548)),
        ("Backup Operators", Builtin(551)),
        ("Server Operators", Builtin(549)),
        ("Print Operators", Builtin(550)),
        ("Cert Publishers", DomainRelative(517)),
        ("Group Policy Creator Owners", DomainRelative(520)),
        ("Domain Controllers", DomainRelative(516)),
        ("Read-only Domain Controllers", DomainRelative(521)),
        ("Enterprise Read-only Domain Controllers", DomainRelative(498)),
        ("Key Admins", DomainRelative(526)),
        ("Enterprise Key Admins", DomainRelative(527)),
        ("Protected Users", DomainRelative(525)),
        ("DnsAdmins", None),
    ]
}

/// Expand the default table against a domain SID.
pub fn default_requests(domain_sid: &str) -> Vec<PrivilegedGroupRequest> {
    default_privileged_groups()
        .into_iter()
        .map(|(name, sid)| PrivilegedGroupRequest::new(name, sid.expected_sid(domain_sid)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN_SID: &str = "S-1-5-21-1004336348-1177238915-682003330";

    #[test]
    fn test_expected_sids() {
        assert_eq!(
            WellKnownSid::DomainRelative(512).expected_sid(DOMAIN_SID).as_deref(),
            Some("S-1-5-21-1004336348-1177238915-682003330-512")
        );
        assert_eq!(
            WellKnownSid::Builtin(544).expected_sid(DOMAIN_SID).as_deref(),
            Some("S-1-5-32-544")
        );
        assert_eq!(WellKnownSid::None.expected_sid(DOMAIN_SID), None);
    }

    #[test]
    fn test_default_requests_order_and_names() {
        let requests = default_requests(DOMAIN_SID);
        assert_eq!(requests.len(), default_privileged_groups().len());
        assert_eq!(requests[0].display_name, "Domain Admins");
        assert_eq!(requests[3].expected_sid.as_deref(), Some("S-1-5-32-544"));

        let dns_admins = requests.iter().find(|r| r.display_name == "DnsAdmins").unwrap();
        assert!(dns_admins.expected_sid.is_none());
    }

    #[test]
    fn test_trailing_dash_in_domain_sid() {
        let sid = WellKnownSid::DomainRelative(519).expected_sid("S-1-5-21-1-2-3-");
        assert_eq!(sid.as_deref(), Some("S-1-5-21-1-2-3-519"));
    }
}
