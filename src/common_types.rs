//! Common Types Module
//!
//! Shared directory constants and small value types used by the gateway,
//! the membership resolver and the report layer.

use serde::{Deserialize, Serialize};

/// Active Directory `groupType` flag constants
pub mod group_type {
    /// Global scope
    pub const GLOBAL: i64 = 0x0000_0002;
    /// Domain-local scope
    pub const DOMAIN_LOCAL: i64 = 0x0000_0004;
    /// Universal scope
    pub const UNIVERSAL: i64 = 0x0000_0008;
}

/// Object classes of members that are expected in privileged groups even
/// though they are neither users, computers nor groups.
pub const EXPECTED_FOREIGN_CLASSES: [&str; 3] = [
    "foreignSecurityPrincipal",
    "msDS-ManagedServiceAccount",
    "msDS-GroupManagedServiceAccount",
];

/// Scope of a directory group, decoded from `groupType`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GroupScope {
    Global,
    DomainLocal,
    Universal,
    Unknown,
}

impl GroupScope {
    /// Decode the scope bits of a `groupType` value.
    ///
    /// AD stores `groupType` as a signed 32-bit integer, so security groups
    /// come back negative; only the low scope bits matter here.
    pub fn from_group_type(value: i64) -> Self {
        if value & group_type::DOMAIN_LOCAL != 0 {
            GroupScope::DomainLocal
        } else if value & group_type::GLOBAL != 0 {
            GroupScope::Global
        } else if value & group_type::UNIVERSAL != 0 {
            GroupScope::Universal
        } else {
            GroupScope::Unknown
        }
    }

    pub fn is_domain_local(&self) -> bool {
        matches!(self, GroupScope::DomainLocal)
    }
}

/// Extract domain name from a distinguished name
///
/// # Example
/// ```
/// use ad_privilege_audit::common_types::extract_domain_from_dn;
///
/// let dn = "CN=John,OU=Users,DC=example,DC=com";
/// assert_eq!(extract_domain_from_dn(dn), "example.com");
/// ```
pub fn extract_domain_from_dn(dn: &str) -> String {
    dn.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.to_uppercase().starts_with("DC=") {
                Some(&part[3..])
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}
