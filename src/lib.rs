//! Active Directory privileged group membership audit
//!
//! Resolves the effective membership of the well-known privileged groups,
//! nested groups and primary-group members included, and emits one flat row
//! per member and membership path.
//!
//! The engine ([`group_audit`], [`membership`], [`projection`]) is synchronous
//! and talks to the directory only through [`directory::DirectoryGateway`];
//! [`ldap_gateway`] is the LDAP implementation.

pub mod common_types;
pub mod config;
pub mod directory;
pub mod errors;
pub mod group_audit;
pub mod ldap_gateway;
mod ldap_helpers;
pub mod ldap_timeout;
pub mod ldap_utils;
pub mod membership;
pub mod privileged_groups;
pub mod projection;
pub mod report_sink;
pub mod schema_catalog;
pub mod secure_types;
pub mod warnings;

pub use errors::{AuditError, Result};
