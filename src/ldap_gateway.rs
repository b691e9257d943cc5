//! LDAP implementation of [`DirectoryGateway`]
//!
//! Wraps one bound synchronous `LdapConn`. Group lookups by name or SID are
//! subtree searches under the base DN; everything addressed by DN is a
//! base-scope read.

use ldap3::{LdapConn, Scope, SearchEntry};
use std::time::Duration;
use tracing::{debug, warn};

use crate::directory::{AttributeValue, DirectoryGateway, DirectoryObject, GroupIdentity};
use crate::errors::{AuditError, Result};
use crate::ldap_helpers::{attrs, filters, SearchEntryExt};
use crate::ldap_timeout::{ldap_paged_search, ldap_search, DEFAULT_PAGE_SIZE};
use crate::ldap_utils::{sid_rid, sid_to_string};
use crate::schema_catalog::{is_binary_attribute, ObjectClass};

/// Attribute list sent to the server: the caller's list plus the two
/// attributes every conversion needs.
fn request_attrs(requested: &[String]) -> Vec<String> {
    let mut list = requested.to_vec();
    for required in [attrs::OBJECT_CLASS, attrs::DISTINGUISHED_NAME] {
        if !list.iter().any(|a| a.eq_ignore_ascii_case(required)) {
            list.push(required.to_string());
        }
    }
    list
}

/// Convert a search entry, keeping the requested attribute order.
///
/// Attributes the entry does not carry are left out.
pub fn entry_to_object(entry: &SearchEntry, requested: &[String]) -> DirectoryObject {
    let class_name = entry
        .most_specific_class()
        .unwrap_or_else(|| "top".to_string());
    let mut object = DirectoryObject::new(entry.dn.clone(), class_name);

    for name in requested {
        if object.get(name).is_some() {
            continue;
        }
        if is_binary_attribute(name) {
            if let Some(values) = entry.get_binary_values(name) {
                object.set(name.clone(), AttributeValue::Binary(values));
            }
        } else {
            let values = entry.get_multi_attr(name);
            if !values.is_empty() {
                object.set(name.clone(), AttributeValue::Text(values));
            }
        }
    }
    object
}

pub struct LdapDirectoryGateway {
    ldap: LdapConn,
    base_dn: String,
    search_timeout: Duration,
    page_size: i32,
}

impl LdapDirectoryGateway {
    pub fn new(ldap: LdapConn, base_dn: impl Into<String>, search_timeout: Duration) -> Self {
        Self {
            ldap,
            base_dn: base_dn.into(),
            search_timeout,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Hand the connection back for unbinding.
    pub fn into_inner(self) -> LdapConn {
        self.ldap
    }

    /// Base-scope read. `noSuchObject` is `Ok(None)`.
    fn read_entry(&mut self, dn: &str, attrs: &[String]) -> Result<Option<SearchEntry>> {
        match ldap_search(
            &mut self.ldap,
            dn,
            Scope::Base,
            filters::ANY_OBJECT,
            attrs,
            self.search_timeout,
        ) {
            Ok(entries) => Ok(entries.into_iter().next()),
            Err(AuditError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn search_one(&mut self, filter: &str, attrs: &[String]) -> Result<Option<SearchEntry>> {
        let base_dn = self.base_dn.clone();
        let mut entries = ldap_search(
            &mut self.ldap,
            &base_dn,
            Scope::Subtree,
            filter,
            attrs,
            self.search_timeout,
        )?;
        if entries.len() > 1 {
            warn!(
                "ldap_gateway: {} matched {} entries, using the first",
                filter,
                entries.len()
            );
        }
        Ok(if entries.is_empty() {
            None
        } else {
            Some(entries.remove(0))
        })
    }

    fn fetch(&mut self, dn: &str, requested: &[String]) -> Result<DirectoryObject> {
        let entry = self
            .read_entry(dn, &request_attrs(requested))?
            .ok_or_else(|| AuditError::NotFound(dn.to_string()))?;
        Ok(entry_to_object(&entry, requested))
    }

    fn group_rid(&mut self, group: &str) -> Result<Option<u32>> {
        let sid_attr = vec![attrs::OBJECT_SID.to_string()];
        let object = self.fetch(group, &sid_attr)?;
        Ok(object.sid().as_deref().and_then(sid_rid))
    }

    fn find_by_primary_group(
        &mut self,
        group_dn: &str,
        filter_for: fn(u32) -> String,
        requested: &[String],
    ) -> Result<Vec<DirectoryObject>> {
        let Some(rid) = self.group_rid(group_dn)? else {
            warn!("ldap_gateway: No objectSid on {}, skipping primary group lookup", group_dn);
            return Ok(Vec::new());
        };

        let base_dn = self.base_dn.clone();
        let entries = ldap_paged_search(
            &mut self.ldap,
            &base_dn,
            Scope::Subtree,
            &filter_for(rid),
            &request_attrs(requested),
            self.page_size,
            self.search_timeout,
        )?;
        Ok(entries
            .iter()
            .map(|entry| entry_to_object(entry, requested))
            .collect())
    }
}

impl DirectoryGateway for LdapDirectoryGateway {
    fn get_group(
        &mut self,
        identity: &GroupIdentity,
        attrs: &[String],
    ) -> Result<Option<DirectoryObject>> {
        let request = request_attrs(attrs);
        let entry = match identity {
            GroupIdentity::Name(name) => self.search_one(&filters::group_by_name(name), &request)?,
            GroupIdentity::Sid(sid) => self.search_one(&filters::group_by_sid(sid), &request)?,
            GroupIdentity::Dn(dn) => self.read_entry(dn, &request)?,
        };

        let object = entry.map(|e| entry_to_object(&e, attrs));
        match object {
            Some(object) if object.object_class() != ObjectClass::Group => {
                debug!(
                    "ldap_gateway: {} resolved to a {}, not a group",
                    identity, object.object_class_name
                );
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn get_user(&mut self, dn: &str, attrs: &[String]) -> Result<DirectoryObject> {
        self.fetch(dn, attrs)
    }

    fn get_computer(&mut self, dn: &str, attrs: &[String]) -> Result<DirectoryObject> {
        self.fetch(dn, attrs)
    }

    fn get_object(&mut self, dn: &str, attrs: &[String]) -> Result<DirectoryObject> {
        self.fetch(dn, attrs)
    }

    /// Follows ranged retrieval (`member;range=N-*`) until the final range.
    fn get_group_members(&mut self, group: &DirectoryObject) -> Result<Vec<String>> {
        let dn = group.distinguished_name.clone();
        let mut members = Vec::new();
        let mut request = attrs::MEMBER.to_string();

        loop {
            let entry = self
                .read_entry(&dn, &[request.clone()])?
                .ok_or_else(|| AuditError::NotFound(dn.clone()))?;

            match entry.get_ranged_attr(attrs::MEMBER) {
                Some((values, upper)) => {
                    members.extend(values);
                    match upper {
                        Some(upper) => {
                            debug!("ldap_gateway: {} member range up to {}", dn, upper);
                            request = format!("{};range={}-*", attrs::MEMBER, upper + 1);
                        }
                        None => break,
                    }
                }
                None => {
                    members.extend(entry.get_multi_attr(attrs::MEMBER));
                    break;
                }
            }
        }
        Ok(members)
    }

    fn find_users_by_primary_group(
        &mut self,
        group_dn: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryObject>> {
        self.find_by_primary_group(group_dn, filters::users_by_primary_group, attrs)
    }

    fn find_computers_by_primary_group(
        &mut self,
        group_dn: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryObject>> {
        self.find_by_primary_group(group_dn, filters::computers_by_primary_group, attrs)
    }

    fn domain_sid(&mut self) -> Result<String> {
        let base_dn = self.base_dn.clone();
        let entry = self
            .read_entry(&base_dn, &[attrs::OBJECT_SID.to_string()])?
            .ok_or_else(|| AuditError::NotFound(base_dn.clone()))?;

        let bytes = entry
            .get_binary_values(attrs::OBJECT_SID)
            .and_then(|values| values.into_iter().next())
            .ok_or_else(|| AuditError::ParseError(format!("No objectSid on {}", base_dn)))?;
        sid_to_string(&bytes).map_err(AuditError::ParseError)
    }
}
