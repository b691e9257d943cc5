//! Privileged group membership resolution
//!
//! Walks the group-membership graph depth-first from one group and yields a
//! [`ResolvedMember`] for every member reached, annotated with the chain of
//! nested groups that led to it.
//!
//! # Ordering
//!
//! 1. Direct members, in member-list order. A nested group's own entry is
//!    followed immediately by its whole subtree.
//! 2. Members by primary group (users, then computers). AD records primary
//!    group membership on the member, not in the group's `member` list, so
//!    it is invisible to the walk above. Domain-local groups cannot be a
//!    primary group and are skipped.
//!
//! # Cycles
//!
//! A nested group whose DN is already on the current path is still emitted
//! but not descended into; a `CircularReference` warning is recorded.
//!
//! Members reachable through several independent paths are yielded once per
//! path. De-duplication belongs to the report layer.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common_types::EXPECTED_FOREIGN_CLASSES;
use crate::directory::{DirectoryGateway, DirectoryObject, GroupIdentity};
use crate::errors::{AuditError, Result};
use crate::ldap_utils::first_rdn_value;
use crate::schema_catalog::{ObjectClass, SchemaCatalog};
use crate::warnings::{AuditWarning, WarningKind, Warnings};

/// Nesting chain of group DNs from the root privileged group, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPath(Vec<String>);

impl MembershipPath {
    pub fn root(group_dn: impl Into<String>) -> Self {
        Self(vec![group_dn.into()])
    }

    /// DNs are case-insensitive in AD.
    pub fn contains(&self, dn: &str) -> bool {
        self.0.iter().any(|entry| entry.eq_ignore_ascii_case(dn))
    }

    /// New path with `dn` appended.
    pub fn child(&self, dn: impl Into<String>) -> Self {
        let mut next = self.0.clone();
        next.push(dn.into());
        Self(next)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn groups(&self) -> &[String] {
        &self.0
    }

    /// Human-readable form: first RDN values joined with ` > `.
    pub fn display(&self) -> String {
        self.0
            .iter()
            .map(|dn| first_rdn_value(dn))
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

/// A member reached through one particular membership path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMember {
    pub object: DirectoryObject,
    pub path: MembershipPath,
}

enum PrimaryGroupPhase {
    Pending,
    Emitting(VecDeque<DirectoryObject>),
    Done,
}

struct Frame {
    group_dn: String,
    path: MembershipPath,
    members: VecDeque<String>,
    primary: PrimaryGroupPhase,
}

/// Lazy, single-pass resolution of one group.
///
/// Yields `Err` at most once: a collaborator failure after the group handle
/// was obtained ends the iteration.
pub struct MemberResolution<'a, G: DirectoryGateway + ?Sized> {
    gateway: &'a mut G,
    catalog: &'a SchemaCatalog,
    warnings: &'a mut Warnings,
    stack: Vec<Frame>,
    start: Option<(String, Option<MembershipPath>)>,
    finished: bool,
}

/// Resolve every member of `group_dn`.
///
/// `path` is the nesting chain leading to this group; `None` starts a new
/// walk rooted at the group itself.
pub fn resolve_members<'a, G: DirectoryGateway + ?Sized>(
    gateway: &'a mut G,
    catalog: &'a SchemaCatalog,
    warnings: &'a mut Warnings,
    group_dn: &str,
    path: Option<MembershipPath>,
) -> MemberResolution<'a, G> {
    MemberResolution {
        gateway,
        catalog,
        warnings,
        stack: Vec::new(),
        start: Some((group_dn.to_string(), path)),
        finished: false,
    }
}

impl<'a, G: DirectoryGateway + ?Sized> MemberResolution<'a, G> {
    fn open_group(&mut self, group_dn: &str, path: Option<MembershipPath>) -> Result<()> {
        let group = self
            .gateway
            .get_group(
                &GroupIdentity::Dn(group_dn.to_string()),
                self.catalog.group_lookup_attrs(),
            )?
            .ok_or_else(|| AuditError::NotFound(format!("group {}", group_dn)))?;
        self.push_frame(group, path)
    }

    fn push_frame(&mut self, group: DirectoryObject, path: Option<MembershipPath>) -> Result<()> {
        let members = self.gateway.get_group_members(&group)?;
        let path = path.unwrap_or_else(|| MembershipPath::root(group.distinguished_name.clone()));
        let primary = if group.group_scope().is_domain_local() {
            PrimaryGroupPhase::Done
        } else {
            PrimaryGroupPhase::Pending
        };

        debug!(
            group = %group.distinguished_name,
            members = members.len(),
            depth = path.depth(),
            "Resolving group members"
        );

        self.stack.push(Frame {
            group_dn: group.distinguished_name,
            path,
            members: members.into(),
            primary,
        });
        Ok(())
    }

    fn visit_member(&mut self, member_dn: &str, path: MembershipPath) -> Result<ResolvedMember> {
        let probe = self
            .gateway
            .get_object(member_dn, &["objectClass".to_string()])?;

        match probe.object_class() {
            ObjectClass::User => {
                let object = self
                    .gateway
                    .get_user(member_dn, self.catalog.input_for(ObjectClass::User))?;
                Ok(ResolvedMember { object, path })
            }
            ObjectClass::Computer => {
                let object = self
                    .gateway
                    .get_computer(member_dn, self.catalog.input_for(ObjectClass::Computer))?;
                Ok(ResolvedMember { object, path })
            }
            ObjectClass::Group => {
                let group = self
                    .gateway
                    .get_group(
                        &GroupIdentity::Dn(member_dn.to_string()),
                        self.catalog.group_lookup_attrs(),
                    )?
                    .ok_or_else(|| AuditError::NotFound(format!("nested group {}", member_dn)))?;

                if path.contains(&group.distinguished_name) {
                    self.warnings.record(
                        AuditWarning::new(
                            WarningKind::CircularReference,
                            format!(
                                "Circular reference: {} is already on path {}",
                                group.distinguished_name,
                                path.display()
                            ),
                        )
                        .group(path.groups().last().cloned().unwrap_or_default())
                        .object(group.distinguished_name.clone()),
                    );
                    return Ok(ResolvedMember {
                        object: group,
                        path,
                    });
                }

                let nested_path = path.child(group.distinguished_name.clone());
                let entry = ResolvedMember {
                    object: group.clone(),
                    path: nested_path.clone(),
                };
                self.push_frame(group, Some(nested_path))?;
                Ok(entry)
            }
            ObjectClass::Object => {
                let class_name = probe.object_class_name.as_str();
                if !EXPECTED_FOREIGN_CLASSES
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(class_name))
                {
                    self.warnings.record(
                        AuditWarning::new(
                            WarningKind::UnexpectedMemberType,
                            format!(
                                "Unexpected member type '{}' for {}",
                                class_name, member_dn
                            ),
                        )
                        .group(path.groups().last().cloned().unwrap_or_default())
                        .object(member_dn.to_string()),
                    );
                }
                let object = self
                    .gateway
                    .get_object(member_dn, self.catalog.input_for(ObjectClass::Object))?;
                Ok(ResolvedMember { object, path })
            }
        }
    }

    fn primary_group_members(&mut self, group_dn: &str) -> Result<VecDeque<DirectoryObject>> {
        let mut found: VecDeque<DirectoryObject> = self
            .gateway
            .find_users_by_primary_group(group_dn, self.catalog.input_for(ObjectClass::User))?
            .into();
        found.extend(self.gateway.find_computers_by_primary_group(
            group_dn,
            self.catalog.input_for(ObjectClass::Computer),
        )?);

        if !found.is_empty() {
            debug!(group = %group_dn, count = found.len(), "Primary group members found");
        }
        Ok(found)
    }

    fn step(&mut self) -> Result<Option<ResolvedMember>> {
        if let Some((group_dn, path)) = self.start.take() {
            self.open_group(&group_dn, path)?;
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            if let Some(member_dn) = frame.members.pop_front() {
                let path = frame.path.clone();
                return self.visit_member(&member_dn, path).map(Some);
            }

            if matches!(frame.primary, PrimaryGroupPhase::Pending) {
                let group_dn = frame.group_dn.clone();
                let found = self.primary_group_members(&group_dn)?;
                if let Some(frame) = self.stack.last_mut() {
                    frame.primary = PrimaryGroupPhase::Emitting(found);
                }
                continue;
            }

            if let PrimaryGroupPhase::Emitting(queue) = &mut frame.primary {
                if let Some(object) = queue.pop_front() {
                    return Ok(Some(ResolvedMember {
                        object,
                        path: frame.path.clone(),
                    }));
                }
            }

            self.stack.pop();
        }
    }
}

impl<'a, G: DirectoryGateway + ?Sized> Iterator for MemberResolution<'a, G> {
    type Item = Result<ResolvedMember>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(member)) => Some(Ok(member)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_contains_is_case_insensitive() {
        let path = MembershipPath::root("CN=Domain Admins,CN=Users,DC=corp,DC=local");
        assert!(path.contains("cn=domain admins,cn=users,dc=corp,dc=local"));
        assert!(!path.contains("CN=Other,DC=corp,DC=local"));
    }

    #[test]
    fn test_path_child_and_display() {
        let root = MembershipPath::root("CN=Domain Admins,CN=Users,DC=corp,DC=local");
        let nested = root.child("CN=Tier0 Ops,OU=Groups,DC=corp,DC=local");
        assert_eq!(root.depth(), 1);
        assert_eq!(nested.depth(), 2);
        assert_eq!(nested.display(), "Domain Admins > Tier0 Ops");
        assert_eq!(nested.groups()[0], root.groups()[0]);
    }
}
