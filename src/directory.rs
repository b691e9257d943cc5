//! Directory model and gateway contract
//!
//! [`DirectoryGateway`] is the seam between the audit engine and the
//! directory service. The LDAP implementation lives in
//! [`crate::ldap_gateway`]; tests drive the engine through in-memory fakes.

use serde::{Deserialize, Serialize};

use crate::common_types::GroupScope;
use crate::errors::Result;
use crate::ldap_utils::sid_to_string;
use crate::schema_catalog::ObjectClass;

/// Raw value of a directory attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(Vec<String>),
    Integer(i64),
    Binary(Vec<Vec<u8>>),
}

impl AttributeValue {
    pub fn text(value: impl Into<String>) -> Self {
        AttributeValue::Text(vec![value.into()])
    }

    /// First value as text, if this is a text attribute.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(values) => values.first().map(String::as_str),
            _ => None,
        }
    }

    /// Integer view of the value. Text values are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(value) => Some(*value),
            AttributeValue::Text(values) => values.first().and_then(|v| v.trim().parse().ok()),
            AttributeValue::Binary(_) => None,
        }
    }
}

/// A directory entry as fetched for one resolution step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryObject {
    pub distinguished_name: String,
    /// Most specific `objectClass` value (e.g. `user`, `foreignSecurityPrincipal`)
    pub object_class_name: String,
    /// Attributes in the order they were requested
    pub attributes: Vec<(String, AttributeValue)>,
}

impl DirectoryObject {
    pub fn new(distinguished_name: impl Into<String>, object_class_name: impl Into<String>) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            object_class_name: object_class_name.into(),
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute append.
    pub fn with_attr(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.set(name, value);
        self
    }

    /// Replace an attribute in place, or append it.
    pub fn set(&mut self, name: impl Into<String>, value: AttributeValue) {
        let name = name.into();
        match self
            .attributes
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn object_class(&self) -> ObjectClass {
        ObjectClass::from_ldap(&self.object_class_name)
    }

    /// Case-insensitive attribute lookup.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::first_text)
    }

    /// Display name: `name`, then `sAMAccountName`, then the DN.
    pub fn display_name(&self) -> &str {
        self.get_text("name")
            .or_else(|| self.get_text("sAMAccountName"))
            .unwrap_or(self.distinguished_name.as_str())
    }

    /// Textual SID decoded from the binary `objectSid`.
    pub fn sid(&self) -> Option<String> {
        match self.get("objectSid")? {
            AttributeValue::Binary(values) => {
                values.first().and_then(|bytes| sid_to_string(bytes).ok())
            }
            AttributeValue::Text(values) => values
                .first()
                .filter(|v| v.starts_with("S-"))
                .cloned(),
            AttributeValue::Integer(_) => None,
        }
    }

    /// Scope of a group object, decoded from `groupType`.
    pub fn group_scope(&self) -> GroupScope {
        self.get("groupType")
            .and_then(AttributeValue::as_i64)
            .map(GroupScope::from_group_type)
            .unwrap_or(GroupScope::Unknown)
    }
}

/// How a group is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupIdentity {
    Name(String),
    Sid(String),
    Dn(String),
}

impl std::fmt::Display for GroupIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupIdentity::Name(name) => write!(f, "name '{}'", name),
            GroupIdentity::Sid(sid) => write!(f, "SID {}", sid),
            GroupIdentity::Dn(dn) => write!(f, "DN {}", dn),
        }
    }
}

/// Access to the directory service.
///
/// Calls are synchronous and blocking from the caller's point of view.
/// Every projection-list fetch tolerates attributes the entry does not
/// carry: they are simply absent from the returned object.
pub trait DirectoryGateway {
    /// Look up a group. `Ok(None)` means the identity did not resolve.
    fn get_group(
        &mut self,
        identity: &GroupIdentity,
        attrs: &[String],
    ) -> Result<Option<DirectoryObject>>;

    fn get_user(&mut self, dn: &str, attrs: &[String]) -> Result<DirectoryObject>;

    fn get_computer(&mut self, dn: &str, attrs: &[String]) -> Result<DirectoryObject>;

    fn get_object(&mut self, dn: &str, attrs: &[String]) -> Result<DirectoryObject>;

    /// Direct member DNs of a group, in member-list order.
    fn get_group_members(&mut self, group: &DirectoryObject) -> Result<Vec<String>>;

    fn find_users_by_primary_group(
        &mut self,
        group_dn: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryObject>>;

    fn find_computers_by_primary_group(
        &mut self,
        group_dn: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryObject>>;

    /// SID of the domain the gateway is bound to (S-1-5-21-...).
    fn domain_sid(&mut self) -> Result<String>;
}
