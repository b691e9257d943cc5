//! Attribute Schema Catalog
//!
//! Declares which directory attributes are requested ("input") and which are
//! emitted in reports ("output") for each object class. The master list is a
//! small tree of tagged nodes:
//!
//! | Node | Expansion rule |
//! |------|----------------|
//! | `Attribute` | the attribute name itself |
//! | `Sequence` | children, in place, in order |
//! | `ClassScoped` | children, only when the class filter is absent or listed |
//! | `Generated` | children, only when generated columns are requested |
//!
//! Every derived set is computed once in [`SchemaCatalog::build`] and is
//! read-only afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{AuditError, Result};

/// Object classes the catalog distinguishes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    User,
    Computer,
    Group,
    /// Residual class: foreign security principals, managed service
    /// accounts and anything else.
    Object,
}

impl ObjectClass {
    /// Map a raw, most-specific `objectClass` value.
    pub fn from_ldap(class_name: &str) -> Self {
        match class_name.to_ascii_lowercase().as_str() {
            "user" => ObjectClass::User,
            "computer" => ObjectClass::Computer,
            "group" => ObjectClass::Group,
            _ => ObjectClass::Object,
        }
    }
}

/// A node of the master attribute tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeNode {
    Attribute { name: String },
    Sequence { items: Vec<AttributeNode> },
    ClassScoped {
        classes: Vec<ObjectClass>,
        items: Vec<AttributeNode>,
    },
    Generated { items: Vec<AttributeNode> },
}

/// Attributes holding Windows FILETIME values. Each one gets a generated
/// `<name>Date` column.
pub const FILETIME_ATTRIBUTES: &[&str] = &[
    "lastLogon",
    "lastLogonTimestamp",
    "pwdLastSet",
    "accountExpires",
    "badPasswordTime",
    "lockoutTime",
    "ms-Mcs-AdmPwdExpirationTime",
];

/// Binary identifier attributes, emitted base64 encoded.
pub const BINARY_ATTRIBUTES: &[&str] = &["objectSid", "objectGUID", "sIDHistory"];

/// Group attributes the resolver itself depends on: the SID check and the
/// domain-local scope test. Fetched whatever the tree declares.
pub const GROUP_RESOLUTION_ATTRIBUTES: &[&str] = &["objectSid", "groupType"];

pub fn is_binary_attribute(name: &str) -> bool {
    BINARY_ATTRIBUTES
        .iter()
        .any(|attr| attr.eq_ignore_ascii_case(name))
}

/// Name of the generated column holding the decoded date of `attribute`.
pub fn date_column(attribute: &str) -> String {
    format!("{}Date", attribute)
}

fn attr(name: &str) -> AttributeNode {
    AttributeNode::Attribute {
        name: name.to_string(),
    }
}

fn attrs(names: &[&str]) -> AttributeNode {
    AttributeNode::Sequence {
        items: names.iter().map(|name| attr(name)).collect(),
    }
}

fn scoped(classes: &[ObjectClass], items: Vec<AttributeNode>) -> AttributeNode {
    AttributeNode::ClassScoped {
        classes: classes.to_vec(),
        items,
    }
}

fn generated(items: Vec<AttributeNode>) -> AttributeNode {
    AttributeNode::Generated { items }
}

/// Built-in Active Directory attribute tree.
pub fn default_attribute_tree() -> Vec<AttributeNode> {
    use ObjectClass::*;

    let account_dates: Vec<AttributeNode> = FILETIME_ATTRIBUTES
        .iter()
        .filter(|name| **name != "ms-Mcs-AdmPwdExpirationTime")
        .map(|name| attr(&date_column(name)))
        .collect();

    vec![
        attrs(&[
            "name",
            "sAMAccountName",
            "distinguishedName",
            "objectClass",
            "objectSid",
            "objectGUID",
            "description",
            "whenCreated",
            "whenChanged",
        ]),
        scoped(
            &[User, Computer, Group],
            vec![attrs(&["adminCount", "sIDHistory"])],
        ),
        scoped(
            &[User],
            vec![attrs(&[
                "displayName",
                "givenName",
                "sn",
                "userPrincipalName",
                "mail",
                "title",
                "department",
                "manager",
            ])],
        ),
        scoped(
            &[User, Computer],
            vec![
                attrs(&[
                    "userAccountControl",
                    "primaryGroupID",
                    "servicePrincipalName",
                    "msDS-AllowedToDelegateTo",
                    "lastLogon",
                    "lastLogonTimestamp",
                    "pwdLastSet",
                    "accountExpires",
                    "badPasswordTime",
                    "lockoutTime",
                ]),
                generated(account_dates),
            ],
        ),
        scoped(
            &[Computer],
            vec![
                attrs(&[
                    "dNSHostName",
                    "operatingSystem",
                    "operatingSystemVersion",
                    "ms-Mcs-AdmPwdExpirationTime",
                ]),
                generated(vec![attr(&date_column("ms-Mcs-AdmPwdExpirationTime"))]),
            ],
        ),
        scoped(&[Group], vec![attrs(&["groupType", "managedBy"])]),
    ]
}

/// Recursive depth-first expansion of an attribute tree.
///
/// Declaration order is kept and the first occurrence of a name wins.
pub fn flatten(
    nodes: &[AttributeNode],
    class: Option<ObjectClass>,
    include_generated: bool,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    expand(nodes, class, include_generated, &mut seen, &mut out);
    out
}

fn expand(
    nodes: &[AttributeNode],
    class: Option<ObjectClass>,
    include_generated: bool,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    for node in nodes {
        match node {
            AttributeNode::Attribute { name } => {
                if seen.insert(name.to_ascii_lowercase()) {
                    out.push(name.clone());
                }
            }
            AttributeNode::Sequence { items } => {
                expand(items, class, include_generated, seen, out);
            }
            AttributeNode::ClassScoped { classes, items } => {
                let applies = match class {
                    Some(c) => classes.contains(&c),
                    None => true,
                };
                if applies {
                    expand(items, class, include_generated, seen, out);
                }
            }
            AttributeNode::Generated { items } => {
                if include_generated {
                    expand(items, class, include_generated, seen, out);
                }
            }
        }
    }
}

fn validate(nodes: &[AttributeNode]) -> Result<()> {
    for node in nodes {
        match node {
            AttributeNode::Attribute { name } => {
                if name.trim().is_empty() {
                    return Err(AuditError::SchemaConfiguration(
                        "attribute with an empty name".to_string(),
                    ));
                }
            }
            AttributeNode::Sequence { items } | AttributeNode::Generated { items } => {
                validate(items)?;
            }
            AttributeNode::ClassScoped { classes, items } => {
                if classes.is_empty() {
                    return Err(AuditError::SchemaConfiguration(
                        "class-scoped group without any class".to_string(),
                    ));
                }
                validate(items)?;
            }
        }
    }
    Ok(())
}

/// Derived, read-only attribute sets for one audit run
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tree: Vec<AttributeNode>,
    user_input: Vec<String>,
    user_output: Vec<String>,
    computer_input: Vec<String>,
    computer_output: Vec<String>,
    group_input: Vec<String>,
    group_output: Vec<String>,
    group_lookup: Vec<String>,
    object_input: Vec<String>,
    object_output: Vec<String>,
    all_output: Vec<String>,
}

impl SchemaCatalog {
    pub fn build(tree: Vec<AttributeNode>) -> Result<Self> {
        validate(&tree)?;
        let catalog = Self::derive(tree);
        if catalog.all_output.is_empty() {
            return Err(AuditError::SchemaConfiguration(
                "attribute tree declares no attributes".to_string(),
            ));
        }
        Ok(catalog)
    }

    fn derive(tree: Vec<AttributeNode>) -> Self {
        let set = |class: ObjectClass, generated: bool| flatten(&tree, Some(class), generated);
        let group_input = set(ObjectClass::Group, false);
        let mut group_lookup = group_input.clone();
        for required in GROUP_RESOLUTION_ATTRIBUTES {
            if !group_lookup.iter().any(|a| a.eq_ignore_ascii_case(required)) {
                group_lookup.push(required.to_string());
            }
        }
        Self {
            user_input: set(ObjectClass::User, false),
            user_output: set(ObjectClass::User, true),
            computer_input: set(ObjectClass::Computer, false),
            computer_output: set(ObjectClass::Computer, true),
            group_input,
            group_lookup,
            group_output: set(ObjectClass::Group, true),
            object_input: set(ObjectClass::Object, false),
            object_output: set(ObjectClass::Object, true),
            all_output: flatten(&tree, None, true),
            tree,
        }
    }

    /// Load an override tree from JSON.
    ///
    /// ```json
    /// [{"kind": "attribute", "name": "sAMAccountName"},
    ///  {"kind": "class_scoped", "classes": ["user"], "items": [...]}]
    /// ```
    pub fn from_json(text: &str) -> Result<Self> {
        let tree: Vec<AttributeNode> = serde_json::from_str(text).map_err(|e| {
            AuditError::SchemaConfiguration(format!("unrecognized attribute node: {}", e))
        })?;
        Self::build(tree)
    }

    pub fn tree(&self) -> &[AttributeNode] {
        &self.tree
    }

    /// Attributes to request from the directory for `class`.
    pub fn input_for(&self, class: ObjectClass) -> &[String] {
        match class {
            ObjectClass::User => &self.user_input,
            ObjectClass::Computer => &self.computer_input,
            ObjectClass::Group => &self.group_input,
            ObjectClass::Object => &self.object_input,
        }
    }

    /// Attributes to request when fetching a group: the group input set
    /// plus [`GROUP_RESOLUTION_ATTRIBUTES`].
    pub fn group_lookup_attrs(&self) -> &[String] {
        &self.group_lookup
    }

    /// Columns to emit for `class`, generated ones included.
    pub fn output_for(&self, class: ObjectClass) -> &[String] {
        match class {
            ObjectClass::User => &self.user_output,
            ObjectClass::Computer => &self.computer_output,
            ObjectClass::Group => &self.group_output,
            ObjectClass::Object => &self.object_output,
        }
    }

    /// Every attribute, generated included, without class filter. Used as the
    /// column set of the privileged members report.
    pub fn all_output(&self) -> &[String] {
        &self.all_output
    }

    /// FILETIME attributes that appear in at least one input set.
    pub fn date_attributes(&self) -> Vec<String> {
        let requested = flatten(&self.tree, None, false);
        FILETIME_ATTRIBUTES
            .iter()
            .filter(|name| requested.iter().any(|r| r.eq_ignore_ascii_case(name)))
            .map(|name| name.to_string())
            .collect()
    }
}

impl Default for SchemaCatalog {
    /// The built-in tree; it always validates (see `test_default_tree_builds`).
    fn default() -> Self {
        Self::derive(default_attribute_tree())
    }
}
