//! LDAP Helper Utilities
//!
//! Extension traits and constants for working with ldap3 search results.
//! Active Directory returns attribute names in its own casing, which can
//! differ from the casing requested, so every lookup here ignores case.

use ldap3::SearchEntry;

/// Extension trait for SearchEntry to simplify attribute extraction
pub(crate) trait SearchEntryExt {
    /// All values of a text attribute; empty when missing
    fn get_multi_attr(&self, name: &str) -> Vec<String>;

    /// All values of a binary attribute.
    ///
    /// ldap3 places values that are not valid UTF-8 in `bin_attrs`; values
    /// that happen to decode as text are taken from `attrs` as raw bytes.
    fn get_binary_values(&self, name: &str) -> Option<Vec<Vec<u8>>>;

    /// The most specific `objectClass` value (AD lists it last)
    fn most_specific_class(&self) -> Option<String>;

    /// A ranged attribute (`member;range=0-1499`): its values and the upper
    /// bound, `None` meaning the final range (`*`).
    fn get_ranged_attr(&self, name: &str) -> Option<(Vec<String>, Option<usize>)>;
}

fn find_ci<'a, V>(map: &'a std::collections::HashMap<String, V>, name: &str) -> Option<&'a V> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

impl SearchEntryExt for SearchEntry {
    fn get_multi_attr(&self, name: &str) -> Vec<String> {
        find_ci(&self.attrs, name).cloned().unwrap_or_default()
    }

    fn get_binary_values(&self, name: &str) -> Option<Vec<Vec<u8>>> {
        if let Some(values) = find_ci(&self.bin_attrs, name) {
            return Some(values.clone());
        }
        find_ci(&self.attrs, name).map(|values| {
            values
                .iter()
                .map(|value| value.as_bytes().to_vec())
                .collect()
        })
    }

    fn most_specific_class(&self) -> Option<String> {
        find_ci(&self.attrs, attrs::OBJECT_CLASS).and_then(|v| v.last()).cloned()
    }

    fn get_ranged_attr(&self, name: &str) -> Option<(Vec<String>, Option<usize>)> {
        let prefix = format!("{};range=", name.to_ascii_lowercase());
        self.attrs.iter().find_map(|(key, values)| {
            let lower = key.to_ascii_lowercase();
            let range = lower.strip_prefix(&prefix)?;
            let (_, upper) = range.split_once('-')?;
            let upper = if upper == "*" {
                None
            } else {
                Some(upper.parse().ok()?)
            };
            Some((values.clone(), upper))
        })
    }
}

/// Common LDAP attribute name constants
pub(crate) mod attrs {
    pub const DISTINGUISHED_NAME: &str = "distinguishedName";
    pub const OBJECT_SID: &str = "objectSid";
    pub const OBJECT_CLASS: &str = "objectClass";
    pub const MEMBER: &str = "member";
}

/// Common LDAP filter patterns
pub(crate) mod filters {
    use crate::ldap_utils::escape_ldap_filter;

    /// Any object; used for base-scope reads
    pub const ANY_OBJECT: &str = "(objectClass=*)";

    /// Group by sAMAccountName or cn
    pub fn group_by_name(name: &str) -> String {
        let escaped = escape_ldap_filter(name);
        format!(
            "(&(objectClass=group)(|(sAMAccountName={})(cn={})))",
            escaped, escaped
        )
    }

    /// Group by textual SID (AD accepts the S-1-... form directly)
    pub fn group_by_sid(sid: &str) -> String {
        format!("(&(objectClass=group)(objectSid={}))", escape_ldap_filter(sid))
    }

    /// Users whose primary group has this RID
    pub fn users_by_primary_group(rid: u32) -> String {
        format!(
            "(&(objectCategory=person)(objectClass=user)(primaryGroupID={}))",
            rid
        )
    }

    /// Computers whose primary group has this RID
    pub fn computers_by_primary_group(rid: u32) -> String {
        format!("(&(objectClass=computer)(primaryGroupID={}))", rid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn create_test_entry(attrs: Vec<(&str, Vec<&str>)>) -> SearchEntry {
        let mut attr_map = HashMap::new();
        for (key, values) in attrs {
            attr_map.insert(key.to_string(), values.into_iter().map(|s| s.to_string()).collect());
        }
        SearchEntry {
            dn: "CN=Test,DC=example,DC=com".to_string(),
            attrs: attr_map,
            bin_attrs: HashMap::new(),
        }
    }

    #[test]
    fn test_get_multi_attr() {
        let entry = create_test_entry(vec![("memberOf", vec!["CN=Group1,DC=test", "CN=Group2,DC=test"])]);
        assert_eq!(entry.get_multi_attr("memberOf").len(), 2);
        assert_eq!(entry.get_multi_attr("MEMBEROF").len(), 2);
        assert_eq!(entry.get_multi_attr("nonexistent"), Vec::<String>::new());
    }

    #[test]
    fn test_binary_values_from_both_maps() {
        let mut entry = create_test_entry(vec![("objectGUID", vec!["abc"])]);
        assert_eq!(entry.get_binary_values("objectguid"), Some(vec![b"abc".to_vec()]));

        entry
            .bin_attrs
            .insert("objectSid".to_string(), vec![vec![0x01, 0xff]]);
        assert_eq!(entry.get_binary_values("objectSid"), Some(vec![vec![0x01, 0xff]]));
        assert_eq!(entry.get_binary_values("sIDHistory"), None);
    }

    #[test]
    fn test_most_specific_class() {
        let entry = create_test_entry(vec![(
            "objectClass",
            vec!["top", "person", "organizationalPerson", "user"],
        )]);
        assert_eq!(entry.most_specific_class().as_deref(), Some("user"));
    }

    #[test]
    fn test_ranged_attr() {
        let entry = create_test_entry(vec![("member;range=0-1499", vec!["CN=a", "CN=b"])]);
        let (values, upper) = entry.get_ranged_attr("member").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(upper, Some(1499));

        let last = create_test_entry(vec![("member;range=1500-*", vec!["CN=c"])]);
        assert_eq!(last.get_ranged_attr("member").unwrap().1, None);

        let plain = create_test_entry(vec![("member", vec!["CN=a"])]);
        assert!(plain.get_ranged_attr("member").is_none());
    }

    #[test]
    fn test_filters_escape_names() {
        assert_eq!(
            filters::group_by_name("Admins (Tier*0)"),
            r"(&(objectClass=group)(|(sAMAccountName=Admins \28Tier\2a0\29)(cn=Admins \28Tier\2a0\29)))"
        );
        assert_eq!(
            filters::users_by_primary_group(512),
            "(&(objectCategory=person)(objectClass=user)(primaryGroupID=512))"
        );
    }
}
