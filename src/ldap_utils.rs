//! LDAP Utilities
//!
//! RFC 4515 filter escaping, MS-DTYP SID decoding and distinguished name
//! helpers shared by the gateway and the report layer.

/// Escapes a string for safe use in an LDAP search filter (RFC 4515).
///
/// The following characters are escaped:
/// - `*` (asterisk) -> `\2a`
/// - `(` (left parenthesis) -> `\28`
/// - `)` (right parenthesis) -> `\29`
/// - `\` (backslash) -> `\5c`
/// - `\0` (NUL) -> `\00`
///
/// # Examples
///
/// ```
/// use ad_privilege_audit::ldap_utils::escape_ldap_filter;
///
/// let safe = escape_ldap_filter("admin*");
/// assert_eq!(safe, "admin\\2a");
/// ```
pub fn escape_ldap_filter(input: &str) -> String {
    input.chars().fold(String::new(), |mut acc, c| {
        match c {
            '*' => acc.push_str("\\2a"),
            '(' => acc.push_str("\\28"),
            ')' => acc.push_str("\\29"),
            '\\' => acc.push_str("\\5c"),
            '\0' => acc.push_str("\\00"),
            _ => acc.push(c),
        }
        acc
    })
}

/// Convert a binary SID to string format (S-1-5-21-...)
///
/// # Format (MS-DTYP 2.4.2):
/// ```text
/// Offset  Size  Field
/// 0       1     Revision
/// 1       1     SubAuthorityCount
/// 2       6     IdentifierAuthority
/// 8       4*N   SubAuthorities (N = SubAuthorityCount)
/// ```
pub fn sid_to_string(bytes: &[u8]) -> Result<String, String> {
    if bytes.len() < 8 {
        return Err("SID too short (minimum 8 bytes)".to_string());
    }

    let revision = bytes[0];
    let sub_auth_count = bytes[1] as usize;

    if bytes.len() < 8 + (sub_auth_count * 4) {
        return Err(format!(
            "SID data insufficient for {} sub-authorities",
            sub_auth_count
        ));
    }

    // 48-bit identifier authority (big-endian)
    let id_auth = u64::from_be_bytes([
        0, 0, bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);

    let mut sid = format!("S-{}-{}", revision, id_auth);

    // Sub-authorities (little-endian)
    for i in 0..sub_auth_count {
        let offset = 8 + (i * 4);
        let sub_auth = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
        sid.push_str(&format!("-{}", sub_auth));
    }

    Ok(sid)
}

/// Relative identifier (last sub-authority) of a textual SID.
pub fn sid_rid(sid: &str) -> Option<u32> {
    if !sid.starts_with("S-") {
        return None;
    }
    sid.rsplit('-').next().and_then(|rid| rid.parse().ok())
}

/// Compare two textual SIDs, ignoring surrounding whitespace and case.
pub fn sids_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Value of the first RDN of a distinguished name, with RFC 4514 escapes
/// removed. `CN=Smith\, John,OU=Admins,DC=corp` yields `Smith, John`.
pub fn first_rdn_value(dn: &str) -> String {
    let mut value = String::new();
    let mut in_value = false;
    let mut chars = dn.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    if in_value {
                        value.push(escaped);
                    }
                }
            }
            '=' if !in_value => in_value = true,
            ',' | '+' if in_value => break,
            _ if in_value => value.push(c),
            _ => {}
        }
    }

    if in_value {
        value.trim().to_string()
    } else {
        dn.to_string()
    }
}
