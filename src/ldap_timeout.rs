//! Timeout wrappers for synchronous LDAP operations
//!
//! The ldap3 crate's `LdapConn::new()` is a blocking call that can hang indefinitely
//! if the server is unreachable. The async wrappers here run connect, bind and
//! unbind through `tokio::task::spawn_blocking` under a timeout. The search
//! helpers are synchronous and rely on ldap3's per-operation timeout; they are
//! called from the resolution engine, which already runs on a blocking thread.

use ldap3::controls::{ControlParser, PagedResults};
use ldap3::{LdapConn, LdapConnSettings, LdapError, LdapResult, Scope, SearchEntry};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::errors::{AuditError, Result};
use crate::secure_types::Credentials;

/// Default connection timeout (15 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default search timeout (30 seconds)
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default page size for paged searches
pub const DEFAULT_PAGE_SIZE: i32 = 500;

/// OID of the Simple Paged Results control
const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

fn join_error(e: tokio::task::JoinError) -> AuditError {
    AuditError::ConnectionError(format!("Task join error: {}", e))
}

/// Attempts to create an LDAP connection with a timeout.
///
/// `no_tls_verify` disables certificate checks for directories fronted by an
/// internal CA the host does not trust.
pub async fn ldap_connect_with_timeout(
    url: &str,
    connect_timeout: Duration,
    no_tls_verify: bool,
) -> Result<LdapConn> {
    let url = url.to_string();

    let result = timeout(connect_timeout, async {
        tokio::task::spawn_blocking(move || {
            let settings = LdapConnSettings::new()
                .set_conn_timeout(connect_timeout)
                .set_no_tls_verify(no_tls_verify);

            LdapConn::with_settings(settings, &url)
        })
        .await
        .map_err(join_error)?
        .map_err(|e| AuditError::ConnectionError(format!("LDAP connection failed: {}", e)))
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(AuditError::Timeout(format!(
            "Connection timeout: Server did not respond within {} seconds. \
             Please verify the server address and network connectivity.",
            connect_timeout.as_secs()
        ))),
    }
}

/// Performs LDAP bind (authentication) with a timeout.
///
/// Takes ownership of the LdapConn to move it into the blocking task,
/// then returns it after successful bind. Anonymous credentials skip the bind.
pub async fn ldap_bind_with_timeout(
    ldap: LdapConn,
    credentials: &Credentials,
    bind_timeout: Duration,
) -> Result<LdapConn> {
    if credentials.is_anonymous() {
        warn!("ldap_bind: No bind user configured, continuing with an anonymous session");
        return Ok(ldap);
    }

    let credentials = credentials.clone();

    let result = timeout(bind_timeout, async {
        tokio::task::spawn_blocking(move || {
            let mut ldap = ldap;
            ldap.simple_bind(credentials.username(), credentials.password())?
                .success()?;
            Ok::<LdapConn, AuditError>(ldap)
        })
        .await
        .map_err(join_error)?
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(AuditError::Timeout(format!(
            "Authentication timeout: Bind operation did not complete within {} seconds.",
            bind_timeout.as_secs()
        ))),
    }
}

/// Unbinds from LDAP connection with a timeout.
pub async fn ldap_unbind_with_timeout(ldap: LdapConn, unbind_timeout: Duration) -> Result<()> {
    let result = timeout(unbind_timeout, async {
        tokio::task::spawn_blocking(move || {
            let mut ldap = ldap;
            ldap.unbind()
        })
        .await
        .map_err(join_error)?
        .map_err(AuditError::from)
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => {
            // Not critical; the connection is dropped anyway
            debug!("ldap_unbind: Unbind did not complete within {}s", unbind_timeout.as_secs());
            Ok(())
        }
    }
}

/// Accepts rc 0 and rc 4 (sizeLimitExceeded, partial results); anything
/// else becomes an error through the `LdapError` mapping.
///
/// rc 32 (noSuchObject) is logged at debug level only; base reads turn it
/// into `Ok(None)`.
fn check_result(result: LdapResult, entries: usize) -> Result<()> {
    match result.rc {
        0 => Ok(()),
        4 => {
            warn!(
                "ldap_search: Size limit exceeded (rc=4), returning {} partial entries",
                entries
            );
            Ok(())
        }
        32 => {
            debug!("ldap_search: No such object: {}", result.text);
            Err(LdapError::LdapResult { result }.into())
        }
        _ => {
            error!("ldap_search: Search failed with rc={}: {}", result.rc, result.text);
            Err(LdapError::LdapResult { result }.into())
        }
    }
}

/// Single-request search.
pub fn ldap_search(
    ldap: &mut LdapConn,
    base_dn: &str,
    scope: Scope,
    filter: &str,
    attrs: &[String],
    search_timeout: Duration,
) -> Result<Vec<SearchEntry>> {
    debug!("ldap_search: {} in {} ({:?})", filter, base_dn, scope);

    let attr_refs: Vec<&str> = attrs.iter().map(String::as_str).collect();
    let result = ldap
        .with_timeout(search_timeout)
        .search(base_dn, scope, filter, attr_refs)?;

    let (entries, ldap_result) = (result.0, result.1);
    check_result(ldap_result, entries.len())?;
    Ok(entries.into_iter().map(SearchEntry::construct).collect())
}

/// Paged search using the Simple Paged Results control.
///
/// Fetches every page so result sets beyond the server's size limit
/// (1000 entries by default in AD) are returned in full.
pub fn ldap_paged_search(
    ldap: &mut LdapConn,
    base_dn: &str,
    scope: Scope,
    filter: &str,
    attrs: &[String],
    page_size: i32,
    search_timeout: Duration,
) -> Result<Vec<SearchEntry>> {
    let attr_refs: Vec<&str> = attrs.iter().map(String::as_str).collect();
    let mut all_entries: Vec<SearchEntry> = Vec::new();
    let mut page_count = 0;
    let mut cookie: Vec<u8> = Vec::new();

    loop {
        page_count += 1;

        let paged_control = PagedResults {
            size: page_size,
            cookie: cookie.clone(),
        };

        let result = ldap
            .with_timeout(search_timeout)
            .with_controls(vec![paged_control.into()])
            .search(base_dn, scope, filter, attr_refs.clone())?;

        let (entries, ldap_result) = (result.0, result.1);
        let entries_in_page = entries.len();
        all_entries.extend(entries.into_iter().map(SearchEntry::construct));

        debug!(
            "ldap_paged_search: Page {} returned {} entries (total so far: {})",
            page_count,
            entries_in_page,
            all_entries.len()
        );

        // Control is a tuple struct where .1 is RawControl
        let mut has_more_pages = false;
        for ctrl in &ldap_result.ctrls {
            let raw_ctrl = &ctrl.1;
            if raw_ctrl.ctype == PAGED_RESULTS_OID {
                if let Some(ref val) = raw_ctrl.val {
                    let pr: PagedResults = PagedResults::parse(val);
                    cookie = pr.cookie;
                    has_more_pages = !cookie.is_empty();
                }
                break;
            }
        }

        check_result(ldap_result, all_entries.len())?;

        if !has_more_pages {
            break;
        }
    }

    info!(
        "ldap_paged_search: {} returned {} entries in {} pages",
        filter,
        all_entries.len(),
        page_count
    );
    Ok(all_entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rc: u32, text: &str) -> LdapResult {
        LdapResult {
            rc,
            matched: String::new(),
            text: text.to_string(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        }
    }

    #[test]
    fn test_check_result_accepts_success_and_partial() {
        assert!(check_result(result(0, ""), 3).is_ok());
        assert!(check_result(result(4, "Size limit exceeded"), 1000).is_ok());
    }

    #[test]
    fn test_check_result_no_such_object_is_not_found() {
        let err = check_result(result(32, "0000208D: NameErr"), 0).unwrap_err();
        assert!(matches!(err, AuditError::NotFound(_)));
    }

    #[test]
    fn test_check_result_other_codes_fail() {
        let err = check_result(result(50, "insufficient access"), 0).unwrap_err();
        assert!(matches!(err, AuditError::PermissionDenied(_)));
    }
}
