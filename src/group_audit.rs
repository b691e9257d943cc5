//! Privileged Group Membership Audit
//!
//! Locates each requested privileged group, flattens its membership through
//! the resolver and emits one row per resolved member.
//!
//! # Reports
//!
//! | Report | Content |
//! |--------|---------|
//! | `PrivilegedGroupMembers` | one row per (member, membership path) |
//! | `Warnings` | missing groups, SID mismatches, cycles, odd member types |
//!
//! # Group lookup
//!
//! Groups are looked up by display name first. A hit whose SID differs from
//! the expected well-known SID is not trusted: a warning is recorded and the
//! expected SID is tried once. Renamed groups are found the same way.
//! A group that cannot be located is skipped, never fatal.
//!
//! # Row counts
//!
//! A member nested under several groups appears once per path. Row counts
//! are therefore not distinct-account counts; de-duplicate downstream before
//! alerting on them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::directory::{AttributeValue, DirectoryGateway, DirectoryObject, GroupIdentity};
use crate::errors::{AuditError, Result};
use crate::ldap_utils::sids_equal;
use crate::membership::{resolve_members, ResolvedMember};
use crate::privileged_groups::PrivilegedGroupRequest;
use crate::projection::{ProjectedRow, RowProjector, ROW_COLUMN};
use crate::report_sink::ReportSink;
use crate::schema_catalog::{ObjectClass, SchemaCatalog};
use crate::warnings::{AuditWarning, WarningKind, Warnings};

pub const MEMBERS_REPORT: &str = "PrivilegedGroupMembers";
pub const WARNINGS_REPORT: &str = "Warnings";

pub const GROUP_NAME_COLUMN: &str = "GroupName";
pub const GROUP_SID_COLUMN: &str = "GroupSid";
pub const MEMBER_PATH_COLUMN: &str = "MemberPath";
pub const MEMBER_DEPTH_COLUMN: &str = "MemberDepth";

/// Per-group resolution statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResolutionSummary {
    pub group_name: String,
    pub distinguished_name: String,
    pub sid: Option<String>,
    pub rows: usize,
    pub nested_groups: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub groups_requested: usize,
    pub groups_resolved: usize,
    pub groups_skipped: Vec<String>,
    pub total_rows: usize,
    pub warnings: usize,
    pub groups: Vec<GroupResolutionSummary>,
    pub scan_timestamp: String,
}

impl ReportSummary {
    fn new(groups_requested: usize) -> Self {
        Self {
            groups_requested,
            groups_resolved: 0,
            groups_skipped: Vec::new(),
            total_rows: 0,
            warnings: 0,
            groups: Vec::new(),
            scan_timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Column set of the privileged members report.
pub fn member_report_columns(catalog: &SchemaCatalog) -> Vec<String> {
    let mut columns = vec![
        ROW_COLUMN.to_string(),
        GROUP_NAME_COLUMN.to_string(),
        GROUP_SID_COLUMN.to_string(),
    ];
    columns.extend(catalog.all_output().iter().cloned());
    columns.push(MEMBER_PATH_COLUMN.to_string());
    columns.push(MEMBER_DEPTH_COLUMN.to_string());
    columns
}

/// Locate a privileged group by name, falling back to its expected SID.
///
/// `Ok(None)` means the group is skipped; the reason is in `warnings`.
pub fn locate_group<G: DirectoryGateway + ?Sized>(
    gateway: &mut G,
    catalog: &SchemaCatalog,
    warnings: &mut Warnings,
    request: &PrivilegedGroupRequest,
) -> Result<Option<DirectoryObject>> {
    let attrs = catalog.group_lookup_attrs();
    let name = &request.display_name;

    match lookup(gateway, &GroupIdentity::Name(name.clone()), attrs)? {
        Some(group) => match &request.expected_sid {
            None => return Ok(Some(group)),
            Some(expected) => {
                let actual = group.sid();
                if actual.as_deref().is_some_and(|sid| sids_equal(sid, expected)) {
                    return Ok(Some(group));
                }
                warnings.record(
                    AuditWarning::new(
                        WarningKind::UnexpectedIdentifier,
                        format!(
                            "Group '{}' has SID {} but {} was expected",
                            name,
                            actual.as_deref().unwrap_or("(none)"),
                            expected
                        ),
                    )
                    .group(name.clone())
                    .object(group.distinguished_name.clone()),
                );
            }
        },
        None => {
            info!("locate_group: '{}' not found by name", name);
        }
    }

    if let Some(expected) = &request.expected_sid {
        if let Some(group) = lookup(gateway, &GroupIdentity::Sid(expected.clone()), attrs)? {
            info!(
                "locate_group: '{}' located by SID {} as {}",
                name, expected, group.distinguished_name
            );
            return Ok(Some(group));
        }
    }

    warnings.record(
        AuditWarning::new(
            WarningKind::GroupNotFound,
            match &request.expected_sid {
                Some(sid) => format!("Group '{}' not found by name or SID {}", name, sid),
                None => format!("Group '{}' not found", name),
            },
        )
        .group(name.clone()),
    );
    Ok(None)
}

fn lookup<G: DirectoryGateway + ?Sized>(
    gateway: &mut G,
    identity: &GroupIdentity,
    attrs: &[String],
) -> Result<Option<DirectoryObject>> {
    match gateway.get_group(identity, attrs) {
        Ok(found) => Ok(found),
        Err(AuditError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// The member object with the report-level columns attached.
fn report_object(group_name: &str, group_sid: Option<&str>, member: ResolvedMember) -> DirectoryObject {
    let ResolvedMember { mut object, path } = member;
    object.set(GROUP_NAME_COLUMN, AttributeValue::text(group_name));
    if let Some(sid) = group_sid {
        object.set(GROUP_SID_COLUMN, AttributeValue::text(sid));
    }
    object.set(MEMBER_PATH_COLUMN, AttributeValue::text(path.display()));
    object.set(MEMBER_DEPTH_COLUMN, AttributeValue::Integer(path.depth() as i64));
    object
}

fn collect_member_rows<G: DirectoryGateway + ?Sized>(
    gateway: &mut G,
    catalog: &SchemaCatalog,
    requests: &[PrivilegedGroupRequest],
    warnings: &mut Warnings,
    projector: &mut RowProjector,
    rows: &mut Vec<ProjectedRow>,
    summary: &mut ReportSummary,
) -> Result<()> {
    for (idx, request) in requests.iter().enumerate() {
        info!(
            "privileged_members: [{}/{}] Resolving group: {}",
            idx + 1,
            requests.len(),
            request.display_name
        );

        let Some(group) = locate_group(gateway, catalog, warnings, request)? else {
            summary.groups_skipped.push(request.display_name.clone());
            continue;
        };

        let group_name = group.display_name().to_string();
        let group_sid = group.sid();
        let mut group_summary = GroupResolutionSummary {
            group_name: group_name.clone(),
            distinguished_name: group.distinguished_name.clone(),
            sid: group_sid.clone(),
            rows: 0,
            nested_groups: 0,
            max_depth: 0,
        };

        for member in resolve_members(gateway, catalog, warnings, &group.distinguished_name, None) {
            let member = member?;
            if member.object.object_class() == ObjectClass::Group {
                group_summary.nested_groups += 1;
            }
            group_summary.max_depth = group_summary.max_depth.max(member.path.depth());

            let object = report_object(&group_name, group_sid.as_deref(), member);
            rows.push(projector.project(&object));
            group_summary.rows += 1;
        }

        info!(
            "privileged_members: Group {} resolved to {} rows ({} nested groups, max depth {})",
            group_name, group_summary.rows, group_summary.nested_groups, group_summary.max_depth
        );
        summary.groups_resolved += 1;
        summary.groups.push(group_summary);
    }
    Ok(())
}

/// Resolve every requested group and emit the members and warnings reports.
///
/// On a fatal directory error the rows produced so far are still emitted,
/// titled as partial, before the error is returned.
pub fn run_privileged_members_report<G: DirectoryGateway + ?Sized>(
    gateway: &mut G,
    catalog: &SchemaCatalog,
    requests: &[PrivilegedGroupRequest],
    warnings: &mut Warnings,
    sink: &mut dyn ReportSink,
) -> Result<ReportSummary> {
    info!(
        target: "audit",
        "SECURITY AUDIT: Starting privileged group membership report ({} groups)",
        requests.len()
    );

    let mut projector = RowProjector::new(member_report_columns(catalog), catalog.date_attributes());
    let mut rows = Vec::new();
    let mut summary = ReportSummary::new(requests.len());

    let outcome = collect_member_rows(
        gateway,
        catalog,
        requests,
        warnings,
        &mut projector,
        &mut rows,
        &mut summary,
    );

    summary.total_rows = rows.len();
    let title = match &outcome {
        Ok(()) => "Privileged group members",
        Err(e) => {
            error!("privileged_members: Aborting after {} rows: {}", rows.len(), e);
            "Privileged group members (partial)"
        }
    };
    sink.emit(MEMBERS_REPORT, title, &mut rows.into_iter())?;
    sink.emit(WARNINGS_REPORT, "Audit warnings", &mut warnings.rows().into_iter())?;
    summary.warnings = warnings.len();

    outcome?;

    info!(
        "privileged_members: Complete - {}/{} groups resolved, {} rows, {} warnings",
        summary.groups_resolved, summary.groups_requested, summary.total_rows, summary.warnings
    );
    Ok(summary)
}
