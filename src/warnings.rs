//! Audit warnings collector
//!
//! Recoverable conditions found during an audit run. They never abort the
//! run; they are surfaced afterwards as their own report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::projection::ProjectedRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WarningKind {
    /// A privileged group could not be located by name or expected SID
    GroupNotFound,
    /// A group was found by name but carried an unexpected SID
    UnexpectedIdentifier,
    /// A nested group already appears on the current membership path
    CircularReference,
    /// A member of an unexpected object class
    UnexpectedMemberType,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::GroupNotFound => "GroupNotFound",
            WarningKind::UnexpectedIdentifier => "UnexpectedIdentifier",
            WarningKind::CircularReference => "CircularReference",
            WarningKind::UnexpectedMemberType => "UnexpectedMemberType",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditWarning {
    pub kind: WarningKind,
    pub group: Option<String>,
    pub object: Option<String>,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            group: None,
            object: None,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }
}

/// Column order of the warnings report
pub const WARNING_COLUMNS: [&str; 6] = ["Row", "Kind", "Group", "Object", "Message", "RecordedAt"];

/// Append-only warnings collector.
///
/// Passed explicitly (`&mut`) to every component that may warn, so there is
/// only ever one writer.
#[derive(Debug, Default)]
pub struct Warnings {
    entries: Vec<AuditWarning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, warning: AuditWarning) {
        warn!(
            kind = warning.kind.as_str(),
            group = warning.group.as_deref().unwrap_or(""),
            object = warning.object.as_deref().unwrap_or(""),
            "{}",
            warning.message
        );
        self.entries.push(warning);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.entries.iter().filter(|w| w.kind == kind).count()
    }

    /// Rows for the warnings report, numbered from 1.
    pub fn rows(&self) -> Vec<ProjectedRow> {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, w)| {
                let optional = |v: &Option<String>| {
                    v.as_ref().map(|s| Value::String(s.clone())).unwrap_or(Value::Null)
                };
                ProjectedRow::from_columns(vec![
                    (WARNING_COLUMNS[0].to_string(), Value::from(idx as u64 + 1)),
                    (WARNING_COLUMNS[1].to_string(), Value::from(w.kind.as_str())),
                    (WARNING_COLUMNS[2].to_string(), optional(&w.group)),
                    (WARNING_COLUMNS[3].to_string(), optional(&w.object)),
                    (WARNING_COLUMNS[4].to_string(), Value::String(w.message.clone())),
                    (WARNING_COLUMNS[5].to_string(), Value::String(w.recorded_at.to_rfc3339())),
                ])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let mut warnings = Warnings::new();
        assert!(warnings.is_empty());

        warnings.record(
            AuditWarning::new(WarningKind::CircularReference, "circular reference")
                .group("CN=A,DC=corp")
                .object("CN=B,DC=corp"),
        );
        warnings.record(AuditWarning::new(WarningKind::GroupNotFound, "missing"));

        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings.count(WarningKind::CircularReference), 1);
        assert_eq!(warnings.count(WarningKind::UnexpectedMemberType), 0);
    }

    #[test]
    fn test_rows_have_stable_columns() {
        let mut warnings = Warnings::new();
        warnings.record(AuditWarning::new(WarningKind::GroupNotFound, "DnsAdmins not found"));

        let rows = warnings.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].column_names(), WARNING_COLUMNS.to_vec());
        assert_eq!(rows[0].get("Row"), Some(&Value::from(1u64)));
        assert_eq!(rows[0].get("Group"), Some(&Value::Null));
    }
}
