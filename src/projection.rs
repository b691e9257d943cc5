//! Row projection
//!
//! Turns heterogeneous directory objects into flat, uniformly-shaped report
//! rows. Projection happens in two phases: the full record is built from
//! whatever the object carries, then it is viewed through the caller's column
//! list. The second phase never fails; a column the object lacks is `null`.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::directory::{AttributeValue, DirectoryObject};
use crate::schema_catalog::date_column;

/// Name of the 1-based sequence column present in every row
pub const ROW_COLUMN: &str = "Row";

/// 100-ns intervals between 1601-01-01 and 1970-01-01
const WINDOWS_EPOCH_DIFF: i64 = 116_444_736_000_000_000;

/// Decode a Windows FILETIME (100-ns intervals since 1601-01-01 UTC).
///
/// Zero, negative and `i64::MAX` ("never") decode to `None`.
pub fn filetime_to_datetime(filetime: i64) -> Option<DateTime<Utc>> {
    if filetime <= 0 || filetime == i64::MAX {
        return None;
    }

    let unix_100ns = filetime - WINDOWS_EPOCH_DIFF;
    let secs = unix_100ns.div_euclid(10_000_000);
    let nanos = (unix_100ns.rem_euclid(10_000_000) * 100) as u32;

    DateTime::from_timestamp(secs, nanos)
}

/// One flat report row with a fixed column order
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRow {
    columns: Vec<(String, Value)>,
}

impl ProjectedRow {
    pub fn from_columns(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl Serialize for ProjectedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn single_or_array(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

fn raw_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Text(values) => {
            single_or_array(values.iter().map(|v| Value::String(v.clone())).collect())
        }
        AttributeValue::Integer(v) => Value::from(*v),
        AttributeValue::Binary(values) => single_or_array(
            values
                .iter()
                .map(|bytes| Value::String(general_purpose::STANDARD.encode(bytes)))
                .collect(),
        ),
    }
}

fn date_value(value: &AttributeValue) -> Value {
    value
        .as_i64()
        .and_then(filetime_to_datetime)
        .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        .unwrap_or(Value::Null)
}

/// Project one object into a row.
///
/// `row_number` seeds the `Row` column, which always comes first whether or
/// not it is listed in `output_columns`.
pub fn project_row(
    row_number: usize,
    source: &DirectoryObject,
    output_columns: &[String],
    date_attributes: &[String],
) -> ProjectedRow {
    // Phase 1: full record in the object's attribute order
    let mut record: Vec<(String, Value)> = Vec::with_capacity(source.attributes.len() + 4);
    record.push((ROW_COLUMN.to_string(), Value::from(row_number as u64)));

    for (name, value) in &source.attributes {
        record.push((name.clone(), raw_value(value)));
        if date_attributes.iter().any(|d| d.eq_ignore_ascii_case(name)) {
            record.push((date_column(name), date_value(value)));
        }
    }

    // Phase 2: view through the requested columns
    let lookup = |column: &str| {
        record
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null)
    };

    let mut columns = Vec::with_capacity(output_columns.len() + 1);
    columns.push((ROW_COLUMN.to_string(), Value::from(row_number as u64)));
    for column in output_columns {
        if column == ROW_COLUMN {
            continue;
        }
        columns.push((column.clone(), lookup(column)));
    }

    ProjectedRow { columns }
}

/// Numbers rows of one report and projects them onto a fixed column set.
#[derive(Debug, Clone)]
pub struct RowProjector {
    output_columns: Vec<String>,
    date_attributes: Vec<String>,
    next_row: usize,
}

impl RowProjector {
    pub fn new(output_columns: Vec<String>, date_attributes: Vec<String>) -> Self {
        Self {
            output_columns,
            date_attributes,
            next_row: 1,
        }
    }

    pub fn project(&mut self, source: &DirectoryObject) -> ProjectedRow {
        let row = project_row(
            self.next_row,
            source,
            &self.output_columns,
            &self.date_attributes,
        );
        self.next_row += 1;
        row
    }

    pub fn rows_projected(&self) -> usize {
        self.next_row - 1
    }

    pub fn output_columns(&self) -> &[String] {
        &self.output_columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_filetime_decoding_exact() {
        let dt = filetime_to_datetime(132_539_328_000_000_000).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());

        let with_fraction = filetime_to_datetime(132_539_328_001_234_567).unwrap();
        assert_eq!(with_fraction.timestamp(), 1_609_459_200);
        assert_eq!(with_fraction.timestamp_subsec_nanos(), 123_456_700);
    }

    #[test]
    fn test_filetime_zero_and_never() {
        assert_eq!(filetime_to_datetime(0), None);
        assert_eq!(filetime_to_datetime(i64::MAX), None);
        assert_eq!(filetime_to_datetime(-1), None);
    }

    #[test]
    fn test_date_column_generated() {
        let obj = DirectoryObject::new("CN=alice", "user")
            .with_attr("pwdLastSet", AttributeValue::text("132539328000000000"))
            .with_attr("lastLogon", AttributeValue::text("0"));
        let dates = cols(&["pwdLastSet", "lastLogon", "accountExpires"]);
        let row = project_row(
            1,
            &obj,
            &cols(&["pwdLastSet", "pwdLastSetDate", "lastLogonDate", "accountExpiresDate"]),
            &dates,
        );

        assert_eq!(row.get("pwdLastSet"), Some(&Value::from("132539328000000000")));
        assert_eq!(row.get("pwdLastSetDate"), Some(&Value::from("2021-01-01T00:00:00Z")));
        assert_eq!(row.get("lastLogonDate"), Some(&Value::Null));
        assert_eq!(row.get("accountExpiresDate"), Some(&Value::Null));
    }

    #[test]
    fn test_binary_round_trip() {
        let guid: Vec<u8> = (0u8..16).collect();
        let obj = DirectoryObject::new("CN=alice", "user")
            .with_attr("objectGUID", AttributeValue::Binary(vec![guid.clone()]));
        let row = project_row(1, &obj, &cols(&["objectGUID"]), &[]);

        let encoded = row.get("objectGUID").and_then(Value::as_str).unwrap();
        let decoded = general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, guid);
    }

    #[test]
    fn test_missing_columns_are_null_and_ordered() {
        let user = DirectoryObject::new("CN=alice", "user")
            .with_attr("sAMAccountName", AttributeValue::text("alice"))
            .with_attr("mail", AttributeValue::text("alice@corp.local"));
        let computer = DirectoryObject::new("CN=WS01", "computer")
            .with_attr("dNSHostName", AttributeValue::text("ws01.corp.local"))
            .with_attr("sAMAccountName", AttributeValue::text("WS01$"));

        let columns = cols(&["sAMAccountName", "dNSHostName", "mail"]);
        let mut projector = RowProjector::new(columns, Vec::new());
        let rows = vec![projector.project(&user), projector.project(&computer)];

        for row in &rows {
            assert_eq!(row.column_names(), vec!["Row", "sAMAccountName", "dNSHostName", "mail"]);
        }
        assert_eq!(rows[0].get("dNSHostName"), Some(&Value::Null));
        assert_eq!(rows[1].get("mail"), Some(&Value::Null));
        assert_eq!(rows[1].get("Row"), Some(&Value::from(2u64)));
        assert_eq!(projector.rows_projected(), 2);
    }

    #[test]
    fn test_multi_valued_and_integer_values() {
        let obj = DirectoryObject::new("CN=svc", "user")
            .with_attr(
                "servicePrincipalName",
                AttributeValue::Text(vec!["HTTP/a".to_string(), "HTTP/b".to_string()]),
            )
            .with_attr("MemberDepth", AttributeValue::Integer(3));
        let row = project_row(7, &obj, &cols(&["servicePrincipalName", "MemberDepth"]), &[]);
        assert_eq!(
            row.get("servicePrincipalName"),
            Some(&serde_json::json!(["HTTP/a", "HTTP/b"]))
        );
        assert_eq!(row.get("MemberDepth"), Some(&Value::from(3)));
    }

    #[test]
    fn test_serializes_in_column_order() {
        let obj = DirectoryObject::new("CN=alice", "user")
            .with_attr("b", AttributeValue::text("2"))
            .with_attr("a", AttributeValue::text("1"));
        let row = project_row(1, &obj, &cols(&["b", "a"]), &[]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"Row":1,"b":"2","a":"1"}"#);
    }
}
