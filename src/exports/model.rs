//! Export catalog types: descriptors, roles, backend kinds and query results

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Wall-clock format used for `updatedAt` in the metadata record
pub const UPDATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which database an export's query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// PostgreSQL
    #[serde(rename = "PG")]
    Primary,
    /// MySQL
    #[serde(rename = "MY")]
    Secondary,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Primary => "PG",
            BackendKind::Secondary => "MY",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PG" => Ok(BackendKind::Primary),
            "MY" => Ok(BackendKind::Secondary),
            other => Err(AppError::InvalidRequest(format!(
                "Unknown database '{}', expected PG or MY",
                other
            ))),
        }
    }
}

/// Caller roles known to the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    A,
    B,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::A => "A",
            Role::B => "B",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "A" => Ok(Role::A),
            "B" => Ok(Role::B),
            _ => Err(AppError::unauthorized("Unauthorized user")),
        }
    }
}

/// Metadata for one export in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDescriptor {
    #[serde(rename = "fileName")]
    pub name: String,
    pub role: Role,
    #[serde(rename = "updatedAt", default, with = "updated_at")]
    pub last_updated_at: Option<NaiveDateTime>,
}

impl ExportDescriptor {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            last_updated_at: None,
        }
    }
}

/// `updatedAt` is `YYYY-MM-DD HH:MM:SS`; `null`, `""` or a missing key mean never updated.
mod updated_at {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::UPDATED_AT_FORMAT;

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_str(&at.format(UPDATED_AT_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDateTime::parse_from_str(s, UPDATED_AT_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// One value in a result row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Text written to a delimited file; null becomes an empty field
    pub fn to_field(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::UInt(u) => u.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Rows and column names returned by a backend query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backend_kind_wire_names() {
        assert_eq!(serde_json::to_string(&BackendKind::Primary).unwrap(), "\"PG\"");
        assert_eq!(
            serde_json::from_str::<BackendKind>("\"MY\"").unwrap(),
            BackendKind::Secondary
        );
        assert!("ORACLE".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("A".parse::<Role>().unwrap(), Role::A);
        assert!(matches!("a".parse::<Role>(), Err(AppError::Unauthorized(_))));
        assert!(matches!("root".parse::<Role>(), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_descriptor_updated_at_variants() {
        let raw = r#"[
            {"fileName": "sales_q1", "role": "A", "updatedAt": "2024-03-01 09:15:00"},
            {"fileName": "stock", "role": "B", "updatedAt": ""},
            {"fileName": "churn", "role": "A", "updatedAt": null},
            {"fileName": "leads", "role": "B"}
        ]"#;
        let parsed: Vec<ExportDescriptor> = serde_json::from_str(raw).unwrap();

        let expected = NaiveDateTime::parse_from_str("2024-03-01 09:15:00", UPDATED_AT_FORMAT).unwrap();
        assert_eq!(parsed[0].last_updated_at, Some(expected));
        assert!(parsed[1..].iter().all(|d| d.last_updated_at.is_none()));
    }

    #[test]
    fn test_descriptor_serializes_record_shape() {
        let mut descriptor = ExportDescriptor::new("sales_q1", Role::A);
        descriptor.last_updated_at =
            Some(NaiveDateTime::parse_from_str("2024-03-01 09:15:00", UPDATED_AT_FORMAT).unwrap());

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"fileName": "sales_q1", "role": "A", "updatedAt": "2024-03-01 09:15:00"})
        );
    }

    #[test]
    fn test_cell_fields() {
        assert_eq!(CellValue::Null.to_field(), "");
        assert_eq!(CellValue::from(Some(42i64)).to_field(), "42");
        assert_eq!(CellValue::from(None::<i64>), CellValue::Null);
        assert_eq!(CellValue::UInt(7).to_field(), "7");
    }
}
