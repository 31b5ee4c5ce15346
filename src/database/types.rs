//! SQL Server type mapping to Rust types.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use tiberius::Row;
use uuid::Uuid;

/// A single value read from a result set.
///
/// Serializes as a JSON string for every non-null value and as `null` for SQL
/// NULL, so dates, decimals, and numbers all reach clients in one textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// String form used in JSON output; `None` for NULL.
    pub fn to_json_string(&self) -> Option<String> {
        let s = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::U8(v) => v.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::String(v) => v.clone(),
            SqlValue::Bytes(v) => format!("0x{}", hex::encode(v)),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Date(v) => v.to_string(),
            SqlValue::Time(v) => v.to_string(),
            SqlValue::DateTime(v) => v.to_string(),
            SqlValue::DateTimeOffset(v) => v.to_rfc3339(),
        };
        Some(s)
    }

    /// Borrow the value as text when it is a non-empty string.
    pub fn as_non_empty_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_json_string() {
            Some(s) => serializer.serialize_str(&s),
            None => serializer.serialize_none(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Type mapper for converting SQL Server column data to [`SqlValue`].
pub struct TypeMapper;

impl TypeMapper {
    /// Extract a value from a tiberius row column.
    pub fn extract_column(row: &Row, idx: usize) -> SqlValue {
        if row.columns().get(idx).is_none() {
            return SqlValue::Null;
        }

        // Strings (most common)
        if let Some(v) = row.try_get::<&str, _>(idx).ok().flatten() {
            return SqlValue::String(v.to_string());
        }

        // Integers
        if let Some(v) = row.try_get::<i32, _>(idx).ok().flatten() {
            return SqlValue::I32(v);
        }
        if let Some(v) = row.try_get::<i64, _>(idx).ok().flatten() {
            return SqlValue::I64(v);
        }
        if let Some(v) = row.try_get::<i16, _>(idx).ok().flatten() {
            return SqlValue::I16(v);
        }
        // TINYINT is unsigned in SQL Server
        if let Some(v) = row.try_get::<u8, _>(idx).ok().flatten() {
            return SqlValue::U8(v);
        }

        // Floating point (MONEY arrives as f64 too)
        if let Some(v) = row.try_get::<f64, _>(idx).ok().flatten() {
            return SqlValue::F64(v);
        }
        if let Some(v) = row.try_get::<f32, _>(idx).ok().flatten() {
            return SqlValue::F32(v);
        }

        // DECIMAL / NUMERIC
        if let Some(v) = row.try_get::<Decimal, _>(idx).ok().flatten() {
            return SqlValue::Decimal(v);
        }

        if let Some(v) = row.try_get::<bool, _>(idx).ok().flatten() {
            return SqlValue::Bool(v);
        }

        if let Some(v) = row.try_get::<Uuid, _>(idx).ok().flatten() {
            return SqlValue::Uuid(v);
        }

        // Date/Time types
        if let Some(v) = row.try_get::<NaiveDateTime, _>(idx).ok().flatten() {
            return SqlValue::DateTime(v);
        }
        if let Some(v) = row.try_get::<NaiveDate, _>(idx).ok().flatten() {
            return SqlValue::Date(v);
        }
        if let Some(v) = row.try_get::<NaiveTime, _>(idx).ok().flatten() {
            return SqlValue::Time(v);
        }
        if let Some(v) = row.try_get::<DateTime<FixedOffset>, _>(idx).ok().flatten() {
            return SqlValue::DateTimeOffset(v);
        }

        if let Some(v) = row.try_get::<&[u8], _>(idx).ok().flatten() {
            return SqlValue::Bytes(v.to_vec());
        }

        // NULL of any type, or a type we do not map
        SqlValue::Null
    }
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_json_string_coercion() {
        assert_eq!(SqlValue::Null.to_json_string(), None);
        assert_eq!(SqlValue::I32(42).to_json_string().as_deref(), Some("42"));
        assert_eq!(SqlValue::F64(120.50).to_json_string().as_deref(), Some("120.5"));
        assert_eq!(SqlValue::Bool(true).to_json_string().as_deref(), Some("true"));
        assert_eq!(
            SqlValue::Bytes(vec![0xDE, 0xAD]).to_json_string().as_deref(),
            Some("0xDEAD")
        );
    }

    #[test]
    fn test_decimal_keeps_scale() {
        let v = SqlValue::Decimal(Decimal::from_str("120.50").unwrap());
        assert_eq!(v.to_json_string().as_deref(), Some("120.50"));
    }

    #[test]
    fn test_dates_render_iso() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            SqlValue::Date(date).to_json_string().as_deref(),
            Some("2024-01-01")
        );

        let dt = date.and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(
            SqlValue::DateTime(dt).to_json_string().as_deref(),
            Some("2024-01-01 13:05:00")
        );
    }

    #[test]
    fn test_serialize() {
        assert_eq!(serde_json::to_string(&SqlValue::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&SqlValue::I64(7)).unwrap(), "\"7\"");
        assert_eq!(
            serde_json::to_string(&SqlValue::from("Groceries")).unwrap(),
            "\"Groceries\""
        );
    }

    #[test]
    fn test_from_option() {
        assert!(SqlValue::from(None::<&str>).is_null());
        assert_eq!(SqlValue::from(Some(3i32)), SqlValue::I32(3));
    }

    #[test]
    fn test_as_non_empty_str() {
        assert_eq!(SqlValue::from("Rent").as_non_empty_str(), Some("Rent"));
        assert_eq!(SqlValue::from("").as_non_empty_str(), None);
        assert_eq!(SqlValue::Null.as_non_empty_str(), None);
        assert_eq!(SqlValue::I32(1).as_non_empty_str(), None);
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex::encode(&[0xDE, 0xAD, 0xBE, 0xEF]), "DEADBEEF");
        assert_eq!(hex::encode(&[]), "");
    }
}
