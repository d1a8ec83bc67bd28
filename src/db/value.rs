use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Serialize, Serializer};

/// A value as returned by the backing store.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Unknown(String),
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int16(i) => i.to_string(),
            CellValue::Int32(i) => i.to_string(),
            CellValue::Int64(i) => i.to_string(),
            CellValue::Float32(f) => f.to_string(),
            CellValue::Float64(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Date(d) => d.to_string(),
            CellValue::Time(t) => t.to_string(),
            CellValue::DateTime(dt) => dt.to_string(),
            CellValue::TimestampTz(dt) => dt.to_string(),
            CellValue::Json(j) => j.to_string(),
            CellValue::Unknown(s) => s.clone(),
        }
    }

    pub fn display_width(&self) -> usize {
        unicode_width::UnicodeWidthStr::width(self.display().as_str())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Integer view of the cell, if it holds an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int16(i) => Some(i64::from(*i)),
            CellValue::Int32(i) => Some(i64::from(*i)),
            CellValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the cell, if it holds any number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float32(f) => Some(f64::from(*f)),
            CellValue::Float64(f) => Some(*f),
            other => other.as_i64().map(|i| i as f64),
        }
    }

    /// Calendar date of the cell, if it holds a date or timestamp.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::DateTime(dt) => Some(dt.date()),
            CellValue::TimestampTz(dt) => Some(dt.date_naive()),
            _ => None,
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Int16(i) => serializer.serialize_i16(*i),
            CellValue::Int32(i) => serializer.serialize_i32(*i),
            CellValue::Int64(i) => serializer.serialize_i64(*i),
            CellValue::Float32(f) => serializer.serialize_f32(*f),
            CellValue::Float64(f) => serializer.serialize_f64(*f),
            CellValue::Json(j) => j.serialize(serializer),
            other => serializer.serialize_str(&other.display()),
        }
    }
}

/// One row from the backing store: column name → value, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    columns: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: CellValue) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.columns.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_display() {
        assert_eq!(CellValue::Null.display(), "NULL");
    }

    #[test]
    fn test_number_display() {
        assert_eq!(CellValue::Int16(42).display(), "42");
        assert_eq!(CellValue::Int32(-100).display(), "-100");
        assert_eq!(CellValue::Float64(2.5).display(), "2.5");
    }

    #[test]
    fn test_display_width() {
        assert_eq!(CellValue::Null.display_width(), 4);
        assert_eq!(CellValue::Text("héllo".into()).display_width(), 5);
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(CellValue::Int32(7).as_i64(), Some(7));
        assert_eq!(CellValue::Int16(7).as_f64(), Some(7.0));
        assert_eq!(CellValue::Text("7".into()).as_f64(), None);
        let day = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        let dt = day.and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(CellValue::DateTime(dt).as_date(), Some(day));
    }

    #[test]
    fn test_serialize_cells() {
        let row = vec![
            CellValue::Null,
            CellValue::Int64(3),
            CellValue::Text("x".into()),
            CellValue::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()),
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[null,3,"x","2020-01-02"]"#);
    }

    #[test]
    fn test_raw_row_lookup() {
        let row = RawRow::new()
            .with("city", CellValue::Text("Springfield".into()))
            .with("age", CellValue::Int32(40));
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("age"), Some(&CellValue::Int32(40)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.iter().next().unwrap().0, "city");
    }
}
