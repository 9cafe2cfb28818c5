use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::metadata::Metadata;

/// Identity column: unique within a store.
pub const FILENAME: &str = "filename";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const ALTITUDE: &str = "altitude";
/// Raw, unmodified description text.
pub const DESCRIPTION: &str = "image_description";
pub const CREATE_DATE: &str = "create_date";
pub const ORIENTATION: &str = "orientation";

/// Declared storage type of an attribute column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    DateTime,
    Blob,
    /// Any other declared type found in an existing store, kept verbatim.
    Other(String),
}

impl ColumnType {
    pub fn as_sql(&self) -> &str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Blob => "BLOB",
            ColumnType::Other(s) => s.as_str(),
        }
    }

    pub fn from_declared(declared: &str) -> Self {
        match declared.trim().to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "MEDIUMINT" | "SMALLINT" | "TINYINT" => ColumnType::Integer,
            "REAL" | "DOUBLE" | "FLOAT" => ColumnType::Real,
            "TEXT" => ColumnType::Text,
            "DATETIME" => ColumnType::DateTime,
            "BLOB" => ColumnType::Blob,
            _ => ColumnType::Other(declared.trim().to_string()),
        }
    }
}

/// A named attribute column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Columns every photo record carries, in write order. The group-key column
/// follows these.
pub fn builtin_columns() -> Vec<Column> {
    vec![
        Column::new(FILENAME, ColumnType::Text),
        Column::new(LATITUDE, ColumnType::Real),
        Column::new(LONGITUDE, ColumnType::Real),
        Column::new(ALTITUDE, ColumnType::Real),
        Column::new(DESCRIPTION, ColumnType::Text),
        Column::new(CREATE_DATE, ColumnType::DateTime),
        Column::new(ORIENTATION, ColumnType::Integer),
    ]
}

/// A single attribute value as stored in a feature store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Real)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(v: Option<String>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Text)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Real(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// WGS84 point. `z` is present when the photo carried an altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Point {
    pub fn new(lon: f64, lat: f64, alt: Option<f64>) -> Self {
        Self {
            x: lon,
            y: lat,
            z: alt,
        }
    }
}

/// One feature: a geometry plus attribute values keyed by column name.
/// A column absent from `fields` reads as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub geometry: Option<Point>,
    pub fields: BTreeMap<String, FieldValue>,
}

static NULL: FieldValue = FieldValue::Null;

impl Row {
    pub fn get(&self, column: &str) -> &FieldValue {
        self.fields.get(column).unwrap_or(&NULL)
    }

    pub fn set(&mut self, column: impl Into<String>, value: FieldValue) {
        self.fields.insert(column.into(), value);
    }

    /// The identity key of this row, if it has one.
    pub fn identity(&self) -> Option<&str> {
        self.get(FILENAME).as_text()
    }
}

/// Attribute table as read from (or written to) a store file.
/// Column names are kept exactly as found on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl StoreTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A geotagged photo accepted for import. Only lives for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub path: PathBuf,
    pub filename: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub description: Option<String>,
    pub metadata: Metadata,
    pub create_date: Option<String>,
    pub orientation: Option<u32>,
    pub group_value: String,
}

impl PhotoRecord {
    pub fn geometry(&self) -> Point {
        Point::new(self.longitude, self.latitude, self.altitude)
    }
}

/// Why a photo was left out of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The file has no EXIF block or no GPS latitude/longitude.
    NoGps,
    /// The description has no entry for the grouping key.
    MissingGroupKey,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoGps => f.write_str("no valid GPS EXIF found"),
            SkipReason::MissingGroupKey => f.write_str("grouping key not found in description"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPhoto {
    pub path: PathBuf,
    pub reason: SkipReason,
}
