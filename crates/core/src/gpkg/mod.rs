//! GeoPackage feature stores.
//!
//! A store is read whole into a [`StoreTable`] and written back whole. Writes
//! go to a temporary file in the destination directory that is renamed over
//! the target once complete, so a store on disk is always either the old
//! version or the new one.

pub mod geometry;
pub mod schema;

use std::fs;
use std::path::Path;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::warn;

use crate::domain::{Column, ColumnType, FieldValue, Row, StoreTable};
use crate::error::{Error, Result};

/// EPSG code of the coordinate reference system every store is written in.
pub const SRS_ID: i32 = 4326;
pub const GEOMETRY_COLUMN: &str = "geom";
pub const FID_COLUMN: &str = "fid";

/// Result of looking for a store on disk.
#[derive(Debug)]
pub enum StoreRead {
    /// No file at the path.
    Absent,
    Loaded(StoreTable),
    /// A file exists but could not be read as a feature store.
    Unreadable(Error),
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            FieldValue::Null => ValueRef::Null,
            FieldValue::Integer(v) => ValueRef::Integer(*v),
            FieldValue::Real(v) => ValueRef::Real(*v),
            FieldValue::Text(s) => ValueRef::Text(s.as_bytes()),
            FieldValue::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

impl From<ValueRef<'_>> for FieldValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(v) => FieldValue::Integer(v),
            ValueRef::Real(v) => FieldValue::Real(v),
            ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => FieldValue::Blob(b.to_vec()),
        }
    }
}

/// Read the store at `path`.
pub fn read(path: &Path) -> StoreRead {
    if !path.exists() {
        return StoreRead::Absent;
    }
    match load(path) {
        Ok(table) => StoreRead::Loaded(table),
        Err(e) => StoreRead::Unreadable(e),
    }
}

/// Load a GeoPackage's feature layer. A layer named after the file stem is
/// preferred, otherwise the first by name.
pub fn load(path: &Path) -> Result<StoreTable> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let preferred = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut stmt = conn.prepare(
        "SELECT table_name FROM gpkg_contents WHERE data_type = 'features'
         ORDER BY table_name = ?1 DESC, table_name",
    )?;
    let layers = stmt
        .query_map([&preferred], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let Some(layer) = layers.first().cloned() else {
        return Err(Error::MissingFeatureTable(path.to_path_buf()));
    };
    if layers.len() > 1 {
        warn!(
            path = %path.display(),
            layer = %layer,
            ignored = layers.len() - 1,
            "store holds several feature layers, only one is used"
        );
    }

    let geom_column: Option<String> = conn
        .query_row(
            "SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?1",
            [&layer],
            |row| row.get(0),
        )
        .optional()?;

    let mut stmt = conn.prepare("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let table_info = stmt
        .query_map([&layer], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if table_info.is_empty() {
        return Err(Error::MissingFeatureTable(path.to_path_buf()));
    }

    let pk_column = table_info
        .iter()
        .find(|(_, _, pk)| *pk > 0)
        .map(|(name, _, _)| name.clone());
    let columns: Vec<Column> = table_info
        .iter()
        .filter(|(name, _, pk)| *pk == 0 && Some(name) != geom_column.as_ref())
        .map(|(name, declared, _)| Column::new(name.clone(), ColumnType::from_declared(declared)))
        .collect();

    let mut select: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    if let Some(geom) = &geom_column {
        select.push(quote_ident(geom));
    }
    if select.is_empty() {
        select.push("NULL".to_string());
    }
    let order_by = pk_column.as_deref().map_or("rowid".to_string(), quote_ident);
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {}",
        select.join(", "),
        quote_ident(&layer),
        order_by
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut query = stmt.query([])?;
    let mut rows = Vec::new();
    while let Some(record) = query.next()? {
        let mut row = Row::default();
        for (i, column) in columns.iter().enumerate() {
            row.set(column.name.clone(), FieldValue::from(record.get_ref(i)?));
        }
        if geom_column.is_some() {
            row.geometry = match record.get_ref(columns.len())? {
                ValueRef::Blob(blob) => geometry::decode(blob)?,
                _ => None,
            };
        }
        rows.push(row);
    }

    Ok(StoreTable { columns, rows })
}

fn extent(rows: &[Row]) -> Option<[f64; 4]> {
    rows.iter()
        .filter_map(|r| r.geometry)
        .fold(None, |acc, p| {
            Some(match acc {
                None => [p.x, p.y, p.x, p.y],
                Some([min_x, min_y, max_x, max_y]) => {
                    [min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y)]
                }
            })
        })
}

/// Write `table` as the single layer `layer` of a fresh GeoPackage at `path`,
/// replacing any existing file.
pub fn write(path: &Path, table: &StoreTable, layer: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let existing_permissions = fs::metadata(path).ok().map(|m| m.permissions());
    let mut builder = tempfile::Builder::new();
    builder.prefix(".store-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if existing_permissions.is_none() {
            builder.permissions(fs::Permissions::from_mode(0o644));
        }
    }
    let tmp = builder.tempfile_in(dir)?;

    {
        let mut conn = Connection::open(tmp.path())?;
        schema::initialize(&conn)?;
        let has_z = table.rows.iter().any(|r| r.geometry.is_some_and(|g| g.z.is_some()));
        schema::create_feature_table(&conn, layer, &table.columns, has_z)?;

        let tx = conn.transaction()?;
        {
            let mut names = vec![quote_ident(GEOMETRY_COLUMN)];
            names.extend(table.columns.iter().map(|c| quote_ident(&c.name)));
            let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(layer),
                names.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            for row in &table.rows {
                let geom = row
                    .geometry
                    .map_or(FieldValue::Null, |p| FieldValue::Blob(geometry::encode(&p, SRS_ID)));
                let values = std::iter::once(&geom).chain(table.columns.iter().map(|c| row.get(&c.name)));
                stmt.execute(params_from_iter(values))?;
            }
        }
        schema::update_extent(&tx, layer, extent(&table.rows))?;
        tx.commit()?;
        conn.close().map_err(|(_, e)| e)?;
    }

    if let Some(permissions) = existing_permissions {
        fs::set_permissions(tmp.path(), permissions)?;
    }
    tmp.persist(path)?;
    Ok(())
}
