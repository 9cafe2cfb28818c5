use rusqlite::{params, Connection};

use crate::domain::Column;
use crate::error::Result;

use super::{quote_ident, FID_COLUMN, GEOMETRY_COLUMN, SRS_ID};

/// `GPKG` in ASCII.
const APPLICATION_ID: i32 = 0x4750_4B47;
/// GeoPackage 1.3.
const USER_VERSION: i32 = 10300;

const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AXIS[\"Latitude\",NORTH],AXIS[\"Longitude\",EAST],AUTHORITY[\"EPSG\",\"4326\"]]";

/// Create the GeoPackage metadata tables and seed the spatial reference
/// systems.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", USER_VERSION)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
            srs_name                 TEXT NOT NULL,
            srs_id                   INTEGER PRIMARY KEY,
            organization             TEXT NOT NULL,
            organization_coordsys_id INTEGER NOT NULL,
            definition               TEXT NOT NULL,
            description              TEXT
        );

        CREATE TABLE IF NOT EXISTS gpkg_contents (
            table_name  TEXT NOT NULL PRIMARY KEY,
            data_type   TEXT NOT NULL,
            identifier  TEXT UNIQUE,
            description TEXT DEFAULT '',
            last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            min_x       DOUBLE,
            min_y       DOUBLE,
            max_x       DOUBLE,
            max_y       DOUBLE,
            srs_id      INTEGER,
            CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
        );

        CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
            table_name         TEXT NOT NULL,
            column_name        TEXT NOT NULL,
            geometry_type_name TEXT NOT NULL,
            srs_id             INTEGER NOT NULL,
            z                  TINYINT NOT NULL,
            m                  TINYINT NOT NULL,
            CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
            CONSTRAINT uk_gc_table_name UNIQUE (table_name),
            CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
            CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
        );
        ",
    )?;

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
            (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    stmt.execute(params![
        "Undefined cartesian SRS", -1, "NONE", -1, "undefined",
        "undefined cartesian coordinate reference system"
    ])?;
    stmt.execute(params![
        "Undefined geographic SRS", 0, "NONE", 0, "undefined",
        "undefined geographic coordinate reference system"
    ])?;
    stmt.execute(params![
        "WGS 84 geodetic", SRS_ID, "EPSG", SRS_ID, WGS84_WKT,
        "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid"
    ])?;
    Ok(())
}

/// Create a point feature table and register it.
///
/// `has_z` marks the layer as carrying optional elevation.
pub fn create_feature_table(conn: &Connection, layer: &str, columns: &[Column], has_z: bool) -> Result<()> {
    let mut ddl = format!(
        "CREATE TABLE {} (\n    {} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,\n    {} POINT",
        quote_ident(layer),
        quote_ident(FID_COLUMN),
        quote_ident(GEOMETRY_COLUMN),
    );
    for column in columns {
        ddl.push_str(&format!(",\n    {} {}", quote_ident(&column.name), column.kind.as_sql()));
    }
    ddl.push_str("\n)");
    conn.execute_batch(&ddl)?;

    conn.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id)
         VALUES (?1, 'features', ?1, ?2)",
        params![layer, SRS_ID],
    )?;
    conn.execute(
        "INSERT INTO gpkg_geometry_columns (table_name, column_name, geometry_type_name, srs_id, z, m)
         VALUES (?1, ?2, 'POINT', ?3, ?4, 0)",
        params![layer, GEOMETRY_COLUMN, SRS_ID, if has_z { 2 } else { 0 }],
    )?;
    Ok(())
}

/// Record the layer's bounding box in `gpkg_contents`.
pub fn update_extent(conn: &Connection, layer: &str, extent: Option<[f64; 4]>) -> Result<()> {
    let [min_x, min_y, max_x, max_y] = match extent {
        Some(e) => e.map(Some),
        None => [None; 4],
    };
    conn.execute(
        "UPDATE gpkg_contents
         SET min_x = ?1, min_y = ?2, max_x = ?3, max_y = ?4,
             last_change = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE table_name = ?5",
        params![min_x, min_y, max_x, max_y, layer],
    )?;
    Ok(())
}
