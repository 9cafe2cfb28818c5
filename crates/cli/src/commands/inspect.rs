use std::path::Path;

use anyhow::{bail, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photopoints_core::domain::{Point, StoreTable};
use photopoints_core::gpkg::{self, StoreRead};

pub(crate) fn format_point(point: Option<&Point>) -> String {
    match point {
        Some(Point { x, y, z: Some(z) }) => format!("POINT Z ({x} {y} {z})"),
        Some(Point { x, y, z: None }) => format!("POINT ({x} {y})"),
        None => "\u{2014}".to_string(),
    }
}

pub(crate) fn schema_table(store: &StoreTable) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Column"), Cell::new("Type")]);
    for column in &store.columns {
        table.add_row(vec![Cell::new(&column.name), Cell::new(column.kind.as_sql())]);
    }
    table
}

pub(crate) fn rows_table(store: &StoreTable) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("geom")];
    header.extend(store.columns.iter().map(|c| Cell::new(&c.name)));
    table.set_header(header);

    for row in &store.rows {
        let mut cells = vec![Cell::new(format_point(row.geometry.as_ref())).fg(Color::Cyan)];
        for column in &store.columns {
            let value = row.get(&column.name);
            if value.is_null() {
                cells.push(Cell::new("").fg(Color::DarkGrey));
            } else {
                cells.push(Cell::new(value));
            }
        }
        table.add_row(cells);
    }
    table
}

pub fn run(path: &Path) -> Result<()> {
    let store = match gpkg::read(path) {
        StoreRead::Loaded(store) => store,
        StoreRead::Absent => bail!("no store at {}", path.display()),
        StoreRead::Unreadable(e) => bail!("cannot read {}: {e}", path.display()),
    };

    println!();
    println!("  {} ({} rows)", path.display(), store.rows.len());
    println!();
    println!("{}", schema_table(&store));
    if !store.is_empty() {
        println!();
        println!("{}", rows_table(&store));
    }
    println!();
    Ok(())
}
