//! Column schema of a feature store and its reconciliation against an
//! incoming batch.
//!
//! Store formats such as GeoPackage treat column names case-insensitively,
//! so two names that differ only in case are one column. [`StoreSchema`]
//! keeps one canonical spelling per case-folded name and everything past
//! this module works with canonical names only.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{builtin_columns, Column, ColumnType, FieldValue, StoreTable};
use crate::error::{Error, Result};
use crate::gpkg::{FID_COLUMN, GEOMETRY_COLUMN};

/// Case-fold a column or metadata key name.
pub fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Ordered set of columns, unique by case-folded name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSchema {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl StoreSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column unless one with the same folded name exists.
    /// Returns the canonical name the column is known by.
    pub fn add(&mut self, column: Column) -> &str {
        let folded = fold(&column.name);
        let idx = match self.index.get(&folded) {
            Some(&idx) => idx,
            None => {
                self.columns.push(column);
                let idx = self.columns.len() - 1;
                self.index.insert(folded, idx);
                idx
            }
        };
        &self.columns[idx].name
    }

    /// Canonical spelling for `name`, matched case-insensitively.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.index
            .get(&fold(name))
            .map(|&idx| self.columns[idx].name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&fold(name))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Result of reconciling one group's batch against its store.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub schema: StoreSchema,
    /// Existing rows rewritten onto canonical column names.
    pub existing: Option<StoreTable>,
    /// Folded incoming metadata key → canonical column name.
    pub key_map: HashMap<String, String>,
}

impl Reconciled {
    pub fn column_for(&self, key: &str) -> Option<&str> {
        self.key_map.get(&fold(key)).map(String::as_str)
    }
}

/// Names metadata keys may never claim: the built-in photo columns, the
/// group-key column and the names the store format reserves for itself.
pub fn is_reserved(name: &str, group_column: &str) -> bool {
    let folded = fold(name);
    folded == fold(group_column)
        || folded == FID_COLUMN
        || folded == GEOMETRY_COLUMN
        || builtin_columns().iter().any(|c| c.name == folded)
}

/// Collapse case-variant columns of an existing table onto one spelling.
///
/// Variants of the group-key column become `group_column` exactly. Any other
/// collision keeps the spelling that comes first. When the canonical column
/// already exists the variant only fills its missing values, first
/// non-missing value winning.
pub fn unify_columns(mut table: StoreTable, group_column: &str) -> StoreTable {
    let group_folded = fold(group_column);
    let mut canonical_by_fold: HashMap<String, String> = HashMap::new();
    if table.columns.iter().any(|c| c.name == group_column) {
        canonical_by_fold.insert(group_folded.clone(), group_column.to_string());
    }

    let mut kept: Vec<Column> = Vec::with_capacity(table.columns.len());
    for column in std::mem::take(&mut table.columns) {
        let folded = fold(&column.name);
        match canonical_by_fold.get(&folded) {
            Some(canonical) if *canonical == column.name => {
                if !kept.iter().any(|c| c.name == column.name) {
                    kept.push(column);
                }
            }
            Some(canonical) => {
                debug!(from = %column.name, into = %canonical, "merging case-variant column");
                for row in &mut table.rows {
                    let variant = row.fields.remove(&column.name).unwrap_or(FieldValue::Null);
                    if row.get(canonical).is_null() && !variant.is_null() {
                        row.set(canonical.clone(), variant);
                    }
                }
            }
            None => {
                let canonical = if folded == group_folded {
                    group_column.to_string()
                } else {
                    column.name.clone()
                };
                if canonical != column.name {
                    debug!(from = %column.name, to = %canonical, "renaming case-variant column");
                    for row in &mut table.rows {
                        if let Some(value) = row.fields.remove(&column.name) {
                            row.set(canonical.clone(), value);
                        }
                    }
                }
                canonical_by_fold.insert(folded, canonical.clone());
                kept.push(Column::new(canonical, column.kind));
            }
        }
    }

    table.columns = kept;
    table
}

/// Decide the schema for a group's store.
///
/// `incoming_keys` are the batch's metadata keys, one per folded name, in
/// first-seen order. A store that already holds rows must already have a
/// column for every non-reserved key; otherwise the key becomes a new text
/// column.
pub fn reconcile(
    existing: Option<StoreTable>,
    incoming_keys: &[&str],
    group_column: &str,
    path: &Path,
) -> Result<Reconciled> {
    let existing = existing.map(|table| unify_columns(table, group_column));
    let has_rows = existing.as_ref().is_some_and(|t| !t.is_empty());

    let mut schema = StoreSchema::new();
    match &existing {
        Some(table) => {
            for column in &table.columns {
                schema.add(column.clone());
            }
            for column in builtin_columns() {
                schema.add(column);
            }
        }
        None => {
            for column in builtin_columns() {
                schema.add(column);
            }
        }
    }
    schema.add(Column::new(group_column, ColumnType::Text));

    let mut key_map = HashMap::new();
    for key in incoming_keys {
        if is_reserved(key, group_column) {
            if fold(key) != fold(group_column) {
                warn!(key, path = %path.display(), "metadata key shadows a built-in column, ignoring it");
            }
            continue;
        }
        let canonical = if has_rows {
            schema
                .resolve(key)
                .ok_or_else(|| Error::SchemaMismatch {
                    key: key.to_string(),
                    path: path.to_path_buf(),
                })?
                .to_string()
        } else {
            schema.add(Column::new(*key, ColumnType::Text)).to_string()
        };
        key_map.insert(fold(key), canonical);
    }

    Ok(Reconciled {
        schema,
        existing,
        key_map,
    })
}
