//! Upsert/prune merge of a group's batch into its store rows.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::domain::{
    FieldValue, PhotoRecord, Row, StoreTable, ALTITUDE, CREATE_DATE, DESCRIPTION, FILENAME,
    LATITUDE, LONGITUDE, ORIENTATION,
};
use crate::schema::{Reconciled, StoreSchema};

/// Final row set for a group plus what happened to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub table: StoreTable,
    pub inserted: usize,
    pub updated: usize,
    pub pruned: usize,
}

/// Turn a record into a store row, placing each metadata value in the column
/// reconciliation resolved it to.
pub fn record_to_row(record: &PhotoRecord, group_column: &str, reconciled: &Reconciled) -> Row {
    let mut row = Row {
        geometry: Some(record.geometry()),
        fields: BTreeMap::new(),
    };
    row.set(FILENAME, FieldValue::Text(record.filename.clone()));
    row.set(LATITUDE, FieldValue::Real(record.latitude));
    row.set(LONGITUDE, FieldValue::Real(record.longitude));
    row.set(ALTITUDE, FieldValue::from(record.altitude));
    row.set(DESCRIPTION, FieldValue::from(record.description.clone()));
    row.set(CREATE_DATE, FieldValue::from(record.create_date.clone()));
    row.set(
        ORIENTATION,
        record
            .orientation
            .map_or(FieldValue::Null, |o| FieldValue::Integer(i64::from(o))),
    );
    row.set(group_column, FieldValue::Text(record.group_value.clone()));

    for (key, value) in record.metadata.unique_ignore_case() {
        if let Some(column) = reconciled.column_for(key) {
            row.set(column, FieldValue::Text(value.to_string()));
        }
    }
    row
}

pub fn resolve_batch(records: &[PhotoRecord], group_column: &str, reconciled: &Reconciled) -> Vec<Row> {
    records
        .iter()
        .map(|r| record_to_row(r, group_column, reconciled))
        .collect()
}

/// Collapse rows sharing an identity. The last row wins and takes the
/// position of the first.
fn dedupe_by_identity(batch: Vec<Row>) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::with_capacity(batch.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for row in batch {
        match row.identity().map(str::to_string) {
            Some(id) => match seen.entry(id) {
                Entry::Occupied(e) => out[*e.get()] = row,
                Entry::Vacant(e) => {
                    e.insert(out.len());
                    out.push(row);
                }
            },
            None => out.push(row),
        }
    }
    out
}

/// Give every row an explicit value for every schema column.
fn pad(row: &mut Row, schema: &StoreSchema) {
    for name in schema.names() {
        row.fields
            .entry(name.to_string())
            .or_insert(FieldValue::Null);
    }
}

/// Upsert `batch` into `existing` by filename.
///
/// A matched row is fully replaced by the incoming one, columns the batch
/// lacks included. Unmatched rows are appended. With `prune` set, existing
/// rows whose filename is not in the batch are dropped.
pub fn merge(
    schema: &StoreSchema,
    existing: Option<StoreTable>,
    batch: Vec<Row>,
    prune: bool,
) -> MergeOutcome {
    let columns = schema.columns().to_vec();
    let mut batch = dedupe_by_identity(batch);

    let Some(existing) = existing else {
        for row in &mut batch {
            pad(row, schema);
        }
        let inserted = batch.len();
        return MergeOutcome {
            table: StoreTable {
                columns,
                rows: batch,
            },
            inserted,
            updated: 0,
            pruned: 0,
        };
    };

    let batch_ids: HashSet<String> = batch
        .iter()
        .filter_map(|r| r.identity().map(str::to_string))
        .collect();

    let mut rows = existing.rows;
    let mut position: HashMap<String, usize> = HashMap::new();
    // Later copies of an identity the batch replaces would break uniqueness.
    let mut superseded = vec![false; rows.len()];
    for (idx, row) in rows.iter().enumerate() {
        if let Some(id) = row.identity() {
            match position.entry(id.to_string()) {
                Entry::Occupied(_) => superseded[idx] = batch_ids.contains(id),
                Entry::Vacant(e) => {
                    e.insert(idx);
                }
            }
        }
    }

    let mut inserted = 0;
    let mut updated = 0;
    for incoming in batch {
        let slot = incoming.identity().and_then(|id| position.get(id).copied());
        match slot {
            Some(idx) => {
                rows[idx] = incoming;
                updated += 1;
            }
            None => {
                rows.push(incoming);
                inserted += 1;
            }
        }
    }

    let mut pruned = 0;
    let mut idx = 0;
    rows.retain(|row| {
        let dup = superseded.get(idx).copied().unwrap_or(false);
        idx += 1;
        if dup {
            return false;
        }
        let keep = !prune || row.identity().is_some_and(|id| batch_ids.contains(id));
        if !keep {
            pruned += 1;
        }
        keep
    });

    for row in &mut rows {
        pad(row, schema);
    }

    MergeOutcome {
        table: StoreTable { columns, rows },
        inserted,
        updated,
        pruned,
    }
}
