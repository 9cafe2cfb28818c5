use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::domain::PhotoRecord;
use crate::error::{Error, Result};
use crate::schema::fold;

/// Partition records by exact group value. Groups iterate in sorted order
/// and keep their records in input order.
pub fn group_records(records: Vec<PhotoRecord>) -> BTreeMap<String, Vec<PhotoRecord>> {
    let mut groups: BTreeMap<String, Vec<PhotoRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.group_value.clone())
            .or_default()
            .push(record);
    }
    groups
}

/// Metadata keys present across a group's records, one per case-folded name,
/// in the spelling and order they were first seen.
pub fn metadata_keys(records: &[PhotoRecord]) -> Vec<&str> {
    let mut keys: Vec<&str> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for record in records {
        for key in record.metadata.keys() {
            let folded = fold(key);
            if !seen.contains(&folded) {
                seen.push(folded);
                keys.push(key);
            }
        }
    }
    keys
}

/// `<output_root>/<group>/<group>.<ext>`. The group value must be usable as a
/// single path component.
pub fn store_path(output_root: &Path, group_value: &str, extension: &str) -> Result<PathBuf> {
    let mut components = Path::new(group_value).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if group_value.trim().is_empty() || !single_normal || group_value.contains(['/', '\\']) {
        return Err(Error::InvalidGroupValue(group_value.to_string()));
    }
    Ok(output_root
        .join(group_value)
        .join(format!("{group_value}.{extension}")))
}
