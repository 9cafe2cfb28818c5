use std::path::Path;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::{PhotoRecord, SkipReason};
use crate::error::{Error, Result};
use crate::exif::{Altitude, GpsCoordinate, PhotoExif};
use crate::metadata::{parse_description, Metadata};
use crate::schema::fold;

/// Convert degrees/minutes/seconds to signed decimal degrees. South and
/// west references are negative.
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, reference: char) -> f64 {
    let dd = degrees + minutes / 60.0 + seconds / 3600.0;
    match reference.to_ascii_uppercase() {
        'S' | 'W' => -dd,
        _ => dd,
    }
}

fn coordinate_to_decimal(c: &GpsCoordinate) -> f64 {
    dms_to_decimal(c.degrees, c.minutes, c.seconds, c.reference)
}

/// Collapse an altitude to metres. A zero denominator yields no altitude.
pub fn altitude_to_decimal(altitude: Altitude, below_sea_level: bool) -> Option<f64> {
    let metres = match altitude {
        Altitude::Decimal(v) => v,
        Altitude::Ratio { denom: 0, .. } => return None,
        Altitude::Ratio { num, denom } => f64::from(num) / f64::from(denom),
    };
    if !metres.is_finite() {
        return None;
    }
    Some(if below_sea_level { -metres } else { metres })
}

/// Normalize an EXIF `YYYY:MM:DD HH:MM:SS` timestamp to ISO-8601. Text that
/// does not parse is kept as written.
pub fn normalize_datetime(raw: &str) -> String {
    let trimmed = raw.trim();
    ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// What became of one photo.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Accepted(PhotoRecord),
    Skipped(SkipReason),
}

/// Turns EXIF data into [`PhotoRecord`]s, routing each by the configured
/// group key.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    group_key: String,
    group_column: String,
    allowed: Option<Vec<String>>,
}

impl RecordBuilder {
    pub fn new(group_key: &str, allowed: Option<Vec<String>>) -> Self {
        Self {
            group_key: group_key.to_string(),
            group_column: fold(group_key),
            allowed,
        }
    }

    /// Canonical column name for the group key.
    pub fn group_column(&self) -> &str {
        &self.group_column
    }

    /// Build a record for `path`. Missing GPS or a missing group key skip the
    /// photo; a group value outside the allow-list is an error.
    pub fn build(&self, path: &Path, exif: &PhotoExif) -> Result<BuildOutcome> {
        let Some((lat, lon)) = exif.position() else {
            return Ok(BuildOutcome::Skipped(SkipReason::NoGps));
        };

        let metadata = drop_blank_keys(parse_description(exif.description.as_deref()), path);
        let Some(group_value) = metadata.get_ignore_case(&self.group_key) else {
            return Ok(BuildOutcome::Skipped(SkipReason::MissingGroupKey));
        };
        let group_value = group_value.to_string();

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|v| *v == group_value) {
                return Err(Error::GroupNotAllowed {
                    value: group_value,
                    photo: path.to_path_buf(),
                    allowed: allowed.clone(),
                });
            }
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(BuildOutcome::Accepted(PhotoRecord {
            path: path.to_path_buf(),
            filename,
            latitude: coordinate_to_decimal(lat),
            longitude: coordinate_to_decimal(lon),
            altitude: exif
                .altitude
                .and_then(|a| altitude_to_decimal(a, exif.below_sea_level)),
            description: exif.description.clone(),
            metadata,
            create_date: exif.datetime_original.as_deref().map(normalize_datetime),
            orientation: exif.orientation,
            group_value,
        }))
    }
}

fn drop_blank_keys(metadata: Metadata, path: &Path) -> Metadata {
    if metadata.keys().all(|k| !k.is_empty()) {
        return metadata;
    }
    debug!(path = %path.display(), "dropping description entries with an empty key");
    let mut kept = Metadata::new();
    for (k, v) in metadata.iter().filter(|(k, _)| !k.is_empty()) {
        kept.insert(k, v);
    }
    kept
}
