pub mod config;
pub mod domain;
pub mod error;
pub mod exif;
pub mod gpkg;
pub mod grouping;
pub mod merge;
pub mod metadata;
pub mod record;
pub mod report;
pub mod scanner;
pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use config::ImportConfig;
use domain::{PhotoRecord, SkipReason, SkippedPhoto};
use error::{Error, Result};
use gpkg::StoreRead;
use record::{BuildOutcome, RecordBuilder};
use report::{GroupOutcome, GroupReport, RunReport};

/// Callback for reporting import progress.
pub enum ImportProgress {
    /// Photos found in the input directory.
    ScanComplete { file_count: usize },
    /// A photo's EXIF has been read.
    PhotoRead { path: PathBuf },
    /// A photo was left out of the run.
    PhotoSkipped { path: PathBuf, reason: SkipReason },
    /// Starting work on a group's store.
    GroupStart { group: String, records: usize },
    /// A group's store was written.
    GroupWritten { group: String, path: PathBuf, rows: usize },
    /// A group's store was left untouched because of an error.
    GroupFailed { group: String, error: String },
}

/// Summary of one group's write.
struct GroupWrite {
    path: PathBuf,
    rows: usize,
    inserted: usize,
    updated: usize,
    pruned: usize,
}

/// Imports a directory of geotagged photos into per-group feature stores.
pub struct Importer {
    config: ImportConfig,
    builder: RecordBuilder,
}

impl Importer {
    pub fn new(config: ImportConfig) -> Result<Self> {
        config.validate()?;
        let builder = RecordBuilder::new(&config.group_key, config.allowed_groups.clone());
        Ok(Self { config, builder })
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Run the import.
    ///
    /// An allow-list violation aborts the run before any store is touched.
    /// Any other failure is confined to its group and recorded in the report.
    pub fn run(&self, mut progress_cb: Option<&mut dyn FnMut(ImportProgress)>) -> Result<RunReport> {
        let input = &self.config.input;
        if !input.exists() {
            return Err(Error::InputNotFound(input.clone()));
        }
        if !input.is_dir() {
            return Err(Error::InputNotDirectory(input.clone()));
        }

        let files = scanner::scan_directory(input)?;
        if let Some(ref mut cb) = progress_cb {
            cb(ImportProgress::ScanComplete {
                file_count: files.len(),
            });
        }

        let mut report = RunReport {
            photos_seen: files.len(),
            ..Default::default()
        };
        if files.is_empty() {
            info!(input = %input.display(), "no JPG files found");
            return Ok(report);
        }

        let mut records: Vec<PhotoRecord> = Vec::new();
        for path in &files {
            let outcome = match crate::exif::read_exif(path) {
                Ok(exif) => self.builder.build(path, &exif)?,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "could not read EXIF");
                    BuildOutcome::Skipped(SkipReason::NoGps)
                }
            };
            if let Some(ref mut cb) = progress_cb {
                cb(ImportProgress::PhotoRead { path: path.clone() });
            }

            match outcome {
                BuildOutcome::Accepted(record) => records.push(record),
                BuildOutcome::Skipped(reason) => {
                    match reason {
                        SkipReason::NoGps => {
                            warn!(path = %path.display(), "skipping photo: no valid GPS EXIF found")
                        }
                        SkipReason::MissingGroupKey => warn!(
                            path = %path.display(),
                            key = %self.config.group_key,
                            "skipping photo: grouping key (any case) not found in description"
                        ),
                    }
                    if let Some(ref mut cb) = progress_cb {
                        cb(ImportProgress::PhotoSkipped {
                            path: path.clone(),
                            reason: reason.clone(),
                        });
                    }
                    report.skipped.push(SkippedPhoto {
                        path: path.clone(),
                        reason,
                    });
                }
            }
        }

        report.records_built = records.len();
        if records.is_empty() {
            info!(key = %self.config.group_key, "no valid geotagged photos found with grouping metadata");
            return Ok(report);
        }

        for (group, group_records) in grouping::group_records(records) {
            if let Some(ref mut cb) = progress_cb {
                cb(ImportProgress::GroupStart {
                    group: group.clone(),
                    records: group_records.len(),
                });
            }

            let outcome = match self.import_group(&group, &group_records) {
                Ok(written) => {
                    info!(
                        rows = written.rows,
                        path = %written.path.display(),
                        "saved {} records",
                        written.rows
                    );
                    if let Some(ref mut cb) = progress_cb {
                        cb(ImportProgress::GroupWritten {
                            group: group.clone(),
                            path: written.path.clone(),
                            rows: written.rows,
                        });
                    }
                    GroupOutcome::Written {
                        path: written.path,
                        rows: written.rows,
                        inserted: written.inserted,
                        updated: written.updated,
                        pruned: written.pruned,
                    }
                }
                Err(e) => {
                    warn!(group = %group, error = %e, "group not written");
                    if let Some(ref mut cb) = progress_cb {
                        cb(ImportProgress::GroupFailed {
                            group: group.clone(),
                            error: e.to_string(),
                        });
                    }
                    GroupOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            report.groups.push(GroupReport {
                group,
                records: group_records.len(),
                outcome,
            });
        }

        Ok(report)
    }

    /// Reconcile, merge and write one group's store.
    fn import_group(&self, group: &str, records: &[PhotoRecord]) -> Result<GroupWrite> {
        let path = grouping::store_path(&self.config.output, group, self.config.store_extension())?;
        let group_column = self.builder.group_column();

        let existing = match gpkg::read(&path) {
            StoreRead::Absent => None,
            StoreRead::Loaded(table) => Some(table),
            StoreRead::Unreadable(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not read existing store, rebuilding it from this batch only"
                );
                None
            }
        };

        let keys = grouping::metadata_keys(records);
        let reconciled = schema::reconcile(existing, &keys, group_column, &path)?;
        let batch = merge::resolve_batch(records, group_column, &reconciled);
        let outcome = merge::merge(&reconciled.schema, reconciled.existing, batch, self.config.prune);

        ensure_parent(&path)?;
        gpkg::write(&path, &outcome.table, group)?;

        Ok(GroupWrite {
            rows: outcome.table.rows.len(),
            path,
            inserted: outcome.inserted,
            updated: outcome.updated,
            pruned: outcome.pruned,
        })
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
