use std::path::PathBuf;

use serde::Serialize;

use crate::domain::SkippedPhoto;

/// What happened to one group's store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GroupOutcome {
    Written {
        path: PathBuf,
        rows: usize,
        inserted: usize,
        updated: usize,
        pruned: usize,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub group: String,
    pub records: usize,
    pub outcome: GroupOutcome,
}

/// Summary of an import run. Groups fail independently of one another.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub photos_seen: usize,
    pub records_built: usize,
    pub skipped: Vec<SkippedPhoto>,
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &GroupReport> {
        self.groups
            .iter()
            .filter(|g| matches!(g.outcome, GroupOutcome::Written { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &GroupReport> {
        self.groups
            .iter()
            .filter(|g| matches!(g.outcome, GroupOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn group(&self, name: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.group == name)
    }
}
