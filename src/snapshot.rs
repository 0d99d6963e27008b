//! Baseline copy of a dataset as it was first ingested.

use log::debug;

use crate::dataset::{Dataset, Fingerprint, NativeType};

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    dataset: Dataset,
    original_types: Vec<(String, NativeType)>,
    fingerprint: Fingerprint,
}

impl Snapshot {
    fn capture(dataset: &Dataset) -> Self {
        Self {
            original_types: dataset.native_types(),
            fingerprint: dataset.fingerprint(),
            dataset: dataset.clone(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn original_types(&self) -> &[(String, NativeType)] {
        &self.original_types
    }

    pub fn original_type(&self, column: &str) -> Option<NativeType> {
        self.original_types
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, native)| *native)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn row_count(&self) -> usize {
        self.dataset.row_count()
    }
}

/// Holds at most one snapshot per upload.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    baseline: Option<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a copy of `dataset` unless a baseline already exists. Returns
    /// whether a capture happened.
    pub fn capture(&mut self, dataset: &Dataset) -> bool {
        if self.baseline.is_some() {
            debug!("Snapshot already captured for this upload; keeping the existing baseline");
            return false;
        }
        let snapshot = Snapshot::capture(dataset);
        debug!(
            "Captured snapshot of {} row(s) x {} column(s) ({})",
            snapshot.row_count(),
            snapshot.original_types.len(),
            snapshot.fingerprint
        );
        self.baseline = Some(snapshot);
        true
    }

    pub fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_ref()
    }

    /// Drops the baseline so the next upload can capture its own.
    pub fn reset(&mut self) {
        self.baseline = None;
    }
}
