//! Registry of uploaded tabular datasets.
//!
//! Datasets are immutable once registered and are handed out as
//! `Arc<Dataset>`. The registry remembers registration order and tracks the
//! most recently registered dataset as the active one.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use labpilot_core::error::{LabpilotError, Result};
use labpilot_core::types::{Dataset, DatasetId, DatasetMeta, NewDataset};

#[derive(Debug, Default)]
struct RegistryState {
    /// Registration order, oldest first.
    datasets: Vec<Arc<Dataset>>,
    active: Option<DatasetId>,
}

/// Process-wide registry of datasets.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    state: RwLock<RegistryState>,
    max_datasets: Option<usize>,
}

impl DatasetRegistry {
    /// Create an unbounded registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that evicts the oldest dataset beyond `max_datasets`.
    pub fn with_limit(max_datasets: Option<usize>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            max_datasets,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>> {
        self.state
            .read()
            .map_err(|e| LabpilotError::Storage(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|e| LabpilotError::Storage(format!("Lock poisoned: {}", e)))
    }

    /// Validate, store, and activate a new dataset under a fresh id.
    ///
    /// Registering identical data twice yields two datasets with distinct ids.
    pub fn register(&self, new: NewDataset) -> Result<Arc<Dataset>> {
        let dataset = Arc::new(Dataset::build(DatasetId::generate(), new)?);

        let mut state = self.write()?;
        state.datasets.push(Arc::clone(&dataset));
        state.active = Some(dataset.id.clone());

        if let Some(max) = self.max_datasets {
            while state.datasets.len() > max.max(1) {
                let evicted = state.datasets.remove(0);
                debug!(dataset_id = %evicted.id, "Dataset evicted by retention limit");
            }
        }

        info!(
            dataset_id = %dataset.id,
            name = %dataset.name,
            rows = dataset.row_count(),
            columns = dataset.columns.len(),
            "Dataset registered"
        );
        Ok(dataset)
    }

    /// Look up a dataset by id.
    pub fn get(&self, id: &DatasetId) -> Result<Arc<Dataset>> {
        let state = self.read()?;
        state
            .datasets
            .iter()
            .find(|d| &d.id == id)
            .cloned()
            .ok_or_else(|| LabpilotError::NotFound(format!("dataset '{}'", id)))
    }

    /// Metadata for every dataset, in registration order.
    pub fn list(&self) -> Result<Vec<DatasetMeta>> {
        let state = self.read()?;
        Ok(state.datasets.iter().map(|d| d.metadata()).collect())
    }

    /// Id of the most recently registered dataset still held.
    pub fn active_id(&self) -> Result<Option<DatasetId>> {
        Ok(self.read()?.active.clone())
    }

    /// The active dataset, if any.
    pub fn active(&self) -> Result<Option<Arc<Dataset>>> {
        let state = self.read()?;
        Ok(state
            .active
            .as_ref()
            .and_then(|id| state.datasets.iter().find(|d| &d.id == id))
            .cloned())
    }

    /// Find a dataset by name, ignoring case. The most recent match wins.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Arc<Dataset>>> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        let state = self.read()?;
        Ok(state
            .datasets
            .iter()
            .rev()
            .find(|d| d.name.to_lowercase() == needle)
            .cloned())
    }

    /// Names of all datasets, in registration order.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.read()?.datasets.iter().map(|d| d.name.clone()).collect())
    }

    /// Remove a dataset. Returns whether it was present.
    ///
    /// When the active dataset is removed the most recent remaining dataset
    /// becomes active.
    pub fn evict(&self, id: &DatasetId) -> Result<bool> {
        let mut state = self.write()?;
        let before = state.datasets.len();
        state.datasets.retain(|d| &d.id != id);
        let removed = state.datasets.len() != before;

        if removed && state.active.as_ref() == Some(id) {
            state.active = state.datasets.last().map(|d| d.id.clone());
        }
        if removed {
            info!(dataset_id = %id, "Dataset evicted");
        }
        Ok(removed)
    }

    /// Number of datasets held.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.datasets.len()).unwrap_or(0)
    }

    /// Whether the registry holds no datasets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
