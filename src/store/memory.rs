use super::{StateStore, WorkRecord};
use anyhow::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory state store.
///
/// Backs tests and single-process deployments. The DashMap entry API gives
/// the atomic create-if-absent the dedup guard requires. State is lost on
/// restart — pair with the SQLite store when tombstones must survive.
#[derive(Default)]
pub struct MemoryStateStore {
    records: DashMap<String, WorkRecord>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get_if_exists(&self, work_id: &str) -> Result<Option<WorkRecord>> {
        Ok(self.records.get(work_id).map(|r| r.clone()))
    }

    fn create_if_absent(&self, record: &WorkRecord) -> Result<bool> {
        match self.records.entry(record.work_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    fn update(&self, record: &WorkRecord) -> Result<()> {
        self.records
            .insert(record.work_id.clone(), record.clone());
        Ok(())
    }
}
