// SPDX-License-Identifier: Apache-2.0

use crate::receivers::tail::error::Result;
use crate::receivers::tail::offset::OffsetRecord;

/// Durable storage for the most recently committed offset.
pub trait OffsetStore: Send {
    /// Read the saved offset. `Ok(None)` when nothing was saved yet.
    ///
    /// A saved value that cannot be decoded is an error; callers decide whether to
    /// start over.
    fn load(&self) -> Result<Option<OffsetRecord>>;

    /// Replace the saved offset.
    fn save(&mut self, record: &OffsetRecord) -> Result<()>;
}

/// Mock offset store for testing
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MockOffsetStore {
    saved: std::sync::Arc<std::sync::Mutex<Vec<OffsetRecord>>>,
    fail_saves: bool,
}

#[cfg(test)]
impl MockOffsetStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `record`
    pub fn with_record(record: OffsetRecord) -> Self {
        let store = Self::default();
        store.history_handle().push(record);
        store
    }

    /// Make every save fail
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    /// Every record saved so far, oldest first
    pub fn history(&self) -> Vec<OffsetRecord> {
        self.history_handle().clone()
    }

    fn history_handle(&self) -> std::sync::MutexGuard<'_, Vec<OffsetRecord>> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
impl OffsetStore for MockOffsetStore {
    fn load(&self) -> Result<Option<OffsetRecord>> {
        Ok(self.history_handle().last().cloned())
    }

    fn save(&mut self, record: &OffsetRecord) -> Result<()> {
        if self.fail_saves {
            return Err(crate::receivers::tail::error::Error::Persistence(
                "mock save failure".to_string(),
            ));
        }
        self.history_handle().push(record.clone());
        Ok(())
    }
}
