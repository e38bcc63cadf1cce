//! In-memory status store double for pipeline and dispatcher tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StatusStoreError;
use crate::status::{DestinationStatus, StatusStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOutcome {
    pub event_id: String,
    pub destination_name: String,
    pub status: String,
    pub response: String,
}

#[derive(Default)]
struct Inner {
    failures: Vec<String>,
    outcomes: Vec<RecordedOutcome>,
    display_names: HashMap<String, String>,
    fail_writes: bool,
}

/// Records every status call, with optional configured display names and a
/// switch to make writes fail for error-path tests.
#[derive(Default)]
pub struct MemoryStatusStore {
    inner: Mutex<Inner>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_display_name(self, service_id: &str, display_name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .display_names
            .insert(service_id.to_owned(), display_name.to_owned());
        self
    }

    pub fn fail_writes(&self) {
        self.inner.lock().unwrap().fail_writes = true;
    }

    pub fn failures(&self) -> Vec<String> {
        self.inner.lock().unwrap().failures.clone()
    }

    pub fn outcomes(&self) -> Vec<RecordedOutcome> {
        self.inner.lock().unwrap().outcomes.clone()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn record_failure(&self, event_id: &str) -> Result<(), StatusStoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(StatusStoreError::Database(sqlx::Error::PoolClosed));
        }
        inner.failures.push(event_id.to_owned());
        Ok(())
    }

    async fn record_destination_outcome(
        &self,
        event_id: &str,
        destination_name: &str,
        status: DestinationStatus,
        response: &str,
    ) -> Result<(), StatusStoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(StatusStoreError::Database(sqlx::Error::PoolClosed));
        }
        inner.outcomes.push(RecordedOutcome {
            event_id: event_id.to_owned(),
            destination_name: destination_name.to_owned(),
            status: status.to_string(),
            response: response.to_owned(),
        });
        Ok(())
    }

    async fn destination_display_name(
        &self,
        service_id: &str,
    ) -> Result<Option<String>, StatusStoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .display_names
            .get(service_id)
            .cloned())
    }
}
