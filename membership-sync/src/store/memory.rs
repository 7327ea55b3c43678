use tokio::sync::RwLock;

use super::{CustomerPatch, CustomerRecord, CustomerStore, RecordFilter, RecordMap};
use crate::{error::Result, ids::UserId};

/// Volatile store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<RecordMap>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SyncError::EmailInUse`] if two records share an email.
    pub fn with_records(records: Vec<CustomerRecord>) -> Result<Self> {
        Ok(Self { map: RwLock::new(RecordMap::from_records(records)?) })
    }
}

impl CustomerStore for MemoryStore {
    async fn load_customer_records(&self, filter: RecordFilter) -> Result<Vec<CustomerRecord>> {
        Ok(self.map.read().await.filtered(filter))
    }

    async fn find_by_user<'a>(&'a self, user: &'a UserId) -> Result<Option<CustomerRecord>> {
        Ok(self.map.read().await.get(user))
    }

    async fn find_by_email<'a>(&'a self, email: &'a str) -> Result<Option<CustomerRecord>> {
        Ok(self.map.read().await.find_by_email(email))
    }

    async fn upsert(&self, record: CustomerRecord) -> Result<()> {
        self.map.write().await.upsert(record)
    }

    async fn update_customer_record<'a>(
        &'a self,
        user: &'a UserId,
        patch: CustomerPatch,
    ) -> Result<Option<CustomerRecord>> {
        Ok(self.map.write().await.update(user, &patch))
    }
}
