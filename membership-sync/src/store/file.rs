//! JSON-file backed store.
//!
//! The whole record set lives in memory and is rewritten after every change:
//! serialized to a sibling temp file, then renamed over the target, so a crash
//! mid-write leaves the previous version intact.

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{CustomerPatch, CustomerRecord, CustomerStore, RecordFilter, RecordMap};
use crate::{
    error::{Result, SyncError},
    ids::UserId,
};

/// Store persisting records as a JSON array.
///
/// # Examples
///
/// ```rust,no_run
/// use membership_sync::store::{CustomerStore, JsonFileStore, RecordFilter};
///
/// # async fn example() -> membership_sync::error::Result<()> {
/// let store = JsonFileStore::open("customers.json").await?;
/// let records = store.load_customer_records(RecordFilter::SWEEP).await?;
/// println!("{} records to reconcile", records.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    map: RwLock<RecordMap>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the file exists but cannot be read,
    /// [`SyncError::Json`] if it is not a valid record array, or
    /// [`SyncError::EmailInUse`] if two records share an email.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<CustomerRecord>>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), records = records.len(), "Customer store opened");
        Ok(Self { path, map: RwLock::new(RecordMap::from_records(records)?) })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self, map), fields(path = %self.path.display()), level = "debug")]
    async fn persist(&self, map: &RecordMap) -> Result<()> {
        let records: Vec<&CustomerRecord> = map.records().collect();
        let bytes = serde_json::to_vec_pretty(&records)?;

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| SyncError::Store(format!("{} is not a file path", self.path.display())))?;
        let mut temp_name = file_name.to_os_string();
        temp_name.push(".tmp");
        let temp = self.path.with_file_name(temp_name);

        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

impl CustomerStore for JsonFileStore {
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
        let mut map = self.map.write().await;
        let mut next = map.clone();
        next.upsert(record)?;
        self.persist(&next).await?;
        *map = next;
        Ok(())
    }

    async fn update_customer_record<'a>(
        &'a self,
        user: &'a UserId,
        patch: CustomerPatch,
    ) -> Result<Option<CustomerRecord>> {
        let mut map = self.map.write().await;
        let mut next = map.clone();
        let Some(updated) = next.update(user, &patch) else {
            return Ok(None);
        };
        self.persist(&next).await?;
        *map = next;
        Ok(Some(updated))
    }
}
