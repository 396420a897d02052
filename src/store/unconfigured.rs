//! Stand-in backend used when the store URL or access key is missing.
//!
//! Startup continues so the configuration banner can be shown and webhook
//! triggers still work. Every store operation fails on its own with a
//! not-configured error.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{DatabaseError, RealtimeError, StorageError};
use crate::leads::record::{Lead, LeadPatch, NewLead};
use crate::realtime::{ChangeFeed, ChangeFilter, Subscription};
use crate::store::{LeadStore, ObjectStorage};

#[derive(Debug, Clone)]
pub struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn database(&self) -> DatabaseError {
        DatabaseError::NotConfigured(self.reason.clone())
    }
}

#[async_trait]
impl LeadStore for Unconfigured {
    async fn fetch_recent(&self, _limit: usize) -> Result<Vec<Lead>, DatabaseError> {
        Err(self.database())
    }

    async fn get_lead(&self, _lead_id: &str) -> Result<Option<Lead>, DatabaseError> {
        Err(self.database())
    }

    async fn insert_lead(&self, _lead: &NewLead) -> Result<Lead, DatabaseError> {
        Err(self.database())
    }

    async fn update_lead(
        &self,
        _lead_id: &str,
        _patch: &LeadPatch,
    ) -> Result<Option<Lead>, DatabaseError> {
        Err(self.database())
    }
}

#[async_trait]
impl ObjectStorage for Unconfigured {
    async fn upload(
        &self,
        _path: &str,
        _bytes: Bytes,
        _content_type: &str,
        _upsert: bool,
    ) -> Result<(), StorageError> {
        Err(StorageError::NotConfigured(self.reason.clone()))
    }

    async fn remove(&self, _path: &str) -> Result<(), StorageError> {
        Err(StorageError::NotConfigured(self.reason.clone()))
    }

    fn public_url(&self, path: &str) -> String {
        path.to_string()
    }
}

impl ChangeFeed for Unconfigured {
    fn subscribe(&self, _filter: ChangeFilter) -> Result<Subscription, RealtimeError> {
        Err(RealtimeError::NotConfigured(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::Unconfigured;
    use crate::error::DatabaseError;
    use crate::realtime::{ChangeFeed, ChangeFilter};
    use crate::store::LeadStore;

    #[tokio::test]
    async fn every_operation_reports_not_configured() {
        let store = Unconfigured::new("SUPABASE_URL is not set");
        let err = store.fetch_recent(10).await.expect_err("unconfigured");
        assert!(matches!(err, DatabaseError::NotConfigured(ref r) if r.contains("SUPABASE_URL")));
        assert!(store.get_lead("L-1").await.is_err());
        assert!(store.subscribe(ChangeFilter::all()).is_err());
    }
}
