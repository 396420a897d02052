//! Durable store and object storage collaborators.
//!
//! Two implementations exist:
//!
//! - [`rest::SupabaseRest`]: the hosted table and storage bucket over HTTP.
//! - [`memory::MemoryStore`]: in-process, used by tests and `--offline`.
//!
//! [`unconfigured::Unconfigured`] stands in when store settings are missing.
//!
//! Callers hold both behind `Arc<dyn ...>` via [`Backend`].

pub mod memory;
pub mod rest;
pub mod unconfigured;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::StoreConfig;
use crate::error::{DatabaseError, StorageError};
use crate::leads::record::{Lead, LeadPatch, NewLead};
use crate::realtime::{ChangeFeed, RealtimeClient};

/// Reads and writes against the leads table.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Most recently updated leads first, at most `limit` of them.
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError>;

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>, DatabaseError>;

    /// Insert a validated submission and return the stored row.
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, DatabaseError>;

    /// Apply `patch` and return the stored row, or `None` if the lead is gone.
    async fn update_lead(
        &self,
        lead_id: &str,
        patch: &LeadPatch,
    ) -> Result<Option<Lead>, DatabaseError>;
}

/// Blob storage for uploaded transcripts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path`. With `upsert` off an occupied path fails with
    /// [`StorageError::AlreadyExists`].
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError>;

    async fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Publicly readable URL for `path`. Does not check the object exists.
    fn public_url(&self, path: &str) -> String;
}

/// The three collaborators wired from one configuration.
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn LeadStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub feed: Arc<dyn ChangeFeed>,
}

impl Backend {
    pub fn in_memory(memory: Arc<memory::MemoryStore>) -> Self {
        Self {
            store: memory.clone(),
            storage: memory.clone(),
            feed: memory,
        }
    }

    /// A backend whose every operation fails with a not-configured error.
    pub fn unconfigured(reason: impl Into<String>) -> Self {
        let stand_in = Arc::new(unconfigured::Unconfigured::new(reason));
        Self {
            store: stand_in.clone(),
            storage: stand_in.clone(),
            feed: stand_in,
        }
    }
}

/// Build the hosted backend from configuration.
///
/// Fails when the store URL or access key is missing; callers that want to
/// keep running degraded should check [`StoreConfig::is_configured`] first
/// and fall back to [`Backend::unconfigured`].
pub fn connect_from_config(config: &StoreConfig) -> Result<Backend, DatabaseError> {
    let rest = Arc::new(rest::SupabaseRest::new(config)?);
    let realtime = RealtimeClient::new(config)
        .map_err(|e| DatabaseError::NotConfigured(e.to_string()))?;
    Ok(Backend {
        store: rest.clone(),
        storage: rest,
        feed: Arc::new(realtime),
    })
}
