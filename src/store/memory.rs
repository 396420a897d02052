//! In-process store, object storage and change feed.
//!
//! Every write emits the matching [`ChangeEvent`] to live subscriptions, so
//! code under test sees the same echo it would get from the hosted backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{DatabaseError, RealtimeError, StorageError};
use crate::leads::collection::ChangeEvent;
use crate::leads::record::{Lead, LeadPatch, NewLead};
use crate::realtime::{ChangeFeed, ChangeFilter, Subscription};
use crate::store::{LeadStore, ObjectStorage};

const PUBLIC_BASE: &str = "memory://dcf_transcript";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

type Subscriber = (ChangeFilter, mpsc::UnboundedSender<ChangeEvent>);

#[derive(Debug, Default)]
pub struct MemoryStore {
    leads: Mutex<Vec<Lead>>,
    objects: Mutex<HashMap<String, StoredObject>>,
    subscribers: Mutex<Vec<Subscriber>>,
    fail_updates: AtomicBool,
    fail_uploads: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leads(leads: Vec<Lead>) -> Self {
        let store = Self::new();
        *lock(&store.leads) = leads;
        store
    }

    /// Make every following `update_lead` fail with a transport error.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every following `upload` fail with a transport error.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn lead(&self, lead_id: &str) -> Option<Lead> {
        lock(&self.leads)
            .iter()
            .find(|l| l.lead_id == lead_id)
            .cloned()
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        lock(&self.objects).get(path).cloned()
    }

    pub fn object_paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = lock(&self.objects).keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Write a row the way the automation pipeline would: replace it when
    /// present, insert it otherwise. Subscribers see the matching event.
    pub fn upsert_external(&self, lead: Lead) {
        let event = {
            let mut leads = lock(&self.leads);
            match leads.iter_mut().find(|l| l.lead_id == lead.lead_id) {
                Some(slot) => {
                    *slot = lead.clone();
                    ChangeEvent::Update(lead)
                }
                None => {
                    leads.push(lead.clone());
                    ChangeEvent::Insert(lead)
                }
            }
        };
        self.emit(event);
    }

    pub fn delete_external(&self, lead_id: &str) -> bool {
        let removed = {
            let mut leads = lock(&self.leads);
            let before = leads.len();
            leads.retain(|l| l.lead_id != lead_id);
            leads.len() < before
        };
        if removed {
            self.emit(ChangeEvent::Delete {
                lead_id: lead_id.to_string(),
            });
        }
        removed
    }

    fn emit(&self, event: ChangeEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|(filter, tx)| {
            if tx.is_closed() {
                return false;
            }
            if filter.accepts(&event) {
                return tx.send(event.clone()).is_ok();
            }
            true
        });
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError> {
        let mut leads = lock(&self.leads).clone();
        leads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        leads.truncate(limit);
        Ok(leads)
    }

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>, DatabaseError> {
        Ok(self.lead(lead_id))
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, DatabaseError> {
        let lead = Lead::new(Uuid::new_v4().to_string(), lead, Utc::now());
        lock(&self.leads).push(lead.clone());
        self.emit(ChangeEvent::Insert(lead.clone()));
        Ok(lead)
    }

    async fn update_lead(
        &self,
        lead_id: &str,
        patch: &LeadPatch,
    ) -> Result<Option<Lead>, DatabaseError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DatabaseError::Transport("memory store refused update".to_string()));
        }
        let updated = {
            let mut leads = lock(&self.leads);
            let Some(slot) = leads.iter_mut().find(|l| l.lead_id == lead_id) else {
                return Ok(None);
            };
            patch.apply_to(slot);
            slot.updated_at = Utc::now();
            slot.clone()
        };
        self.emit(ChangeEvent::Update(updated.clone()));
        Ok(Some(updated))
    }
}

#[async_trait]
impl ObjectStorage for MemoryStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("memory storage refused upload".to_string()));
        }
        let mut objects = lock(&self.objects);
        if !upsert && objects.contains_key(path) {
            return Err(StorageError::AlreadyExists {
                path: path.to_string(),
            });
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        lock(&self.objects).remove(path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{PUBLIC_BASE}/{path}")
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, RealtimeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push((filter, tx));
        Ok(Subscription::new(rx, None))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    use super::MemoryStore;
    use crate::error::StorageError;
    use crate::leads::collection::ChangeEvent;
    use crate::leads::record::LeadPatch;
    use crate::leads::record::fixtures::{lead, new_lead};
    use crate::realtime::{ChangeFeed, ChangeFilter};
    use crate::store::{LeadStore, ObjectStorage};

    #[tokio::test]
    async fn writes_echo_to_matching_subscribers() {
        let store = MemoryStore::new();
        let mut all = store.subscribe(ChangeFilter::all()).expect("subscribe");

        let inserted = store.insert_lead(&new_lead()).await.expect("insert");
        let mut one = store
            .subscribe(ChangeFilter::lead_updates(inserted.lead_id.clone()))
            .expect("subscribe");

        let patch = LeadPatch {
            deal_closed: Some(true),
            ..LeadPatch::default()
        };
        let updated = store
            .update_lead(&inserted.lead_id, &patch)
            .await
            .expect("update")
            .expect("present");
        assert!(updated.deal_closed);

        assert_eq!(all.try_recv(), Some(ChangeEvent::Insert(inserted.clone())));
        assert_eq!(all.try_recv(), Some(ChangeEvent::Update(updated.clone())));
        assert_eq!(one.try_recv(), Some(ChangeEvent::Update(updated)));
        assert_eq!(one.try_recv(), None);
    }

    #[tokio::test]
    async fn update_of_missing_lead_is_none() {
        let store = MemoryStore::new();
        let result = store
            .update_lead("nope", &LeadPatch::default())
            .await
            .expect("no error");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn fetch_orders_by_recency_and_limits() {
        let mut old = lead("old");
        old.updated_at -= chrono::Duration::days(1);
        let store = MemoryStore::with_leads(vec![old, lead("new"), lead("newer")]);
        store.upsert_external({
            let mut l = lead("newer");
            l.updated_at += chrono::Duration::hours(1);
            l
        });
        let ids: Vec<_> = store
            .fetch_recent(2)
            .await
            .expect("fetch")
            .into_iter()
            .map(|l| l.lead_id)
            .collect();
        assert_eq!(ids, vec!["newer".to_string(), "new".to_string()]);
    }

    #[tokio::test]
    async fn occupied_path_is_not_overwritten() {
        let store = MemoryStore::new();
        store
            .upload("L-1/1-transcript.txt", Bytes::from_static(b"a"), "text/plain", false)
            .await
            .expect("first");
        let err = store
            .upload("L-1/1-transcript.txt", Bytes::from_static(b"b"), "text/plain", false)
            .await
            .expect_err("occupied");
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(
            store.object("L-1/1-transcript.txt").expect("kept").bytes,
            Bytes::from_static(b"a")
        );
    }
}
