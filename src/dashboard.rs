//! Single-owner client state and the event loop that feeds it.
//!
//! [`Dashboard`] holds the lead collection, the search and status filter, the
//! configuration banner, the workflow busy flags and at most one open detail.
//! Change events are drained from the feed queues one tick at a time; user
//! actions go to the store and come back through the same queues.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::config::{Config, ConfigWarning};
use crate::error::{DatabaseError, Error, WorkflowError};
use crate::leads::collection::{Applied, ChangeEvent, LeadCollection};
use crate::leads::detail::{LeadDetail, OptimisticWrite, WriteOutcome};
use crate::leads::record::{EditableField, Lead, LeadPatch, NewLead};
use crate::leads::view::{StatusFilter, filtered_view};
use crate::realtime::{ChangeFeed, ChangeFilter, Subscription};
use crate::store::{Backend, LeadStore};
use crate::transcript::{
    IngestedTranscript, TranscriptFile, TranscriptIngestor, transcript_text_patch,
};
use crate::workflows::{BusyTracker, WorkflowGateway, WorkflowKind};

/// Configuration gaps shown once per session until dismissed.
#[derive(Debug, Clone, Default)]
pub struct Banner {
    warnings: Vec<ConfigWarning>,
    dismissed: bool,
}

impl Banner {
    pub fn new(warnings: Vec<ConfigWarning>) -> Self {
        Self {
            warnings,
            dismissed: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        !self.dismissed && !self.warnings.is_empty()
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    pub fn dismiss(&mut self) {
        self.dismissed = true;
    }
}

/// A created lead and the background lead-magnet trigger, if one was started.
#[derive(Debug)]
pub struct CreatedLead {
    pub lead: Lead,
    pub lead_magnet: Option<JoinHandle<()>>,
}

/// Trigger `kind` for `lead_id` while holding its busy flag.
async fn dispatch(
    gateway: &WorkflowGateway,
    busy: &BusyTracker,
    lead_id: &str,
    kind: WorkflowKind,
    lead: Option<&Lead>,
) -> Result<(), WorkflowError> {
    let _guard = busy
        .begin(lead_id, kind)
        .ok_or_else(|| WorkflowError::AlreadyRunning {
            lead_id: lead_id.to_string(),
            workflow: kind.label(),
        })?;
    gateway.trigger(lead_id, kind, lead).await
}

enum Next {
    List(Option<ChangeEvent>),
    Detail(ChangeEvent),
}

async fn next_or_pending(subscription: Option<&mut Subscription>) -> ChangeEvent {
    if let Some(subscription) = subscription
        && let Some(event) = subscription.recv().await
    {
        return event;
    }
    std::future::pending().await
}

pub struct Dashboard {
    store: Arc<dyn LeadStore>,
    feed: Arc<dyn ChangeFeed>,
    gateway: WorkflowGateway,
    ingestor: TranscriptIngestor,
    fetch_limit: usize,

    collection: LeadCollection,
    query: String,
    filter: StatusFilter,
    banner: Banner,
    busy: BusyTracker,

    list_feed: Option<Subscription>,
    detail: Option<LeadDetail>,
    detail_feed: Option<Subscription>,
}

impl Dashboard {
    pub fn new(backend: &Backend, gateway: WorkflowGateway, config: &Config) -> Self {
        let banner = Banner::new(config.warnings());
        for warning in banner.warnings() {
            tracing::warn!(key = warning.key, "{}", warning.message);
        }
        Self {
            store: backend.store.clone(),
            feed: backend.feed.clone(),
            gateway,
            ingestor: TranscriptIngestor::new(backend.store.clone(), backend.storage.clone()),
            fetch_limit: config.store.fetch_limit,
            collection: LeadCollection::default(),
            query: String::new(),
            filter: StatusFilter::All,
            banner,
            busy: BusyTracker::new(),
            list_feed: None,
            detail: None,
            detail_feed: None,
        }
    }

    /// Replace the collection with a fresh bulk fetch.
    pub async fn refresh(&mut self) -> Result<usize, DatabaseError> {
        let leads = self.store.fetch_recent(self.fetch_limit).await?;
        tracing::debug!("Fetched {} leads", leads.len());
        self.collection = LeadCollection::from_fetch(leads);
        Ok(self.collection.len())
    }

    /// Subscribe the list to every lead change. Feed failures are logged and
    /// leave the list without live updates.
    pub fn watch(&mut self) {
        match self.feed.subscribe(ChangeFilter::all()) {
            Ok(subscription) => self.list_feed = Some(subscription),
            Err(e) => tracing::warn!("Live updates unavailable: {}", e),
        }
    }

    pub fn collection(&self) -> &LeadCollection {
        &self.collection
    }

    /// Leads matching the current query and status filter, in collection order.
    pub fn visible(&self) -> Vec<&Lead> {
        filtered_view(self.collection.as_slice(), &self.query, self.filter)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn filter(&self) -> StatusFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: StatusFilter) {
        self.filter = filter;
    }

    pub fn banner(&self) -> &Banner {
        &self.banner
    }

    pub fn dismiss_banner(&mut self) {
        self.banner.dismiss();
    }

    pub fn busy(&self) -> &BusyTracker {
        &self.busy
    }

    /// Apply one list-feed event.
    pub fn apply_change(&mut self, event: ChangeEvent) -> Applied {
        let lead_id = event.lead_id().to_string();
        let kind = event.kind();
        let applied = self.collection.apply(event);
        tracing::debug!(lead_id = %lead_id, kind, ?applied, "Applied change");
        applied
    }

    /// Apply one detail-feed event: the detail takes it, then the collection
    /// gets the same row so both agree.
    pub fn apply_detail_change(&mut self, event: ChangeEvent) {
        let ChangeEvent::Update(lead) = event else {
            return;
        };
        if let Some(detail) = self.detail.as_mut()
            && detail.apply_notification(lead.clone())
        {
            self.collection.replace(lead);
        }
    }

    /// Apply everything already queued on both feeds without waiting.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.list_feed.as_mut().and_then(Subscription::try_recv) {
            self.apply_change(event);
            applied += 1;
        }
        while let Some(event) = self.detail_feed.as_mut().and_then(Subscription::try_recv) {
            self.apply_detail_change(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next event, then apply it and everything queued behind it.
    /// Returns the number of events applied, or `None` without a list feed.
    pub async fn next_tick(&mut self) -> Option<usize> {
        let next = {
            let list = self.list_feed.as_mut()?;
            let detail = self.detail_feed.as_mut();
            tokio::select! {
                event = list.recv() => Next::List(event),
                event = next_or_pending(detail) => Next::Detail(event),
            }
        };
        match next {
            Next::List(Some(event)) => {
                self.apply_change(event);
            }
            Next::List(None) => {
                tracing::warn!("List feed closed");
                self.list_feed = None;
                return None;
            }
            Next::Detail(event) => self.apply_detail_change(event),
        }
        Some(1 + self.drain())
    }

    /// Run ticks until `shutdown` resolves or the list feed closes, calling
    /// `on_tick` after each one.
    pub async fn run<S, F>(&mut self, shutdown: S, mut on_tick: F)
    where
        S: Future<Output = ()>,
        F: FnMut(&Self, usize),
    {
        tokio::pin!(shutdown);
        loop {
            let tick = tokio::select! {
                _ = &mut shutdown => None,
                tick = self.next_tick() => tick,
            };
            match tick {
                Some(applied) => on_tick(self, applied),
                None => break,
            }
        }
    }

    /// Trigger a workflow for a lead. Refused while the same trigger runs.
    pub async fn trigger_workflow(
        &self,
        lead_id: &str,
        kind: WorkflowKind,
    ) -> Result<(), WorkflowError> {
        let lead = self
            .detail
            .as_ref()
            .filter(|d| d.lead_id() == lead_id)
            .map(LeadDetail::lead)
            .or_else(|| self.collection.get(lead_id));
        dispatch(&self.gateway, &self.busy, lead_id, kind, lead).await
    }

    /// Validate and insert a new lead, then start the lead-magnet workflow in
    /// the background when it is configured. Its failure is only logged.
    pub async fn create_lead(&self, submission: &NewLead) -> Result<CreatedLead, Error> {
        let submission = submission.validate()?;
        let lead = self.store.insert_lead(&submission).await?;
        tracing::info!(lead_id = %lead.lead_id, "Lead created");

        let lead_magnet = self
            .gateway
            .is_configured(WorkflowKind::LeadMagnet)
            .then(|| {
                let gateway = self.gateway.clone();
                let busy = self.busy.clone();
                let lead_id = lead.lead_id.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        dispatch(&gateway, &busy, &lead_id, WorkflowKind::LeadMagnet, None).await
                    {
                        tracing::warn!(lead_id = %lead_id, "Lead magnet trigger failed: {}", e);
                    }
                })
            });

        Ok(CreatedLead { lead, lead_magnet })
    }

    /// Open the detail for `lead_id`, subscribing to its updates. Reuses the
    /// open detail when it is already this lead.
    pub async fn open_detail(&mut self, lead_id: &str) -> Result<&LeadDetail, Error> {
        let reuse = self.detail.as_ref().is_some_and(|d| d.lead_id() == lead_id);
        if !reuse {
            let lead = match self.collection.get(lead_id) {
                Some(lead) => lead.clone(),
                None => self.store.get_lead(lead_id).await?.ok_or_else(|| {
                    DatabaseError::NotFound {
                        entity: "lead".to_string(),
                        id: lead_id.to_string(),
                    }
                })?,
            };
            self.close_detail();
            self.detail_feed = match self.feed.subscribe(ChangeFilter::lead_updates(lead_id)) {
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    tracing::warn!(lead_id, "Live updates for lead unavailable: {}", e);
                    None
                }
            };
            self.detail = Some(LeadDetail::new(lead));
        }
        self.detail.as_ref().ok_or_else(|| {
            Error::Database(DatabaseError::NotFound {
                entity: "lead".to_string(),
                id: lead_id.to_string(),
            })
        })
    }

    pub fn detail(&self) -> Option<&LeadDetail> {
        self.detail.as_ref()
    }

    /// Close the detail and drop its subscription.
    pub fn close_detail(&mut self) {
        self.detail = None;
        self.detail_feed = None;
    }

    async fn detail_mut(&mut self, lead_id: &str) -> Result<&mut LeadDetail, Error> {
        self.open_detail(lead_id).await?;
        self.detail.as_mut().ok_or_else(|| {
            Error::Database(DatabaseError::NotFound {
                entity: "lead".to_string(),
                id: lead_id.to_string(),
            })
        })
    }

    /// Send an optimistic write to the store and reconcile the answer.
    ///
    /// The list row only ever gets the patched columns; it may already hold a
    /// newer server copy than the detail, so the detail's row is never copied
    /// over it.
    async fn commit(&mut self, write: OptimisticWrite) -> Result<WriteOutcome, Error> {
        let list_before = self.collection.get_mut(&write.lead_id).map(|row| {
            let before = row.clone();
            write.patch.apply_to(row);
            before
        });
        let patch = write.patch.clone();

        let result = self.store.update_lead(&write.lead_id, &write.patch).await;
        let outcome = match self.detail.as_mut() {
            Some(detail) => detail.complete(write, result.as_ref().map(Clone::clone)),
            None => WriteOutcome::Superseded,
        };

        match &result {
            Ok(Some(stored)) => {
                self.collection.replace(stored.clone());
            }
            Ok(None) | Err(_) => {
                if let Some(before) = &list_before
                    && let Some(row) = self.collection.get_mut(&before.lead_id)
                {
                    patch.revert(row, before);
                }
            }
        }
        match result {
            Ok(_) => Ok(outcome),
            Err(e) => {
                tracing::error!("Lead update failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Save a contact or company section. Only changed fields are sent; an
    /// unchanged section makes no round trip and returns `None`.
    pub async fn save_section(
        &mut self,
        lead_id: &str,
        edits: &[(EditableField, String)],
    ) -> Result<Option<WriteOutcome>, Error> {
        let Some((first, _)) = edits.first() else {
            return Ok(None);
        };
        let section = first.section();
        let detail = self.detail_mut(lead_id).await?;
        let patch = LeadPatch::diff(detail.lead(), edits)?;
        if patch.is_empty() {
            return Ok(None);
        }
        let write = detail.begin(section, patch)?;
        self.commit(write).await.map(Some)
    }

    /// Save a hand-edited transcript. Unchanged text makes no round trip.
    pub async fn save_transcript_text(
        &mut self,
        lead_id: &str,
        text: &str,
    ) -> Result<Option<WriteOutcome>, Error> {
        let detail = self.detail_mut(lead_id).await?;
        let Some(patch) = transcript_text_patch(detail.lead(), text) else {
            return Ok(None);
        };
        let write = detail.begin("dc_call_transcript", patch)?;
        self.commit(write).await.map(Some)
    }

    pub async fn toggle_call_completed(&mut self, lead_id: &str) -> Result<WriteOutcome, Error> {
        let write = self.detail_mut(lead_id).await?.toggle_call_completed()?;
        self.commit(write).await
    }

    pub async fn toggle_deal_closed(
        &mut self,
        lead_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome, Error> {
        let write = self.detail_mut(lead_id).await?.toggle_deal_closed(now)?;
        self.commit(write).await
    }

    /// Ingest a transcript file for a lead and show the stored row.
    pub async fn upload_transcript(
        &mut self,
        lead_id: &str,
        file: TranscriptFile,
        now: DateTime<Utc>,
    ) -> Result<IngestedTranscript, Error> {
        let ingested = self.ingestor.ingest(lead_id, file, now).await?;
        if let Some(detail) = self.detail.as_mut() {
            detail.apply_notification(ingested.lead.clone());
        }
        self.collection.replace(ingested.lead.clone());
        Ok(ingested)
    }
}
