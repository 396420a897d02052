//! Change-notification channel.
//!
//! A [`ChangeFeed`] hands out [`Subscription`]s. Each subscription is a queue
//! of [`ChangeEvent`]s fed by a background task; dropping it stops the task.
//! Feed failures are logged by the task and never reach the subscriber.

pub mod phoenix;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RealtimeError;
use crate::leads::collection::ChangeEvent;

pub use self::phoenix::RealtimeClient;

/// Which row changes a subscription wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    /// Only changes to this lead.
    pub lead_id: Option<String>,
    /// Only UPDATE events.
    pub updates_only: bool,
}

impl ChangeFilter {
    /// Every change to every lead: the list view's subscription.
    pub fn all() -> Self {
        Self::default()
    }

    /// Updates to one lead: the detail view's subscription.
    pub fn lead_updates(lead_id: impl Into<String>) -> Self {
        Self {
            lead_id: Some(lead_id.into()),
            updates_only: true,
        }
    }

    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        if self.updates_only && !matches!(event, ChangeEvent::Update(_)) {
            return false;
        }
        self.lead_id
            .as_deref()
            .is_none_or(|id| id == event.lead_id())
    }
}

#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::UnboundedReceiver<ChangeEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self { events, task }
    }

    /// Wait for the next event. `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Next already-queued event, without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Source of row-change subscriptions.
pub trait ChangeFeed: Send + Sync {
    /// Start delivering changes matching `filter`. Must be called inside a
    /// tokio runtime.
    fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, RealtimeError>;
}
