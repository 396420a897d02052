//! Outbound triggers for the three external automation workflows.
//!
//! A trigger is a single JSON POST. There is no retry and no idempotency key;
//! the [`BusyTracker`] only tells the caller a trigger is already running.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::leads::record::{Lead, present};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowKind {
    LeadMagnet,
    DiscoveryCall,
    Proposal,
}

impl WorkflowKind {
    pub const ALL: [Self; 3] = [Self::LeadMagnet, Self::DiscoveryCall, Self::Proposal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LeadMagnet => "lead-magnet",
            Self::DiscoveryCall => "discovery-call",
            Self::Proposal => "proposal",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::LeadMagnet => "Lead Magnet",
            Self::DiscoveryCall => "Discovery Call",
            Self::Proposal => "Proposal",
        }
    }

    /// Environment variable holding this workflow's webhook URL.
    pub fn env_key(self) -> &'static str {
        match self {
            Self::LeadMagnet => "N8N_WEBHOOK_LEAD_MAGNET",
            Self::DiscoveryCall => "N8N_WEBHOOK_DISCOVERY_CALL",
            Self::Proposal => "N8N_WEBHOOK_PROPOSAL",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "lead-magnet" | "leadmagnet" | "lm" => Ok(Self::LeadMagnet),
            "discovery-call" | "discoverycall" | "dc" => Ok(Self::DiscoveryCall),
            "proposal" | "pr" => Ok(Self::Proposal),
            other => Err(format!(
                "unknown workflow '{other}' (expected lead-magnet, discovery-call or proposal)"
            )),
        }
    }
}

/// Webhook body: the lead id plus, for proposals, the call transcript context.
pub fn build_payload(lead_id: &str, kind: WorkflowKind, lead: Option<&Lead>) -> serde_json::Value {
    let mut payload = serde_json::Map::new();
    payload.insert("lead_id".to_string(), serde_json::json!(lead_id));

    if kind == WorkflowKind::Proposal
        && let Some(lead) = lead
        && present(&lead.discovery_call.call_transcript_url)
    {
        payload.insert(
            "dc_call_transcript_url".to_string(),
            serde_json::json!(lead.discovery_call.call_transcript_url),
        );
        payload.insert(
            "dc_call_transcript".to_string(),
            serde_json::json!(lead.discovery_call.call_transcript),
        );
    }

    serde_json::Value::Object(payload)
}

#[derive(Debug, Clone)]
pub struct WorkflowGateway {
    http: reqwest::Client,
    config: WorkflowConfig,
}

impl WorkflowGateway {
    pub fn new(config: WorkflowConfig) -> Result<Self, WorkflowError> {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| WorkflowError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn with_client(http: reqwest::Client, config: WorkflowConfig) -> Self {
        Self { http, config }
    }

    pub fn is_configured(&self, kind: WorkflowKind) -> bool {
        self.config.endpoint(kind).is_some()
    }

    /// POST the trigger payload for `lead_id` to the `kind` webhook.
    ///
    /// `lead` supplies optional context; pass the locally held copy if there
    /// is one.
    pub async fn trigger(
        &self,
        lead_id: &str,
        kind: WorkflowKind,
        lead: Option<&Lead>,
    ) -> Result<(), WorkflowError> {
        let url = self
            .config
            .endpoint(kind)
            .ok_or(WorkflowError::NotConfigured {
                workflow: kind.label(),
            })?;
        let payload = build_payload(lead_id, kind, lead);

        tracing::info!(lead_id, workflow = kind.as_str(), "Triggering workflow");
        let response = self
            .http
            .post(url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| WorkflowError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                lead_id,
                workflow = kind.as_str(),
                status = status.as_u16(),
                "Workflow webhook rejected trigger"
            );
            return Err(WorkflowError::Dispatch {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        Ok(())
    }
}

/// Advisory per-(lead, workflow) busy flags.
#[derive(Debug, Clone, Default)]
pub struct BusyTracker {
    inner: Arc<Mutex<HashSet<(String, WorkflowKind)>>>,
}

impl BusyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `(lead_id, kind)` busy. Returns `None` if it already is. The flag
    /// clears when the guard drops, whatever the trigger's outcome.
    pub fn begin(&self, lead_id: &str, kind: WorkflowKind) -> Option<BusyGuard> {
        let mut set = self.inner.lock().ok()?;
        if !set.insert((lead_id.to_string(), kind)) {
            return None;
        }
        Some(BusyGuard {
            tracker: self.clone(),
            key: (lead_id.to_string(), kind),
        })
    }

    pub fn is_busy(&self, lead_id: &str, kind: WorkflowKind) -> bool {
        self.inner
            .lock()
            .map(|set| set.contains(&(lead_id.to_string(), kind)))
            .unwrap_or(false)
    }

    pub fn busy_count(&self) -> usize {
        self.inner.lock().map(|set| set.len()).unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct BusyGuard {
    tracker: BusyTracker,
    key: (String, WorkflowKind),
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        match self.tracker.inner.lock() {
            Ok(mut set) => {
                set.remove(&self.key);
            }
            Err(e) => tracing::warn!("Workflow busy-flag lock poisoned: {}", e),
        }
    }
}
