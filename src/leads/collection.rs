//! Client-held replica of the leads table, kept current by change events.

use serde::Serialize;

use crate::leads::record::Lead;

/// Row-level change delivered by the change-notification channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert(Lead),
    Update(Lead),
    Delete { lead_id: String },
}

impl ChangeEvent {
    pub fn lead_id(&self) -> &str {
        match self {
            Self::Insert(lead) | Self::Update(lead) => &lead.lead_id,
            Self::Delete { lead_id } => lead_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// What [`LeadCollection::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Deleted,
    /// Update or delete for a lead that is not held locally.
    Ignored,
}

/// Ordered leads, newest first.
///
/// Inserts are prepended without re-sorting, updates replace in place, and
/// events for unknown leads are dropped. Events are applied strictly in the
/// order they are handed over; there is no coalescing or deduplication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadCollection {
    leads: Vec<Lead>,
}

impl LeadCollection {
    /// Seed from the bulk fetch, which is already ordered by `updated_at` desc.
    pub fn from_fetch(leads: Vec<Lead>) -> Self {
        Self { leads }
    }

    pub fn apply(&mut self, event: ChangeEvent) -> Applied {
        match event {
            ChangeEvent::Insert(lead) => {
                self.leads.insert(0, lead);
                Applied::Inserted
            }
            ChangeEvent::Update(lead) => {
                if self.replace(lead) {
                    Applied::Updated
                } else {
                    Applied::Ignored
                }
            }
            ChangeEvent::Delete { lead_id } => {
                let before = self.leads.len();
                self.leads.retain(|l| l.lead_id != lead_id);
                if self.leads.len() < before {
                    Applied::Deleted
                } else {
                    Applied::Ignored
                }
            }
        }
    }

    /// Replace the held copy of `lead`, keeping its position. Returns false
    /// (and changes nothing) when the lead is not held.
    pub fn replace(&mut self, lead: Lead) -> bool {
        match self.leads.iter_mut().find(|l| l.lead_id == lead.lead_id) {
            Some(slot) => {
                *slot = lead;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, lead_id: &str) -> Option<&Lead> {
        self.leads.iter().find(|l| l.lead_id == lead_id)
    }

    pub fn get_mut(&mut self, lead_id: &str) -> Option<&mut Lead> {
        self.leads.iter_mut().find(|l| l.lead_id == lead_id)
    }

    pub fn as_slice(&self) -> &[Lead] {
        &self.leads
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lead> {
        self.leads.iter()
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }
}
