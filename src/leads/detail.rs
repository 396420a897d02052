//! Single-lead reconciliation for an open detail view.
//!
//! User actions are applied to the local copy immediately and produce an
//! [`OptimisticWrite`] for the caller to send to the store. Change
//! notifications for the lead always replace the local copy. When a write
//! fails and no notification has arrived since it began, the fields it
//! touched are rolled back.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::{DatabaseError, EditError};
use crate::leads::record::{Lead, LeadPatch};

/// A local mutation awaiting its store round trip.
#[derive(Debug, Clone)]
pub struct OptimisticWrite {
    pub lead_id: String,
    /// In-flight key; at most one write per key at a time.
    pub field: &'static str,
    pub patch: LeadPatch,
    before: Lead,
    revision: u64,
}

/// How a finished write was reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The store accepted the write; its returned row is now the local copy.
    Confirmed,
    /// A notification arrived while the write was in flight and already
    /// replaced the local copy; the write result was not applied.
    Superseded,
    /// The write failed and the touched fields were restored.
    RolledBack,
    /// The store no longer has this lead. The optimistic change was undone.
    Vanished,
}

#[derive(Debug, Clone)]
pub struct LeadDetail {
    current: Lead,
    /// Bumped on every server-side replacement of `current`.
    revision: u64,
    in_flight: HashSet<&'static str>,
}

impl LeadDetail {
    pub fn new(lead: Lead) -> Self {
        Self {
            current: lead,
            revision: 0,
            in_flight: HashSet::new(),
        }
    }

    pub fn lead(&self) -> &Lead {
        &self.current
    }

    pub fn lead_id(&self) -> &str {
        &self.current.lead_id
    }

    pub fn is_in_flight(&self, field: &str) -> bool {
        self.in_flight.contains(field)
    }

    /// Server state for this lead arrived. It always wins over local edits.
    /// Returns false for notifications about other leads.
    pub fn apply_notification(&mut self, lead: Lead) -> bool {
        if lead.lead_id != self.current.lead_id {
            return false;
        }
        self.current = lead;
        self.revision += 1;
        true
    }

    /// Start an optimistic write of `patch` under the in-flight key `field`.
    pub fn begin(
        &mut self,
        field: &'static str,
        patch: LeadPatch,
    ) -> Result<OptimisticWrite, EditError> {
        if !self.in_flight.insert(field) {
            return Err(EditError::InFlight { field });
        }
        let before = self.current.clone();
        patch.apply_to(&mut self.current);
        Ok(OptimisticWrite {
            lead_id: self.current.lead_id.clone(),
            field,
            patch,
            before,
            revision: self.revision,
        })
    }

    /// Flip `dc_call_completed`. Turning it on needs a transcript first.
    pub fn toggle_call_completed(&mut self) -> Result<OptimisticWrite, EditError> {
        let next = !self.current.discovery_call.call_completed;
        if next && !self.current.has_transcript() {
            return Err(EditError::TranscriptRequired);
        }
        self.begin(
            "dc_call_completed",
            LeadPatch {
                dc_call_completed: Some(next),
                ..LeadPatch::default()
            },
        )
    }

    /// Flip `deal_closed`. The first close stamps `closed_date` with `now`;
    /// reopening never clears it and a later close never re-stamps it.
    pub fn toggle_deal_closed(&mut self, now: DateTime<Utc>) -> Result<OptimisticWrite, EditError> {
        let next = !self.current.deal_closed;
        let closed_date = (next && self.current.closed_date.is_none()).then_some(now);
        self.begin(
            "deal_closed",
            LeadPatch {
                deal_closed: Some(next),
                closed_date,
                ..LeadPatch::default()
            },
        )
    }

    /// Reconcile a finished write with the store's answer.
    pub fn complete(
        &mut self,
        write: OptimisticWrite,
        result: Result<Option<Lead>, &DatabaseError>,
    ) -> WriteOutcome {
        self.in_flight.remove(write.field);
        let superseded = self.revision != write.revision;

        match result {
            Ok(Some(_)) if superseded => WriteOutcome::Superseded,
            Ok(Some(lead)) => {
                self.apply_notification(lead);
                WriteOutcome::Confirmed
            }
            Ok(None) => {
                if !superseded {
                    write.patch.revert(&mut self.current, &write.before);
                }
                WriteOutcome::Vanished
            }
            Err(_) if superseded => WriteOutcome::Superseded,
            Err(e) => {
                tracing::warn!(
                    lead_id = %write.lead_id,
                    field = write.field,
                    "Rolling back optimistic update: {}",
                    e
                );
                write.patch.revert(&mut self.current, &write.before);
                WriteOutcome::RolledBack
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{LeadDetail, WriteOutcome};
    use crate::error::{DatabaseError, EditError};
    use crate::leads::record::LeadPatch;
    use crate::leads::record::fixtures::{lead, named};

    fn failure() -> DatabaseError {
        DatabaseError::Transport("connection reset".to_string())
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0)
            .single()
            .expect("valid")
    }

    #[test]
    fn call_completed_requires_transcript_to_turn_on() {
        let mut detail = LeadDetail::new(lead("L-1"));
        assert_eq!(
            detail.toggle_call_completed().map(|_| ()),
            Err(EditError::TranscriptRequired)
        );
        assert!(!detail.lead().discovery_call.call_completed);
    }

    #[test]
    fn call_completed_can_always_be_turned_off() {
        let mut seeded = lead("L-1");
        seeded.discovery_call.call_completed = true;
        let mut detail = LeadDetail::new(seeded);
        let write = detail.toggle_call_completed().expect("turn off allowed");
        assert_eq!(write.patch.dc_call_completed, Some(false));
        assert!(!detail.lead().discovery_call.call_completed);
    }

    #[test]
    fn optimistic_toggle_is_visible_before_confirmation() {
        let mut seeded = lead("L-1");
        seeded.discovery_call.call_transcript_url = Some("https://files.test/t.txt".to_string());
        let mut detail = LeadDetail::new(seeded);

        let write = detail.toggle_call_completed().expect("allowed");
        assert!(detail.lead().discovery_call.call_completed);
        assert!(detail.is_in_flight("dc_call_completed"));

        let mut confirmed = detail.lead().clone();
        confirmed.updated_at += Duration::seconds(1);
        assert_eq!(
            detail.complete(write, Ok(Some(confirmed.clone()))),
            WriteOutcome::Confirmed
        );
        assert_eq!(detail.lead(), &confirmed);
        assert!(!detail.is_in_flight("dc_call_completed"));
    }

    #[test]
    fn second_toggle_while_in_flight_is_refused() {
        let mut detail = LeadDetail::new(lead("L-1"));
        let _write = detail.toggle_deal_closed(now()).expect("first");
        assert_eq!(
            detail.toggle_deal_closed(now()).map(|_| ()),
            Err(EditError::InFlight {
                field: "deal_closed"
            })
        );
    }

    #[test]
    fn failed_write_rolls_back_only_its_fields() {
        let mut detail = LeadDetail::new(lead("L-1"));
        let deal = detail.toggle_deal_closed(now()).expect("deal");
        let rename = detail
            .begin(
                "contact",
                LeadPatch {
                    contact_name: Some("Countess Ada".to_string()),
                    ..LeadPatch::default()
                },
            )
            .expect("rename");

        let err = failure();
        assert_eq!(detail.complete(deal, Err(&err)), WriteOutcome::RolledBack);
        assert!(!detail.lead().deal_closed);
        assert_eq!(detail.lead().closed_date, None);
        assert_eq!(detail.lead().contact.name, "Countess Ada");

        let mut stored = detail.lead().clone();
        stored.contact.name = "Countess Ada".to_string();
        assert_eq!(
            detail.complete(rename, Ok(Some(stored))),
            WriteOutcome::Confirmed
        );
    }

    #[test]
    fn notification_during_write_beats_rollback() {
        let mut seeded = lead("L-1");
        seeded.discovery_call.call_transcript = Some("hello".to_string());
        let mut detail = LeadDetail::new(seeded);
        let write = detail.toggle_call_completed().expect("allowed");

        let mut from_server = named("L-1", "Server Name", "Server Co");
        from_server.discovery_call.call_completed = true;
        assert!(detail.apply_notification(from_server.clone()));

        let err = failure();
        assert_eq!(detail.complete(write, Err(&err)), WriteOutcome::Superseded);
        assert_eq!(detail.lead(), &from_server);
    }

    #[test]
    fn notification_for_other_lead_is_ignored() {
        let mut detail = LeadDetail::new(lead("L-1"));
        assert!(!detail.apply_notification(lead("L-2")));
        assert_eq!(detail.lead_id(), "L-1");
    }

    #[test]
    fn first_close_stamps_date_and_reclose_keeps_it() {
        let mut detail = LeadDetail::new(lead("L-1"));
        let first = detail.toggle_deal_closed(now()).expect("close");
        assert_eq!(first.patch.closed_date, Some(now()));
        let stored = detail.lead().clone();
        detail.complete(first, Ok(Some(stored)));

        let reopen = detail
            .toggle_deal_closed(now() + Duration::days(1))
            .expect("reopen");
        assert_eq!(reopen.patch.deal_closed, Some(false));
        assert_eq!(reopen.patch.closed_date, None);
        let stored = detail.lead().clone();
        detail.complete(reopen, Ok(Some(stored)));
        assert_eq!(detail.lead().closed_date, Some(now()));

        let reclose = detail
            .toggle_deal_closed(now() + Duration::days(2))
            .expect("close again");
        assert_eq!(reclose.patch.closed_date, None);
        assert_eq!(detail.lead().closed_date, Some(now()));
    }

    #[test]
    fn vanished_lead_undoes_optimistic_change() {
        let mut detail = LeadDetail::new(lead("L-1"));
        let write = detail.toggle_deal_closed(now()).expect("close");
        assert_eq!(detail.complete(write, Ok(None)), WriteOutcome::Vanished);
        assert!(!detail.lead().deal_closed);
    }
}
