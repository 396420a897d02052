//! The seven-stage "discovery to deal" journey shown in the detail view.
//!
//! Stage completion is a coarser indicator than
//! [`progress_percent`](crate::leads::status::progress_percent) and the two
//! are never mixed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::leads::record::{Lead, present};
use crate::leads::status::StepCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStage {
    Captured,
    Research,
    LeadMagnetCreated,
    DiscoveryCallPrepared,
    DiscoveryCallCompleted,
    ProposalDelivered,
    DealClosed,
}

impl JourneyStage {
    pub const ALL: [Self; 7] = [
        Self::Captured,
        Self::Research,
        Self::LeadMagnetCreated,
        Self::DiscoveryCallPrepared,
        Self::DiscoveryCallCompleted,
        Self::ProposalDelivered,
        Self::DealClosed,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Captured => "Lead Captured",
            Self::Research => "Research & Intelligence",
            Self::LeadMagnetCreated => "Lead Magnet Created",
            Self::DiscoveryCallPrepared => "Discovery Call Prepared",
            Self::DiscoveryCallCompleted => "Discovery Call Completed",
            Self::ProposalDelivered => "Proposal Delivered",
            Self::DealClosed => "Deal Closed",
        }
    }

    /// Stages the user flips by hand rather than automation.
    pub fn is_manual(self) -> bool {
        matches!(self, Self::DiscoveryCallCompleted | Self::DealClosed)
    }
}

/// One evaluated stage for a given lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JourneyStep<'a> {
    pub stage: JourneyStage,
    pub complete: bool,
    /// Work has started but the stage is not complete yet.
    pub active: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub doc_url: Option<&'a str>,
}

fn doc(url: &Option<String>) -> Option<&str> {
    url.as_deref().filter(|u| !u.is_empty())
}

fn evaluate(lead: &Lead, stage: JourneyStage) -> JourneyStep<'_> {
    let lm = &lead.lead_magnet;
    let dc = &lead.discovery_call;
    let pr = &lead.proposal;

    let (complete, active, doc_url) = match stage {
        JourneyStage::Captured => (true, false, None),
        JourneyStage::Research => {
            let done =
                lm.contact_profile_scraped && lm.company_profile_scraped && lm.website_scraped;
            (done, lm.started && !done, None)
        }
        JourneyStage::LeadMagnetCreated => {
            let done = present(&lm.doc_url);
            (done, lm.brief_generated && !done, doc(&lm.doc_url))
        }
        JourneyStage::DiscoveryCallPrepared => {
            let done = present(&dc.doc_url);
            (done, dc.started && !done, doc(&dc.doc_url))
        }
        JourneyStage::DiscoveryCallCompleted => {
            let done = dc.call_completed;
            (done, present(&dc.doc_url) && !done, None)
        }
        JourneyStage::ProposalDelivered => {
            let done = present(&pr.doc_url);
            (done, pr.started && !done, doc(&pr.doc_url))
        }
        JourneyStage::DealClosed => {
            let done = lead.deal_closed;
            (done, present(&pr.doc_url) && !done, None)
        }
    };

    let timestamp = match stage {
        JourneyStage::Captured => Some(lead.created_at),
        JourneyStage::DealClosed => lead.closed_date,
        JourneyStage::DiscoveryCallCompleted => None,
        _ if complete => Some(lead.updated_at),
        _ => None,
    };

    JourneyStep {
        stage,
        complete,
        active,
        timestamp,
        doc_url,
    }
}

/// All seven stages in order.
pub fn journey(lead: &Lead) -> Vec<JourneyStep<'_>> {
    JourneyStage::ALL
        .iter()
        .map(|stage| evaluate(lead, *stage))
        .collect()
}

/// Completed stages out of seven.
pub fn journey_progress(lead: &Lead) -> StepCount {
    let completed = JourneyStage::ALL
        .iter()
        .filter(|stage| evaluate(lead, **stage).complete)
        .count() as u32;
    StepCount {
        completed,
        total: JourneyStage::ALL.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{JourneyStage, journey, journey_progress};
    use crate::leads::record::fixtures::lead;
    use crate::leads::status::progress_percent;

    fn step(lead: &crate::leads::record::Lead, stage: JourneyStage) -> (bool, bool) {
        let steps = journey(lead);
        let s = steps
            .iter()
            .find(|s| s.stage == stage)
            .expect("stage present");
        (s.complete, s.active)
    }

    #[test]
    fn fresh_lead_has_only_capture_complete() {
        let lead = lead("L-1");
        let steps = journey(&lead);
        assert_eq!(steps.len(), 7);
        assert!(steps[0].complete);
        assert_eq!(steps[0].timestamp, Some(lead.created_at));
        assert!(steps[1..].iter().all(|s| !s.complete && !s.active));
        assert_eq!(journey_progress(&lead).completed, 1);
        assert_eq!(journey_progress(&lead).total, 7);
    }

    #[test]
    fn research_is_active_until_all_scrapes_finish() {
        let mut lead = lead("L-1");
        lead.lead_magnet.started = true;
        lead.lead_magnet.contact_profile_scraped = true;
        assert_eq!(step(&lead, JourneyStage::Research), (false, true));

        lead.lead_magnet.company_profile_scraped = true;
        lead.lead_magnet.website_scraped = true;
        assert_eq!(step(&lead, JourneyStage::Research), (true, false));
    }

    #[test]
    fn research_completes_without_started_flag() {
        let mut lead = lead("L-1");
        lead.lead_magnet.contact_profile_scraped = true;
        lead.lead_magnet.company_profile_scraped = true;
        lead.lead_magnet.website_scraped = true;
        assert_eq!(step(&lead, JourneyStage::Research), (true, false));
    }

    #[test]
    fn doc_stages_carry_their_urls() {
        let mut lead = lead("L-1");
        lead.lead_magnet.brief_generated = true;
        assert_eq!(step(&lead, JourneyStage::LeadMagnetCreated), (false, true));

        lead.lead_magnet.doc_url = Some("https://docs.test/lm".to_string());
        let steps = journey(&lead);
        let lm = &steps[2];
        assert!(lm.complete && !lm.active);
        assert_eq!(lm.doc_url, Some("https://docs.test/lm"));
        assert_eq!(lm.timestamp, Some(lead.updated_at));
    }

    #[test]
    fn call_completed_becomes_active_once_prep_doc_exists() {
        let mut lead = lead("L-1");
        lead.discovery_call.doc_url = Some("https://docs.test/dc".to_string());
        assert_eq!(
            step(&lead, JourneyStage::DiscoveryCallCompleted),
            (false, true)
        );
        lead.discovery_call.call_completed = true;
        assert_eq!(
            step(&lead, JourneyStage::DiscoveryCallCompleted),
            (true, false)
        );
    }

    #[test]
    fn deal_closed_uses_closed_date_timestamp() {
        let mut lead = lead("L-1");
        lead.proposal.doc_url = Some("https://docs.test/pr".to_string());
        assert_eq!(step(&lead, JourneyStage::DealClosed), (false, true));

        let closed = Utc
            .with_ymd_and_hms(2026, 4, 1, 9, 0, 0)
            .single()
            .expect("valid");
        lead.deal_closed = true;
        lead.closed_date = Some(closed);
        let steps = journey(&lead);
        assert!(steps[6].complete);
        assert_eq!(steps[6].timestamp, Some(closed));
    }

    #[test]
    fn stage_count_and_step_percent_are_independent() {
        let mut lead = lead("L-1");
        lead.discovery_call.call_completed = true;
        lead.deal_closed = true;
        assert_eq!(journey_progress(&lead).completed, 3);
        assert_eq!(progress_percent(&lead), 0);
    }

    #[test]
    fn only_two_stages_are_manual() {
        let manual: Vec<_> = JourneyStage::ALL
            .iter()
            .filter(|s| s.is_manual())
            .collect();
        assert_eq!(
            manual,
            vec![
                &JourneyStage::DiscoveryCallCompleted,
                &JourneyStage::DealClosed
            ]
        );
    }
}
