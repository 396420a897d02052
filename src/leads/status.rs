//! Coarse lead status and step progress, derived from the phase flags.
//!
//! Nothing here assumes the flags are monotonic: any combination is valid
//! input and is displayed as-is.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::leads::record::{Lead, present};

/// Total number of phase-progress flags across the three phases.
pub const TOTAL_STEPS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadStatus {
    NotStarted,
    InProgress,
    Completed,
    Error,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Error => "Error",
        }
    }

    pub fn from_str_value(value: &str) -> Option<Self> {
        match value {
            "not-started" => Some(Self::NotStarted),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `{completed, total}` for one phase, or for the seven journey stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepCount {
    pub completed: u32,
    pub total: u32,
}

impl StepCount {
    fn of(flags: &[bool]) -> Self {
        Self {
            completed: flags.iter().filter(|f| **f).count() as u32,
            total: flags.len() as u32,
        }
    }
}

pub fn lead_magnet_progress(lead: &Lead) -> StepCount {
    let lm = &lead.lead_magnet;
    StepCount::of(&[
        lm.started,
        lm.contact_profile_scraped,
        lm.company_profile_scraped,
        lm.website_scraped,
        lm.brief_generated,
        lm.doc_uploaded,
    ])
}

pub fn discovery_call_progress(lead: &Lead) -> StepCount {
    let dc = &lead.discovery_call;
    StepCount::of(&[dc.started, dc.generated, dc.doc_uploaded])
}

pub fn proposal_progress(lead: &Lead) -> StepCount {
    let pr = &lead.proposal;
    StepCount::of(&[pr.started, pr.generated, pr.doc_uploaded])
}

fn completed_steps(lead: &Lead) -> u32 {
    lead_magnet_progress(lead).completed
        + discovery_call_progress(lead).completed
        + proposal_progress(lead).completed
}

/// All three phase documents exist.
pub fn all_docs_delivered(lead: &Lead) -> bool {
    present(&lead.lead_magnet.doc_url)
        && present(&lead.discovery_call.doc_url)
        && present(&lead.proposal.doc_url)
}

/// Error beats completed beats in-progress beats not-started.
pub fn status(lead: &Lead) -> LeadStatus {
    if lead.has_error() {
        LeadStatus::Error
    } else if all_docs_delivered(lead) {
        LeadStatus::Completed
    } else if completed_steps(lead) > 0 {
        LeadStatus::InProgress
    } else {
        LeadStatus::NotStarted
    }
}

/// Share of the twelve phase-progress flags that are set, 0..=100, rounded
/// half-up. `deal_closed` and `dc_call_completed` do not count.
pub fn progress_percent(lead: &Lead) -> u8 {
    let done = completed_steps(lead);
    ((done * 100 + TOTAL_STEPS / 2) / TOTAL_STEPS) as u8
}

#[cfg(test)]
mod tests {
    use super::{
        LeadStatus, discovery_call_progress, lead_magnet_progress, progress_percent,
        proposal_progress, status,
    };
    use crate::leads::record::Lead;
    use crate::leads::record::fixtures::lead;

    fn flag_setters() -> Vec<fn(&mut Lead)> {
        vec![
            |l: &mut Lead| l.lead_magnet.started = true,
            |l: &mut Lead| l.lead_magnet.contact_profile_scraped = true,
            |l: &mut Lead| l.lead_magnet.company_profile_scraped = true,
            |l: &mut Lead| l.lead_magnet.website_scraped = true,
            |l: &mut Lead| l.lead_magnet.brief_generated = true,
            |l: &mut Lead| l.lead_magnet.doc_uploaded = true,
            |l: &mut Lead| l.discovery_call.started = true,
            |l: &mut Lead| l.discovery_call.generated = true,
            |l: &mut Lead| l.discovery_call.doc_uploaded = true,
            |l: &mut Lead| l.proposal.started = true,
            |l: &mut Lead| l.proposal.generated = true,
            |l: &mut Lead| l.proposal.doc_uploaded = true,
        ]
    }

    fn with_all_docs(mut lead: Lead) -> Lead {
        lead.lead_magnet.doc_url = Some("https://docs.test/lm".to_string());
        lead.discovery_call.doc_url = Some("https://docs.test/dc".to_string());
        lead.proposal.doc_url = Some("https://docs.test/pr".to_string());
        lead
    }

    #[test]
    fn fresh_lead_is_not_started() {
        let lead = lead("L-1");
        assert_eq!(status(&lead), LeadStatus::NotStarted);
        assert_eq!(progress_percent(&lead), 0);
    }

    #[test]
    fn error_wins_over_every_flag_combination() {
        let mut errored = with_all_docs(lead("L-1"));
        for set in flag_setters() {
            set(&mut errored);
        }
        errored.last_error = Some("scraper timed out".to_string());
        assert_eq!(status(&errored), LeadStatus::Error);

        let mut bare = lead("L-2");
        bare.last_error = Some("x".to_string());
        assert_eq!(status(&bare), LeadStatus::Error);
    }

    #[test]
    fn empty_error_string_is_not_an_error() {
        let mut lead = lead("L-1");
        lead.last_error = Some(String::new());
        assert_eq!(status(&lead), LeadStatus::NotStarted);
    }

    #[test]
    fn all_docs_without_error_is_completed_even_with_no_flags() {
        let lead = with_all_docs(lead("L-1"));
        assert_eq!(status(&lead), LeadStatus::Completed);
        assert_eq!(progress_percent(&lead), 0);
    }

    #[test]
    fn two_of_three_docs_is_not_completed() {
        let mut lead = with_all_docs(lead("L-1"));
        lead.proposal.doc_url = Some(String::new());
        lead.proposal.started = true;
        assert_eq!(status(&lead), LeadStatus::InProgress);
    }

    #[test]
    fn out_of_order_flags_count_as_in_progress() {
        let mut lead = lead("L-1");
        lead.proposal.doc_uploaded = true;
        assert_eq!(status(&lead), LeadStatus::InProgress);
    }

    #[test]
    fn single_started_flag_rounds_to_eight_percent() {
        let mut lead = lead("L-1");
        lead.lead_magnet.started = true;
        assert_eq!(status(&lead), LeadStatus::InProgress);
        assert_eq!(progress_percent(&lead), 8);
    }

    #[test]
    fn manual_toggles_do_not_move_progress() {
        let mut lead = lead("L-1");
        lead.deal_closed = true;
        lead.discovery_call.call_completed = true;
        assert_eq!(progress_percent(&lead), 0);
        assert_eq!(status(&lead), LeadStatus::NotStarted);
    }

    #[test]
    fn progress_is_monotonic_as_flags_flip_on() {
        let setters = flag_setters();
        for (i, set) in setters.iter().enumerate() {
            // Every prefix of flags on, then flip flag i as well.
            for prefix in 0..setters.len() {
                let mut base = lead("L-1");
                for other in setters.iter().take(prefix) {
                    other(&mut base);
                }
                let before = progress_percent(&base);
                set(&mut base);
                assert!(
                    progress_percent(&base) >= before,
                    "flag {i} decreased progress from prefix {prefix}"
                );
            }
        }

        let mut full = lead("L-1");
        for set in &setters {
            set(&mut full);
        }
        assert_eq!(progress_percent(&full), 100);
    }

    #[test]
    fn phase_progress_uses_phase_totals() {
        let mut lead = lead("L-1");
        lead.lead_magnet.started = true;
        lead.lead_magnet.website_scraped = true;
        lead.discovery_call.generated = true;
        assert_eq!(lead_magnet_progress(&lead).completed, 2);
        assert_eq!(lead_magnet_progress(&lead).total, 6);
        assert_eq!(discovery_call_progress(&lead).completed, 1);
        assert_eq!(discovery_call_progress(&lead).total, 3);
        assert_eq!(proposal_progress(&lead).completed, 0);
        assert_eq!(proposal_progress(&lead).total, 3);
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            LeadStatus::NotStarted,
            LeadStatus::InProgress,
            LeadStatus::Completed,
            LeadStatus::Error,
        ] {
            assert_eq!(LeadStatus::from_str_value(s.as_str()), Some(s));
        }
    }
}
