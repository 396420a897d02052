//! Lead records and everything derived from them on the client side.

pub mod collection;
pub mod detail;
pub mod journey;
pub mod record;
pub mod status;
pub mod view;

pub use collection::{Applied, ChangeEvent, LeadCollection};
pub use detail::{LeadDetail, OptimisticWrite, WriteOutcome};
pub use journey::{JourneyStage, JourneyStep, journey, journey_progress};
pub use record::{EditableField, Lead, LeadPatch, NewLead};
pub use status::{
    LeadStatus, StepCount, discovery_call_progress, lead_magnet_progress, progress_percent,
    proposal_progress, status,
};
pub use view::{StatusFilter, filtered_view, matches_query};
