use url::Url;

use crate::config::helpers::{env_or_setting, parse_http_url};
use crate::error::ConfigError;
use crate::settings::Settings;
use crate::workflows::WorkflowKind;

/// Webhook endpoints, one per workflow kind. Unset endpoints stay `None` so
/// the matching trigger fails on its own while the rest keep working.
#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    pub lead_magnet: Option<Url>,
    pub discovery_call: Option<Url>,
    pub proposal: Option<Url>,
}

impl WorkflowConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let resolve_one = |kind: WorkflowKind, setting: Option<&String>| {
            let key = kind.env_key();
            parse_http_url(key, env_or_setting(key, setting)?)
        };

        Ok(Self {
            lead_magnet: resolve_one(
                WorkflowKind::LeadMagnet,
                settings.workflows.lead_magnet.as_ref(),
            )?,
            discovery_call: resolve_one(
                WorkflowKind::DiscoveryCall,
                settings.workflows.discovery_call.as_ref(),
            )?,
            proposal: resolve_one(WorkflowKind::Proposal, settings.workflows.proposal.as_ref())?,
        })
    }

    pub fn endpoint(&self, kind: WorkflowKind) -> Option<&Url> {
        match kind {
            WorkflowKind::LeadMagnet => self.lead_magnet.as_ref(),
            WorkflowKind::DiscoveryCall => self.discovery_call.as_ref(),
            WorkflowKind::Proposal => self.proposal.as_ref(),
        }
    }
}
