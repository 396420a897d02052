//! Search + status filter projection over the lead collection.

use std::fmt;
use std::str::FromStr;

use crate::leads::record::Lead;
use crate::leads::status::{LeadStatus, status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(LeadStatus),
}

impl StatusFilter {
    pub fn matches(self, lead: &Lead) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => status(lead) == wanted,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(s) => s.as_str(),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        if normalized == "all" {
            return Ok(Self::All);
        }
        LeadStatus::from_str_value(&normalized)
            .map(Self::Only)
            .ok_or_else(|| {
                format!(
                    "unknown status filter '{value}' (expected all, not-started, in-progress, completed or error)"
                )
            })
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive substring match on contact name, company name, email and
/// phone. An empty query matches everything.
pub fn matches_query(lead: &Lead, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    [
        lead.contact.name.as_str(),
        lead.company.name.as_str(),
        lead.contact.email.as_str(),
        lead.contact.phone.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&needle))
}

/// Leads passing both the query and the status filter, in collection order.
pub fn filtered_view<'a>(leads: &'a [Lead], query: &str, filter: StatusFilter) -> Vec<&'a Lead> {
    leads
        .iter()
        .filter(|lead| matches_query(lead, query) && filter.matches(lead))
        .collect()
}
