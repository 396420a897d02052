//! Lead records as stored in the hosted table, plus the write-side params.
//!
//! Column names are the wire names. Phase flags are grouped into one struct
//! per phase and flattened back into the flat row on (de)serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::LeadValidationError;

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// True when an optional text column holds a non-empty value.
pub fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "contact_name", default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(rename = "contact_email", default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(rename = "contact_phone", default, deserialize_with = "null_as_empty")]
    pub phone: String,
    #[serde(rename = "contact_linkedin", default, deserialize_with = "null_as_empty")]
    pub linkedin: String,
    /// Scraped profile, written by automation only.
    #[serde(rename = "contact_linkedin_raw", default)]
    pub linkedin_raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "company_name", default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(rename = "company_linkedin", default)]
    pub linkedin: Option<String>,
    #[serde(rename = "company_website", default)]
    pub website: Option<String>,
    #[serde(rename = "company_linkedin_raw", default)]
    pub linkedin_raw: Option<serde_json::Value>,
    #[serde(rename = "company_website_text", default)]
    pub website_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadMagnetPhase {
    #[serde(rename = "lm_started", default, deserialize_with = "null_as_false")]
    pub started: bool,
    #[serde(
        rename = "lm_contact_profile_scraped",
        default,
        deserialize_with = "null_as_false"
    )]
    pub contact_profile_scraped: bool,
    #[serde(
        rename = "lm_company_profile_scraped",
        default,
        deserialize_with = "null_as_false"
    )]
    pub company_profile_scraped: bool,
    #[serde(rename = "lm_website_scraped", default, deserialize_with = "null_as_false")]
    pub website_scraped: bool,
    #[serde(rename = "lm_brief_generated", default, deserialize_with = "null_as_false")]
    pub brief_generated: bool,
    #[serde(rename = "lm_doc_uploaded", default, deserialize_with = "null_as_false")]
    pub doc_uploaded: bool,
    #[serde(rename = "lm_doc_url", default)]
    pub doc_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryCallPhase {
    #[serde(rename = "dc_started", default, deserialize_with = "null_as_false")]
    pub started: bool,
    #[serde(rename = "dc_generated", default, deserialize_with = "null_as_false")]
    pub generated: bool,
    #[serde(rename = "dc_doc_uploaded", default, deserialize_with = "null_as_false")]
    pub doc_uploaded: bool,
    #[serde(rename = "dc_doc_url", default)]
    pub doc_url: Option<String>,
    #[serde(rename = "dc_call_transcript", default)]
    pub call_transcript: Option<String>,
    #[serde(rename = "dc_call_transcript_url", default)]
    pub call_transcript_url: Option<String>,
    #[serde(rename = "dc_call_summary", default)]
    pub call_summary: Option<String>,
    #[serde(rename = "dc_call_completed", default, deserialize_with = "null_as_false")]
    pub call_completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposalPhase {
    #[serde(rename = "pr_started", default, deserialize_with = "null_as_false")]
    pub started: bool,
    #[serde(rename = "pr_generated", default, deserialize_with = "null_as_false")]
    pub generated: bool,
    #[serde(rename = "pr_doc_uploaded", default, deserialize_with = "null_as_false")]
    pub doc_uploaded: bool,
    #[serde(rename = "pr_doc_url", default)]
    pub doc_url: Option<String>,
}

/// One row of the leads table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub contact: Contact,
    #[serde(flatten)]
    pub company: Company,
    #[serde(flatten)]
    pub lead_magnet: LeadMagnetPhase,
    #[serde(flatten)]
    pub discovery_call: DiscoveryCallPhase,
    #[serde(flatten)]
    pub proposal: ProposalPhase,
    #[serde(default, deserialize_with = "null_as_false")]
    pub deal_closed: bool,
    #[serde(default)]
    pub closed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Lead {
    /// A freshly created record: every flag false, every optional field unset.
    pub fn new(lead_id: impl Into<String>, params: &NewLead, now: DateTime<Utc>) -> Self {
        Self {
            lead_id: lead_id.into(),
            created_at: now,
            updated_at: now,
            contact: Contact {
                name: params.contact_name.clone(),
                email: params.contact_email.clone(),
                phone: params.contact_phone.clone(),
                linkedin: params.contact_linkedin.clone(),
                linkedin_raw: None,
            },
            company: Company {
                name: params.company_name.clone(),
                linkedin: params.company_linkedin.clone(),
                website: params.company_website.clone(),
                linkedin_raw: None,
                website_text: None,
            },
            lead_magnet: LeadMagnetPhase::default(),
            discovery_call: DiscoveryCallPhase::default(),
            proposal: ProposalPhase::default(),
            deal_closed: false,
            closed_date: None,
            last_error: None,
        }
    }

    /// The automation pipeline reported a failure for this lead.
    pub fn has_error(&self) -> bool {
        present(&self.last_error)
    }

    /// A discovery-call transcript has been uploaded or typed in.
    pub fn has_transcript(&self) -> bool {
        present(&self.discovery_call.call_transcript_url)
            || present(&self.discovery_call.call_transcript)
    }
}

/// New-lead submission. Use [`NewLead::validate`] before inserting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub contact_linkedin: String,
    pub company_name: String,
    pub company_linkedin: Option<String>,
    pub company_website: Option<String>,
}

fn required(field: &'static str, value: &str) -> Result<String, LeadValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LeadValidationError::MissingField { field });
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl NewLead {
    /// Trim every field, reject blank required fields, and turn blank
    /// optional fields into nulls.
    pub fn validate(&self) -> Result<Self, LeadValidationError> {
        Ok(Self {
            contact_name: required("contact_name", &self.contact_name)?,
            contact_email: required("contact_email", &self.contact_email)?,
            contact_phone: required("contact_phone", &self.contact_phone)?,
            contact_linkedin: required("contact_linkedin", &self.contact_linkedin)?,
            company_name: required("company_name", &self.company_name)?,
            company_linkedin: optional(self.company_linkedin.as_deref()),
            company_website: optional(self.company_website.as_deref()),
        })
    }
}

/// User-editable text fields, grouped the way the edit sections group them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditableField {
    ContactName,
    ContactEmail,
    ContactPhone,
    ContactLinkedin,
    CompanyName,
    CompanyLinkedin,
    CompanyWebsite,
}

impl EditableField {
    pub fn column(self) -> &'static str {
        match self {
            Self::ContactName => "contact_name",
            Self::ContactEmail => "contact_email",
            Self::ContactPhone => "contact_phone",
            Self::ContactLinkedin => "contact_linkedin",
            Self::CompanyName => "company_name",
            Self::CompanyLinkedin => "company_linkedin",
            Self::CompanyWebsite => "company_website",
        }
    }

    pub fn from_column(value: &str) -> Option<Self> {
        match value {
            "contact_name" => Some(Self::ContactName),
            "contact_email" => Some(Self::ContactEmail),
            "contact_phone" => Some(Self::ContactPhone),
            "contact_linkedin" => Some(Self::ContactLinkedin),
            "company_name" => Some(Self::CompanyName),
            "company_linkedin" => Some(Self::CompanyLinkedin),
            "company_website" => Some(Self::CompanyWebsite),
            _ => None,
        }
    }

    /// Edit section the field belongs to; also its in-flight key.
    pub fn section(self) -> &'static str {
        match self {
            Self::ContactName | Self::ContactEmail | Self::ContactPhone | Self::ContactLinkedin => {
                "contact"
            }
            Self::CompanyName | Self::CompanyLinkedin | Self::CompanyWebsite => "company",
        }
    }

    fn is_required(self) -> bool {
        !matches!(self, Self::CompanyLinkedin | Self::CompanyWebsite)
    }

    fn current(self, lead: &Lead) -> Option<&str> {
        let value = match self {
            Self::ContactName => Some(lead.contact.name.as_str()),
            Self::ContactEmail => Some(lead.contact.email.as_str()),
            Self::ContactPhone => Some(lead.contact.phone.as_str()),
            Self::ContactLinkedin => Some(lead.contact.linkedin.as_str()),
            Self::CompanyName => Some(lead.company.name.as_str()),
            Self::CompanyLinkedin => lead.company.linkedin.as_deref(),
            Self::CompanyWebsite => lead.company.website.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Partial update for one lead. `None` leaves a column untouched;
/// `Some(None)` writes null.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeadPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_linkedin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_linkedin: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_website: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc_call_transcript: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc_call_transcript_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc_call_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_date: Option<DateTime<Utc>>,
}

impl LeadPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Build a patch holding only the edited fields whose value changed.
    ///
    /// A blank input clears an optional field and is rejected for a required
    /// one. Returns an empty patch when nothing changed.
    pub fn diff(
        lead: &Lead,
        edits: &[(EditableField, String)],
    ) -> Result<Self, LeadValidationError> {
        let mut patch = Self::default();
        for (field, raw) in edits {
            let next = optional(Some(raw));
            if next.as_deref() == field.current(lead) {
                continue;
            }
            if field.is_required() && next.is_none() {
                return Err(LeadValidationError::MissingField {
                    field: field.column(),
                });
            }
            match field {
                EditableField::ContactName => patch.contact_name = next,
                EditableField::ContactEmail => patch.contact_email = next,
                EditableField::ContactPhone => patch.contact_phone = next,
                EditableField::ContactLinkedin => patch.contact_linkedin = next,
                EditableField::CompanyName => patch.company_name = next,
                EditableField::CompanyLinkedin => patch.company_linkedin = Some(next),
                EditableField::CompanyWebsite => patch.company_website = Some(next),
            }
        }
        Ok(patch)
    }

    /// Apply the patch to a local copy. `updated_at` is left to the caller.
    pub fn apply_to(&self, lead: &mut Lead) {
        if let Some(v) = &self.contact_name {
            lead.contact.name = v.clone();
        }
        if let Some(v) = &self.contact_email {
            lead.contact.email = v.clone();
        }
        if let Some(v) = &self.contact_phone {
            lead.contact.phone = v.clone();
        }
        if let Some(v) = &self.contact_linkedin {
            lead.contact.linkedin = v.clone();
        }
        if let Some(v) = &self.company_name {
            lead.company.name = v.clone();
        }
        if let Some(v) = &self.company_linkedin {
            lead.company.linkedin = v.clone();
        }
        if let Some(v) = &self.company_website {
            lead.company.website = v.clone();
        }
        if let Some(v) = &self.dc_call_transcript {
            lead.discovery_call.call_transcript = v.clone();
        }
        if let Some(v) = &self.dc_call_transcript_url {
            lead.discovery_call.call_transcript_url = v.clone();
        }
        if let Some(v) = self.dc_call_completed {
            lead.discovery_call.call_completed = v;
        }
        if let Some(v) = self.deal_closed {
            lead.deal_closed = v;
        }
        if let Some(v) = self.closed_date {
            lead.closed_date = Some(v);
        }
    }

    /// Undo this patch on `lead`, restoring every touched column from `before`.
    /// Columns the patch did not touch keep their current value.
    pub fn revert(&self, lead: &mut Lead, before: &Lead) {
        if self.contact_name.is_some() {
            lead.contact.name = before.contact.name.clone();
        }
        if self.contact_email.is_some() {
            lead.contact.email = before.contact.email.clone();
        }
        if self.contact_phone.is_some() {
            lead.contact.phone = before.contact.phone.clone();
        }
        if self.contact_linkedin.is_some() {
            lead.contact.linkedin = before.contact.linkedin.clone();
        }
        if self.company_name.is_some() {
            lead.company.name = before.company.name.clone();
        }
        if self.company_linkedin.is_some() {
            lead.company.linkedin = before.company.linkedin.clone();
        }
        if self.company_website.is_some() {
            lead.company.website = before.company.website.clone();
        }
        if self.dc_call_transcript.is_some() {
            lead.discovery_call.call_transcript = before.discovery_call.call_transcript.clone();
        }
        if self.dc_call_transcript_url.is_some() {
            lead.discovery_call.call_transcript_url =
                before.discovery_call.call_transcript_url.clone();
        }
        if self.dc_call_completed.is_some() {
            lead.discovery_call.call_completed = before.discovery_call.call_completed;
        }
        if self.deal_closed.is_some() {
            lead.deal_closed = before.deal_closed;
        }
        if self.closed_date.is_some() {
            lead.closed_date = before.closed_date;
        }
    }
}
