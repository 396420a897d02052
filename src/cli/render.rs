//! Plain-text rendering for terminal output.

use std::fmt::Write as _;

use crate::dashboard::Banner;
use crate::leads::journey::{journey, journey_progress};
use crate::leads::record::Lead;
use crate::leads::status::{
    StepCount, discovery_call_progress, lead_magnet_progress, progress_percent, proposal_progress,
    status,
};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

fn steps(count: StepCount) -> String {
    format!("{}/{}", count.completed, count.total)
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

/// Header for [`lead_row`] columns.
pub fn list_header() -> String {
    format!(
        "{:<36}  {:<24}  {:<24}  {:<12}  {:>4}",
        "LEAD", "CONTACT", "COMPANY", "STATUS", "DONE"
    )
}

/// One list line: id, contact, company, status and progress.
pub fn lead_row(lead: &Lead) -> String {
    format!(
        "{:<36}  {:<24}  {:<24}  {:<12}  {:>3}%",
        lead.lead_id,
        lead.contact.name,
        lead.company.name,
        status(lead).label(),
        progress_percent(lead)
    )
}

/// Full detail: contact, company, phase progress and the journey.
pub fn lead_detail(lead: &Lead) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", lead.contact.name, lead.lead_id);
    let _ = writeln!(out, "  Email:     {}", or_dash(Some(lead.contact.email.as_str())));
    let _ = writeln!(out, "  Phone:     {}", or_dash(Some(lead.contact.phone.as_str())));
    let _ = writeln!(out, "  LinkedIn:  {}", or_dash(Some(lead.contact.linkedin.as_str())));
    let _ = writeln!(out, "  Company:   {}", or_dash(Some(lead.company.name.as_str())));
    let _ = writeln!(out, "  Website:   {}", or_dash(lead.company.website.as_deref()));
    let _ = writeln!(out, "  Co. page:  {}", or_dash(lead.company.linkedin.as_deref()));
    let _ = writeln!(
        out,
        "  Status:    {} ({}%)",
        status(lead).label(),
        progress_percent(lead)
    );
    if let Some(error) = lead.last_error.as_deref().filter(|e| !e.is_empty()) {
        let _ = writeln!(out, "  Error:     {error}");
    }
    let _ = writeln!(
        out,
        "  Phases:    lead magnet {}, discovery call {}, proposal {}",
        steps(lead_magnet_progress(lead)),
        steps(discovery_call_progress(lead)),
        steps(proposal_progress(lead))
    );
    let _ = writeln!(
        out,
        "  Transcript: {}",
        or_dash(lead.discovery_call.call_transcript_url.as_deref())
    );

    let _ = writeln!(out, "Journey: {}", steps(journey_progress(lead)));
    for step in journey(lead) {
        let mark = if step.complete {
            "x"
        } else if step.active {
            "~"
        } else {
            " "
        };
        let when = step
            .timestamp
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_default();
        let _ = write!(out, "  [{mark}] {:<26} {when}", step.stage.title());
        if let Some(url) = step.doc_url {
            let _ = write!(out, "  {url}");
        }
        out.truncate(out.trim_end().len());
        out.push('\n');
    }
    out
}

/// Configuration banner text, or `None` when hidden.
pub fn banner(banner: &Banner) -> Option<String> {
    if !banner.is_visible() {
        return None;
    }
    let mut out = String::from("Configuration incomplete:\n");
    for warning in banner.warnings() {
        let _ = writeln!(out, "  {}: {}", warning.key, warning.message);
    }
    Some(out)
}
