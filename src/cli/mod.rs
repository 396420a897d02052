//! Command-line front end.

pub mod render;

use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::error::Error;
use crate::leads::detail::WriteOutcome;
use crate::leads::record::{EditableField, NewLead};
use crate::leads::view::StatusFilter;
use crate::transcript::{TranscriptExport, TranscriptFile};
use crate::workflows::WorkflowKind;

#[derive(Parser, Debug)]
#[command(name = "dcf-leads", version, about = "Lead pipeline dashboard")]
pub struct Cli {
    /// Settings file (default: ~/.dcf-leads/settings.toml)
    #[arg(long, global = true, env = "DCF_LEADS_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Use an in-process store instead of the hosted backend. Nothing persists.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List leads, most recently updated first
    List(ListArgs),
    /// Show one lead with its journey
    Show { lead_id: String },
    /// List leads and keep the list live until interrupted
    Watch(ListArgs),
    /// Create a lead (starts the lead magnet workflow when configured)
    Add(AddArgs),
    /// Edit contact or company fields; pass an empty value to clear an optional field
    Edit(EditArgs),
    /// Trigger a workflow: lead-magnet, discovery-call or proposal
    Trigger {
        lead_id: String,
        workflow: WorkflowKind,
    },
    /// Upload a .txt discovery-call transcript
    UploadTranscript { lead_id: String, path: PathBuf },
    /// Save the stored transcript as a .txt file
    ExportTranscript {
        lead_id: String,
        /// Directory to write into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Replace the transcript text; an empty value clears it
    SetTranscript { lead_id: String, text: String },
    /// Toggle "discovery call completed"
    CallCompleted { lead_id: String },
    /// Toggle "deal closed"
    DealClosed { lead_id: String },
    /// Report missing configuration
    CheckConfig,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Match contact name, company name, email or phone
    #[arg(long, short, default_value = "")]
    pub query: String,

    /// all, not-started, in-progress, completed or error
    #[arg(long, short, default_value = "all")]
    pub status: StatusFilter,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(long)]
    pub contact_name: String,
    #[arg(long)]
    pub contact_email: String,
    #[arg(long)]
    pub contact_phone: String,
    #[arg(long)]
    pub contact_linkedin: String,
    #[arg(long)]
    pub company_name: String,
    #[arg(long)]
    pub company_linkedin: Option<String>,
    #[arg(long)]
    pub company_website: Option<String>,
}

impl From<AddArgs> for NewLead {
    fn from(args: AddArgs) -> Self {
        Self {
            contact_name: args.contact_name,
            contact_email: args.contact_email,
            contact_phone: args.contact_phone,
            contact_linkedin: args.contact_linkedin,
            company_name: args.company_name,
            company_linkedin: args.company_linkedin,
            company_website: args.company_website,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub lead_id: String,
    #[arg(long)]
    pub contact_name: Option<String>,
    #[arg(long)]
    pub contact_email: Option<String>,
    #[arg(long)]
    pub contact_phone: Option<String>,
    #[arg(long)]
    pub contact_linkedin: Option<String>,
    #[arg(long)]
    pub company_name: Option<String>,
    #[arg(long)]
    pub company_linkedin: Option<String>,
    #[arg(long)]
    pub company_website: Option<String>,
}

impl EditArgs {
    /// Requested edits split into (contact, company) sections.
    pub fn sections(&self) -> [Vec<(EditableField, String)>; 2] {
        let all = [
            (EditableField::ContactName, &self.contact_name),
            (EditableField::ContactEmail, &self.contact_email),
            (EditableField::ContactPhone, &self.contact_phone),
            (EditableField::ContactLinkedin, &self.contact_linkedin),
            (EditableField::CompanyName, &self.company_name),
            (EditableField::CompanyLinkedin, &self.company_linkedin),
            (EditableField::CompanyWebsite, &self.company_website),
        ];
        let pick = |section: &str| -> Vec<(EditableField, String)> {
            all.iter()
                .filter_map(|(field, value)| {
                    let value = value.as_deref()?;
                    (field.section() == section).then(|| (*field, value.to_string()))
                })
                .collect()
        };
        [pick("contact"), pick("company")]
    }
}

fn print_list(dash: &Dashboard) {
    println!("{}", render::list_header());
    for lead in dash.visible() {
        println!("{}", render::lead_row(lead));
    }
}

fn describe(outcome: WriteOutcome) -> &'static str {
    match outcome {
        WriteOutcome::Confirmed => "saved",
        WriteOutcome::Superseded => "superseded by a newer change",
        WriteOutcome::RolledBack => "rolled back",
        WriteOutcome::Vanished => "lead no longer exists",
    }
}

/// Run one command against a dashboard built from `config`.
pub async fn execute(
    dash: &mut Dashboard,
    config: &Config,
    command: Command,
) -> Result<(), Error> {
    if let Some(text) = render::banner(dash.banner()) {
        eprint!("{text}");
        dash.dismiss_banner();
    }

    match command {
        Command::List(args) => {
            dash.refresh().await?;
            dash.set_query(args.query);
            dash.set_filter(args.status);
            print_list(dash);
        }
        Command::Show { lead_id } => {
            let detail = dash.open_detail(&lead_id).await?;
            print!("{}", render::lead_detail(detail.lead()));
        }
        Command::Watch(args) => {
            dash.refresh().await?;
            dash.set_query(args.query);
            dash.set_filter(args.status);
            dash.watch();
            print_list(dash);
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            dash.run(shutdown, |dash, applied| {
                tracing::debug!("Applied {} changes", applied);
                println!();
                print_list(dash);
            })
            .await;
        }
        Command::Add(args) => {
            let created = dash.create_lead(&args.into()).await?;
            println!("Created lead {}", created.lead.lead_id);
            // The process would exit before a background trigger is sent.
            if let Some(handle) = created.lead_magnet
                && let Err(e) = handle.await
            {
                tracing::warn!("Lead magnet task did not finish: {}", e);
            }
        }
        Command::Edit(args) => {
            let mut changed = false;
            for edits in args.sections() {
                if let Some(outcome) = dash.save_section(&args.lead_id, &edits).await? {
                    println!("{}", describe(outcome));
                    changed = true;
                }
            }
            if !changed {
                println!("No changes");
            }
        }
        Command::Trigger { lead_id, workflow } => {
            // The webhook only needs the id; lead fields are extra context.
            if let Err(e) = dash.refresh().await {
                tracing::warn!(lead_id = %lead_id, "Triggering without lead context: {}", e);
            }
            dash.trigger_workflow(&lead_id, workflow).await?;
            println!("{} triggered for {}", workflow.label(), lead_id);
        }
        Command::UploadTranscript { lead_id, path } => {
            let file = TranscriptFile::read(&path).await?;
            let ingested = dash.upload_transcript(&lead_id, file, Utc::now()).await?;
            println!("Transcript stored at {}", ingested.url);
        }
        Command::ExportTranscript { lead_id, out } => {
            let detail = dash.open_detail(&lead_id).await?;
            match TranscriptExport::for_lead(detail.lead(), Utc::now().date_naive()) {
                Some(export) => {
                    let path = export.write_to(&out).await?;
                    println!("Transcript saved to {}", path.display());
                }
                None => println!("Lead {lead_id} has no transcript"),
            }
        }
        Command::SetTranscript { lead_id, text } => {
            match dash.save_transcript_text(&lead_id, &text).await? {
                Some(outcome) => println!("{}", describe(outcome)),
                None => println!("No changes"),
            }
        }
        Command::CallCompleted { lead_id } => {
            let outcome = dash.toggle_call_completed(&lead_id).await?;
            let state = dash
                .detail()
                .is_some_and(|d| d.lead().discovery_call.call_completed);
            println!("Call completed: {state} ({})", describe(outcome));
        }
        Command::DealClosed { lead_id } => {
            let outcome = dash.toggle_deal_closed(&lead_id, Utc::now()).await?;
            let state = dash.detail().is_some_and(|d| d.lead().deal_closed);
            println!("Deal closed: {state} ({})", describe(outcome));
        }
        Command::CheckConfig => {
            let warnings = config.warnings();
            if warnings.is_empty() {
                println!("Configuration complete");
            }
            for warning in warnings {
                println!("{}: {}", warning.key, warning.message);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};
    use crate::leads::record::EditableField;
    use crate::leads::status::LeadStatus;
    use crate::leads::view::StatusFilter;
    use crate::workflows::WorkflowKind;

    #[test]
    fn list_parses_status_filter() {
        let cli =
            Cli::try_parse_from(["dcf-leads", "list", "--status", "in_progress", "-q", "ada"])
                .expect("parse");
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.status, StatusFilter::Only(LeadStatus::InProgress));
        assert_eq!(args.query, "ada");
    }

    #[test]
    fn trigger_parses_workflow_and_global_flags() {
        let cli = Cli::try_parse_from(["dcf-leads", "trigger", "L-1", "proposal", "--offline"])
            .expect("parse");
        assert!(cli.offline);
        assert!(matches!(
            cli.command,
            Command::Trigger { ref lead_id, workflow: WorkflowKind::Proposal } if lead_id == "L-1"
        ));
        assert!(Cli::try_parse_from(["dcf-leads", "trigger", "L-1", "invoice"]).is_err());
    }

    #[test]
    fn edit_splits_sections_and_keeps_blank_values() {
        let cli = Cli::try_parse_from([
            "dcf-leads",
            "edit",
            "L-1",
            "--contact-email",
            "new@example.test",
            "--company-website",
            "",
        ])
        .expect("parse");
        let Command::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        let [contact, company] = args.sections();
        assert_eq!(
            contact,
            vec![(EditableField::ContactEmail, "new@example.test".to_string())]
        );
        assert_eq!(company, vec![(EditableField::CompanyWebsite, String::new())]);
    }

    #[test]
    fn export_transcript_defaults_to_current_directory() {
        let cli = Cli::try_parse_from(["dcf-leads", "export-transcript", "L-1"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::ExportTranscript { ref lead_id, ref out }
                if lead_id == "L-1" && out.as_os_str() == "."
        ));
        let cli = Cli::try_parse_from(["dcf-leads", "export-transcript", "L-1", "--out", "/tmp/x"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::ExportTranscript { ref out, .. } if out.as_os_str() == "/tmp/x"
        ));
    }
}
