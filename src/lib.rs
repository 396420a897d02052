//! dcf-leads: client core for a lead pipeline dashboard.
//!
//! Leads live in a hosted table that external automation keeps updating.
//! This crate holds a live replica of that table, derives each lead's
//! pipeline status, filters the list, triggers the automation workflows and
//! ingests discovery-call transcripts.
//!
//! - [`leads`]: records, status derivation, reconciliation, filtering
//! - [`store`]: table and object storage collaborators
//! - [`realtime`]: row-change subscriptions
//! - [`workflows`]: webhook triggers and busy flags
//! - [`transcript`]: transcript validation, normalization and upload
//! - [`dashboard`]: the single-owner event loop tying them together

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod leads;
pub mod realtime;
pub mod settings;
pub mod store;
pub mod transcript;
pub mod workflows;

pub use config::Config;
pub use error::{Error, Result};
pub use settings::Settings;
