use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dcf_leads::cli::{self, Cli};
use dcf_leads::config::Config;
use dcf_leads::dashboard::Dashboard;
use dcf_leads::settings::{Settings, default_settings_path};
use dcf_leads::store::{self, Backend, memory::MemoryStore};
use dcf_leads::workflows::WorkflowGateway;

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dcf_leads=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    let config = Config::resolve(&settings).context("resolving configuration")?;

    let backend = if cli.offline {
        tracing::info!("Offline mode: using in-memory store");
        Backend::in_memory(Arc::new(MemoryStore::new()))
    } else if config.store.is_configured() {
        store::connect_from_config(&config.store).context("connecting to store")?
    } else {
        Backend::unconfigured("set SUPABASE_URL and SUPABASE_ANON_KEY, or pass --offline")
    };
    let gateway = WorkflowGateway::new(config.workflows.clone())?;

    let mut dashboard = Dashboard::new(&backend, gateway, &config);
    cli::execute(&mut dashboard, &config, cli.command).await?;
    Ok(())
}
