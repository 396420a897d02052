//! Workflow triggers against a real HTTP endpoint.
//!
//! Each test starts an Axum server on a random port that records every
//! webhook body it receives, then points the gateway at it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

use dcf_leads::cli::{self, Command};
use dcf_leads::config::{Config, StoreConfig, WorkflowConfig};
use dcf_leads::dashboard::Dashboard;
use dcf_leads::error::{Error, WorkflowError};
use dcf_leads::leads::NewLead;
use dcf_leads::store::Backend;
use dcf_leads::store::memory::MemoryStore;
use dcf_leads::workflows::{WorkflowGateway, WorkflowKind};

const TIMEOUT: Duration = Duration::from_secs(5);

type Captured = mpsc::UnboundedSender<(String, serde_json::Value)>;

async fn capture(
    State(tx): State<Captured>,
    Path(name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let _ = tx.send((name, body));
    StatusCode::OK
}

async fn slow(State(tx): State<Captured>, Json(body): Json<serde_json::Value>) -> StatusCode {
    tokio::time::sleep(Duration::from_millis(200)).await;
    let _ = tx.send(("slow".to_string(), body));
    StatusCode::OK
}

/// Start a webhook server; returns its address and the captured bodies.
type Received = mpsc::UnboundedReceiver<(String, serde_json::Value)>;

async fn start_hook_server() -> (SocketAddr, Received) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/hook/{name}", post(capture))
        .route("/slow", post(slow))
        .route(
            "/broken",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        )
        .with_state(tx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve webhooks");
    });
    (addr, rx)
}

fn hook(addr: SocketAddr, path: &str) -> Option<Url> {
    Some(Url::parse(&format!("http://{addr}{path}")).expect("hook url"))
}

fn workflows(addr: SocketAddr) -> WorkflowConfig {
    WorkflowConfig {
        lead_magnet: hook(addr, "/hook/lead-magnet"),
        discovery_call: hook(addr, "/broken"),
        proposal: hook(addr, "/hook/proposal"),
    }
}

fn config(workflows: &WorkflowConfig) -> Config {
    Config {
        store: StoreConfig {
            url: None,
            anon_key: None,
            table: "dcf_leads".to_string(),
            transcript_bucket: "dcf_transcript".to_string(),
            fetch_limit: 100,
        },
        workflows: workflows.clone(),
    }
}

fn dashboard(store: &Arc<MemoryStore>, workflows: WorkflowConfig) -> Dashboard {
    let config = config(&workflows);
    let gateway = WorkflowGateway::new(workflows).expect("gateway");
    Dashboard::new(&Backend::in_memory(store.clone()), gateway, &config)
}

fn submission() -> NewLead {
    NewLead {
        contact_name: "Grace Hopper".to_string(),
        contact_email: "grace@navy.test".to_string(),
        contact_phone: "555-0100".to_string(),
        contact_linkedin: "https://linkedin.com/in/grace".to_string(),
        company_name: "Navy".to_string(),
        company_linkedin: Some("".to_string()),
        company_website: None,
    }
}

#[tokio::test]
async fn proposal_trigger_sends_transcript_context() {
    let (addr, mut received) = start_hook_server().await;
    let store = Arc::new(MemoryStore::new());
    let mut dash = dashboard(&store, workflows(addr));

    let created = dash.create_lead(&submission()).await.expect("create");
    let lead_id = created.lead.lead_id.clone();
    if let Some(handle) = created.lead_magnet {
        handle.await.expect("lead magnet task");
    }
    let (name, body) = timeout(TIMEOUT, received.recv())
        .await
        .expect("lead magnet webhook in time")
        .expect("captured");
    assert_eq!(name, "lead-magnet");
    assert_eq!(body, serde_json::json!({ "lead_id": lead_id }));

    let mut with_transcript = store.lead(&lead_id).expect("stored");
    with_transcript.discovery_call.call_transcript_url =
        Some("https://files.test/call.txt".to_string());
    with_transcript.discovery_call.call_transcript = Some("Budget approved.".to_string());
    store.upsert_external(with_transcript);
    dash.refresh().await.expect("refresh");

    dash.trigger_workflow(&lead_id, WorkflowKind::Proposal)
        .await
        .expect("proposal trigger");
    let (name, body) = timeout(TIMEOUT, received.recv())
        .await
        .expect("proposal webhook in time")
        .expect("captured");
    assert_eq!(name, "proposal");
    assert_eq!(
        body,
        serde_json::json!({
            "lead_id": lead_id,
            "dc_call_transcript_url": "https://files.test/call.txt",
            "dc_call_transcript": "Budget approved.",
        })
    );
}

#[tokio::test]
async fn proposal_without_transcript_sends_only_the_id() {
    let (addr, mut received) = start_hook_server().await;
    let gateway = WorkflowGateway::new(workflows(addr)).expect("gateway");

    gateway
        .trigger("L-77", WorkflowKind::Proposal, None)
        .await
        .expect("trigger");
    let (_, body) = timeout(TIMEOUT, received.recv())
        .await
        .expect("in time")
        .expect("captured");
    assert_eq!(body, serde_json::json!({ "lead_id": "L-77" }));
}

#[tokio::test]
async fn rejected_trigger_reports_status_and_clears_busy_flag() {
    let (addr, _received) = start_hook_server().await;
    let store = Arc::new(MemoryStore::new());
    let dash = dashboard(&store, workflows(addr));

    let err = dash
        .trigger_workflow("L-1", WorkflowKind::DiscoveryCall)
        .await
        .expect_err("503 must fail");
    let WorkflowError::Dispatch { status, ref reason } = err else {
        panic!("expected dispatch error, got {err:?}");
    };
    assert_eq!(status, 503);
    assert_eq!(reason, "Service Unavailable");
    assert_eq!(err.to_string(), "Webhook request failed: 503 Service Unavailable");
    assert!(!dash.busy().is_busy("L-1", WorkflowKind::DiscoveryCall));
}

#[tokio::test]
async fn concurrent_trigger_for_same_lead_is_refused() {
    let (addr, mut received) = start_hook_server().await;
    let store = Arc::new(MemoryStore::new());
    let dash = dashboard(
        &store,
        WorkflowConfig {
            proposal: hook(addr, "/slow"),
            ..WorkflowConfig::default()
        },
    );

    let (first, second) = tokio::join!(
        dash.trigger_workflow("L-1", WorkflowKind::Proposal),
        dash.trigger_workflow("L-1", WorkflowKind::Proposal),
    );
    first.expect("first trigger");
    assert!(matches!(
        second,
        Err(WorkflowError::AlreadyRunning { ref lead_id, .. }) if lead_id == "L-1"
    ));
    assert!(!dash.busy().is_busy("L-1", WorkflowKind::Proposal));

    let (name, _) = timeout(TIMEOUT, received.recv())
        .await
        .expect("in time")
        .expect("captured");
    assert_eq!(name, "slow");
    assert!(received.try_recv().is_err());
}

#[tokio::test]
async fn missing_webhook_url_fails_without_request() {
    let (_addr, mut received) = start_hook_server().await;
    let store = Arc::new(MemoryStore::new());
    let dash = dashboard(&store, WorkflowConfig::default());

    let created = dash.create_lead(&submission()).await.expect("create");
    assert!(created.lead_magnet.is_none());

    let err = dash
        .trigger_workflow(&created.lead.lead_id, WorkflowKind::LeadMagnet)
        .await
        .expect_err("not configured");
    assert_eq!(err.to_string(), "Webhook URL for Lead Magnet is not configured");
    assert!(received.try_recv().is_err());
}

#[tokio::test]
async fn trigger_works_while_store_is_unconfigured() {
    let (addr, mut received) = start_hook_server().await;
    let workflows = workflows(addr);
    let config = config(&workflows);
    let gateway = WorkflowGateway::new(workflows).expect("gateway");
    let backend = Backend::unconfigured("store settings missing");
    let mut dash = Dashboard::new(&backend, gateway, &config);
    assert!(dash.banner().is_visible());

    cli::execute(
        &mut dash,
        &config,
        Command::Trigger {
            lead_id: "L-9".to_string(),
            workflow: WorkflowKind::Proposal,
        },
    )
    .await
    .expect("trigger without store");
    let (name, body) = timeout(TIMEOUT, received.recv())
        .await
        .expect("in time")
        .expect("captured");
    assert_eq!(name, "proposal");
    assert_eq!(body, serde_json::json!({ "lead_id": "L-9" }));

    let err = cli::execute(&mut dash, &config, Command::Show { lead_id: "L-9".to_string() })
        .await
        .expect_err("store operations still fail");
    assert!(matches!(err, Error::Database(_)));
}
