//! Shared runtime state for ff-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The state owns the
//! store and adapter objects the pipeline services are constructed over;
//! services themselves are built per request (they are thin borrows).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use ff_audit::AuditJournal;
use ff_config::{EffectiveConfig, RunMode};
use ff_pipeline::{BillingPlatform, IdentityProvider, Notifier, RegulatorClient, Store};
use ff_sandbox::{
    MemoryStore, RecordingNotifier, SandboxBilling, SandboxIdentityProvider, SandboxRegulator,
};

// ---------------------------------------------------------------------------
// BusMsg — SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events
/// on the admin stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    StatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    WebhookProcessed {
        submission_id: Uuid,
        kind: String,
        outcome: String,
    },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "ff-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub config: EffectiveConfig,
    pub store: Arc<dyn Store + Send + Sync>,
    pub regulator: Arc<dyn RegulatorClient + Send + Sync>,
    pub identity: Arc<dyn IdentityProvider + Send + Sync>,
    pub billing: Arc<dyn BillingPlatform + Send + Sync>,
    pub notifier: Arc<dyn Notifier + Send + Sync>,
    /// Webhook HMAC secret, resolved at boot from the env var the config
    /// names. `None` disables signature checks (sandbox only).
    pub webhook_secret: Option<Arc<Vec<u8>>>,
    /// Optional JSONL compliance journal.
    pub journal: Option<Arc<Mutex<AuditJournal>>>,
}

impl AppState {
    /// Sandbox wiring: in-memory store and fakes for every external system.
    pub fn sandbox(config: EffectiveConfig) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let journal = open_journal(&config);
        Self {
            bus,
            build: BuildInfo::default(),
            webhook_secret: read_webhook_secret(&config),
            store: Arc::new(MemoryStore::new()),
            regulator: Arc::new(SandboxRegulator::new()),
            identity: Arc::new(SandboxIdentityProvider::new()),
            billing: Arc::new(SandboxBilling::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            journal,
            config,
        }
    }

    /// Wire from config: sandbox fakes, or the durable Postgres store plus
    /// live HTTP connectors resolved through the injected endpoint table.
    pub async fn from_config(config: EffectiveConfig) -> anyhow::Result<Self> {
        match config.mode {
            RunMode::Sandbox => Ok(Self::sandbox(config)),
            RunMode::Live => {
                // Live mode persists through Postgres: orders, submissions,
                // the webhook inbox, and the activation queue must survive a
                // restart, and the status CAS must hold across processes.
                let pool = ff_db::connect_from_env().await?;
                let db = ff_db::status(&pool).await?;
                if !db.has_orders_table {
                    anyhow::bail!("database schema is absent; run `ff db migrate` first");
                }

                // Identity: an external provider when an endpoint is
                // configured, otherwise our own directory (unique-email
                // upsert in the datastore).
                let identity: Arc<dyn IdentityProvider + Send + Sync> =
                    if config.endpoints.contains_key("identity") {
                        Arc::new(ff_connect::HttpIdentityProvider::from_config(&config)?)
                    } else {
                        Arc::new(ff_db::PgIdentityDirectory::new(pool.clone()))
                    };

                let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
                let journal = open_journal(&config);
                Ok(Self {
                    bus,
                    build: BuildInfo::default(),
                    webhook_secret: read_webhook_secret(&config),
                    store: Arc::new(ff_db::PgStore::new(pool)),
                    regulator: Arc::new(ff_connect::HttpRegulatorClient::from_config(&config)?),
                    identity,
                    billing: Arc::new(ff_connect::HttpBillingPlatform::from_config(&config)?),
                    notifier: Arc::new(ff_connect::HttpNotifier::from_config(&config)?),
                    journal,
                    config,
                })
            }
        }
    }

    /// Append to the compliance journal, if one is configured. Journal
    /// trouble is logged and never fails the request.
    pub fn journal_append(&self, subject: &str, event_type: &str, payload: serde_json::Value) {
        if let Some(journal) = &self.journal {
            let mut journal = journal.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(err) = journal.append(subject, event_type, payload) {
                warn!(error = %err, "audit journal append failed");
            }
        }
    }
}

fn read_webhook_secret(config: &EffectiveConfig) -> Option<Arc<Vec<u8>>> {
    match std::env::var(&config.webhook_secret_env) {
        Ok(secret) if !secret.is_empty() => Some(Arc::new(secret.into_bytes())),
        _ => {
            warn!(
                env = %config.webhook_secret_env,
                "webhook secret not set; signature verification disabled"
            );
            None
        }
    }
}

fn open_journal(config: &EffectiveConfig) -> Option<Arc<Mutex<AuditJournal>>> {
    let path = config.audit_journal_path.as_ref()?;
    match AuditJournal::new(path, true) {
        Ok(journal) => Some(Arc::new(Mutex::new(journal))),
        Err(err) => {
            warn!(error = %err, path = %path, "cannot open audit journal; continuing without");
            None
        }
    }
}

/// Emit a heartbeat on the bus every `interval` so SSE consumers can detect
/// a dead daemon.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let _ = bus.send(BusMsg::Heartbeat {
                ts_millis: chrono::Utc::now().timestamp_millis(),
            });
        }
    });
}
