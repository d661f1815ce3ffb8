//! ff — operational CLI for the activation platform.
//!
//! Database lifecycle (migrate with a mid-activation guardrail, status),
//! config hashing, audit journal verification, and webhook replay for
//! backfill after an outage.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;

use ff_schemas::RegulatorEvent;

#[derive(Parser)]
#[command(name = "ff")]
#[command(about = "FibreFlow activation platform CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Validate a config file and print its canonical hash
    ConfigHash {
        /// Path to the YAML config
        path: String,
    },

    /// Audit journal utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Webhook utilities
    Webhook {
        #[command(subcommand)]
        cmd: WebhookCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while any order is mid
    /// activation unless --yes is provided.
    Migrate {
        /// Acknowledge migrating a database with in-flight activations.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a journal file.
    Verify {
        /// Path to the JSONL journal
        path: String,
    },
}

#[derive(Subcommand)]
enum WebhookCmd {
    /// Re-post a recorded regulator event (backfill after an outage).
    /// The event file is validated strictly before anything is sent; the
    /// daemon's idempotent processor makes replays safe.
    Replay {
        /// Path to a JSON file holding one regulator event
        path: String,

        /// Daemon webhook endpoint
        #[arg(long, default_value = "http://127.0.0.1:8790/v1/webhooks/regulator")]
        url: String,

        /// Env var holding the webhook signing secret
        #[arg(long, default_value = "FF_REGULATOR_WEBHOOK_SECRET")]
        secret_env: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => {
                let pool = ff_db::connect_from_env().await?;
                let st = ff_db::status(&pool).await?;
                println!("connectivity: {}", if st.ok { "ok" } else { "FAILED" });
                println!("orders table: {}", if st.has_orders_table { "present" } else { "absent" });
            }
            DbCmd::Migrate { yes } => {
                let pool = ff_db::connect_from_env().await?;
                let in_flight = ff_db::count_orders_mid_activation(&pool).await?;
                if in_flight > 0 && !yes {
                    bail!(
                        "{in_flight} order(s) are mid-activation; re-run with --yes to migrate anyway"
                    );
                }
                ff_db::migrate(&pool).await?;
                println!("migrations applied");
            }
        },

        Commands::ConfigHash { path } => {
            let cfg = ff_config::EffectiveConfig::load_yaml(&path)?;
            println!("{}", cfg.config_hash()?);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match ff_audit::verify_hash_chain(&path)? {
                ff_audit::VerifyResult::Valid { lines } => {
                    println!("chain valid ({lines} entries)");
                }
                ff_audit::VerifyResult::Broken { line, reason } => {
                    bail!("chain broken at line {line}: {reason}");
                }
            },
        },

        Commands::Webhook { cmd } => match cmd {
            WebhookCmd::Replay {
                path,
                url,
                secret_env,
            } => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("read event file {path}"))?;
                // Strict parse before sending: a malformed recording is a
                // caller error, not something to fling at the daemon.
                let event: RegulatorEvent =
                    serde_json::from_str(&raw).context("event file is not a known event kind")?;

                let body = serde_json::to_string(&event)?;
                let mut req = reqwest::Client::new().post(&url).body(body.clone());
                req = req.header("content-type", "application/json");
                if let Ok(secret) = std::env::var(&secret_env) {
                    let signature =
                        ff_connect::compute_signature(secret.as_bytes(), body.as_bytes());
                    req = req.header("x-regulator-signature", signature);
                }

                let resp = req.send().await.context("replay request failed")?;
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                println!(
                    "replayed {} event for submission {}: http {status} {text}",
                    event.kind(),
                    event.submission_id()
                );
                if !status.is_success() {
                    bail!("daemon refused the replay");
                }
            }
        },
    }

    Ok(())
}
