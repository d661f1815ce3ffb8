//! ff-config
//!
//! Effective configuration for the activation pipeline. The integration
//! endpoint table (slug → handler URL) is part of the config and is injected
//! into the submission/replay components — there is no hidden global
//! registry, which also makes replay/backfill trivially testable.
//!
//! Secrets never live in config files: only the *names* of environment
//! variables do. A scan over every leaf string aborts loading when a value
//! looks like an embedded credential.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // Stripe / OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

/// Integration slugs a live deployment must always resolve through the
/// endpoint table. "identity" is deliberately absent: without one the
/// platform uses its own customer directory in the datastore.
pub const REQUIRED_LIVE_ENDPOINTS: &[&str] = &["regulator", "billing", "notify"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Deterministic in-memory fakes for every external system.
    Sandbox,
    /// Real HTTP connectors resolved through the endpoint table.
    Live,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Sandbox => "SANDBOX",
            RunMode::Live => "LIVE",
        }
    }
}

/// Who we are when filing with the regulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub name: String,
    /// ECNS license number quoted on every regulatory filing.
    pub license_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSettings {
    pub currency: String,
    /// VAT in basis points (1500 = 15%).
    pub vat_rate_bps: i64,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            currency: "ZAR".to_string(),
            vat_rate_bps: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Applied to every outbound call (regulator, billing, identity).
    /// A timeout is retryable, never a definitive rejection.
    pub external_call_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            external_call_ms: 10_000,
        }
    }
}

/// The effective, validated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub mode: RunMode,
    /// Integration slug → handler URL. Injected wherever an external call is
    /// made; nothing resolves endpoints any other way.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub timeouts: Timeouts,
    pub provider: ProviderIdentity,
    #[serde(default)]
    pub billing: BillingSettings,
    /// Name of the env var holding the webhook HMAC secret. The value itself
    /// never appears in config.
    pub webhook_secret_env: String,
    /// JSONL audit journal path; None disables file journaling.
    #[serde(default)]
    pub audit_journal_path: Option<String>,
}

impl EffectiveConfig {
    /// Sandbox defaults used by tests and the CLI when no file is given.
    pub fn sandbox_defaults() -> Self {
        Self {
            mode: RunMode::Sandbox,
            endpoints: BTreeMap::new(),
            timeouts: Timeouts::default(),
            provider: ProviderIdentity {
                name: "FibreFlow Networks (Pty) Ltd".to_string(),
                license_number: "ECNS/001/2024".to_string(),
            },
            billing: BillingSettings::default(),
            webhook_secret_env: "FF_REGULATOR_WEBHOOK_SECRET".to_string(),
            audit_journal_path: None,
        }
    }

    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read config {:?}", path.as_ref()))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw).context("parse config yaml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Structural validation + secret scan. Run on every load.
    pub fn validate(&self) -> Result<()> {
        if self.mode == RunMode::Live {
            for slug in REQUIRED_LIVE_ENDPOINTS {
                if !self.endpoints.contains_key(*slug) {
                    bail!("LIVE mode requires an endpoint for integration '{slug}'");
                }
            }
        }
        if self.timeouts.external_call_ms == 0 {
            bail!("external_call_ms must be non-zero");
        }
        self.scan_for_secrets()
    }

    /// Resolve one integration endpoint. Absence is a config error, not a
    /// fallback to some default URL.
    pub fn endpoint(&self, slug: &str) -> Result<&str> {
        self.endpoints
            .get(slug)
            .map(String::as_str)
            .with_context(|| format!("no endpoint configured for integration '{slug}'"))
    }

    /// SHA-256 over the canonical (sorted-key, compact) JSON form. Recorded
    /// in the journal so runs can be tied to the exact config they used.
    pub fn config_hash(&self) -> Result<String> {
        let raw = serde_json::to_value(self).context("serialize config")?;
        let canonical =
            serde_json::to_string(&sort_keys(&raw)).context("canonicalize config json")?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Abort if any leaf string looks like an embedded credential.
    pub fn scan_for_secrets(&self) -> Result<()> {
        let raw = serde_json::to_value(self).context("serialize config")?;
        let mut offending = Vec::new();
        scan_value("", &raw, &mut offending);
        if !offending.is_empty() {
            bail!(
                "CONFIG_SECRET_DETECTED: secret-like values at {}; move them to env vars",
                offending.join(", ")
            );
        }
        Ok(())
    }
}

fn scan_value(pointer: &str, v: &Value, offending: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                scan_value(&format!("{pointer}/{k}"), child, offending);
            }
        }
        Value::Array(arr) => {
            for (i, child) in arr.iter().enumerate() {
                scan_value(&format!("{pointer}/{i}"), child, offending);
            }
        }
        Value::String(s) => {
            if SECRET_PREFIXES.iter().any(|p| s.starts_with(p)) {
                offending.push(pointer.to_string());
            }
        }
        _ => {}
    }
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE_YAML: &str = r#"
mode: live
endpoints:
  regulator: "https://rica.example.gov.za/v1/registrations"
  billing: "https://billing.example.com/api/v1/subscriptions"
  identity: "https://identity.example.com/api/v1/accounts"
  notify: "https://notify.internal/api/v1/send"
provider:
  name: "FibreFlow Networks (Pty) Ltd"
  license_number: "ECNS/001/2024"
webhook_secret_env: "FF_REGULATOR_WEBHOOK_SECRET"
"#;

    #[test]
    fn live_yaml_loads_with_defaults_applied() {
        let cfg = EffectiveConfig::from_yaml_str(LIVE_YAML).unwrap();
        assert_eq!(cfg.mode, RunMode::Live);
        assert_eq!(cfg.billing.currency, "ZAR");
        assert_eq!(cfg.billing.vat_rate_bps, 1500);
        assert_eq!(cfg.timeouts.external_call_ms, 10_000);
        assert_eq!(
            cfg.endpoint("regulator").unwrap(),
            "https://rica.example.gov.za/v1/registrations"
        );
    }

    #[test]
    fn live_mode_requires_every_integration_endpoint() {
        let yaml = LIVE_YAML.replace("  billing: \"https://billing.example.com/api/v1/subscriptions\"\n", "");
        let err = EffectiveConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("billing"), "{err}");
    }

    #[test]
    fn embedded_secret_aborts_load() {
        let yaml = LIVE_YAML.replace(
            "FF_REGULATOR_WEBHOOK_SECRET",
            "sk_live_abcdef0123456789",
        );
        let err = EffectiveConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("CONFIG_SECRET_DETECTED"), "{err}");
    }

    #[test]
    fn config_hash_is_stable_and_sensitive() {
        let a = EffectiveConfig::from_yaml_str(LIVE_YAML).unwrap();
        let b = EffectiveConfig::from_yaml_str(LIVE_YAML).unwrap();
        assert_eq!(a.config_hash().unwrap(), b.config_hash().unwrap());

        let mut c = a.clone();
        c.timeouts.external_call_ms = 5_000;
        assert_ne!(a.config_hash().unwrap(), c.config_hash().unwrap());
    }

    #[test]
    fn sandbox_defaults_validate() {
        let cfg = EffectiveConfig::sandbox_defaults();
        cfg.validate().unwrap();
        assert!(cfg.endpoints.is_empty());
    }

    #[test]
    fn missing_endpoint_is_an_error_not_a_fallback() {
        let cfg = EffectiveConfig::sandbox_defaults();
        assert!(cfg.endpoint("regulator").is_err());
    }
}
