//! Live HTTP adapters for the pipeline's external collaborators.
//!
//! Each client resolves its endpoint from the injected configuration map and
//! applies the configured call timeout. Transport failures and non-success
//! statuses fold into retryable [`PipelineError::External`]; a timeout is a
//! retry signal, never a definitive rejection. The vendors' wire formats are
//! treated as opaque request/response contracts.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::warn;

use ff_config::EffectiveConfig;
use ff_pipeline::{
    AccountCreateOutcome, BillingPlatform, IdentityProvider, Notifier, PipelineError,
    PipelineResult, RegistrationRequest, RegistrationResponse, RegulatorClient,
    SubscriptionRequest,
};
use ff_schemas::{CustomerAccount, Notification};

/// Env var holding the regulator API bearer token.
pub const ENV_REGULATOR_API_KEY: &str = "FF_REGULATOR_API_KEY";

fn build_http(cfg: &EffectiveConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_millis(cfg.timeouts.external_call_ms))
        .build()
        .context("build http client")
}

fn transport_error(service: &'static str, err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::external(service, "request timed out")
    } else {
        PipelineError::external(service, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Regulator
// ---------------------------------------------------------------------------

pub struct HttpRegulatorClient {
    http: Client,
    endpoint: String,
    provider_license: String,
    bearer: Option<String>,
}

impl HttpRegulatorClient {
    pub fn from_config(cfg: &EffectiveConfig) -> Result<Self> {
        Ok(Self {
            http: build_http(cfg)?,
            endpoint: cfg.endpoint("regulator")?.to_string(),
            provider_license: cfg.provider.license_number.clone(),
            bearer: std::env::var(ENV_REGULATOR_API_KEY).ok(),
        })
    }
}

impl RegulatorClient for HttpRegulatorClient {
    fn register_subscriber(
        &self,
        request: &RegistrationRequest,
    ) -> PipelineResult<RegistrationResponse> {
        let mut req = self
            .http
            .post(&self.endpoint)
            .header("X-Provider-License", &self.provider_license)
            .json(request);
        if let Some(bearer) = &self.bearer {
            req = req.bearer_auth(bearer);
        }

        let resp = req.send().map_err(|e| transport_error("regulator", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::external(
                "regulator",
                format!("registration endpoint returned http {status}"),
            ));
        }
        resp.json::<RegistrationResponse>()
            .map_err(|e| transport_error("regulator", e))
    }
}

// ---------------------------------------------------------------------------
// Billing platform
// ---------------------------------------------------------------------------

pub struct HttpBillingPlatform {
    http: Client,
    endpoint: String,
}

impl HttpBillingPlatform {
    pub fn from_config(cfg: &EffectiveConfig) -> Result<Self> {
        Ok(Self {
            http: build_http(cfg)?,
            endpoint: cfg.endpoint("billing")?.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubscriptionWire {
    subscription_id: String,
}

impl BillingPlatform for HttpBillingPlatform {
    fn create_subscription(&self, request: &SubscriptionRequest) -> PipelineResult<String> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|e| transport_error("billing", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::external(
                "billing",
                format!("subscription endpoint returned http {status}"),
            ));
        }
        let wire: SubscriptionWire = resp.json().map_err(|e| transport_error("billing", e))?;
        Ok(wire.subscription_id)
    }
}

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

pub struct HttpIdentityProvider {
    http: Client,
    endpoint: String,
}

impl HttpIdentityProvider {
    pub fn from_config(cfg: &EffectiveConfig) -> Result<Self> {
        Ok(Self {
            http: build_http(cfg)?,
            endpoint: cfg.endpoint("identity")?.to_string(),
        })
    }
}

#[derive(serde::Serialize)]
struct CreateAccountWire<'a> {
    email: &'a str,
    full_name: &'a str,
    temporary_credential: &'a str,
}

impl IdentityProvider for HttpIdentityProvider {
    fn find_account(&self, email: &str) -> PipelineResult<Option<CustomerAccount>> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("email", email)])
            .send()
            .map_err(|e| transport_error("identity", e))?;

        let status = resp.status();
        if status.is_success() {
            resp.json::<CustomerAccount>()
                .map(Some)
                .map_err(|e| transport_error("identity", e))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(PipelineError::external(
                "identity",
                format!("account lookup returned http {status}"),
            ))
        }
    }

    fn create_account(
        &self,
        email: &str,
        full_name: &str,
        temporary_credential: &str,
    ) -> PipelineResult<AccountCreateOutcome> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&CreateAccountWire {
                email,
                full_name,
                temporary_credential,
            })
            .send()
            .map_err(|e| transport_error("identity", e))?;

        let status = resp.status();
        if status.is_success() {
            resp.json::<CustomerAccount>()
                .map(AccountCreateOutcome::Created)
                .map_err(|e| transport_error("identity", e))
        } else if status == reqwest::StatusCode::CONFLICT {
            // Unique-email violation: somebody created it first. Fetch and
            // continue — this is convergence, not an error.
            let existing = self.find_account(email)?.ok_or_else(|| {
                PipelineError::external(
                    "identity",
                    "create conflicted but account not found on re-read",
                )
            })?;
            Ok(AccountCreateOutcome::AlreadyExists(existing))
        } else {
            Err(PipelineError::external(
                "identity",
                format!("account create returned http {status}"),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub struct HttpNotifier {
    http: Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn from_config(cfg: &EffectiveConfig) -> Result<Self> {
        Ok(Self {
            http: build_http(cfg)?,
            endpoint: cfg.endpoint("notify")?.to_string(),
        })
    }
}

impl Notifier for HttpNotifier {
    fn send(&self, notification: &Notification) -> PipelineResult<()> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(notification)
            .send()
            .map_err(|e| transport_error("notify", e))?;
        if !resp.status().is_success() {
            warn!(
                template = %notification.template,
                status = %resp.status(),
                "notification trigger refused"
            );
            return Err(PipelineError::external(
                "notify",
                format!("notify endpoint returned http {}", resp.status()),
            ));
        }
        Ok(())
    }
}
