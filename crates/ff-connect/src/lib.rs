//! ff-connect
//!
//! Live HTTP adapters (regulator, billing platform, identity provider,
//! notification trigger) plus webhook signature verification. The only crate
//! that speaks the network in production; sandbox mode never loads it.

mod clients;
mod signature;

pub use clients::{
    HttpBillingPlatform, HttpIdentityProvider, HttpNotifier, HttpRegulatorClient,
    ENV_REGULATOR_API_KEY,
};
pub use signature::{compute_signature, verify_signature};
