//! Regulatory submission service.
//!
//! Files a subscriber registration with the external authority using the KYC
//! extract alone — no manual re-entry. All-or-nothing: completeness
//! validation and the regulator call both happen *before* anything is
//! written, so a failed attempt leaves no ledger row to clean up.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use ff_risk::RiskTier;
use ff_schemas::{
    is_valid_iccid, Address, ExtractedIdentityData, KycVerificationResult, RegulatorySubmission,
    SubmissionReceipt, SubmissionStatus,
};

use crate::adapters::{
    RegistrationRequest, RegulatorClient, ServiceLine, SubscriberDetails, VerificationMetadata,
};
use crate::error::{PipelineError, PipelineResult};
use crate::store::Store;

pub struct SubmissionService<'a> {
    store: &'a dyn Store,
    regulator: &'a dyn RegulatorClient,
    provider_name: String,
    provider_license: String,
}

impl<'a> SubmissionService<'a> {
    pub fn new(
        store: &'a dyn Store,
        regulator: &'a dyn RegulatorClient,
        provider_name: impl Into<String>,
        provider_license: impl Into<String>,
    ) -> Self {
        Self {
            store,
            regulator,
            provider_name: provider_name.into(),
            provider_license: provider_license.into(),
        }
    }

    /// File the registration for `order_id` from the extract owned by
    /// `kyc_session_id`, covering `device_ids`.
    ///
    /// Re-invoking after a previous successful filing returns the existing
    /// receipt (idempotent). A previously *rejected* filing does not block a
    /// fresh attempt.
    pub fn submit(
        &self,
        kyc_session_id: Uuid,
        order_id: Uuid,
        device_ids: &[String],
        now: DateTime<Utc>,
    ) -> PipelineResult<SubmissionReceipt> {
        let session = self
            .store
            .load_kyc_session(kyc_session_id)?
            .ok_or_else(|| {
                PipelineError::Validation(format!("unknown kyc session {kyc_session_id}"))
            })?;

        let address = validate_completeness(&session.extracted_data)?;
        validate_device_ids(device_ids)?;

        // Risk gate: the filing is gated on the scoring engine. Low tier
        // files straight through; medium tier needs a compliance reviewer's
        // approval on the session first; high tier never files.
        let breakdown = ff_risk::score(&session.extracted_data);
        match breakdown.risk_tier {
            RiskTier::Low => {}
            RiskTier::Medium => {
                if session.verification_result != Some(KycVerificationResult::Approved) {
                    return Err(PipelineError::Validation(
                        "medium risk tier: held for compliance review before filing".to_string(),
                    ));
                }
            }
            RiskTier::High => {
                return Err(PipelineError::Validation(
                    "high risk tier: registration declined".to_string(),
                ));
            }
        }

        let order = self
            .store
            .load_order(order_id)?
            .ok_or_else(|| PipelineError::FatalData(format!("order {order_id} not found")))?;

        // One active submission per activation attempt: a Submitted or
        // Approved filing already covers this order.
        if let Some(existing) = self.store.find_submission_by_order(order_id)? {
            if existing.status != SubmissionStatus::Rejected {
                info!(
                    order_id = %order_id,
                    submission_id = %existing.id,
                    status = existing.status.as_str(),
                    "submission already filed; returning existing receipt"
                );
                return Ok(SubmissionReceipt {
                    submission_id: existing.id,
                    regulator_tracking_id: existing.regulator_tracking_id,
                });
            }
            warn!(
                order_id = %order_id,
                submission_id = %existing.id,
                "previous filing was rejected; filing a fresh registration"
            );
        }

        let data = &session.extracted_data;
        let request = RegistrationRequest {
            subscriber: SubscriberDetails {
                id_number: data.id_number.clone(),
                full_name: data.full_name.clone(),
                date_of_birth: data.date_of_birth,
            },
            address,
            service_lines: device_ids
                .iter()
                .map(|id| ServiceLine {
                    device_identifier: id.clone(),
                    product_name: order.package_name.clone(),
                })
                .collect(),
            provider_name: self.provider_name.clone(),
            provider_license: self.provider_license.clone(),
            verification: VerificationMetadata {
                method: data.verification_method.clone(),
                verified_at: data.verification_timestamp,
                session_id: kyc_session_id,
            },
        };

        // The regulator call comes before any write. If it fails the caller
        // retries the whole submission; there is no half-written row.
        let response = self.regulator.register_subscriber(&request)?;

        let submission = RegulatorySubmission {
            id: Uuid::new_v4(),
            order_id,
            kyc_session_id,
            device_identifiers: device_ids.to_vec(),
            regulator_tracking_id: response.tracking_id.clone(),
            status: SubmissionStatus::Submitted,
            rejection_reason: None,
            submitted_at: now,
            updated_at: now,
        };
        self.store.insert_submission(&submission)?;

        info!(
            order_id = %order_id,
            submission_id = %submission.id,
            tracking_id = %response.tracking_id,
            "regulatory registration filed"
        );

        Ok(SubmissionReceipt {
            submission_id: submission.id,
            regulator_tracking_id: response.tracking_id,
        })
    }
}

/// Completeness precondition for filing. Failing any check refuses the whole
/// submission with "incomplete data" and writes nothing. Returns the
/// verified address so the caller never touches an unvalidated one.
fn validate_completeness(data: &ExtractedIdentityData) -> PipelineResult<Address> {
    if data.id_number.trim().is_empty() {
        return Err(PipelineError::Validation(
            "incomplete data: id_number is missing".to_string(),
        ));
    }

    let address = match &data.proof_of_address {
        None => {
            return Err(PipelineError::Validation(
                "incomplete data: proof of address is missing".to_string(),
            ))
        }
        Some(poa) if !poa.verified => {
            return Err(PipelineError::Validation(
                "incomplete data: proof of address is not verified".to_string(),
            ))
        }
        Some(poa) => poa.address.clone(),
    };

    if let Some(company) = &data.company {
        if company.registration_number.trim().is_empty() {
            return Err(PipelineError::Validation(
                "incomplete data: company registration number is missing".to_string(),
            ));
        }
        if company.directors.is_empty() {
            return Err(PipelineError::Validation(
                "incomplete data: business account has no directors on record".to_string(),
            ));
        }
    }

    Ok(address)
}

fn validate_device_ids(device_ids: &[String]) -> PipelineResult<()> {
    if device_ids.is_empty() {
        return Err(PipelineError::Validation(
            "incomplete data: no device identifiers supplied".to_string(),
        ));
    }
    for id in device_ids {
        if !is_valid_iccid(id) {
            return Err(PipelineError::Validation(format!(
                "invalid device identifier '{id}': expected 19-20 digit ICCID"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ff_schemas::{Address, DocumentAuthenticity, ProofOfAddress};

    fn extract() -> ExtractedIdentityData {
        ExtractedIdentityData {
            id_number: "8001015009087".to_string(),
            full_name: "John Michael Doe".to_string(),
            date_of_birth: None,
            proof_of_address: Some(ProofOfAddress {
                verified: true,
                document_date: None,
                address: Address {
                    street: "123 Main Street".to_string(),
                    suburb: "Gardens".to_string(),
                    city: "Cape Town".to_string(),
                    province: "Western Cape".to_string(),
                    postal_code: "8001".to_string(),
                    country: "South Africa".to_string(),
                },
            }),
            liveness_score: Some(0.95),
            document_authenticity: DocumentAuthenticity::Valid,
            aml_flags: vec![],
            sanctions_match: false,
            pep_match: false,
            verification_timestamp: Utc.with_ymd_and_hms(2025, 11, 1, 10, 0, 0).unwrap(),
            verification_method: "biometric".to_string(),
            company: None,
        }
    }

    #[test]
    fn empty_id_number_is_incomplete() {
        let mut data = extract();
        data.id_number = "".to_string();
        let err = validate_completeness(&data).unwrap_err();
        assert!(err.to_string().contains("incomplete data"), "{err}");
    }

    #[test]
    fn unverified_proof_of_address_is_incomplete() {
        let mut data = extract();
        data.proof_of_address.as_mut().unwrap().verified = false;
        assert!(validate_completeness(&data).is_err());
    }

    #[test]
    fn business_without_directors_is_incomplete() {
        let mut data = extract();
        data.company = Some(ff_schemas::CompanyRegistration {
            registration_number: "2019/123456/07".to_string(),
            company_name: "Example Trading (Pty) Ltd".to_string(),
            verified: true,
            directors: vec![],
        });
        let err = validate_completeness(&data).unwrap_err();
        assert!(err.to_string().contains("directors"), "{err}");
    }

    #[test]
    fn device_ids_must_be_present_and_iccid_shaped() {
        assert!(validate_device_ids(&[]).is_err());
        assert!(validate_device_ids(&["8927123456789012345".to_string()]).is_ok());
        assert!(validate_device_ids(&["not-an-iccid".to_string()]).is_err());
    }

    #[test]
    fn complete_extract_passes() {
        assert!(validate_completeness(&extract()).is_ok());
    }
}
