//! Risk scoring over an identity-verification extract.
//!
//! Pure deterministic logic, no I/O: the same extract always produces the
//! same breakdown. The AML veto is an explicit short-circuit — a sanctions
//! or PEP match zeroes the factor before any flag counting runs, so future
//! re-weighting of the bands can never re-admit a sanctioned match.

use ff_schemas::{DocumentAuthenticity, ExtractedIdentityData};

use crate::types::{RiskScoreBreakdown, RiskTier, DOCUMENT_MAX_POINTS, LIVENESS_MAX_POINTS};

/// Liveness factor: banded on the verifier's confidence score.
///
/// Fails closed: below 0.6, or when the check did not run at all (`None`),
/// the factor contributes nothing.
pub fn liveness_points(score: Option<f64>) -> u32 {
    match score {
        Some(s) if s >= 0.9 => LIVENESS_MAX_POINTS,
        Some(s) if s >= 0.8 => 35,
        Some(s) if s >= 0.7 => 25,
        Some(s) if s >= 0.6 => 15,
        _ => 0,
    }
}

/// Document factor: driven by the authenticity verdict, demoted when a
/// sub-check (proof of address, or the company registration for business
/// accounts) explicitly failed while the overall verdict stayed Valid.
pub fn document_points(data: &ExtractedIdentityData) -> u32 {
    match data.document_authenticity {
        DocumentAuthenticity::Valid => {
            let sub_check_failed = data
                .proof_of_address
                .as_ref()
                .is_some_and(|poa| !poa.verified)
                || data.company.as_ref().is_some_and(|c| !c.verified);
            if sub_check_failed {
                20
            } else {
                DOCUMENT_MAX_POINTS
            }
        }
        DocumentAuthenticity::Suspicious => 15,
        DocumentAuthenticity::Invalid => 0,
    }
}

/// AML factor. Sanctions or PEP matches are a hard veto: zero points
/// regardless of every other signal. Otherwise banded on the flag count.
pub fn aml_points(data: &ExtractedIdentityData) -> u32 {
    if data.sanctions_match || data.pep_match {
        // Hard veto. Must stay an explicit short-circuit, never a weight.
        return 0;
    }

    match data.aml_flags.len() {
        0 => 30,
        1 | 2 => 15,
        _ => 0,
    }
}

/// Score an identity extract into a full breakdown.
pub fn score(data: &ExtractedIdentityData) -> RiskScoreBreakdown {
    let mut reasoning = Vec::new();

    let liveness = liveness_points(data.liveness_score);
    match data.liveness_score {
        Some(s) => reasoning.push(format!("liveness {s:.2} -> {liveness} points")),
        None => reasoning.push("liveness check missing -> 0 points".to_string()),
    }

    let document = document_points(data);
    reasoning.push(format!(
        "document authenticity {:?} -> {document} points",
        data.document_authenticity
    ));
    if document == 20 {
        reasoning.push("sub-check failed on a valid document: demoted to partial trust".to_string());
    }

    let aml = aml_points(data);
    if data.sanctions_match || data.pep_match {
        reasoning.push("sanctions/PEP match: AML factor vetoed to 0".to_string());
    } else {
        reasoning.push(format!(
            "{} AML flag(s) -> {aml} points",
            data.aml_flags.len()
        ));
    }

    let total = liveness + document + aml;
    let tier = RiskTier::from_total(total);
    reasoning.push(format!("total {total}/100 -> tier {}", tier.as_str()));

    RiskScoreBreakdown {
        liveness_points: liveness,
        document_points: document,
        aml_points: aml,
        total_score: total,
        risk_tier: tier,
        auto_approved: tier == RiskTier::Low,
        reasoning,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ff_schemas::{Address, CompanyRegistration, ProofOfAddress};

    fn address() -> Address {
        Address {
            street: "123 Main Street".to_string(),
            suburb: "Gardens".to_string(),
            city: "Cape Town".to_string(),
            province: "Western Cape".to_string(),
            postal_code: "8001".to_string(),
            country: "South Africa".to_string(),
        }
    }

    fn clean_extract() -> ExtractedIdentityData {
        ExtractedIdentityData {
            id_number: "8001015009087".to_string(),
            full_name: "John Michael Doe".to_string(),
            date_of_birth: None,
            proof_of_address: Some(ProofOfAddress {
                verified: true,
                document_date: None,
                address: address(),
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
    fn clean_profile_scores_100_low_auto_approved() {
        let breakdown = score(&clean_extract());
        assert_eq!(breakdown.liveness_points, 40);
        assert_eq!(breakdown.document_points, 30);
        assert_eq!(breakdown.aml_points, 30);
        assert_eq!(breakdown.total_score, 100);
        assert_eq!(breakdown.risk_tier, RiskTier::Low);
        assert!(breakdown.auto_approved);
    }

    #[test]
    fn liveness_band_boundaries() {
        assert_eq!(liveness_points(Some(0.9)), 40);
        assert_eq!(liveness_points(Some(0.89)), 35);
        assert_eq!(liveness_points(Some(0.6)), 15);
        assert_eq!(liveness_points(Some(0.59)), 0);
    }

    #[test]
    fn missing_liveness_fails_closed() {
        assert_eq!(liveness_points(None), 0);
        let mut data = clean_extract();
        data.liveness_score = None;
        let breakdown = score(&data);
        assert_eq!(breakdown.liveness_points, 0);
        assert_ne!(breakdown.risk_tier, RiskTier::Low);
    }

    #[test]
    fn sanctions_match_vetoes_aml_regardless_of_other_factors() {
        let mut data = clean_extract();
        data.sanctions_match = true;
        let breakdown = score(&data);
        assert_eq!(breakdown.aml_points, 0);
        assert!(breakdown.total_score <= 70);
        assert_ne!(breakdown.risk_tier, RiskTier::Low);
        assert!(!breakdown.auto_approved);
    }

    #[test]
    fn pep_match_vetoes_aml_even_with_zero_flags() {
        let mut data = clean_extract();
        data.pep_match = true;
        assert_eq!(aml_points(&data), 0);
        let breakdown = score(&data);
        assert_ne!(breakdown.risk_tier, RiskTier::Low);
    }

    #[test]
    fn aml_flag_count_bands() {
        let mut data = clean_extract();
        assert_eq!(aml_points(&data), 30);
        data.aml_flags = vec!["adverse media".to_string()];
        assert_eq!(aml_points(&data), 15);
        data.aml_flags.push("watchlist near-match".to_string());
        assert_eq!(aml_points(&data), 15);
        data.aml_flags.push("unusual activity".to_string());
        assert_eq!(aml_points(&data), 0);
    }

    #[test]
    fn unverified_proof_of_address_demotes_valid_document() {
        let mut data = clean_extract();
        data.proof_of_address.as_mut().unwrap().verified = false;
        assert_eq!(document_points(&data), 20);
        // The demotion only applies while the overall verdict is Valid.
        data.document_authenticity = DocumentAuthenticity::Suspicious;
        assert_eq!(document_points(&data), 15);
    }

    #[test]
    fn unverified_company_registration_demotes_business_document() {
        let mut data = clean_extract();
        data.company = Some(CompanyRegistration {
            registration_number: "2019/123456/07".to_string(),
            company_name: "Example Trading (Pty) Ltd".to_string(),
            verified: false,
            directors: vec!["John Michael Doe".to_string()],
        });
        assert_eq!(document_points(&data), 20);
    }

    #[test]
    fn invalid_document_scores_zero() {
        let mut data = clean_extract();
        data.document_authenticity = DocumentAuthenticity::Invalid;
        assert_eq!(document_points(&data), 0);
    }

    #[test]
    fn scoring_is_pure_and_repeatable() {
        let data = clean_extract();
        let first = score(&data);
        for _ in 0..5 {
            assert_eq!(score(&data), first, "identical input must score identically");
        }
    }

    #[test]
    fn medium_tier_holds_for_mid_band_profile() {
        let mut data = clean_extract();
        data.liveness_score = Some(0.75); // 25 points
        data.aml_flags = vec!["adverse media".to_string()]; // 15 points
        let breakdown = score(&data);
        // 25 + 30 + 15 = 70
        assert_eq!(breakdown.total_score, 70);
        assert_eq!(breakdown.risk_tier, RiskTier::Medium);
        assert!(!breakdown.auto_approved);
    }
}
