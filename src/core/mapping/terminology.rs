//! Terminology token resolution
//!
//! Source item values carry coded concepts as compound tokens: an optional
//! code-system OID and a code joined by `_`, multiple concepts joined by
//! `__`. This module resolves OIDs to canonical FHIR system URLs and turns
//! tokens into codings, logging the full source path for every token it
//! cannot resolve cleanly.

use crate::domain::fhir::Coding;
use tracing::warn;

pub const SNOMED: &str = "http://snomed.info/sct";
pub const LOINC: &str = "http://loinc.org";
pub const UCUM: &str = "http://unitsofmeasure.org";
pub const ICD_10_GM: &str = "http://fhir.de/CodeSystem/dimdi/icd-10-gm";
pub const OPS: &str = "http://fhir.de/CodeSystem/dimdi/ops";
pub const ATC: &str = "http://fhir.de/CodeSystem/dimdi/atc";
pub const GENDER_AMTLICH_DE: &str = "http://fhir.de/CodeSystem/gender-amtlich-de";
pub const CONDITION_CLINICAL: &str = "http://terminology.hl7.org/CodeSystem/condition-clinical";
pub const CONDITION_VER_STATUS: &str =
    "http://terminology.hl7.org/CodeSystem/condition-ver-status";
pub const OBSERVATION_CATEGORY: &str =
    "http://terminology.hl7.org/CodeSystem/observation-category";
pub const ACT_CODE: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";
pub const CONSENT_SCOPE: &str = "http://terminology.hl7.org/CodeSystem/consentscope";
pub const IDENTIFIER_TYPE: &str = "http://terminology.hl7.org/CodeSystem/v2-0203";

const HL7_OID: &str = "2.16.840.1.113883";
const DE_HC_OID: &str = "1.2.276.0.76.5";

/// Sentinel system token for codes without a code system
const NO_CODE_SYSTEM: &str = "NoCodeSystem";
/// Sentinel code token for absent codes
const NO_CODE: &str = "NoCode";

/// Canonical system URL for a code-system OID, if known
fn system_for_oid(oid: &str) -> Option<&'static str> {
    let suffix = |base: &str| oid.strip_prefix(base).map(|s| s.to_string());

    if let Some(rest) = suffix(HL7_OID) {
        return match rest.as_str() {
            ".6.96" => Some(SNOMED),
            ".6.1" => Some(LOINC),
            ".6.8" => Some(UCUM),
            _ => None,
        };
    }
    if let Some(rest) = suffix(DE_HC_OID) {
        return match rest.as_str() {
            ".409" | ".502" => Some(ICD_10_GM),
            ".483" => Some(GENDER_AMTLICH_DE),
            ".487" => Some(OPS),
            ".498" => Some(ATC),
            _ => None,
        };
    }
    None
}

/// Resolve one `system_code` token into a coding
///
/// A one-part token is a bare code without a system. Unknown system OIDs
/// fall back to `urn:oid:` form. Sentinel tokens (`NoCodeSystem`,
/// `NoCode`) coerce their part to empty silently; blank parts are coerced
/// the same way but reported with the source path. Codings whose code
/// ends up empty are dropped at the multi-value layer.
pub fn coding_from_token(token: &str, path: &str) -> Option<Coding> {
    let parts: Vec<&str> = token.splitn(2, '_').collect();

    let (system_token, code_token) = match parts.as_slice() {
        [code] => (None, *code),
        [system, code] => (Some(*system), *code),
        _ => return None,
    };

    let system = match system_token {
        None => None,
        Some(NO_CODE_SYSTEM) => None,
        Some("") => {
            warn!(token, path, "Blank code system in terminology token");
            None
        }
        Some(oid) => match system_for_oid(oid) {
            Some(url) => Some(url.to_string()),
            None => {
                warn!(oid, path, "Unknown code system OID");
                Some(format!("urn:oid:{oid}"))
            }
        },
    };

    let code = match code_token {
        NO_CODE => String::new(),
        "" => {
            warn!(token, path, "Blank code in terminology token");
            String::new()
        }
        code => code.to_string(),
    };

    Some(Coding {
        system,
        code: Some(code),
        display: None,
    })
}

/// Resolve a multi-concept value (`token__token__...`) into codings,
/// dropping tokens that resolve to an empty code
pub fn codings_from_value(value: &str, path: &str) -> Vec<Coding> {
    value
        .split("__")
        .filter(|token| !token.is_empty())
        .filter_map(|token| coding_from_token(token, path))
        .filter(|coding| !coding.is_empty())
        .collect()
}

/// Resolve a laboratory token: `code`, `code_display` or
/// `system_code_display`, defaulting to LOINC when no system is given
pub fn lab_coding(token: &str) -> Option<Coding> {
    let parts: Vec<&str> = token.split('_').collect();
    match parts.as_slice() {
        [code] if !code.is_empty() => Some(Coding::new(LOINC, *code)),
        [code, display] if !code.is_empty() => {
            Some(Coding::new(LOINC, *code).with_display(*display))
        }
        [system, code, display] if !code.is_empty() => {
            let url = system_for_oid(system)
                .map(str::to_string)
                .unwrap_or_else(|| format!("urn:oid:{system}"));
            Some(Coding::new(url, *code).with_display(*display))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const PATH: &str = "S1-V1.1-f.1-g.1-item";

    #[test_case("2.16.840.1.113883.6.96_386661006", SNOMED, "386661006" ; "snomed")]
    #[test_case("2.16.840.1.113883.6.1_1988-5", LOINC, "1988-5" ; "loinc")]
    #[test_case("2.16.840.1.113883.6.8_a", UCUM, "a" ; "ucum")]
    #[test_case("1.2.276.0.76.5.409_U07.1", ICD_10_GM, "U07.1" ; "icd10gm")]
    #[test_case("1.2.276.0.76.5.502_U07.1", ICD_10_GM, "U07.1" ; "icd10gm successor oid")]
    #[test_case("1.2.276.0.76.5.483_M", GENDER_AMTLICH_DE, "M" ; "gender amtlich de")]
    #[test_case("1.2.276.0.76.5.487_5-470", OPS, "5-470" ; "ops")]
    #[test_case("1.2.276.0.76.5.498_J05AR10", ATC, "J05AR10" ; "atc")]
    fn test_known_oids_resolve_to_canonical_urls(token: &str, system: &str, code: &str) {
        let coding = coding_from_token(token, PATH).unwrap();
        assert_eq!(coding.system.as_deref(), Some(system));
        assert_eq!(coding.code.as_deref(), Some(code));
    }

    #[test]
    fn test_bare_code_has_no_system() {
        let coding = coding_from_token("42", PATH).unwrap();
        assert_eq!(coding.system, None);
        assert_eq!(coding.code.as_deref(), Some("42"));
    }

    #[test]
    fn test_unknown_oid_falls_back_to_urn() {
        let coding = coding_from_token("99999_X1", PATH).unwrap();
        assert_eq!(coding.system.as_deref(), Some("urn:oid:99999"));
        assert_eq!(coding.code.as_deref(), Some("X1"));
    }

    #[test]
    fn test_sentinels_coerce_silently() {
        let coding = coding_from_token("NoCodeSystem_X1", PATH).unwrap();
        assert_eq!(coding.system, None);
        assert_eq!(coding.code.as_deref(), Some("X1"));

        let coding = coding_from_token("2.16.840.1.113883.6.96_NoCode", PATH).unwrap();
        assert!(coding.is_empty());
        assert_eq!(coding.system.as_deref(), Some(SNOMED));
    }

    #[test]
    fn test_blank_parts_yield_empty_codings() {
        assert!(coding_from_token("_X1", PATH).unwrap().system.is_none());

        // the system survives a blank code, so callers can still see it
        let blank_code = coding_from_token("2.16.840.1.113883.6.96_", PATH).unwrap();
        assert!(blank_code.is_empty());
        assert_eq!(blank_code.system.as_deref(), Some(SNOMED));

        assert!(coding_from_token("", PATH).unwrap().is_empty());
    }

    #[test]
    fn test_multi_value_drops_empty_code_codings() {
        let codings = codings_from_value("49727002__2.16.840.1.113883.6.96_", PATH);
        assert_eq!(codings.len(), 1);
        assert_eq!(codings[0].code.as_deref(), Some("49727002"));
    }

    #[test]
    fn test_multi_value_split_drops_empty_tokens() {
        let codings = codings_from_value(
            "2.16.840.1.113883.6.96_386661006__2.16.840.1.113883.6.96_NoCode__49727002",
            PATH,
        );
        assert_eq!(codings.len(), 2);
        assert_eq!(codings[0].code.as_deref(), Some("386661006"));
        assert_eq!(codings[1].code.as_deref(), Some("49727002"));
    }

    #[test]
    fn test_lab_coding_defaults_to_loinc() {
        let coding = lab_coding("1988-5").unwrap();
        assert_eq!(coding.system.as_deref(), Some(LOINC));

        let coding = lab_coding("1988-5_C reactive protein").unwrap();
        assert_eq!(coding.display.as_deref(), Some("C reactive protein"));

        let coding = lab_coding("2.16.840.1.113883.6.96_365711004_CRP finding").unwrap();
        assert_eq!(coding.system.as_deref(), Some(SNOMED));

        assert!(lab_coding("").is_none());
    }
}
