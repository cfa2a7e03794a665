//! Form mapping rules
//!
//! Each rule owns one form kind, matched by OID suffix, and turns the
//! captured items into FHIR resources. Rules receive the shared patient
//! mutably (demographic rules enrich it in place) and return any
//! standalone resources they produce. A rule never fails on missing or
//! malformed single items; it logs the source path and moves on.

use crate::config::MappingConfig;
use crate::core::mapping::identity::IdentityRegistry;
use crate::core::mapping::terminology::{
    self, codings_from_value, lab_coding, CONDITION_CLINICAL, CONDITION_VER_STATUS, CONSENT_SCOPE,
    LOINC, OBSERVATION_CATEGORY, SNOMED, UCUM,
};
use crate::domain::fhir::{
    CodeableConcept, Coding, Condition, Consent, ConsentProvision, Element, Extension, Identifier,
    Observation, Patient, Quantity, Resource,
};
use crate::domain::odm::{FormData, StudyEventData};
use crate::domain::result::Result;
use tracing::warn;

const AGE_EXTENSION_URL: &str = "https://studylift.org/fhir/StructureDefinition/age";
const UNCERTAINTY_OF_PRESENCE_URL: &str =
    "https://studylift.org/fhir/StructureDefinition/uncertainty-of-presence";

/// One form occurrence in its full source position
pub struct FormScope<'a> {
    pub subject_key: &'a str,
    pub event: &'a StudyEventData,
    pub form: &'a FormData,
}

impl FormScope<'_> {
    /// Full source path of an item, for diagnostics
    pub fn item_path(&self, item_oid: &str) -> String {
        let (group_oid, group_repeat) = self.form.owning_group(item_oid);
        format!(
            "{}-{}.{}-{}.{}-{}.{}-{}",
            self.subject_key,
            self.event.study_event_oid,
            self.event.study_event_repeat_key,
            self.form.form_oid,
            self.form.form_repeat_key,
            group_oid,
            group_repeat,
            item_oid
        )
    }

    /// Identifier anchored at an item of this form
    pub fn identifier(
        &self,
        identity: &IdentityRegistry,
        kind: &str,
        item_oid: &str,
    ) -> Identifier {
        let group = self.form.owning_group(item_oid);
        identity.create_identifier(
            kind,
            self.subject_key,
            (
                &self.event.study_event_oid,
                &self.event.study_event_repeat_key,
            ),
            (&self.form.form_oid, &self.form.form_repeat_key),
            (&group.0, &group.1),
            item_oid,
        )
    }
}

/// Shared state every rule sees while one subject is mapped
pub struct MappingContext<'a> {
    pub patient: &'a mut Patient,
    pub options: &'a MappingConfig,
    pub identity: &'a IdentityRegistry,
}

/// A mapper for one form kind
pub trait FormRule: Send + Sync {
    /// OID suffix this rule handles
    fn form_oid(&self) -> &'static str;

    fn applies_to(&self, form_oid: &str) -> bool {
        form_oid.ends_with(self.form_oid())
    }

    /// Map one complete form occurrence
    fn apply(
        &self,
        context: &mut MappingContext<'_>,
        scope: &FormScope<'_>,
    ) -> Result<Vec<Resource>>;
}

/// The built-in rule set, in application order
pub fn default_rules() -> Vec<Box<dyn FormRule>> {
    vec![
        Box::new(Age),
        Box::new(BiologicalSex),
        Box::new(SymptomConditions),
        Box::new(RespiratoryRate),
        Box::new(LaboratoryValues),
        Box::new(DnrOrder),
    ]
}

/// Documented age, attached to the patient as a complex extension
pub struct Age;

impl FormRule for Age {
    fn form_oid(&self) -> &'static str {
        "demographie"
    }

    fn apply(
        &self,
        context: &mut MappingContext<'_>,
        scope: &FormScope<'_>,
    ) -> Result<Vec<Resource>> {
        let age_item = scope.form.item_data("alter");
        if age_item.is_empty() {
            return Ok(Vec::new());
        }

        let years: f64 = match age_item.value.trim().parse() {
            Ok(years) => years,
            Err(_) => {
                warn!(
                    path = %scope.item_path("alter"),
                    value = %age_item.value,
                    "Age value is not numeric"
                );
                return Ok(Vec::new());
            }
        };

        let documented = scope.form.item_data("alter_datum");
        let documentation = if documented.is_empty() {
            Extension {
                url: "dateTimeOfDocumentation".to_string(),
                value_date_time_element: Some(Element {
                    extension: vec![Extension::data_absent("unknown")],
                }),
                ..Extension::default()
            }
        } else {
            Extension {
                url: "dateTimeOfDocumentation".to_string(),
                value_date_time: Some(documented.value.clone()),
                ..Extension::default()
            }
        };

        let age = Extension {
            url: "age".to_string(),
            value_quantity: Some(Quantity {
                value: Some(years),
                comparator: None,
                unit: Some("years".to_string()),
                system: Some(UCUM.to_string()),
                code: Some("a".to_string()),
            }),
            ..Extension::default()
        };

        context.patient.extension.push(Extension {
            url: AGE_EXTENSION_URL.to_string(),
            extension: vec![documentation, age],
            ..Extension::default()
        });
        Ok(Vec::new())
    }
}

/// Administrative gender from the captured sex code
pub struct BiologicalSex;

impl FormRule for BiologicalSex {
    fn form_oid(&self) -> &'static str {
        "demographie"
    }

    fn apply(
        &self,
        context: &mut MappingContext<'_>,
        scope: &FormScope<'_>,
    ) -> Result<Vec<Resource>> {
        let item = scope.form.item_data("geschlecht");
        if item.is_empty() {
            return Ok(Vec::new());
        }

        let path = scope.item_path("geschlecht");
        let gender = codings_from_value(&item.value, &path)
            .iter()
            .find_map(|coding| administrative_gender(coding));

        match gender {
            Some(gender) => context.patient.gender = Some(gender.to_string()),
            None => {
                warn!(path = %path, value = %item.value, "Unmapped sex code");
                context.patient.gender = Some("unknown".to_string());
            }
        }
        Ok(Vec::new())
    }
}

fn administrative_gender(coding: &Coding) -> Option<&'static str> {
    match (coding.system.as_deref(), coding.code.as_deref()) {
        (Some(SNOMED), Some("248153007")) => Some("male"),
        (Some(SNOMED), Some("248152002")) => Some("female"),
        (Some(terminology::GENDER_AMTLICH_DE), Some("M")) => Some("male"),
        (Some(terminology::GENDER_AMTLICH_DE), Some("W")) => Some("female"),
        (Some(terminology::GENDER_AMTLICH_DE), Some("X" | "D")) => Some("other"),
        _ => None,
    }
}

/// Presence status codes carried in symptom item values
const PRESENT: &str = "410605003";
const ABSENT: &str = "410594000";
const UNKNOWN: &str = "261665006";
/// The unspecific "Other" symptom
const OTHER_SYMPTOM: &str = "74964007";

const SYMPTOM_ITEMS: [(&str, &str, &str); 5] = [
    ("husten", "49727002", "Cough"),
    ("fieber", "386661006", "Fever"),
    ("atemnot", "267036007", "Dyspnea"),
    ("durchfall", "62315008", "Diarrhea"),
    ("andere_symptome", OTHER_SYMPTOM, "Other"),
];

/// One Condition per documented symptom
pub struct SymptomConditions;

impl FormRule for SymptomConditions {
    fn form_oid(&self) -> &'static str {
        "symptome"
    }

    fn apply(
        &self,
        context: &mut MappingContext<'_>,
        scope: &FormScope<'_>,
    ) -> Result<Vec<Resource>> {
        // the whole form is gated by the "symptoms documented" flag
        if scope.form.item_data("symptome").value != "1" {
            return Ok(Vec::new());
        }

        let mut conditions = Vec::new();
        for (item_oid, symptom_code, display) in SYMPTOM_ITEMS {
            let item = scope.form.item_data(item_oid);
            if item.is_empty() {
                continue;
            }

            let path = scope.item_path(item_oid);
            let statuses = codings_from_value(&item.value, &path);

            let mut condition = Condition {
                identifier: vec![scope.identifier(context.identity, "Condition", item_oid)],
                category: vec![CodeableConcept::from_coding(
                    Coding::new(LOINC, "75325-1").with_display("Symptom"),
                )],
                code: Some(CodeableConcept::from_coding(
                    Coding::new(SNOMED, symptom_code).with_display(display),
                )),
                ..Condition::default()
            };

            let status_code = |code: &str| {
                statuses
                    .iter()
                    .any(|coding| coding.code.as_deref() == Some(code))
            };
            if status_code(PRESENT) {
                condition.clinical_status = Some(CodeableConcept::from_coding(Coding::new(
                    CONDITION_CLINICAL,
                    "active",
                )));
                condition.verification_status = Some(CodeableConcept::from_coding(Coding::new(
                    CONDITION_VER_STATUS,
                    "confirmed",
                )));
            } else if status_code(ABSENT) {
                condition.verification_status = Some(CodeableConcept::from_coding(Coding::new(
                    CONDITION_VER_STATUS,
                    "refuted",
                )));
            } else if status_code(UNKNOWN) {
                condition.modifier_extension.push(Extension {
                    url: UNCERTAINTY_OF_PRESENCE_URL.to_string(),
                    value_codeable_concept: Some(CodeableConcept::from_coding(
                        Coding::new(SNOMED, UNKNOWN).with_display("Unknown"),
                    )),
                    ..Extension::default()
                });
            } else {
                warn!(path = %path, value = %item.value, "No presence status in symptom value");
                continue;
            }

            conditions.push(condition);
        }

        // drop the unspecific entry when specific symptoms are documented
        if context.options.other_symptoms_removed && conditions.len() > 1 {
            conditions.retain(|condition| {
                condition
                    .code
                    .as_ref()
                    .map(|code| {
                        code.coding
                            .iter()
                            .all(|coding| coding.code.as_deref() != Some(OTHER_SYMPTOM))
                    })
                    .unwrap_or(true)
            });
        }

        Ok(conditions.into_iter().map(Resource::Condition).collect())
    }
}

/// Respiratory rate vital sign
pub struct RespiratoryRate;

impl FormRule for RespiratoryRate {
    fn form_oid(&self) -> &'static str {
        "vitalparameter"
    }

    fn apply(
        &self,
        context: &mut MappingContext<'_>,
        scope: &FormScope<'_>,
    ) -> Result<Vec<Resource>> {
        let item = scope.form.item_data("atemfrequenz");
        if item.is_empty() {
            return Ok(Vec::new());
        }

        let rate: f64 = match item.value.trim().parse() {
            Ok(rate) => rate,
            Err(_) => {
                warn!(
                    path = %scope.item_path("atemfrequenz"),
                    value = %item.value,
                    "Respiratory rate is not numeric"
                );
                return Ok(Vec::new());
            }
        };

        let documented = scope.form.item_data("atemfrequenz_datum");
        let observation = Observation {
            identifier: vec![scope.identifier(context.identity, "Observation", "atemfrequenz")],
            status: Some("final".to_string()),
            category: vec![CodeableConcept::from_coding(Coding::new(
                OBSERVATION_CATEGORY,
                "vital-signs",
            ))],
            code: Some(CodeableConcept::from_coding(
                Coding::new(LOINC, "9279-1").with_display("Respiratory rate"),
            )),
            effective_date_time: (!documented.is_empty()).then(|| documented.value.clone()),
            value_quantity: Some(Quantity {
                value: Some(rate),
                comparator: None,
                unit: Some("breaths/minute".to_string()),
                system: Some(UCUM.to_string()),
                code: Some("/min".to_string()),
            }),
            ..Observation::default()
        };

        Ok(vec![Resource::Observation(observation)])
    }
}

const LAB_ANALYTES: [(&str, &str, &str, &str); 4] = [
    ("crp", "1988-5", "C reactive protein", "mg/L"),
    ("ferritin", "2276-4", "Ferritin", "ng/mL"),
    ("leukozyten", "6690-2", "Leukocytes", "10*3/uL"),
    ("ddimer", "48065-7", "Fibrin D-dimer FEU", "ng/mL"),
];

/// One laboratory Observation per captured analyte
pub struct LaboratoryValues;

impl FormRule for LaboratoryValues {
    fn form_oid(&self) -> &'static str {
        "laborwerte"
    }

    fn apply(
        &self,
        context: &mut MappingContext<'_>,
        scope: &FormScope<'_>,
    ) -> Result<Vec<Resource>> {
        let mut observations = Vec::new();

        for (item_oid, default_code, display, unit) in LAB_ANALYTES {
            let item = scope.form.item_data(item_oid);
            if item.is_empty() {
                continue;
            }

            let value: f64 = match item.value.trim().parse() {
                Ok(value) => value,
                Err(_) => {
                    warn!(
                        path = %scope.item_path(item_oid),
                        value = %item.value,
                        "Laboratory value is not numeric"
                    );
                    continue;
                }
            };

            // an explicit code item overrides the built-in analyte coding
            let code_item = scope.form.item_data(&format!("{item_oid}_code"));
            let coding = if code_item.is_empty() {
                Coding::new(LOINC, default_code).with_display(display)
            } else {
                lab_coding(&code_item.value)
                    .unwrap_or_else(|| Coding::new(LOINC, default_code).with_display(display))
            };

            observations.push(Resource::Observation(Observation {
                identifier: vec![scope.identifier(context.identity, "Observation", item_oid)],
                status: Some("final".to_string()),
                category: vec![CodeableConcept::from_coding(Coding::new(
                    OBSERVATION_CATEGORY,
                    "laboratory",
                ))],
                code: Some(CodeableConcept::from_coding(coding)),
                value_quantity: Some(Quantity {
                    value: Some(value),
                    comparator: None,
                    unit: Some(unit.to_string()),
                    system: Some(UCUM.to_string()),
                    code: Some(unit.to_string()),
                }),
                ..Observation::default()
            }));
        }

        Ok(observations)
    }
}

/// Do-not-resuscitate order as a Consent
pub struct DnrOrder;

impl FormRule for DnrOrder {
    fn form_oid(&self) -> &'static str {
        "therapie"
    }

    fn apply(
        &self,
        context: &mut MappingContext<'_>,
        scope: &FormScope<'_>,
    ) -> Result<Vec<Resource>> {
        let item = scope.form.item_data("dnr_anordnung");
        if item.is_empty() {
            return Ok(Vec::new());
        }

        let path = scope.item_path("dnr_anordnung");
        let codings = codings_from_value(&item.value, &path);
        if codings.is_empty() {
            warn!(path = %path, value = %item.value, "Unresolvable DNR order value");
            return Ok(Vec::new());
        }

        let consent = Consent {
            identifier: vec![scope.identifier(context.identity, "Consent", "dnr_anordnung")],
            status: Some("active".to_string()),
            scope: Some(CodeableConcept::from_coding(Coding::new(
                CONSENT_SCOPE,
                "adr",
            ))),
            category: vec![CodeableConcept::from_coding(
                Coding::new(LOINC, "59284-0").with_display("Consent Document"),
            )],
            provision: Some(ConsentProvision {
                type_: None,
                code: vec![CodeableConcept::from_codings(codings)],
            }),
            ..Consent::default()
        };

        Ok(vec![Resource::Consent(consent)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::odm::{ItemData, ItemGroupData};

    fn scope_form(form_oid: &str, items: Vec<(&str, &str)>) -> (StudyEventData, FormData) {
        let form = FormData {
            form_oid: form_oid.to_string(),
            form_repeat_key: "1".to_string(),
            item_group_data: vec![ItemGroupData {
                item_group_oid: format!("{form_oid}.g1"),
                item_group_repeat_key: "1".to_string(),
                item_data: items
                    .into_iter()
                    .map(|(oid, value)| ItemData {
                        item_oid: oid.to_string(),
                        value: value.to_string(),
                    })
                    .collect(),
            }],
        };
        let event = StudyEventData {
            study_event_oid: "V1".to_string(),
            study_event_repeat_key: "1".to_string(),
            form_data: vec![],
        };
        (event, form)
    }

    fn run_rule(
        rule: &dyn FormRule,
        form_oid: &str,
        items: Vec<(&str, &str)>,
        options: &MappingConfig,
    ) -> (Patient, Vec<Resource>) {
        let (event, form) = scope_form(form_oid, items);
        let scope = FormScope {
            subject_key: "S1",
            event: &event,
            form: &form,
        };
        let identity = IdentityRegistry::new(options);
        let mut patient = Patient::default();
        let mut context = MappingContext {
            patient: &mut patient,
            options,
            identity: &identity,
        };
        let resources = rule.apply(&mut context, &scope).unwrap();
        (patient, resources)
    }

    #[test]
    fn test_age_extension_on_patient() {
        let options = MappingConfig::default();
        let (patient, resources) = run_rule(
            &Age,
            "demographie",
            vec![("alter", "42"), ("alter_datum", "2024-03-01")],
            &options,
        );

        assert!(resources.is_empty());
        let age = &patient.extension[0];
        assert_eq!(age.url, AGE_EXTENSION_URL);
        assert_eq!(
            age.extension[0].value_date_time.as_deref(),
            Some("2024-03-01")
        );
        let quantity = age.extension[1].value_quantity.as_ref().unwrap();
        assert_eq!(quantity.value, Some(42.0));
        assert_eq!(quantity.code.as_deref(), Some("a"));
    }

    #[test]
    fn test_age_without_documentation_date_is_marked_unknown() {
        let options = MappingConfig::default();
        let (patient, _) = run_rule(&Age, "demographie", vec![("alter", "42")], &options);

        let documentation = &patient.extension[0].extension[0];
        assert!(documentation.value_date_time.is_none());
        let absent = &documentation.value_date_time_element.as_ref().unwrap().extension[0];
        assert_eq!(absent.value_code.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_non_numeric_age_is_skipped() {
        let options = MappingConfig::default();
        let (patient, resources) =
            run_rule(&Age, "demographie", vec![("alter", "vierzig")], &options);
        assert!(patient.extension.is_empty());
        assert!(resources.is_empty());
    }

    #[test]
    fn test_biological_sex_mapping() {
        let options = MappingConfig::default();
        let (patient, _) = run_rule(
            &BiologicalSex,
            "demographie",
            vec![("geschlecht", "2.16.840.1.113883.6.96_248152002")],
            &options,
        );
        assert_eq!(patient.gender.as_deref(), Some("female"));

        let (patient, _) = run_rule(
            &BiologicalSex,
            "demographie",
            vec![("geschlecht", "2.16.840.1.113883.6.96_999999999")],
            &options,
        );
        assert_eq!(patient.gender.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_symptom_gate_blocks_ungated_form() {
        let options = MappingConfig::default();
        let (_, resources) = run_rule(
            &SymptomConditions,
            "symptome",
            vec![
                ("symptome", "0"),
                ("husten", "2.16.840.1.113883.6.96_410605003"),
            ],
            &options,
        );
        assert!(resources.is_empty());
    }

    #[test]
    fn test_symptom_presence_statuses() {
        let options = MappingConfig::default();
        let (_, resources) = run_rule(
            &SymptomConditions,
            "symptome",
            vec![
                ("symptome", "1"),
                ("husten", "2.16.840.1.113883.6.96_410605003"),
                ("fieber", "2.16.840.1.113883.6.96_410594000"),
                ("atemnot", "2.16.840.1.113883.6.96_261665006"),
            ],
            &options,
        );
        assert_eq!(resources.len(), 3);

        let condition = |index: usize| match &resources[index] {
            Resource::Condition(condition) => condition,
            other => panic!("expected condition, got {other:?}"),
        };

        let present = condition(0);
        assert_eq!(
            present.clinical_status.as_ref().unwrap().coding[0]
                .code
                .as_deref(),
            Some("active")
        );
        assert_eq!(
            present.verification_status.as_ref().unwrap().coding[0]
                .code
                .as_deref(),
            Some("confirmed")
        );

        let absent = condition(1);
        assert!(absent.clinical_status.is_none());
        assert_eq!(
            absent.verification_status.as_ref().unwrap().coding[0]
                .code
                .as_deref(),
            Some("refuted")
        );

        let unknown = condition(2);
        assert_eq!(
            unknown.modifier_extension[0].url,
            UNCERTAINTY_OF_PRESENCE_URL
        );
    }

    #[test]
    fn test_other_symptom_dropped_when_specific_ones_exist() {
        let options = MappingConfig::default();
        let (_, resources) = run_rule(
            &SymptomConditions,
            "symptome",
            vec![
                ("symptome", "1"),
                ("husten", "2.16.840.1.113883.6.96_410605003"),
                ("andere_symptome", "2.16.840.1.113883.6.96_410605003"),
            ],
            &options,
        );
        assert_eq!(resources.len(), 1);

        let mut keep_other = MappingConfig::default();
        keep_other.other_symptoms_removed = false;
        let (_, resources) = run_rule(
            &SymptomConditions,
            "symptome",
            vec![
                ("symptome", "1"),
                ("husten", "2.16.840.1.113883.6.96_410605003"),
                ("andere_symptome", "2.16.840.1.113883.6.96_410605003"),
            ],
            &keep_other,
        );
        assert_eq!(resources.len(), 2);
    }

    #[test]
    fn test_respiratory_rate_observation() {
        let options = MappingConfig::default();
        let (_, resources) = run_rule(
            &RespiratoryRate,
            "vitalparameter",
            vec![("atemfrequenz", "18"), ("atemfrequenz_datum", "2024-03-01")],
            &options,
        );

        let Resource::Observation(observation) = &resources[0] else {
            panic!("expected observation");
        };
        assert_eq!(observation.value_quantity.as_ref().unwrap().value, Some(18.0));
        assert_eq!(observation.effective_date_time.as_deref(), Some("2024-03-01"));
        assert_eq!(observation.category[0].coding[0].code.as_deref(), Some("vital-signs"));
    }

    #[test]
    fn test_laboratory_values_with_code_override() {
        let options = MappingConfig::default();
        let (_, resources) = run_rule(
            &LaboratoryValues,
            "laborwerte",
            vec![
                ("crp", "12.5"),
                ("ferritin", "not a number"),
                ("leukozyten", "7.2"),
                ("leukozyten_code", "26464-8_Leukocytes in blood"),
            ],
            &options,
        );
        assert_eq!(resources.len(), 2);

        let Resource::Observation(leukocytes) = &resources[1] else {
            panic!("expected observation");
        };
        assert_eq!(
            leukocytes.code.as_ref().unwrap().coding[0].code.as_deref(),
            Some("26464-8")
        );
    }

    #[test]
    fn test_dnr_order_consent() {
        let options = MappingConfig::default();
        let (_, resources) = run_rule(
            &DnrOrder,
            "therapie",
            vec![("dnr_anordnung", "2.16.840.1.113883.6.96_304252001")],
            &options,
        );

        let Resource::Consent(consent) = &resources[0] else {
            panic!("expected consent");
        };
        assert_eq!(consent.status.as_deref(), Some("active"));
        assert_eq!(
            consent.provision.as_ref().unwrap().code[0].coding[0]
                .code
                .as_deref(),
            Some("304252001")
        );
    }

    #[test]
    fn test_rule_suffix_matching() {
        assert!(Age.applies_to("edc.demographie"));
        assert!(!Age.applies_to("demographie_extra"));
    }
}
