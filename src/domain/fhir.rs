//! Minimal FHIR R4 value model
//!
//! Only the datatypes and resource kinds the mapping rules emit. Everything
//! serializes straight to FHIR JSON via serde; optional fields are skipped
//! when absent so empty resources stay structurally empty.

use serde::Serialize;
use serde_json::Value;

pub const DATA_ABSENT_REASON_URL: &str =
    "http://hl7.org/fhir/StructureDefinition/data-absent-reason";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Coding {
            system: Some(system.into()),
            code: Some(code.into()),
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.code.as_deref().unwrap_or("").is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodeableConcept {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    pub fn from_coding(coding: Coding) -> Self {
        CodeableConcept {
            coding: vec![coding],
            text: None,
        }
    }

    pub fn from_codings(coding: Vec<Coding>) -> Self {
        CodeableConcept { coding, text: None }
    }

    pub fn is_empty(&self) -> bool {
        self.coding.iter().all(Coding::is_empty) && self.text.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigner: Option<Box<Reference>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<CodeableConcept>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Box<Identifier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    pub fn to_resource(fhir_type: &str, id: &str) -> Self {
        Reference {
            reference: Some(format!("{fhir_type}/{id}")),
            identifier: None,
            display: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quantity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Primitive element carrier, used for extensions on value-less primitives
/// (serialized under the `_value...` sibling key)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Element {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extension: Vec<Extension>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extension {
    pub url: String,
    #[serde(rename = "valueCode", skip_serializing_if = "Option::is_none")]
    pub value_code: Option<String>,
    #[serde(rename = "valueDateTime", skip_serializing_if = "Option::is_none")]
    pub value_date_time: Option<String>,
    #[serde(rename = "_valueDateTime", skip_serializing_if = "Option::is_none")]
    pub value_date_time_element: Option<Element>,
    #[serde(rename = "valueQuantity", skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
    #[serde(
        rename = "valueCodeableConcept",
        skip_serializing_if = "Option::is_none"
    )]
    pub value_codeable_concept: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extension: Vec<Extension>,
}

impl Extension {
    pub fn new(url: impl Into<String>) -> Self {
        Extension {
            url: url.into(),
            ..Extension::default()
        }
    }

    /// Extension marking a primitive as unknown
    pub fn data_absent(reason: &str) -> Self {
        Extension {
            url: DATA_ABSENT_REASON_URL.to_string(),
            value_code: Some(reason.to_string()),
            ..Extension::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub profile: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extension: Vec<Extension>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Organization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_status: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub category: Vec<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub modifier_extension: Vec<Extension>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub category: Vec<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_codeable_concept: Option<CodeableConcept>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifier: Vec<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub category: Vec<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provision: Option<ConsentProvision>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentProvision {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub code: Vec<CodeableConcept>,
}

/// Every resource kind the pipeline can emit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Patient(Patient),
    Organization(Organization),
    Encounter(Encounter),
    Condition(Condition),
    Observation(Observation),
    Consent(Consent),
}

impl Resource {
    pub fn fhir_type(&self) -> &'static str {
        match self {
            Resource::Patient(_) => "Patient",
            Resource::Organization(_) => "Organization",
            Resource::Encounter(_) => "Encounter",
            Resource::Condition(_) => "Condition",
            Resource::Observation(_) => "Observation",
            Resource::Consent(_) => "Consent",
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Resource::Patient(r) => r.id.as_deref(),
            Resource::Organization(r) => r.id.as_deref(),
            Resource::Encounter(r) => r.id.as_deref(),
            Resource::Condition(r) => r.id.as_deref(),
            Resource::Observation(r) => r.id.as_deref(),
            Resource::Consent(r) => r.id.as_deref(),
        }
    }

    pub fn set_id(&mut self, id: String) {
        match self {
            Resource::Patient(r) => r.id = Some(id),
            Resource::Organization(r) => r.id = Some(id),
            Resource::Encounter(r) => r.id = Some(id),
            Resource::Condition(r) => r.id = Some(id),
            Resource::Observation(r) => r.id = Some(id),
            Resource::Consent(r) => r.id = Some(id),
        }
    }

    pub fn clear_id(&mut self) {
        match self {
            Resource::Patient(r) => r.id = None,
            Resource::Organization(r) => r.id = None,
            Resource::Encounter(r) => r.id = None,
            Resource::Condition(r) => r.id = None,
            Resource::Observation(r) => r.id = None,
            Resource::Consent(r) => r.id = None,
        }
    }

    pub fn first_identifier(&self) -> Option<&Identifier> {
        match self {
            Resource::Patient(r) => r.identifier.first(),
            Resource::Organization(r) => r.identifier.first(),
            Resource::Encounter(r) => r.identifier.first(),
            Resource::Condition(r) => r.identifier.first(),
            Resource::Observation(r) => r.identifier.first(),
            Resource::Consent(r) => r.identifier.first(),
        }
    }

    /// True when the resource carries no clinical payload beyond its
    /// identifier and bookkeeping fields. Empty resources are dropped
    /// before bundling.
    pub fn is_empty(&self) -> bool {
        match self {
            Resource::Patient(r) => {
                r.identifier.is_empty() && r.gender.is_none() && r.extension.is_empty()
            }
            Resource::Organization(r) => r.identifier.is_empty() && r.name.is_none(),
            Resource::Encounter(r) => r.identifier.is_empty(),
            Resource::Condition(r) => {
                r.code.as_ref().map_or(true, CodeableConcept::is_empty)
                    && r.modifier_extension.is_empty()
            }
            Resource::Observation(r) => {
                r.value_quantity.is_none()
                    && r.value_codeable_concept
                        .as_ref()
                        .map_or(true, CodeableConcept::is_empty)
            }
            Resource::Consent(r) => r.status.is_none() && r.provision.is_none(),
        }
    }

    /// Attach the patient reference. Patient and Organization carry no
    /// subject; Consent links the patient through its `patient` field.
    pub fn set_subject(&mut self, reference: Reference) {
        match self {
            Resource::Patient(_) | Resource::Organization(_) => {}
            Resource::Encounter(r) => r.subject = Some(reference),
            Resource::Condition(r) => r.subject = Some(reference),
            Resource::Observation(r) => r.subject = Some(reference),
            Resource::Consent(r) => r.patient = Some(reference),
        }
    }

    /// Attach the encounter reference where the kind supports one
    pub fn set_encounter(&mut self, reference: Reference) {
        match self {
            Resource::Condition(r) => r.encounter = Some(reference),
            Resource::Observation(r) => r.encounter = Some(reference),
            _ => {}
        }
    }

    /// FHIR JSON with the `resourceType` discriminator first
    pub fn to_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert(
                "resourceType".to_string(),
                Value::String(self.fhir_type().to_string()),
            );
        }
        value
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    pub method: String,
    pub url: String,
    #[serde(rename = "ifNoneExist", skip_serializing_if = "Option::is_none")]
    pub if_none_exist: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub full_url: String,
    pub resource: Value,
    pub request: BundleRequest,
}

/// FHIR transaction bundle ready for serialization
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    pub fn transaction(entry: Vec<BundleEntry>) -> Self {
        Bundle {
            resource_type: "Bundle".to_string(),
            type_: "transaction".to_string(),
            entry,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_json_carries_resource_type() {
        let patient = Resource::Patient(Patient {
            gender: Some("female".to_string()),
            ..Patient::default()
        });

        let json = patient.to_json();
        assert_eq!(json["resourceType"], "Patient");
        assert_eq!(json["gender"], "female");
    }

    #[test]
    fn test_empty_fields_are_skipped() {
        let condition = Resource::Condition(Condition::default());
        let json = serde_json::to_string(&condition.to_json()).unwrap();
        assert_eq!(json, r#"{"resourceType":"Condition"}"#);
    }

    #[test]
    fn test_is_empty_per_kind() {
        assert!(Resource::Patient(Patient::default()).is_empty());
        assert!(Resource::Condition(Condition::default()).is_empty());

        let with_code = Resource::Condition(Condition {
            code: Some(CodeableConcept::from_coding(Coding::new(
                "http://snomed.info/sct",
                "410605003",
            ))),
            ..Condition::default()
        });
        assert!(!with_code.is_empty());

        // a concept whose codings all lack codes is still empty
        let hollow = Resource::Condition(Condition {
            code: Some(CodeableConcept::from_coding(Coding::default())),
            ..Condition::default()
        });
        assert!(hollow.is_empty());
    }

    #[test]
    fn test_subject_attachment_skips_patient_and_organization() {
        let reference = Reference::to_resource("Patient", "abc");

        let mut patient = Resource::Patient(Patient::default());
        patient.set_subject(reference.clone());
        assert_eq!(serde_json::to_value(&patient).unwrap(), serde_json::json!({}));

        let mut consent = Resource::Consent(Consent::default());
        consent.set_subject(reference.clone());
        if let Resource::Consent(c) = &consent {
            assert_eq!(c.patient.as_ref().unwrap().reference.as_deref(), Some("Patient/abc"));
        }

        let mut condition = Resource::Condition(Condition::default());
        condition.set_subject(reference);
        if let Resource::Condition(c) = &condition {
            assert!(c.subject.is_some());
        }
    }

    #[test]
    fn test_encounter_attachment_skips_consent() {
        let reference = Reference::to_resource("Encounter", "enc");

        let mut consent = Resource::Consent(Consent::default());
        consent.set_encounter(reference.clone());
        assert_eq!(serde_json::to_value(&consent).unwrap(), serde_json::json!({}));

        let mut observation = Resource::Observation(Observation::default());
        observation.set_encounter(reference);
        if let Resource::Observation(o) = &observation {
            assert!(o.encounter.is_some());
        }
    }

    #[test]
    fn test_transaction_bundle_shape() {
        let bundle = Bundle::transaction(vec![BundleEntry {
            full_url: "Patient/abc".to_string(),
            resource: serde_json::json!({"resourceType": "Patient"}),
            request: BundleRequest {
                method: "POST".to_string(),
                url: "Patient".to_string(),
                if_none_exist: Some("identifier=sys|val".to_string()),
            },
        }]);

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["resourceType"], "Bundle");
        assert_eq!(json["type"], "transaction");
        assert_eq!(json["entry"][0]["fullUrl"], "Patient/abc");
        assert_eq!(json["entry"][0]["request"]["ifNoneExist"], "identifier=sys|val");
    }
}
