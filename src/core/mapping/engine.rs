//! Subject mapping engine
//!
//! Drives the per-subject transformation: organization and patient scaffolding,
//! encounter generation for designated visits, rule dispatch per complete form,
//! reference wiring and final id assignment.

use crate::config::MappingConfig;
use crate::core::mapping::identity::IdentityRegistry;
use crate::core::mapping::rules::{default_rules, FormRule, FormScope, MappingContext};
use crate::core::mapping::terminology::ACT_CODE;
use crate::domain::fhir::{Coding, Encounter, Organization, Patient, Reference, Resource};
use crate::domain::odm::SubjectData;
use crate::domain::result::Result;
use tracing::debug;

/// Maps one subject at a time into FHIR resources
pub struct MappingEngine {
    options: MappingConfig,
    identity: IdentityRegistry,
    rules: Vec<Box<dyn FormRule>>,
}

impl MappingEngine {
    pub fn new(options: MappingConfig) -> Self {
        Self::with_rules(options, default_rules())
    }

    /// Engine with a caller-supplied rule set instead of the built-in one
    pub fn with_rules(options: MappingConfig, rules: Vec<Box<dyn FormRule>>) -> Self {
        let identity = IdentityRegistry::new(&options);
        Self {
            identity,
            rules,
            options,
        }
    }

    /// Map one subject into its resource set
    ///
    /// Output order is stable: the assigner organization, the patient,
    /// then per visit the encounter followed by the resources of its
    /// forms. Empty resources are dropped; every kept resource gets its
    /// final id and the patient/encounter references.
    ///
    /// # Errors
    ///
    /// A failing rule aborts this subject only; the caller decides whether
    /// to continue with the remaining subjects.
    pub fn map_subject(&self, subject: &SubjectData) -> Result<Vec<Resource>> {
        let mut patient = Patient {
            identifier: vec![self.identity.patient_identifier(&subject.subject_key)],
            ..Patient::default()
        };

        let mut mapped = Vec::new();
        for event in subject.merged_study_events() {
            let encounter = self.encounter_for(&subject.subject_key, &event);

            let mut event_resources = Vec::new();
            for form in &event.form_data {
                if !form.is_complete(self.options.incomplete_forms_allowed) {
                    debug!(
                        subject_key = %subject.subject_key,
                        form_oid = %form.form_oid,
                        "Skipping incomplete form"
                    );
                    continue;
                }

                let scope = FormScope {
                    subject_key: &subject.subject_key,
                    event: &event,
                    form,
                };
                for rule in &self.rules {
                    if !rule.applies_to(&form.form_oid) {
                        continue;
                    }
                    let mut context = MappingContext {
                        patient: &mut patient,
                        options: &self.options,
                        identity: &self.identity,
                    };
                    event_resources.extend(rule.apply(&mut context, &scope)?);
                }
            }

            event_resources.retain(|resource| !resource.is_empty());

            if let Some(encounter) = encounter {
                let reference =
                    Reference::to_resource("Encounter", encounter.id.as_deref().unwrap_or(""));
                for resource in &mut event_resources {
                    resource.set_encounter(reference.clone());
                }
                mapped.push(Resource::Encounter(encounter));
            }
            mapped.append(&mut event_resources);
        }

        let mut resources = Vec::new();
        resources.push(Resource::Organization(self.organization()));
        resources.push(Resource::Patient(patient));
        resources.append(&mut mapped);

        self.finalize(&mut resources);
        Ok(resources)
    }

    /// Encounter for visits whose OID carries a configured designator
    fn encounter_for(&self, subject_key: &str, event: &crate::domain::odm::StudyEventData) -> Option<Encounter> {
        let designated = self
            .options
            .encounter_designators
            .iter()
            .any(|designator| event.study_event_oid.contains(designator.as_str()));
        if !designated {
            return None;
        }

        let identifier = self.identity.encounter_identifier(
            subject_key,
            &event.study_event_oid,
            &event.study_event_repeat_key,
        );
        let id = self.identity.resource_id(&identifier);
        Some(Encounter {
            id: Some(id),
            identifier: vec![identifier],
            status: Some("unknown".to_string()),
            class: Some(Coding::new(ACT_CODE, "IMP").with_display("inpatient encounter")),
            subject: None,
        })
    }

    fn organization(&self) -> Organization {
        let name = self.identity.assigner_name();
        Organization {
            id: None,
            identifier: vec![self.identity.organization_identifier(name)],
            name: Some(name.to_string()),
        }
    }

    /// Assign final ids from identifiers and wire up the patient reference
    fn finalize(&self, resources: &mut [Resource]) {
        for resource in resources.iter_mut() {
            if let Some(identifier) = resource.first_identifier() {
                let id = self.identity.resource_id(identifier);
                resource.set_id(id);
            }
        }

        let patient_reference = resources
            .iter()
            .find(|resource| resource.fhir_type() == "Patient")
            .and_then(|patient| patient.id())
            .map(|id| Reference::to_resource("Patient", id));

        if let Some(reference) = patient_reference {
            for resource in resources.iter_mut() {
                resource.set_subject(reference.clone());
            }
        }
    }
}
