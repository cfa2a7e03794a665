//! Transaction bundle assembly
//!
//! Packs one subject's mapped resources into a FHIR transaction bundle.
//! Entries are conditional creates keyed by logical identifier, or plain
//! updates when update-as-create is enabled, so redelivery of the same
//! bundle never duplicates resources on the target.

use crate::config::FhirConfig;
use crate::domain::fhir::{Bundle, BundleEntry, BundleRequest, Resource};
use serde_json::Value;
use tracing::warn;

/// Validation hook applied before bundling
///
/// A resource reporting errors is excluded from the bundle. The default
/// pipeline runs without a validator.
pub trait BundleValidator: Send + Sync {
    fn has_errors(&self, resource: &Resource) -> bool;
}

/// One subject's deliverable bundle
#[derive(Debug, Clone)]
pub struct PatientBundle {
    /// Logical patient identifier value, used as the delivery key
    pub patient_identifier: String,
    pub bundle: Bundle,
}

impl PatientBundle {
    pub fn is_empty(&self) -> bool {
        self.bundle.is_empty()
    }

    pub fn resource_count(&self) -> usize {
        self.bundle.len()
    }
}

/// Assembles transaction bundles from mapped resources
pub struct Bundler {
    update_as_create: bool,
    strip_displays: bool,
    validator: Option<Box<dyn BundleValidator>>,
}

impl Bundler {
    pub fn new(options: &FhirConfig) -> Self {
        Self {
            update_as_create: options.update_as_create,
            strip_displays: options.strip_displays,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Box<dyn BundleValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Build the transaction bundle for one subject's resources
    pub fn bundle(&self, resources: Vec<Resource>) -> PatientBundle {
        let patient_identifier = resources
            .iter()
            .find(|resource| resource.fhir_type() == "Patient")
            .and_then(Resource::first_identifier)
            .and_then(|identifier| identifier.value.clone())
            .unwrap_or_default();

        let entries = resources
            .into_iter()
            .filter(|resource| self.passes_validation(resource))
            .map(|resource| self.entry(resource))
            .collect();

        PatientBundle {
            patient_identifier,
            bundle: Bundle::transaction(entries),
        }
    }

    fn passes_validation(&self, resource: &Resource) -> bool {
        match &self.validator {
            Some(validator) if validator.has_errors(resource) => {
                warn!(
                    fhir_type = resource.fhir_type(),
                    id = resource.id().unwrap_or(""),
                    "Excluding resource with validation errors"
                );
                false
            }
            _ => true,
        }
    }

    fn entry(&self, mut resource: Resource) -> BundleEntry {
        let fhir_type = resource.fhir_type();
        let full_url = format!("{}/{}", fhir_type, resource.id().unwrap_or(""));

        let request = if self.update_as_create {
            BundleRequest {
                method: "PUT".to_string(),
                url: full_url.clone(),
                if_none_exist: None,
            }
        } else {
            let if_none_exist = resource.first_identifier().map(|identifier| {
                format!(
                    "identifier={}|{}",
                    identifier.system.as_deref().unwrap_or(""),
                    identifier.value.as_deref().unwrap_or("")
                )
                .replace(' ', "%20")
            });
            // conditional creates assign the id server-side
            resource.clear_id();
            BundleRequest {
                method: "POST".to_string(),
                url: fhir_type.to_string(),
                if_none_exist,
            }
        };

        let mut json = resource.to_json();
        if self.strip_displays {
            strip_displays(&mut json);
        }

        BundleEntry {
            full_url,
            resource: json,
            request,
        }
    }
}

/// Remove display texts recursively
fn strip_displays(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("display");
            for child in map.values_mut() {
                strip_displays(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_displays(item);
            }
        }
        _ => {}
    }
}
