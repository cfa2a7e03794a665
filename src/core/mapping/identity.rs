//! Deterministic identity derivation
//!
//! Every emitted resource gets a logical identifier derived from the full
//! source position of its anchor item, and a resource id derived from that
//! identifier. Re-running the pipeline over unchanged source data yields
//! byte-identical identifiers and ids, which is what makes conditional
//! creates and update-as-create idempotent.

use crate::config::MappingConfig;
use crate::core::mapping::terminology::IDENTIFIER_TYPE;
use crate::domain::fhir::{CodeableConcept, Coding, Identifier, Reference};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

/// Assigner organization name used when none is configured
const DEFAULT_ASSIGNER: &str = "Unnamed Hospital";

/// SHA-256 hex digest of a string
pub fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derives identifier systems and values for emitted resources
pub struct IdentityRegistry {
    debug_identifiers: bool,
    subject_keys_hashed: bool,
    identifier_base: String,
    systems: std::collections::HashMap<String, String>,
    assigner: String,
    // id of the assigner Organization, referenced by patient identifiers
    organization_id: String,
    // resource kinds whose fallback system was already reported
    warned_fallbacks: Mutex<HashSet<String>>,
}

impl IdentityRegistry {
    pub fn new(options: &MappingConfig) -> Self {
        let assigner = options.assigner.clone().unwrap_or_else(|| {
            warn!(
                assigner = DEFAULT_ASSIGNER,
                "No assigner configured, using default"
            );
            DEFAULT_ASSIGNER.to_string()
        });

        let mut registry = Self {
            debug_identifiers: options.debug_identifiers,
            subject_keys_hashed: options.subject_keys_hashed,
            identifier_base: options.identifier_base.clone(),
            systems: options.identifier_systems.clone(),
            assigner,
            organization_id: String::new(),
            warned_fallbacks: Mutex::new(HashSet::new()),
        };
        let name = registry.assigner.clone();
        let identifier = registry.organization_identifier(&name);
        registry.organization_id = registry.resource_id(&identifier);
        registry
    }

    pub fn assigner_name(&self) -> &str {
        &self.assigner
    }

    /// Identifier system for a resource kind
    ///
    /// Configured systems win; otherwise a system is synthesized from the
    /// identifier base, with a warning logged once per kind.
    pub fn system_for(&self, kind: &str) -> String {
        if let Some(system) = self.systems.get(&kind.to_lowercase()) {
            return system.clone();
        }

        let fallback = format!("{}/{}Id", self.identifier_base, kind);
        let mut warned = self
            .warned_fallbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if warned.insert(kind.to_string()) {
            warn!(
                resource_kind = kind,
                system = %fallback,
                "No identifier system configured, using fallback"
            );
        }
        fallback
    }

    /// Identifier anchored at one source item
    ///
    /// The value encodes the complete position of the item in the source
    /// tree. It is hashed unless debug identifiers are enabled.
    #[allow(clippy::too_many_arguments)]
    pub fn create_identifier(
        &self,
        kind: &str,
        subject_key: &str,
        event: (&str, &str),
        form: (&str, &str),
        group: (&str, &str),
        item_oid: &str,
    ) -> Identifier {
        let value = format!(
            "{}-{}.{}-{}.{}-{}.{}-{}",
            subject_key, event.0, event.1, form.0, form.1, group.0, group.1, item_oid
        );
        self.identifier_with_value(kind, &value)
    }

    /// Patient identifier carrying the subject key, hashed unless subject
    /// key hashing is disabled or debug identifiers are enabled. Typed as
    /// a medical record number and assigned by the emitted Organization.
    pub fn patient_identifier(&self, subject_key: &str) -> Identifier {
        let value = if self.subject_keys_hashed && !self.debug_identifiers {
            digest(subject_key)
        } else {
            subject_key.to_string()
        };
        Identifier {
            system: Some(self.system_for("Patient")),
            value: Some(value),
            assigner: Some(Box::new(self.organization_reference())),
            type_: Some(CodeableConcept::from_coding(Coding::new(
                IDENTIFIER_TYPE,
                "MR",
            ))),
        }
    }

    /// Organization identifier carrying the assigner name
    pub fn organization_identifier(&self, name: &str) -> Identifier {
        let value = if self.debug_identifiers {
            name.to_string()
        } else {
            digest(name)
        };
        Identifier {
            system: Some(self.system_for("Organization")),
            value: Some(value),
            assigner: None,
            type_: None,
        }
    }

    /// Encounter identifier anchored at one study event occurrence
    pub fn encounter_identifier(
        &self,
        subject_key: &str,
        event_oid: &str,
        repeat_key: &str,
    ) -> Identifier {
        self.identifier_with_value("Encounter", &format!("{subject_key}-{event_oid}.{repeat_key}"))
    }

    /// Resource id derived from an identifier: digest of system and value
    pub fn resource_id(&self, identifier: &Identifier) -> String {
        digest(&format!(
            "{}{}",
            identifier.system.as_deref().unwrap_or(""),
            identifier.value.as_deref().unwrap_or("")
        ))
    }

    /// Reference to the assigner Organization every run emits
    pub fn organization_reference(&self) -> Reference {
        Reference {
            reference: Some(format!("Organization/{}", self.organization_id)),
            identifier: None,
            display: None,
        }
    }

    fn identifier_with_value(&self, kind: &str, value: &str) -> Identifier {
        let value = if self.debug_identifiers {
            value.to_string()
        } else {
            digest(value)
        };
        Identifier {
            system: Some(self.system_for(kind)),
            value: Some(value),
            assigner: None,
            type_: None,
        }
    }
}
