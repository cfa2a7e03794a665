//! ODM source-tree model
//!
//! In-memory representation of one study extraction: subjects containing
//! repeated study events, each containing forms, item groups and leaf items.
//! Parsed from CDISC ODM XML. All lookups are total functions: a missing
//! group or item yields a synthetic empty entity, never an error, so the
//! mapping rules never need existence checks.

use crate::domain::errors::StudyliftError;
use crate::domain::result::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Form status values that count as complete: complete (2), locked (4), signed (5)
pub const COMPLETION_CODES: [&str; 3] = ["2", "4", "5"];

/// The demographics form is always mapped, complete or not
pub const DEMOGRAPHICS_FORM_OID: &str = "demographie";

/// Root ODM document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Odm {
    /// Declared creation time of the extraction, seeds the incremental window
    #[serde(rename = "@CreationDateTime", default)]
    pub creation_date_time: Option<String>,

    #[serde(rename = "ClinicalData", default)]
    pub clinical_data: Vec<ClinicalData>,
}

/// One ClinicalData block (one study)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalData {
    #[serde(rename = "@StudyOID", default)]
    pub study_oid: String,

    #[serde(rename = "SubjectData", default)]
    pub subject_data: Vec<SubjectData>,
}

/// One subject's captured data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectData {
    #[serde(rename = "@SubjectKey", default)]
    pub subject_key: String,

    #[serde(rename = "StudyEventData", default)]
    pub study_event_data: Vec<StudyEventData>,

    /// Forms captured outside any study event (some exports emit these)
    #[serde(rename = "FormData", default)]
    pub form_data: Vec<FormData>,
}

/// One study event (visit) occurrence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyEventData {
    #[serde(rename = "@StudyEventOID", default)]
    pub study_event_oid: String,

    #[serde(rename = "@StudyEventRepeatKey", default)]
    pub study_event_repeat_key: String,

    #[serde(rename = "FormData", default)]
    pub form_data: Vec<FormData>,
}

/// One form occurrence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormData {
    #[serde(rename = "@FormOID", default)]
    pub form_oid: String,

    #[serde(rename = "@FormRepeatKey", default)]
    pub form_repeat_key: String,

    #[serde(rename = "ItemGroupData", default)]
    pub item_group_data: Vec<ItemGroupData>,
}

/// One item-group occurrence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemGroupData {
    #[serde(rename = "@ItemGroupOID", default)]
    pub item_group_oid: String,

    #[serde(rename = "@ItemGroupRepeatKey", default)]
    pub item_group_repeat_key: String,

    #[serde(rename = "ItemData", default)]
    pub item_data: Vec<ItemData>,
}

/// One leaf data item: stable field code plus raw string value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemData {
    #[serde(rename = "@ItemOID", default)]
    pub item_oid: String,

    #[serde(rename = "@Value", default)]
    pub value: String,
}

impl Odm {
    /// Parse an ODM XML document
    ///
    /// Escaped value tokens (`PLUS`, `EQUAL`, ...) are decoded after parsing.
    ///
    /// # Errors
    ///
    /// Returns [`StudyliftError::Parse`] if the input is not well-formed XML
    /// or contains no clinical data at all (fatal for the whole run).
    pub fn parse(xml: &str) -> Result<Self> {
        let mut odm: Odm = quick_xml::de::from_str(xml)
            .map_err(|e| StudyliftError::Parse(format!("Not a well-formed ODM document: {e}")))?;

        if odm.is_empty() {
            return Err(StudyliftError::Parse(
                "Input is not in valid ODM format".to_string(),
            ));
        }

        for clinical_data in &mut odm.clinical_data {
            for subject in &mut clinical_data.subject_data {
                subject.decode_values();
            }
        }

        Ok(odm)
    }

    /// True when the document carries no subject data
    pub fn is_empty(&self) -> bool {
        self.clinical_data
            .iter()
            .all(|clinical_data| clinical_data.subject_data.is_empty())
    }

    /// All subjects across all ClinicalData blocks, in document order
    pub fn subjects(&self) -> impl Iterator<Item = &SubjectData> {
        self.clinical_data
            .iter()
            .flat_map(|clinical_data| clinical_data.subject_data.iter())
    }
}

impl SubjectData {
    pub fn is_empty(&self) -> bool {
        self.study_event_data.is_empty() && self.form_data.is_empty()
    }

    /// Merge repeated study events sharing the same `{oid}.{repeat_key}`
    /// compound key, concatenating their forms. Output is ordered by
    /// compound key ascending, so the merge is deterministic regardless of
    /// input order.
    pub fn merged_study_events(&self) -> Vec<StudyEventData> {
        let mut merged: BTreeMap<String, StudyEventData> = BTreeMap::new();

        for event in &self.study_event_data {
            let key = format!("{}.{}", event.study_event_oid, event.study_event_repeat_key);
            merged
                .entry(key)
                .and_modify(|existing| existing.form_data.extend(event.form_data.clone()))
                .or_insert_with(|| event.clone());
        }

        merged.into_values().collect()
    }

    /// Structural content hash of the parsed subject
    ///
    /// SHA-256 hex over the canonical JSON serialization. Byte-identical
    /// source data yields byte-identical hashes across process runs, which
    /// is what the change tracker persists and compares.
    pub fn content_hash(&self) -> String {
        // serde_json emits struct fields in declaration order, so the
        // serialization is already canonical
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn decode_values(&mut self) {
        for event in &mut self.study_event_data {
            for form in &mut event.form_data {
                form.decode_values();
            }
        }
        for form in &mut self.form_data {
            form.decode_values();
        }
    }
}

impl FormData {
    pub fn is_empty(&self) -> bool {
        self.item_group_data.is_empty()
    }

    /// First item group with the given OID, or a synthetic empty group
    pub fn item_group_data(&self, item_group_oid: &str) -> ItemGroupData {
        self.item_group_data
            .iter()
            .find(|group| group.item_group_oid == item_group_oid)
            .cloned()
            .unwrap_or_else(|| ItemGroupData {
                item_group_oid: item_group_oid.to_string(),
                ..ItemGroupData::default()
            })
    }

    /// First item with the given OID across all groups, or a synthetic
    /// empty item. Never fails, so mapping rules can chain lookups freely.
    pub fn item_data(&self, item_oid: &str) -> ItemData {
        self.item_group_data
            .iter()
            .flat_map(|group| group.item_data.iter())
            .find(|item| item.item_oid == item_oid)
            .cloned()
            .unwrap_or_else(|| ItemData {
                item_oid: item_oid.to_string(),
                ..ItemData::default()
            })
    }

    /// Compound key of the group owning an item, for path diagnostics.
    /// Falls back to empty keys when the item is synthetic.
    pub fn owning_group(&self, item_oid: &str) -> (String, String) {
        self.item_group_data
            .iter()
            .find(|group| group.item_data.iter().any(|item| item.item_oid == item_oid))
            .map(|group| {
                (
                    group.item_group_oid.clone(),
                    group.item_group_repeat_key.clone(),
                )
            })
            .unwrap_or_default()
    }

    /// Completeness gate: the demographics form is always complete, the
    /// `allow_incomplete` override accepts everything, otherwise the
    /// REDCap `{form_oid}_complete` or DIS `Status` item must hold one of
    /// the completion codes.
    pub fn is_complete(&self, allow_incomplete: bool) -> bool {
        self.form_oid.ends_with(DEMOGRAPHICS_FORM_OID)
            || allow_incomplete
            || [format!("{}_complete", self.form_oid), "Status".to_string()]
                .iter()
                .map(|oid| self.item_data(oid))
                .any(|item| COMPLETION_CODES.contains(&item.value.as_str()))
    }

    fn decode_values(&mut self) {
        for group in &mut self.item_group_data {
            for item in &mut group.item_data {
                item.value = decode_escaped_value(&item.value);
            }
        }
    }
}

impl ItemGroupData {
    pub fn is_empty(&self) -> bool {
        self.item_data.is_empty()
    }
}

impl ItemData {
    /// Emptiness = blank after whitespace trimming
    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Copy of this item carrying a different value, used when logging
    /// the offending part of a composite token
    pub fn with_value(&self, value: &str) -> ItemData {
        ItemData {
            item_oid: self.item_oid.clone(),
            value: value.to_string(),
        }
    }
}

/// Decode escaped characters some export channels cannot transmit raw
fn decode_escaped_value(value: &str) -> String {
    value
        .replace("PLUS", "+")
        .replace("EQUAL", "=")
        .replace("COLON", ":")
        .replace("COMMA", ",")
        .replace("LESSTHAN", "<")
        .replace("LBRACKET", "{")
        .replace("RBRACKET", "}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(oid: &str, value: &str) -> ItemData {
        ItemData {
            item_oid: oid.to_string(),
            value: value.to_string(),
        }
    }

    fn form_with_items(form_oid: &str, items: Vec<ItemData>) -> FormData {
        FormData {
            form_oid: form_oid.to_string(),
            form_repeat_key: "1".to_string(),
            item_group_data: vec![ItemGroupData {
                item_group_oid: format!("{form_oid}.g1"),
                item_group_repeat_key: "1".to_string(),
                item_data: items,
            }],
        }
    }

    const SAMPLE_ODM: &str = r#"<ODM CreationDateTime="2024-03-01T12:00:00">
      <ClinicalData StudyOID="S">
        <SubjectData SubjectKey="S1">
          <StudyEventData StudyEventOID="V1" StudyEventRepeatKey="1">
            <FormData FormOID="demographie" FormRepeatKey="1">
              <ItemGroupData ItemGroupOID="demographie.g1" ItemGroupRepeatKey="1">
                <ItemData ItemOID="alter" Value="42"/>
              </ItemGroupData>
            </FormData>
          </StudyEventData>
        </SubjectData>
      </ClinicalData>
    </ODM>"#;

    #[test]
    fn test_parse_sample_document() {
        let odm = Odm::parse(SAMPLE_ODM).unwrap();
        assert_eq!(
            odm.creation_date_time.as_deref(),
            Some("2024-03-01T12:00:00")
        );

        let subjects: Vec<_> = odm.subjects().collect();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].subject_key, "S1");
        assert_eq!(subjects[0].study_event_data[0].study_event_oid, "V1");
    }

    #[test]
    fn test_parse_rejects_non_odm() {
        assert!(Odm::parse("not xml at all <<<").is_err());
        assert!(Odm::parse("<ODM></ODM>").is_err());
    }

    #[test]
    fn test_item_lookup_is_total() {
        let form = form_with_items("f", vec![item("known", "x")]);

        let found = form.item_data("known");
        assert_eq!(found.value, "x");

        let missing = form.item_data("absent");
        assert_eq!(missing.item_oid, "absent");
        assert!(missing.is_empty());
    }

    #[test]
    fn test_group_lookup_is_total() {
        let form = form_with_items("f", vec![]);
        let missing = form.item_group_data("nope");
        assert_eq!(missing.item_group_oid, "nope");
        assert!(missing.is_empty());
    }

    #[test]
    fn test_merged_study_events_concatenates_and_sorts() {
        let event = |oid: &str, repeat: &str, form_oid: &str| StudyEventData {
            study_event_oid: oid.to_string(),
            study_event_repeat_key: repeat.to_string(),
            form_data: vec![form_with_items(form_oid, vec![])],
        };

        let subject = SubjectData {
            subject_key: "S1".to_string(),
            study_event_data: vec![
                event("V2", "1", "b"),
                event("V1", "1", "a1"),
                event("V1", "1", "a2"),
            ],
            form_data: vec![],
        };

        let merged = subject.merged_study_events();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].study_event_oid, "V1");
        assert_eq!(merged[0].form_data.len(), 2);
        assert_eq!(merged[0].form_data[0].form_oid, "a1");
        assert_eq!(merged[0].form_data[1].form_oid, "a2");
        assert_eq!(merged[1].study_event_oid, "V2");
    }

    #[test]
    fn test_merge_order_independent_of_input_order() {
        let event = |oid: &str, form_oid: &str| StudyEventData {
            study_event_oid: oid.to_string(),
            study_event_repeat_key: "1".to_string(),
            form_data: vec![form_with_items(form_oid, vec![])],
        };

        let forward = SubjectData {
            subject_key: "S1".to_string(),
            study_event_data: vec![event("V1", "a"), event("V2", "b")],
            form_data: vec![],
        };
        let reversed = SubjectData {
            subject_key: "S1".to_string(),
            study_event_data: vec![event("V2", "b"), event("V1", "a")],
            form_data: vec![],
        };

        let oids = |subject: &SubjectData| {
            subject
                .merged_study_events()
                .iter()
                .map(|event| event.study_event_oid.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(oids(&forward), oids(&reversed));
    }

    #[test]
    fn test_completion_gating() {
        let mut form = form_with_items("anamnese", vec![item("anamnese_complete", "1")]);
        assert!(!form.is_complete(false));
        assert!(form.is_complete(true));

        form.item_group_data[0].item_data[0].value = "4".to_string();
        assert!(form.is_complete(false));

        let dis_form = form_with_items("anamnese", vec![item("Status", "2")]);
        assert!(dis_form.is_complete(false));

        let demographics = form_with_items("demographie", vec![]);
        assert!(demographics.is_complete(false));
    }

    #[test]
    fn test_content_hash_stable_and_sensitive() {
        let odm = Odm::parse(SAMPLE_ODM).unwrap();
        let subject = odm.subjects().next().unwrap();

        let first = subject.content_hash();
        let second = subject.content_hash();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let mut changed = subject.clone();
        changed.study_event_data[0].form_data[0].item_group_data[0].item_data[0].value =
            "43".to_string();
        assert_ne!(first, changed.content_hash());
    }

    #[test]
    fn test_decode_escaped_value() {
        assert_eq!(decode_escaped_value("aPLUSb"), "a+b");
        assert_eq!(decode_escaped_value("10COLON30"), "10:30");
        assert_eq!(decode_escaped_value("LBRACKETxRBRACKET"), "{x}");
        assert_eq!(decode_escaped_value("plain"), "plain");
    }

    #[test]
    fn test_owning_group() {
        let form = form_with_items("f", vec![item("a", "1")]);
        assert_eq!(form.owning_group("a"), ("f.g1".to_string(), "1".to_string()));
        assert_eq!(form.owning_group("absent"), (String::new(), String::new()));
    }
}
