//! Target field schema and the structured record it produces.
//!
//! A [`FieldSchema`] is the fixed list of identification fields the analyzer
//! asks the hosted model for. A [`StructuredRecord`] built from it always has
//! exactly the schema's keys, in schema order; values are `None` when the
//! field was not found.

use crate::error::ExtractError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;

/// One field the analyzer should extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// JSON key used in the prompt and in the record, e.g. `"date_of_birth"`.
    pub name: String,
    /// Short hint embedded in the prompt. May be empty.
    #[serde(default)]
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Ordered, duplicate-free set of target fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl Default for FieldSchema {
    /// Personal-identification fields found on passports, ID cards,
    /// certificates and income statements.
    fn default() -> Self {
        let fields = [
            ("full_name", "Full name of the document holder"),
            ("father_name", "Father's or guardian's name, if printed"),
            ("mother_name", "Mother's name, if printed"),
            ("date_of_birth", "Date of birth as printed"),
            ("gender", "Gender or sex"),
            ("nationality", "Nationality or citizenship"),
            ("place_of_birth", "Place of birth"),
            ("address", "Residential address"),
            ("document_type", "Kind of document, e.g. passport, national ID, marksheet"),
            ("document_number", "Primary document or passport number"),
            ("id_number", "National or personal identification number"),
            ("issuing_authority", "Authority or country that issued the document"),
            ("issue_date", "Date of issue"),
            ("expiry_date", "Date of expiry"),
        ];
        Self {
            fields: fields
                .iter()
                .map(|(n, d)| FieldSpec::new(*n, *d))
                .collect(),
        }
    }
}

impl FieldSchema {
    /// Build a schema from field specs, rejecting empty or duplicate names.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, ExtractError> {
        if fields.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Field schema must contain at least one field".into(),
            ));
        }
        let mut seen = HashSet::new();
        for f in &fields {
            let name = f.name.trim();
            if name.is_empty() {
                return Err(ExtractError::InvalidConfig(
                    "Field names must not be empty".into(),
                ));
            }
            if name != f.name {
                return Err(ExtractError::InvalidConfig(format!(
                    "Field name '{}' has surrounding whitespace",
                    f.name
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(ExtractError::InvalidConfig(format!(
                    "Duplicate field name '{}'",
                    name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Build a schema from bare field names (no descriptions).
    pub fn from_names<I, S>(names: I) -> Result<Self, ExtractError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|n| FieldSpec::new(n, String::new()))
                .collect(),
        )
    }

    /// Parse a schema from JSON.
    ///
    /// Accepts either an array of names (`["name", "id_number"]`), an array
    /// of `{"name": …, "description": …}` objects, or an object mapping each
    /// name to its description.
    pub fn from_json(json: &str) -> Result<Self, ExtractError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Entry {
            Name(String),
            Spec(FieldSpec),
        }

        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ExtractError::InvalidConfig(format!("Schema is not valid JSON: {e}")))?;

        match value {
            serde_json::Value::Array(_) => {
                let entries: Vec<Entry> = serde_json::from_value(value).map_err(|e| {
                    ExtractError::InvalidConfig(format!("Invalid schema entry: {e}"))
                })?;
                Self::new(
                    entries
                        .into_iter()
                        .map(|e| match e {
                            Entry::Name(n) => FieldSpec::new(n, String::new()),
                            Entry::Spec(s) => s,
                        })
                        .collect(),
                )
            }
            serde_json::Value::Object(map) => {
                let mut fields = Vec::with_capacity(map.len());
                for (name, desc) in map {
                    let description = match desc {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => {
                            return Err(ExtractError::InvalidConfig(format!(
                                "Description for '{name}' must be a string, got {other}"
                            )))
                        }
                    };
                    fields.push(FieldSpec::new(name, description));
                }
                Self::new(fields)
            }
            _ => Err(ExtractError::InvalidConfig(
                "Schema must be a JSON array or object".into(),
            )),
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// A record with every field set to `None`.
    pub fn empty_record(&self) -> StructuredRecord {
        StructuredRecord {
            entries: self.fields.iter().map(|f| (f.name.clone(), None)).collect(),
        }
    }
}

/// Field name → extracted value, keyed by a [`FieldSchema`].
///
/// Serialises as a JSON object in schema order, with `null` for missing
/// values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredRecord {
    entries: Vec<(String, Option<String>)>,
}

impl StructuredRecord {
    /// Set a field's value. Returns `false` (and changes nothing) when the
    /// field is not part of the schema.
    pub fn set(&mut self, field: &str, value: Option<String>) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == field) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Value of a field; `None` both for unknown fields and null values.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == field)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of fields with a value.
    pub fn filled(&self) -> usize {
        self.entries.iter().filter(|(_, v)| v.is_some()).count()
    }

    pub fn is_all_null(&self) -> bool {
        self.filled() == 0
    }

    /// Copy values from `other` into fields that are still null here.
    ///
    /// Returns how many fields were filled.
    pub fn merge_missing(&mut self, other: &StructuredRecord) -> usize {
        let mut filled = 0;
        for (key, slot) in self.entries.iter_mut() {
            if slot.is_none() {
                if let Some(v) = other.get(key) {
                    *slot = Some(v.to_string());
                    filled += 1;
                }
            }
        }
        filled
    }
}

impl Serialize for StructuredRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
