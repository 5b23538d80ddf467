use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{MorselError, Result};

/// Largest number of fields addressable by the postings field byte
pub const MAX_FIELDS: usize = 127;

const WEIGHT_SUM_TOLERANCE: f32 = 1e-4;

/// How a field's raw values are kept for result display
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Indexed only
    Unstored,
    /// Only the first value of the field in each document is kept
    Single,
    /// All values are joined into one stored value
    Concatenated,
    /// Every value is kept as its own slice, in document order
    #[default]
    JsonSliced,
}

/// Parameters for the storage strategy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageParams {
    /// Joiner for `Concatenated` storage
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Stored values are cut to this many chars
    #[serde(default)]
    pub max_len: Option<usize>,
}

fn default_separator() -> String {
    " ".to_string()
}

impl Default for StorageParams {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            max_len: None,
        }
    }
}

/// User-facing declaration of one field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub weight: f32,
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default)]
    pub storage_params: StorageParams,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, weight: f32, storage: StorageKind) -> Self {
        Self {
            name: name.into(),
            weight,
            storage,
            storage_params: StorageParams::default(),
        }
    }

    pub fn with_storage_params(mut self, params: StorageParams) -> Self {
        self.storage_params = params;
        self
    }
}

/// A resolved field with its id
#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    pub id: u8,
    pub name: String,
    pub weight: f32,
    pub storage: StorageKind,
    pub storage_params: StorageParams,
}

impl FieldInfo {
    pub fn is_indexed(&self) -> bool {
        self.weight > 0.0
    }
}

/// One stored value: `[field_id, text]` in JSON
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredField(pub u8, pub String);

/// `fieldInfo.json` entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldInfoEntry {
    pub id: u8,
    pub storage: StorageKind,
    #[serde(rename = "storageParams", default)]
    pub storage_params: StorageParams,
    pub weight: f32,
}

/// The validated field set of an index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, FieldInfoEntry>",
    into = "BTreeMap<String, FieldInfoEntry>"
)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    by_name: HashMap<String, u8>,
}

impl FieldInfos {
    /// Assign ids in declaration order and validate the field set
    pub fn new(configs: &[FieldConfig]) -> Result<Self> {
        if configs.len() > MAX_FIELDS {
            return Err(MorselError::TooManyFields(configs.len()));
        }

        let mut fields = Vec::with_capacity(configs.len());
        let mut by_name = HashMap::with_capacity(configs.len());
        for (idx, config) in configs.iter().enumerate() {
            let id = idx as u8;
            if by_name.insert(config.name.clone(), id).is_some() {
                return Err(MorselError::DuplicateField(config.name.clone()));
            }
            fields.push(FieldInfo {
                id,
                name: config.name.clone(),
                weight: config.weight,
                storage: config.storage,
                storage_params: config.storage_params.clone(),
            });
        }

        let infos = Self { fields, by_name };
        infos.validate_weights()?;
        Ok(infos)
    }

    fn validate_weights(&self) -> Result<()> {
        let sum: f32 = self.fields.iter().map(|f| f.weight).sum();
        let any_negative = self.fields.iter().any(|f| f.weight < 0.0);
        if any_negative || (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(MorselError::InvalidFieldWeights(sum));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&id| &self.fields[id as usize])
    }

    pub fn by_id(&self, id: u8) -> Option<&FieldInfo> {
        self.fields.get(id as usize)
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }

    /// Field weights indexed by field id
    pub fn weights(&self) -> Vec<f32> {
        self.fields.iter().map(|f| f.weight).collect()
    }

    /// Apply each field's storage strategy to a document's raw values.
    ///
    /// Unknown field names are ignored.
    pub fn stored_fields(&self, values: &[(String, String)]) -> Vec<StoredField> {
        let mut stored: Vec<StoredField> = Vec::new();
        let mut slot_of: HashMap<u8, usize> = HashMap::new();

        for (name, text) in values {
            let Some(info) = self.get(name) else {
                continue;
            };
            let text = match info.storage_params.max_len {
                Some(max) => text.chars().take(max).collect(),
                None => text.clone(),
            };

            match info.storage {
                StorageKind::Unstored => {}
                StorageKind::Single => {
                    if !slot_of.contains_key(&info.id) {
                        slot_of.insert(info.id, stored.len());
                        stored.push(StoredField(info.id, text));
                    }
                }
                StorageKind::Concatenated => match slot_of.get(&info.id) {
                    Some(&slot) => {
                        let existing = &mut stored[slot].1;
                        existing.push_str(&info.storage_params.separator);
                        existing.push_str(&text);
                    }
                    None => {
                        slot_of.insert(info.id, stored.len());
                        stored.push(StoredField(info.id, text));
                    }
                },
                StorageKind::JsonSliced => stored.push(StoredField(info.id, text)),
            }
        }

        stored
    }
}

impl TryFrom<BTreeMap<String, FieldInfoEntry>> for FieldInfos {
    type Error = MorselError;

    fn try_from(map: BTreeMap<String, FieldInfoEntry>) -> Result<Self> {
        let mut entries: Vec<(String, FieldInfoEntry)> = map.into_iter().collect();
        entries.sort_by_key(|(_, e)| e.id);

        for (expected, (name, entry)) in entries.iter().enumerate() {
            if entry.id as usize != expected {
                return Err(MorselError::format(format!(
                    "field '{}' has id {}, expected dense id {}",
                    name, entry.id, expected
                )));
            }
        }

        let configs: Vec<FieldConfig> = entries
            .into_iter()
            .map(|(name, e)| FieldConfig {
                name,
                weight: e.weight,
                storage: e.storage,
                storage_params: e.storage_params,
            })
            .collect();
        FieldInfos::new(&configs)
    }
}

impl From<FieldInfos> for BTreeMap<String, FieldInfoEntry> {
    fn from(infos: FieldInfos) -> Self {
        infos
            .fields
            .into_iter()
            .map(|f| {
                (
                    f.name,
                    FieldInfoEntry {
                        id: f.id,
                        storage: f.storage,
                        storage_params: f.storage_params,
                        weight: f.weight,
                    },
                )
            })
            .collect()
    }
}
