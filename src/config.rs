//! Configuration model.
//!
//! Two kinds of configuration feed a run:
//!
//! - [`ComponentConfig`]: the JSON document describing *what* to generate
//!   (the `parameters` section plus the user's storage mapping).
//! - [`RuntimeConfig`]: process-level settings (feature gates, catalog
//!   location) built once at start-up and passed down explicitly.

use crate::error::{ScdError, ScdResult};
use crate::mapping::TableDescriptor;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Settings file looked up in the working directory first.
pub const RUNTIME_CONFIG_FILE: &str = "scd.toml";

/// Project feature gates that enable typed table creation.
pub const NATIVE_TYPES_FEATURES: [&str; 2] = ["native-types", "new-native-types"];

/// The `parameters` section of the component configuration.
///
/// Field order is part of the snapshot naming hash, see [`ScdConfig::hash`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScdConfig {
    #[serde(rename = "_componentId")]
    pub component_id: String,
    pub scd_type: String,
    pub primary_key: String,
    #[serde(default)]
    pub monitored_parameters: String,
    pub timezone: String,
    #[serde(default)]
    pub deleted_flag: bool,
    #[serde(default)]
    pub use_datetime: bool,
    #[serde(default)]
    pub keep_del_active: bool,
    #[serde(default = "default_start_date_name")]
    pub start_date_name: String,
    #[serde(default = "default_end_date_name")]
    pub end_date_name: String,
    #[serde(default = "default_actual_name")]
    pub actual_name: String,
    #[serde(default = "default_is_deleted_name")]
    pub is_deleted_name: String,
    #[serde(default = "default_deleted_flag_value")]
    pub deleted_flag_value: String,
    #[serde(default = "default_end_date_value")]
    pub end_date_value: String,
    #[serde(default)]
    pub current_timestamp_minus_one: bool,
    #[serde(default)]
    pub uppercase_columns: bool,
    #[serde(default, deserialize_with = "int_or_string")]
    pub effective_date_adjustment: i64,
    #[serde(default)]
    pub snapshot_table_name: String,
}

fn default_start_date_name() -> String {
    "start_date".to_string()
}

fn default_end_date_name() -> String {
    "end_date".to_string()
}

fn default_actual_name() -> String {
    "actual".to_string()
}

fn default_is_deleted_name() -> String {
    "is_deleted".to_string()
}

fn default_deleted_flag_value() -> String {
    "0/1".to_string()
}

fn default_end_date_value() -> String {
    "9999-12-31".to_string()
}

/// The UI stores the adjustment as a string, API clients send a number.
fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(n) => Ok(n),
        IntOrString::Str(s) if s.trim().is_empty() => Ok(0),
        IntOrString::Str(s) => s.trim().parse().map_err(|_| {
            serde::de::Error::custom(format!(
                "effective_date_adjustment must be an integer, given \"{}\"",
                s
            ))
        }),
    }
}

impl ScdConfig {
    /// Parse the parameters section, applying defaults.
    pub fn from_value(value: serde_json::Value) -> ScdResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| ScdError::config(format!("Invalid parameters: {}", e)))
    }

    pub fn primary_key_columns(&self) -> Vec<String> {
        split_column_list(&self.primary_key)
    }

    pub fn monitored_columns(&self) -> Vec<String> {
        split_column_list(&self.monitored_parameters)
    }

    /// Short content hash of the defaulted parameter section.
    ///
    /// Every field participates, so any edit yields a new snapshot table name.
    pub fn hash(&self) -> ScdResult<String> {
        let serialized = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&serialized);
        let mut hash = hex::encode(digest);
        hash.truncate(CONFIG_HASH_LENGTH);
        Ok(hash)
    }
}

/// Number of hex characters kept from the parameter hash.
pub const CONFIG_HASH_LENGTH: usize = 6;

/// Split a comma separated column list, trimming names and dropping empties.
pub fn split_column_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tables of one mapping direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableList {
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
}

/// Input and output storage mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub input: TableList,
    #[serde(default)]
    pub output: TableList,
}

/// The full component configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub parameters: ScdConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ComponentConfig {
    pub fn from_json(s: &str) -> ScdResult<Self> {
        serde_json::from_str(s).map_err(|e| ScdError::config(format!("Invalid configuration: {}", e)))
    }

    pub fn load(path: &Path) -> ScdResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn input_tables(&self) -> &[TableDescriptor] {
        &self.storage.input.tables
    }
}

/// Process-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Feature gates enabled for the project.
    #[serde(default)]
    pub feature_gates: Vec<String>,
    /// JSON catalog standing in for the storage service.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Parse settings from TOML text.
    pub fn from_toml(s: &str) -> ScdResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load `scd.toml` from the working directory, then from the user config
    /// directory. Missing files yield defaults.
    pub fn discover() -> ScdResult<Self> {
        let candidates = [
            Some(PathBuf::from(RUNTIME_CONFIG_FILE)),
            dirs::config_dir().map(|p| p.join("scd-pattern").join(RUNTIME_CONFIG_FILE)),
        ];

        for path in candidates.into_iter().flatten() {
            if path.exists() {
                tracing::debug!("Loading runtime settings from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                return Self::from_toml(&content);
            }
        }

        Ok(Self::default())
    }

    /// Parse the `;` separated gate list used by the platform.
    pub fn with_feature_gate_list(mut self, list: &str) -> Self {
        for gate in list.split(';').map(str::trim).filter(|g| !g.is_empty()) {
            if !self.feature_gates.iter().any(|g| g == gate) {
                self.feature_gates.push(gate.to_string());
            }
        }
        self
    }

    pub fn has_native_types(&self) -> bool {
        self.feature_gates
            .iter()
            .any(|g| NATIVE_TYPES_FEATURES.contains(&g.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "_componentId": "keboola.snowflake-transformation",
            "scd_type": "scd2",
            "primary_key": "testKey, testKey2",
            "monitored_parameters": "abc,def",
            "timezone": "Europe/Prague",
        })
    }

    #[test]
    fn test_defaults() {
        let config = ScdConfig::from_value(minimal()).unwrap();
        assert!(!config.deleted_flag);
        assert!(!config.use_datetime);
        assert!(!config.keep_del_active);
        assert_eq!(config.start_date_name, "start_date");
        assert_eq!(config.end_date_name, "end_date");
        assert_eq!(config.actual_name, "actual");
        assert_eq!(config.is_deleted_name, "is_deleted");
        assert_eq!(config.deleted_flag_value, "0/1");
        assert_eq!(config.end_date_value, "9999-12-31");
        assert!(!config.current_timestamp_minus_one);
        assert!(!config.uppercase_columns);
        assert_eq!(config.effective_date_adjustment, 0);
        assert_eq!(config.snapshot_table_name, "");
    }

    #[test]
    fn test_column_lists_are_trimmed() {
        let config = ScdConfig::from_value(minimal()).unwrap();
        assert_eq!(config.primary_key_columns(), vec!["testKey", "testKey2"]);
        assert_eq!(config.monitored_columns(), vec!["abc", "def"]);
        assert!(split_column_list("").is_empty());
        assert_eq!(split_column_list(" a ,, b "), vec!["a", "b"]);
    }

    #[test]
    fn test_effective_date_adjustment_accepts_string() {
        let mut value = minimal();
        value["effective_date_adjustment"] = json!("-2");
        assert_eq!(
            ScdConfig::from_value(value.clone()).unwrap().effective_date_adjustment,
            -2
        );

        value["effective_date_adjustment"] = json!(3);
        assert_eq!(ScdConfig::from_value(value.clone()).unwrap().effective_date_adjustment, 3);

        value["effective_date_adjustment"] = json!("soon");
        assert!(ScdConfig::from_value(value).is_err());
    }

    #[test]
    fn test_missing_required_field() {
        let mut value = minimal();
        value.as_object_mut().unwrap().remove("primary_key");
        let err = ScdConfig::from_value(value).unwrap_err();
        assert!(matches!(err, ScdError::Configuration(_)));
        assert!(err.to_string().contains("primary_key"));
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let config = ScdConfig::from_value(minimal()).unwrap();
        let again = ScdConfig::from_value(minimal()).unwrap();
        assert_eq!(config.hash().unwrap(), again.hash().unwrap());
        assert_eq!(config.hash().unwrap().len(), CONFIG_HASH_LENGTH);

        let mut changed = config.clone();
        changed.primary_key = "testKey".to_string();
        assert_ne!(config.hash().unwrap(), changed.hash().unwrap());
    }

    #[test]
    fn test_explicit_defaults_hash_like_omitted_ones() {
        let mut explicit = minimal();
        explicit["deleted_flag_value"] = json!("0/1");
        explicit["effective_date_adjustment"] = json!("0");
        assert_eq!(
            ScdConfig::from_value(minimal()).unwrap().hash().unwrap(),
            ScdConfig::from_value(explicit).unwrap().hash().unwrap()
        );
    }

    #[test]
    fn test_runtime_config_from_toml() {
        let config = RuntimeConfig::from_toml(
            r#"
feature_gates = ["feature1"]
catalog = "storage.json"
"#,
        )
        .unwrap();
        assert_eq!(config.catalog, Some(PathBuf::from("storage.json")));
        assert!(!config.has_native_types());

        let config = config.with_feature_gate_list("feature1;new-native-types");
        assert_eq!(config.feature_gates, vec!["feature1", "new-native-types"]);
        assert!(config.has_native_types());
    }
}
