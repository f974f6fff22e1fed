//! Configuration loading
//!
//! The platform hands the service a JSON blob describing its data sources:
//!
//! ```json
//! {
//!     "version": 1,
//!     "data_sources": [
//!         {
//!             "name": "prod_file_share",
//!             "kind": "smb",
//!             "username": "user",
//!             "password": "pass",
//!             "label_filter": ".*",
//!             "path_filter": ""
//!         }
//!     ]
//! }
//! ```
//!
//! Only a broken top level is fatal. Each malformed entry becomes a warning
//! and is skipped.

use crate::data_model::{
    normalize_path, Credentials, DataSource, DataSourceKind, LabelFilter, MATCH_ALL_LABELS,
};
use crate::error::IplError;
use crate::warnings::{Warnings, DEFAULT_MAX_WARNINGS};
use serde::Deserialize;
use serde_json::Value;

/// Replaces credentials in any text derived from a configuration entry
pub const CREDENTIAL_MASK: &str = "********";

const CREDENTIAL_KEYS: [&str; 2] = ["username", "password"];

/// Result of loading a configuration blob
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub version: u64,
    pub data_sources: Vec<DataSource>,
    pub warnings: Warnings,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    version: u64,
    data_sources: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SmbEntry {
    name: String,
    username: String,
    password: String,
    #[serde(default = "default_label_filter")]
    label_filter: String,
    #[serde(default)]
    path_filter: String,
}

fn default_label_filter() -> String {
    MATCH_ALL_LABELS.to_string()
}

/// Parses data source declarations
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    max_warnings: usize,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            max_warnings: DEFAULT_MAX_WARNINGS,
        }
    }

    /// Bound the number of warnings kept for one load
    pub fn with_max_warnings(max: usize) -> Self {
        Self { max_warnings: max }
    }

    pub fn load(&self, raw: &str) -> Result<LoadedConfig, IplError> {
        let parsed: RawConfig = serde_json::from_str(raw)
            .map_err(|e| IplError::Config(format!("invalid configuration: {}", e)))?;

        let mut warnings = Warnings::with_max_entries(self.max_warnings);
        let mut data_sources = Vec::new();

        for entry in &parsed.data_sources {
            match parse_entry(entry) {
                Ok(ds) => {
                    tracing::debug!(name = %ds.name, kind = %ds.kind, "loaded data source");
                    data_sources.push(ds);
                }
                Err(err) => warnings.record(err),
            }
        }

        tracing::info!(
            version = parsed.version,
            data_sources = data_sources.len(),
            warnings = warnings.len(),
            "configuration loaded"
        );

        Ok(LoadedConfig {
            version: parsed.version,
            data_sources,
            warnings,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_entry(entry: &Value) -> Result<DataSource, IplError> {
    let kind = match entry.get("kind").and_then(Value::as_str) {
        Some(kind) => kind,
        None => {
            return Err(IplError::Config(format!(
                "failed to parse data source: {} error: missing field `kind`",
                scrub_credentials(entry)
            )))
        }
    };

    match kind.parse::<DataSourceKind>() {
        Ok(DataSourceKind::Smb) => parse_smb(entry),
        Err(_) => Err(IplError::Config(format!(
            "unsupported data source: {}",
            scrub_credentials(entry)
        ))),
    }
}

fn parse_smb(entry: &Value) -> Result<DataSource, IplError> {
    let smb = SmbEntry::deserialize(entry).map_err(|e| {
        IplError::Config(format!(
            "failed to parse data source: {} error: {}",
            scrub_credentials(entry),
            e
        ))
    })?;

    if let Err(e) = LabelFilter::compile(&smb.label_filter) {
        return Err(IplError::Config(format!(
            "invalid label_filter in data source: {} error: {}",
            scrub_credentials(entry),
            e
        )));
    }

    Ok(DataSource {
        name: smb.name,
        kind: DataSourceKind::Smb,
        label_filter: smb.label_filter,
        path_filter: normalize_path(&smb.path_filter),
        credentials: Credentials {
            username: smb.username,
            password: smb.password,
        },
    })
}

/// Render an entry as JSON with credential fields masked
pub fn scrub_credentials(entry: &Value) -> String {
    let mut scrubbed = entry.clone();
    if let Some(obj) = scrubbed.as_object_mut() {
        for key in CREDENTIAL_KEYS {
            if let Some(v) = obj.get_mut(key) {
                *v = Value::String(CREDENTIAL_MASK.to_string());
            }
        }
    }
    scrubbed.to_string()
}
