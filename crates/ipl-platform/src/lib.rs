//! ipl-platform: the data-catalog platform as seen by the pipeline
//!
//! Three calls matter: look up a named connection in the platform's
//! registry, fetch the catalog rows of a data source, and report progress
//! on the execution callback. [`PlatformApi`] abstracts them so the
//! pipeline runs the same against [`HttpPlatform`] and [`StaticPlatform`].

pub mod http;
pub mod memory;

pub use http::{HttpPlatform, HttpPlatformFactory};
pub use memory::StaticPlatform;

use async_trait::async_trait;
use ipl_core::ActionRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Endpoint of the platform's connection registry
pub const REGISTRY_ENDPOINT: &str = "ds-connections";

/// Endpoint of the platform's data catalog
pub const CATALOG_ENDPOINT: &str = "data-catalog";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("platform request timed out")]
    Timeout,

    #[error("platform HTTP error: {0}")]
    Http(String),

    #[error("platform returned status {status} for {endpoint}")]
    BadStatus { status: u16, endpoint: String },

    #[error("platform returned invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

impl From<reqwest::Error> for PlatformError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            PlatformError::Timeout
        } else {
            PlatformError::Http(value.to_string())
        }
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// A named connection in the platform registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "smbServer", default, skip_serializing_if = "Option::is_none")]
    pub smb_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(rename = "sharedResource", default, skip_serializing_if = "Option::is_none")]
    pub shared_resource: Option<String>,
}

impl RegistryEntry {
    /// An SMB connection entry
    pub fn smb(name: &str, server: &str, shares: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: Some("smb".to_string()),
            smb_server: Some(server.to_string()),
            domain: None,
            shared_resource: Some(shares.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegistryResponse {
    pub data: RegistryData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegistryData {
    #[serde(default)]
    pub ds_connections: Vec<RegistryEntry>,
}

/// Catalog rows of one data source. Rows stay untyped here so one odd row
/// cannot reject the whole page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogPage {
    #[serde(rename = "totalRowsCounter", default)]
    pub total_rows: u64,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

/// Execution status understood by the platform callback contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    InProgress,
    Completed,
    Error,
}

/// Body of a progress callback, also the success response of `/execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub execution_id: String,
    pub status_enum: Status,
    pub progress: f64,
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(execution_id: &str, status: Status, progress: f64, message: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            status_enum: status,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    /// The fixed "completed" acknowledgement
    pub fn completed(execution_id: &str) -> Self {
        Self::new(execution_id, Status::Completed, 1.0, "Done")
    }
}

// ============================================================================
// TRAITS
// ============================================================================

#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Registry entries whose name equals `name` exactly
    async fn find_connections(&self, name: &str) -> Result<Vec<RegistryEntry>, PlatformError>;

    /// Every catalog row of the data source `system`
    async fn catalog(&self, system: &str) -> Result<CatalogPage, PlatformError>;

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<(), PlatformError>;
}

/// Builds a platform client for one inbound request
pub trait PlatformFactory: Send + Sync {
    fn for_request(&self, request: &ActionRequest) -> Arc<dyn PlatformApi>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_update_wire_format() {
        let update = ProgressUpdate::new("execution-id-012", Status::InProgress, 0.5, "status-message");
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({
                "executionId": "execution-id-012",
                "statusEnum": "IN_PROGRESS",
                "progress": 0.5,
                "message": "status-message"
            })
        );
    }

    #[test]
    fn test_completed_ack() {
        let done = ProgressUpdate::completed("e1");
        assert_eq!(done.status_enum, Status::Completed);
        assert_eq!(done.progress, 1.0);
        assert_eq!(done.message, "Done");
    }

    #[test]
    fn test_registry_entry_tolerates_missing_fields() {
        let entry: RegistryEntry = serde_json::from_value(json!({"name": "ds"})).unwrap();
        assert_eq!(entry.name, "ds");
        assert!(entry.kind.is_none());
        assert!(entry.smb_server.is_none());
    }
}
