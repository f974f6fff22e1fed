//! Canned platform responses
use crate::{CatalogPage, PlatformApi, PlatformError, PlatformFactory, ProgressUpdate, RegistryEntry};
use async_trait::async_trait;
use ipl_core::ActionRequest;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Platform double serving fixed registry and catalog contents and
/// recording every progress update it receives.
#[derive(Debug, Default)]
pub struct StaticPlatform {
    connections: Vec<RegistryEntry>,
    catalogs: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl StaticPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(mut self, entry: RegistryEntry) -> Self {
        self.connections.push(entry);
        self
    }

    pub fn with_catalog(mut self, system: &str, rows: Vec<Value>) -> Self {
        self.catalogs.insert(system.to_string(), rows);
        self
    }

    /// Registry and catalog calls for `name` fail with a 503
    pub fn with_failing_source(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    fn check(&self, name: &str, endpoint: &str) -> Result<(), PlatformError> {
        if self.failing.contains(name) {
            return Err(PlatformError::BadStatus {
                status: 503,
                endpoint: endpoint.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformApi for StaticPlatform {
    async fn find_connections(&self, name: &str) -> Result<Vec<RegistryEntry>, PlatformError> {
        self.check(name, crate::REGISTRY_ENDPOINT)?;
        Ok(self
            .connections
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect())
    }

    async fn catalog(&self, system: &str) -> Result<CatalogPage, PlatformError> {
        self.check(system, crate::CATALOG_ENDPOINT)?;
        let results = self.catalogs.get(system).cloned().unwrap_or_default();
        Ok(CatalogPage {
            total_rows: results.len() as u64,
            results,
        })
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<(), PlatformError> {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update.clone());
        }
        Ok(())
    }
}

impl PlatformFactory for Arc<StaticPlatform> {
    fn for_request(&self, _request: &ActionRequest) -> Arc<dyn PlatformApi> {
        self.clone()
    }
}
