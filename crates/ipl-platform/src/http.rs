//! reqwest client for the platform REST API
use crate::{
    CatalogPage, PlatformApi, PlatformError, PlatformFactory, ProgressUpdate, RegistryEntry,
    RegistryResponse, CATALOG_ENDPOINT, REGISTRY_ENDPOINT,
};
use async_trait::async_trait;
use ipl_core::ActionRequest;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Platform client bound to one execution
#[derive(Clone)]
pub struct HttpPlatform {
    http: reqwest::Client,
    base_url: String,
    token: String,
    callback_url: String,
}

impl std::fmt::Debug for HttpPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPlatform")
            .field("base_url", &self.base_url)
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

impl HttpPlatform {
    pub fn new(http: reqwest::Client, base_url: &str, token: &str, callback_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            token: token.to_string(),
            callback_url: callback_url.to_string(),
        }
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let resp = self
            .http
            .get(self.endpoint_url(endpoint))
            .header(AUTHORIZATION, &self.token)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .query(query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PlatformError::BadStatus {
                status: resp.status().as_u16(),
                endpoint: endpoint.to_string(),
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| PlatformError::InvalidResponse {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl PlatformApi for HttpPlatform {
    async fn find_connections(&self, name: &str) -> Result<Vec<RegistryEntry>, PlatformError> {
        let filter = serde_json::json!([{ "field": "name", "value": name, "operator": "equal" }]);
        let resp: RegistryResponse = self
            .get_json(REGISTRY_ENDPOINT, &[("filter", filter.to_string())])
            .await?;
        Ok(resp.data.ds_connections)
    }

    async fn catalog(&self, system: &str) -> Result<CatalogPage, PlatformError> {
        let page: CatalogPage = self
            .get_json(CATALOG_ENDPOINT, &[("filter", format!("system={}", system))])
            .await?;
        tracing::info!(system, rows = page.total_rows, "scan result rows");
        Ok(page)
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<(), PlatformError> {
        let resp = self
            .http
            .put(&self.callback_url)
            .header(AUTHORIZATION, &self.token)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .json(update)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PlatformError::BadStatus {
                status: resp.status().as_u16(),
                endpoint: self.callback_url.clone(),
            });
        }
        Ok(())
    }
}

/// Shares one connection pool across requests
#[derive(Clone)]
pub struct HttpPlatformFactory {
    http: reqwest::Client,
}

impl HttpPlatformFactory {
    pub fn new(timeout: Duration) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Http(e.to_string()))?;
        Ok(Self { http })
    }
}

impl PlatformFactory for HttpPlatformFactory {
    fn for_request(&self, request: &ActionRequest) -> Arc<dyn PlatformApi> {
        Arc::new(HttpPlatform::new(
            self.http.clone(),
            &request.platform_base_url,
            &request.platform_token,
            &request.update_result_callback,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        let client = HttpPlatform::new(reqwest::Client::new(), "http://bigid/api/v1/", "t", "cb");
        assert_eq!(
            client.endpoint_url("/data-catalog"),
            "http://bigid/api/v1/data-catalog"
        );
        assert_eq!(client.endpoint_url("ds-connections"), "http://bigid/api/v1/ds-connections");
    }

    #[test]
    fn test_debug_hides_token() {
        let client = HttpPlatform::new(reqwest::Client::new(), "http://bigid", "token98765", "cb");
        assert!(!format!("{:?}", client).contains("token98765"));
    }
}
