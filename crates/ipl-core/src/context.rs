//! Action request received from the platform
use crate::error::IplError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Global param carrying the configuration blob
pub const CONFIG_PARAM: &str = "config";

/// Action param restricting the request to one data source
pub const DATA_SOURCE_NAME_PARAM: &str = "data_source_name";

/// Action param overriding every source's label filter
pub const LABEL_FILTER_PARAM: &str = "label_filter";

/// One `{paramName, paramValue}` pair as sent by the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    #[serde(rename = "paramName")]
    pub name: String,
    #[serde(rename = "paramValue")]
    pub value: String,
}

/// Body of a `POST /execute` call
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    pub action_name: String,
    pub execution_id: String,
    pub tpa_id: String,
    pub bigid_token: String,
    pub bigid_base_url: String,
    pub update_result_callback: String,
    #[serde(default)]
    pub global_params: Vec<Param>,
    #[serde(default)]
    pub action_params: Vec<Param>,
}

/// An action request with its param lists folded into maps
#[derive(Clone)]
pub struct ActionRequest {
    pub action_name: String,
    pub execution_id: String,
    pub tpa_id: String,
    pub platform_token: String,
    pub platform_base_url: String,
    pub update_result_callback: String,
    pub global_params: HashMap<String, String>,
    pub action_params: HashMap<String, String>,
}

impl std::fmt::Debug for ActionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // token and the config blob (credentials) stay out of logs
        f.debug_struct("ActionRequest")
            .field("action_name", &self.action_name)
            .field("execution_id", &self.execution_id)
            .field("tpa_id", &self.tpa_id)
            .field("platform_base_url", &self.platform_base_url)
            .field("update_result_callback", &self.update_result_callback)
            .field("action_params", &self.action_params)
            .finish_non_exhaustive()
    }
}

impl ActionRequest {
    /// Parse a raw request body. Any missing required field is fatal.
    pub fn from_slice(body: &[u8]) -> Result<Self, IplError> {
        let parsed: ExecuteBody = serde_json::from_slice(body)
            .map_err(|e| IplError::FatalInput(format!("invalid action request: {}", e)))?;
        Ok(parsed.into())
    }

    /// The configuration blob from the global params
    pub fn config_blob(&self) -> Result<&str, IplError> {
        self.global_params
            .get(CONFIG_PARAM)
            .map(String::as_str)
            .ok_or_else(|| IplError::FatalInput(format!("missing global param: {}", CONFIG_PARAM)))
    }

    /// Filter overrides carried by the action params
    pub fn overrides(&self) -> RequestOverrides {
        RequestOverrides {
            data_source_name: non_empty(self.action_params.get(DATA_SOURCE_NAME_PARAM)),
            label_filter: non_empty(self.action_params.get(LABEL_FILTER_PARAM)),
        }
    }
}

impl From<ExecuteBody> for ActionRequest {
    fn from(body: ExecuteBody) -> Self {
        Self {
            action_name: body.action_name,
            execution_id: body.execution_id,
            tpa_id: body.tpa_id,
            platform_token: body.bigid_token,
            platform_base_url: body.bigid_base_url,
            update_result_callback: body.update_result_callback,
            global_params: fold_params(body.global_params),
            action_params: fold_params(body.action_params),
        }
    }
}

/// Request-level overrides layered on top of configured filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOverrides {
    pub data_source_name: Option<String>,
    pub label_filter: Option<String>,
}

/// Later duplicates win
fn fold_params(params: Vec<Param>) -> HashMap<String, String> {
    params.into_iter().map(|p| (p.name, p.value)).collect()
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}
