//! ipl-core: data model, error taxonomy, warnings and configuration
//!
//! Shared vocabulary for the ip-labels action service. Every other crate in
//! the workspace speaks in these types.

pub mod config;
pub mod context;
pub mod data_model;
pub mod error;
pub mod warnings;

pub use config::{ConfigLoader, LoadedConfig, CREDENTIAL_MASK};
pub use context::{ActionRequest, ExecuteBody, Param, RequestOverrides};
pub use data_model::{
    CheckedRow, Credentials, DataSource, DataSourceKind, EffectiveFilter, FileLabels, GroupKey,
    LabelFilter, LabelGroups, LabelManifest, PathFilter, ResolvedSource, ScanResultRow,
    ServerInfo, ShareList, SIDECAR_FILE_NAME,
};
pub use error::IplError;
pub use warnings::{Warning, Warnings, DEFAULT_MAX_WARNINGS};

/// Service version reported by `/health`
pub const IPL_VERSION: &str = env!("CARGO_PKG_VERSION");
