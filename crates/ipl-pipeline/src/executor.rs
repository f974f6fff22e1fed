//! Action execution
//!
//! ```text
//! Idle ─► Resolving ─► per source: Scanning ─► Grouping ─► Writing ─► Completed | Failed
//! ```
//!
//! Every per-source, per-group and per-share failure is recorded as a
//! warning and processing moves on. Only a missing config blob or a broken
//! top level of the configuration aborts [`Executor::execute`].

use crate::aggregate::{group_source, scan};
use crate::resolver::Resolver;
use ipl_core::{
    ActionRequest, ConfigLoader, DataSource, GroupKey, IplError, LabelManifest, LoadedConfig,
    RequestOverrides, ResolvedSource, ShareList, Warnings, DEFAULT_MAX_WARNINGS,
    SIDECAR_FILE_NAME,
};
use ipl_platform::{PlatformApi, ProgressUpdate, Status};
use ipl_share::{atomic_write, is_special_share, ShareConnector, ShareSession, ShareTarget};
use std::fmt;

// ============================================================================
// ACTIONS
// ============================================================================

pub const ENCRYPT_ACTION: &str = "Encrypt";
pub const VERIFY_CONFIG_ACTION: &str = "Verify Config";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write `.ip-labels` sidecars
    Encrypt,
    /// Probe write access on every share
    VerifyConfig,
    Unrecognized(String),
}

impl Action {
    pub fn parse(name: &str) -> Self {
        match name {
            ENCRYPT_ACTION => Action::Encrypt,
            VERIFY_CONFIG_ACTION => Action::VerifyConfig,
            other => Action::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::Encrypt => ENCRYPT_ACTION,
            Action::VerifyConfig => VERIFY_CONFIG_ACTION,
            Action::Unrecognized(name) => name,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Idle,
    Resolving,
    Scanning,
    Grouping,
    Writing,
    Completed,
    Failed,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Idle => "idle",
            ExecutionPhase::Resolving => "resolving",
            ExecutionPhase::Scanning => "scanning",
            ExecutionPhase::Grouping => "grouping",
            ExecutionPhase::Writing => "writing",
            ExecutionPhase::Completed => "completed",
            ExecutionPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// What one execution did. Any warning makes it a failure.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub action: Action,
    pub sources_processed: usize,
    pub files_written: usize,
    pub shares_verified: usize,
    pub warnings: Warnings,
}

impl ExecutionOutcome {
    fn new(action: Action, warnings: Warnings) -> Self {
        Self {
            action,
            sources_processed: 0,
            files_written: 0,
            shares_verified: 0,
            warnings,
        }
    }

    pub fn is_success(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn phase(&self) -> ExecutionPhase {
        if self.is_success() {
            ExecutionPhase::Completed
        } else {
            ExecutionPhase::Failed
        }
    }

    /// Newline-joined warnings, empty on success
    pub fn message(&self) -> String {
        self.warnings.joined()
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Runs one action request against a platform and a share connector
pub struct Executor<'a> {
    platform: &'a dyn PlatformApi,
    connector: &'a dyn ShareConnector,
    max_warnings: usize,
}

impl<'a> Executor<'a> {
    pub fn new(platform: &'a dyn PlatformApi, connector: &'a dyn ShareConnector) -> Self {
        Self {
            platform,
            connector,
            max_warnings: DEFAULT_MAX_WARNINGS,
        }
    }

    pub fn with_max_warnings(mut self, max: usize) -> Self {
        self.max_warnings = max;
        self
    }

    /// Load the request's configuration and run its action
    pub async fn execute(&self, request: &ActionRequest) -> Result<ExecutionOutcome, IplError> {
        let config = ConfigLoader::with_max_warnings(self.max_warnings).load(request.config_blob()?)?;
        let action = Action::parse(&request.action_name);
        Ok(self
            .run(action, config, &request.overrides(), &request.execution_id)
            .await)
    }

    pub async fn run(
        &self,
        action: Action,
        config: LoadedConfig,
        overrides: &RequestOverrides,
        execution_id: &str,
    ) -> ExecutionOutcome {
        let mut warnings = Warnings::with_max_entries(self.max_warnings);
        warnings.absorb(config.warnings);
        let mut outcome = ExecutionOutcome::new(action.clone(), warnings);
        log_phase(&action, ExecutionPhase::Idle);

        match &action {
            Action::Encrypt | Action::VerifyConfig => {
                self.run_sources(&action, &config.data_sources, overrides, execution_id, &mut outcome)
                    .await
            }
            Action::Unrecognized(name) => outcome
                .warnings
                .record(IplError::UnsupportedAction(format!("unrecognized action name: {}", name))),
        }

        log_phase(&action, outcome.phase());
        tracing::info!(
            action = %action,
            sources = outcome.sources_processed,
            files_written = outcome.files_written,
            shares_verified = outcome.shares_verified,
            warnings = outcome.warnings.len(),
            "execution finished"
        );
        outcome
    }

    async fn run_sources(
        &self,
        action: &Action,
        sources: &[DataSource],
        overrides: &RequestOverrides,
        execution_id: &str,
        outcome: &mut ExecutionOutcome,
    ) {
        log_phase(action, ExecutionPhase::Resolving);
        let total = sources.len().max(1);
        let mut resolver = Resolver::new(sources, overrides, self.platform);

        while let Some(source) = resolver.next(&mut outcome.warnings).await {
            match action {
                Action::VerifyConfig => {
                    outcome.shares_verified += self.verify_source(&source, &mut outcome.warnings).await;
                }
                _ => {
                    outcome.files_written += self.encrypt_source(action, &source, &mut outcome.warnings).await;
                }
            }
            outcome.sources_processed += 1;

            let progress = outcome.sources_processed as f64 / total as f64;
            self.report_progress(execution_id, progress, source.name()).await;
        }
    }

    /// Write one sidecar per group; returns the number written
    async fn encrypt_source(
        &self,
        action: &Action,
        source: &ResolvedSource,
        warnings: &mut Warnings,
    ) -> usize {
        log_phase(action, ExecutionPhase::Scanning);
        let rows = scan(self.platform, source, warnings).await;
        log_phase(action, ExecutionPhase::Grouping);
        let groups = group_source(source, rows);
        if groups.is_empty() {
            tracing::info!(data_source = %source.name(), "no labeled files to protect");
            return 0;
        }

        let Some(mut session) = self.open(source, warnings).await else {
            return 0;
        };

        log_phase(action, ExecutionPhase::Writing);
        let mut written = 0;
        for (key, manifest) in &groups {
            match write_sidecar(session.as_mut(), key, manifest).await {
                Ok(()) => {
                    written += 1;
                    tracing::info!(group = %key, files = manifest.len(), "labels written");
                }
                Err(e) => warnings.record(e),
            }
        }

        close(session, source.name()).await;
        written
    }

    /// Probe every share of the source; returns the number that passed
    async fn verify_source(&self, source: &ResolvedSource, warnings: &mut Warnings) -> usize {
        let Some(mut session) = self.open(source, warnings).await else {
            return 0;
        };

        let shares = match &source.server.shares {
            ShareList::Named(shares) => shares.clone(),
            ShareList::Wildcard => match session.list_shares().await {
                Ok(found) => found.into_iter().filter(|s| !is_special_share(s)).collect(),
                Err(e) => {
                    warnings.record(IplError::ShareIo(format!(
                        "failed to list shares of data source {}: {}",
                        source.name(),
                        e
                    )));
                    close(session, source.name()).await;
                    return 0;
                }
            },
        };

        if shares.is_empty() {
            warnings.record(IplError::ShareIo(format!(
                "no shares to verify on data source {}",
                source.name()
            )));
        }

        let mut verified = 0;
        for share in &shares {
            match probe_share(session.as_mut(), share).await {
                Ok(()) => {
                    verified += 1;
                    tracing::info!(data_source = %source.name(), share = %share, "share verified");
                }
                Err(e) => warnings.record(e),
            }
        }

        close(session, source.name()).await;
        verified
    }

    async fn open(
        &self,
        source: &ResolvedSource,
        warnings: &mut Warnings,
    ) -> Option<Box<dyn ShareSession>> {
        match self.connector.connect(&share_target(source)).await {
            Ok(session) => {
                tracing::debug!(data_source = %source.name(), server = %source.server.address, "connected");
                Some(session)
            }
            Err(e) => {
                warnings.record(IplError::ShareIo(format!(
                    "failed to connect to data source {}: {}",
                    source.name(),
                    e
                )));
                None
            }
        }
    }

    async fn report_progress(&self, execution_id: &str, progress: f64, data_source: &str) {
        let update = ProgressUpdate::new(
            execution_id,
            Status::InProgress,
            progress,
            format!("processed data source {}", data_source),
        );
        if let Err(e) = self.platform.update_progress(&update).await {
            tracing::warn!(execution_id, error = %e, "progress update failed");
        }
    }
}

/// Connection parameters for a resolved source
pub fn share_target(source: &ResolvedSource) -> ShareTarget {
    ShareTarget {
        server: source.server.address.clone(),
        domain: source.server.domain.clone(),
        username: source.source.credentials.username.clone(),
        password: source.source.credentials.password.clone(),
    }
}

async fn write_sidecar(
    session: &mut dyn ShareSession,
    key: &GroupKey,
    manifest: &LabelManifest,
) -> Result<(), IplError> {
    let exists = session
        .directory_exists(&key.share, &key.directory)
        .await
        .map_err(|e| IplError::ShareIo(format!("failed to check directory {}: {}", key, e)))?;
    if !exists {
        return Err(IplError::ShareIo(format!("directory {} not found, skipping", key)));
    }

    let data = manifest
        .to_sidecar_bytes()
        .map_err(|e| IplError::ShareIo(format!("failed to encode labels for {}: {}", key, e)))?;

    atomic_write(session, &key.share, &key.directory, SIDECAR_FILE_NAME, &data)
        .await
        .map_err(|e| IplError::ShareIo(format!("failed to write labels to {}: {}", key, e)))
}

async fn probe_share(session: &mut dyn ShareSession, share: &str) -> Result<(), IplError> {
    let probe = format!("ipl-verify-{}", uuid::Uuid::new_v4().simple());
    session
        .write(share, &probe, b"ipl-verify")
        .await
        .map_err(|e| IplError::ShareIo(format!("failed to write probe file to share {}: {}", share, e)))?;
    session
        .delete(share, &probe)
        .await
        .map_err(|e| IplError::ShareIo(format!("failed to delete probe file from share {}: {}", share, e)))
}

async fn close(mut session: Box<dyn ShareSession>, data_source: &str) {
    if let Err(e) = session.disconnect().await {
        tracing::warn!(data_source, error = %e, "disconnect failed");
    }
}

fn log_phase(action: &Action, phase: ExecutionPhase) {
    tracing::debug!(action = %action, phase = %phase, "phase");
}
