//! Data source resolution
//!
//! Cross-references configured data sources with the platform's connection
//! registry and yields, one at a time, the sources that can be worked on.

use ipl_core::{
    DataSource, EffectiveFilter, IplError, RequestOverrides, ResolvedSource, ServerInfo,
    ShareList, Warnings,
};
use ipl_platform::{PlatformApi, RegistryEntry};

/// Lazy sequence of resolved data sources
pub struct Resolver<'a> {
    sources: std::slice::Iter<'a, DataSource>,
    overrides: &'a RequestOverrides,
    platform: &'a dyn PlatformApi,
    yielded: usize,
    exhausted: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(
        sources: &'a [DataSource],
        overrides: &'a RequestOverrides,
        platform: &'a dyn PlatformApi,
    ) -> Self {
        Self {
            sources: sources.iter(),
            overrides,
            platform,
            yielded: 0,
            exhausted: false,
        }
    }

    /// Next resolvable source. Sources that fail to resolve are recorded in
    /// `warnings` and skipped. Once the configuration is exhausted without
    /// yielding anything, a single "no data sources enumerated" warning is
    /// recorded.
    pub async fn next(&mut self, warnings: &mut Warnings) -> Option<ResolvedSource> {
        while let Some(source) = self.sources.next() {
            match self.resolve(source).await {
                Ok(Some(resolved)) => {
                    self.yielded += 1;
                    tracing::info!(
                        data_source = %resolved.name(),
                        server = %resolved.server.address,
                        "data source resolved"
                    );
                    return Some(resolved);
                }
                Ok(None) => continue,
                Err(err) => warnings.record(err),
            }
        }

        if !self.exhausted {
            self.exhausted = true;
            if self.yielded == 0 {
                warnings.record(IplError::Resolution("no data sources enumerated".to_string()));
            }
        }
        None
    }

    /// Number of sources yielded so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    async fn resolve(&self, source: &DataSource) -> Result<Option<ResolvedSource>, IplError> {
        if let Some(wanted) = &self.overrides.data_source_name {
            if wanted != &source.name {
                tracing::debug!(data_source = %source.name, wanted = %wanted, "skipping data source");
                return Ok(None);
            }
        }

        let filter = EffectiveFilter::for_request(source, self.overrides.label_filter.as_deref())?;

        let mut matches = self
            .platform
            .find_connections(&source.name)
            .await
            .map_err(|e| {
                IplError::Platform(format!("registry lookup for {} failed: {}", source.name, e))
            })?;

        if matches.len() != 1 {
            return Err(IplError::Resolution(format!(
                "expected exactly one data source named {}, found {}",
                source.name,
                matches.len()
            )));
        }
        let entry = matches.remove(0);

        let registry_kind = entry.kind.as_deref().unwrap_or("");
        if !registry_kind.eq_ignore_ascii_case(source.kind.as_str()) {
            return Err(IplError::Resolution(format!(
                "data source {} has type {:?} in the registry, configured as {}",
                source.name, registry_kind, source.kind
            )));
        }

        let server = server_info(&entry).map_err(|e| {
            IplError::Resolution(format!(
                "failed to read connection details for {}: {}",
                source.name, e
            ))
        })?;

        tracing::debug!(
            data_source = %source.name,
            label_filter = %filter.label.pattern(),
            path_filter = %filter.path.as_string(),
            "effective filters"
        );

        Ok(Some(ResolvedSource {
            source: source.clone(),
            server,
            filter,
        }))
    }
}

fn server_info(entry: &RegistryEntry) -> Result<ServerInfo, String> {
    let address = entry
        .smb_server
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing field smbServer".to_string())?;

    Ok(ServerInfo {
        address: address.to_string(),
        domain: entry.domain.clone().unwrap_or_default(),
        shares: ShareList::parse(entry.shared_resource.as_deref().unwrap_or("")),
    })
}
