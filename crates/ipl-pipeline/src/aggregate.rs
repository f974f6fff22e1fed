//! Label aggregation
//!
//! Turns a data source's catalog rows into one label manifest per
//! (share, directory).
//!
//! ```text
//! catalog row ─► required fields ─► label filter ─► path filter ─► (share, parent dir)
//!                     │                  │               │
//!                  logged             dropped         dropped
//! ```

use ipl_core::{
    data_model::normalize_path, EffectiveFilter, GroupKey, IplError, LabelGroups, ResolvedSource,
    ScanResultRow, Warnings,
};
use ipl_platform::PlatformApi;
use serde_json::Value;

/// A row that survived filtering, ready to be grouped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedRow {
    pub key: GroupKey,
    pub filename: String,
    pub labels: Vec<String>,
}

/// Fetch the catalog of `source` and group it. A failed catalog query is
/// recorded as a warning and yields no groups.
pub async fn aggregate(
    platform: &dyn PlatformApi,
    source: &ResolvedSource,
    warnings: &mut Warnings,
) -> LabelGroups {
    let rows = scan(platform, source, warnings).await;
    group_source(source, rows)
}

/// Catalog rows of `source`, empty (with a warning) when the query fails
pub async fn scan(
    platform: &dyn PlatformApi,
    source: &ResolvedSource,
    warnings: &mut Warnings,
) -> Vec<Value> {
    match platform.catalog(source.name()).await {
        Ok(page) => page.results,
        Err(e) => {
            warnings.record(IplError::Platform(format!(
                "catalog query for {} failed: {}",
                source.name(),
                e
            )));
            Vec::new()
        }
    }
}

/// Group the scanned rows of `source` under its effective filters
pub fn group_source(source: &ResolvedSource, rows: Vec<Value>) -> LabelGroups {
    tracing::debug!(
        data_source = %source.name(),
        rows = rows.len(),
        label_filter = %source.filter.label.pattern(),
        path_filter = %source.filter.path.as_string(),
        "grouping scan results"
    );

    let groups = group_values(rows, &source.filter);
    tracing::info!(data_source = %source.name(), groups = groups.len(), "scan results grouped");
    groups
}

/// Group raw catalog rows; rows that do not decode are logged and dropped
pub fn group_values(rows: Vec<Value>, filter: &EffectiveFilter) -> LabelGroups {
    let decoded = rows.into_iter().filter_map(|value| {
        match serde_json::from_value::<ScanResultRow>(value.clone()) {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::error!(row = %value, error = %e, "error processing scan result row");
                None
            }
        }
    });
    group_rows(decoded, filter)
}

/// Group typed rows. Duplicate filenames in one directory: last row wins.
pub fn group_rows<I>(rows: I, filter: &EffectiveFilter) -> LabelGroups
where
    I: IntoIterator<Item = ScanResultRow>,
{
    let mut groups = LabelGroups::new();
    for row in rows {
        match place_row(&row, filter) {
            Ok(Some(placed)) => {
                groups
                    .entry(placed.key)
                    .or_default()
                    .insert(placed.filename, placed.labels);
            }
            Ok(None) => {}
            Err(e) => tracing::error!(row = ?row, error = %e, "error processing scan result row"),
        }
    }
    groups
}

/// Decide where a row goes, `None` when a filter drops it
pub fn place_row(row: &ScanResultRow, filter: &EffectiveFilter) -> Result<Option<PlacedRow>, IplError> {
    let checked = row.checked()?;

    let labels: Vec<String> = filter
        .label
        .select(checked.labels)
        .into_iter()
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        tracing::debug!(labels = ?checked.labels, "filtered out file by label");
        return Ok(None);
    }

    let full = normalize_path(checked.full_object_name);
    if !filter.path.admits(&full) {
        tracing::debug!(path = %full, "filtered out file by path");
        return Ok(None);
    }

    let share = normalize_path(checked.container_name);
    let relative = full
        .strip_prefix(share.as_str())
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .filter(|_| !share.is_empty())
        .ok_or_else(|| {
            IplError::ScanRow(format!("path {} is not inside share {}", full, checked.container_name))
        })?
        .trim_start_matches('/');

    if relative.is_empty() {
        return Err(IplError::ScanRow(format!("path {} names the share itself", full)));
    }
    let directory = relative.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

    Ok(Some(PlacedRow {
        key: GroupKey::new(share.clone(), directory),
        filename: checked.object_name.to_string(),
        labels,
    }))
}
