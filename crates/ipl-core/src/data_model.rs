//! Data Model: DataSource, ScanResultRow, LabelGroups
use crate::error::IplError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Name of the sidecar manifest written into each labelled directory
pub const SIDECAR_FILE_NAME: &str = ".ip-labels";

/// Label filter used when a data source does not declare one
pub const MATCH_ALL_LABELS: &str = ".*";

// ============================================================================
// DATA SOURCES
// ============================================================================

/// Kinds of data source the service knows how to write to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Smb,
}

impl DataSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smb => "smb",
        }
    }
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSourceKind {
    type Err = IplError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smb" => Ok(Self::Smb),
            other => Err(IplError::Config(format!("unsupported data source kind: {}", other))),
        }
    }
}

/// Login for a data source. `Debug` never prints either field.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Credentials(********)")
    }
}

/// A configured data source, as declared in the configuration blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub name: String,
    pub kind: DataSourceKind,
    /// Case-insensitive label regex
    pub label_filter: String,
    /// Directory prefix, normalized (see [`PathFilter`])
    pub path_filter: String,
    pub credentials: Credentials,
}

/// Share list declared for a connection in the platform registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareList {
    /// Empty or `*`: every non-special share on the server
    Wildcard,
    Named(Vec<String>),
}

impl ShareList {
    /// Parse the registry's comma separated share list
    pub fn parse(raw: &str) -> Self {
        let names: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() || names.iter().any(|n| n == "*") {
            Self::Wildcard
        } else {
            Self::Named(names)
        }
    }
}

/// Connection metadata pulled from the platform registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub address: String,
    pub domain: String,
    pub shares: ShareList,
}

/// A data source that matched the registry, with the filters in effect
/// for the current request.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub source: DataSource,
    pub server: ServerInfo,
    pub filter: EffectiveFilter,
}

impl ResolvedSource {
    pub fn name(&self) -> &str {
        &self.source.name
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Case-insensitive label regex, matched from the start of each label
#[derive(Debug, Clone)]
pub struct LabelFilter {
    pattern: String,
    regex: Regex,
}

impl LabelFilter {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(&format!("^(?:{})", pattern))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, label: &str) -> bool {
        self.regex.is_match(label)
    }

    /// Labels accepted by the filter, in their original order
    pub fn select<'a>(&self, labels: &'a [String]) -> Vec<&'a str> {
        labels
            .iter()
            .map(String::as_str)
            .filter(|l| self.matches(l))
            .collect()
    }
}

/// Directory prefix filter, compared segment by segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    segments: Vec<String>,
}

impl PathFilter {
    pub fn new(raw: &str) -> Self {
        Self {
            segments: path_segments(raw).map(str::to_string).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// `share/path` admits `share/path/x` but not `share/path2/x`
    pub fn admits(&self, full_path: &str) -> bool {
        let mut path = path_segments(full_path);
        self.segments
            .iter()
            .all(|want| path.next().is_some_and(|got| got == want))
    }

    pub fn as_string(&self) -> String {
        self.segments.join("/")
    }
}

/// Label and path filters in effect for one source during one request
#[derive(Debug, Clone)]
pub struct EffectiveFilter {
    pub label: LabelFilter,
    pub path: PathFilter,
}

impl EffectiveFilter {
    /// Combine a source's configured filters with a request override
    pub fn for_request(source: &DataSource, label_override: Option<&str>) -> Result<Self, IplError> {
        let pattern = label_override.unwrap_or(&source.label_filter);
        let label = LabelFilter::compile(pattern).map_err(|e| {
            IplError::Resolution(format!(
                "invalid label filter for data source {}: {}",
                source.name, e
            ))
        })?;
        Ok(Self {
            label,
            path: PathFilter::new(&source.path_filter),
        })
    }
}

/// Normalize a catalog or filter path: backslashes become `/`, leading and
/// trailing separators are removed.
pub fn normalize_path(raw: &str) -> String {
    path_segments(raw).collect::<Vec<_>>().join("/")
}

fn path_segments(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".")
}

// ============================================================================
// CATALOG ROWS
// ============================================================================

/// One row of the platform's data catalog, as sent on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResultRow {
    #[serde(rename = "objectName", default)]
    pub object_name: Option<String>,
    #[serde(rename = "fullObjectName", default)]
    pub full_object_name: Option<String>,
    #[serde(rename = "containerName", default)]
    pub container_name: Option<String>,
    #[serde(rename = "attribute", default)]
    pub labels: Option<Vec<String>>,
}

/// A row with every required field present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedRow<'a> {
    pub object_name: &'a str,
    pub full_object_name: &'a str,
    pub container_name: &'a str,
    pub labels: &'a [String],
}

impl ScanResultRow {
    pub fn checked(&self) -> Result<CheckedRow<'_>, IplError> {
        fn require<'a, T: ?Sized>(field: Option<&'a T>, name: &str) -> Result<&'a T, IplError> {
            field.ok_or_else(|| IplError::ScanRow(format!("row missing field: {}", name)))
        }

        Ok(CheckedRow {
            object_name: require(self.object_name.as_deref(), "objectName")?,
            full_object_name: require(self.full_object_name.as_deref(), "fullObjectName")?,
            container_name: require(self.container_name.as_deref(), "containerName")?,
            labels: require(self.labels.as_deref(), "attribute")?,
        })
    }
}

// ============================================================================
// LABEL GROUPS
// ============================================================================

/// Share and directory a sidecar is written to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub share: String,
    /// Relative to the share, `/` separated, `""` for the share root
    pub directory: String,
}

impl GroupKey {
    pub fn new(share: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            share: share.into(),
            directory: directory.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.share, self.directory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLabels {
    pub labels: Vec<String>,
}

/// Contents of one `.ip-labels` sidecar: filename → labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelManifest(pub BTreeMap<String, FileLabels>);

impl LabelManifest {
    /// Insert or replace the labels of `filename`
    pub fn insert(&mut self, filename: impl Into<String>, labels: Vec<String>) {
        self.0.insert(filename.into(), FileLabels { labels });
    }

    pub fn get(&self, filename: &str) -> Option<&FileLabels> {
        self.0.get(filename)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// JSON, 4-space indented, UTF-8
    pub fn to_sidecar_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        Ok(out)
    }
}

pub type LabelGroups = BTreeMap<GroupKey, LabelManifest>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_filter_is_case_insensitive_and_anchored() {
        let filter = LabelFilter::compile("pii").unwrap();
        assert!(filter.matches("PII"));
        assert!(filter.matches("pii-email"));
        assert!(!filter.matches("not-pii"));
    }

    #[test]
    fn test_path_filter_matches_segments() {
        let filter = PathFilter::new("/share/path");
        assert!(filter.admits("share/path/to/file.txt"));
        assert!(filter.admits("share\\path\\file.txt"));
        assert!(!filter.admits("share/path2/file.txt"));
        assert!(!filter.admits("share"));
        assert!(PathFilter::new("").admits("anything/at/all"));
    }

    #[test]
    fn test_share_list_parse() {
        assert_eq!(ShareList::parse(""), ShareList::Wildcard);
        assert_eq!(ShareList::parse(" * "), ShareList::Wildcard);
        assert_eq!(
            ShareList::parse("a, b,"),
            ShareList::Named(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_checked_row_reports_missing_field() {
        let row = ScanResultRow {
            object_name: Some("file.txt".to_string()),
            full_object_name: Some("share/file.txt".to_string()),
            container_name: Some("share".to_string()),
            labels: None,
        };
        let err = row.checked().unwrap_err();
        assert_eq!(err, IplError::ScanRow("row missing field: attribute".to_string()));
    }

    #[test]
    fn test_sidecar_bytes_use_four_space_indent() {
        let mut manifest = LabelManifest::default();
        manifest.insert("file.txt", vec!["label-1".to_string()]);

        let text = String::from_utf8(manifest.to_sidecar_bytes().unwrap()).unwrap();
        assert_eq!(
            text,
            "{\n    \"file.txt\": {\n        \"labels\": [\n            \"label-1\"\n        ]\n    }\n}"
        );
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
    }
}
