//! Warning accumulation
//!
//! Non-fatal anomalies are threaded through the pipeline in a [`Warnings`]
//! value owned by the request. Any warning left at the end of an action
//! fails the request.

use crate::error::IplError;
use serde::Serialize;

/// Default bound on recorded warnings for one request.
pub const DEFAULT_MAX_WARNINGS: usize = 100;

/// A recorded, non-fatal anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// Taxonomy tag of the error that produced this warning
    pub category: &'static str,

    /// Human readable description
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<IplError> for Warning {
    fn from(err: IplError) -> Self {
        Self {
            category: err.category(),
            message: err.to_string(),
        }
    }
}

/// Bounded warning collector
#[derive(Debug, Clone)]
pub struct Warnings {
    entries: Vec<Warning>,
    max_entries: usize,
    dropped: usize,
}

impl Warnings {
    /// Create a collector with [`DEFAULT_MAX_WARNINGS`]
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_WARNINGS)
    }

    /// Create with a custom bound. The bound is at least one so a request
    /// with dropped warnings can never look clean.
    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max.max(1),
            dropped: 0,
        }
    }

    /// Record a warning. Past the bound the warning is counted and dropped.
    pub fn record(&mut self, warning: impl Into<Warning>) {
        let warning = warning.into();
        if self.entries.len() >= self.max_entries {
            self.dropped += 1;
            tracing::debug!(dropped = self.dropped, "warning bound reached: {}", warning);
            return;
        }
        tracing::warn!(category = warning.category, "{}", warning);
        self.entries.push(warning);
    }

    /// Move every warning of `other` into `self`, honouring the bound.
    /// The absorbed warnings were logged when first recorded.
    pub fn absorb(&mut self, other: Warnings) {
        self.dropped += other.dropped;
        let room = self.max_entries.saturating_sub(self.entries.len());
        let mut incoming = other.entries;
        if incoming.len() > room {
            self.dropped += incoming.len() - room;
            incoming.truncate(room);
        }
        self.entries.extend(incoming);
    }

    pub fn entries(&self) -> &[Warning] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was recorded, kept or dropped
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.dropped == 0
    }

    /// Number of warnings discarded because the bound was reached
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// All messages joined by newlines, in recording order
    pub fn joined(&self) -> String {
        self.entries
            .iter()
            .map(|w| w.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn into_vec(self) -> Vec<Warning> {
        self.entries
    }
}

impl Default for Warnings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_join() {
        let mut warnings = Warnings::new();
        warnings.record(IplError::Resolution("first".to_string()));
        warnings.record(IplError::ShareIo("second".to_string()));

        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings.entries()[0].category, "resolution");
        assert_eq!(warnings.joined(), "RESOLVE/first\nSHARE/second");
    }

    #[test]
    fn test_bound_drops_extra() {
        let mut warnings = Warnings::with_max_entries(2);
        for i in 0..5 {
            warnings.record(IplError::Config(format!("bad entry {}", i)));
        }

        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings.dropped(), 3);
        assert!(warnings.joined().contains("bad entry 1"));
        assert!(!warnings.joined().contains("bad entry 2"));
    }

    #[test]
    fn test_absorb_keeps_order() {
        let mut config = Warnings::new();
        config.record(IplError::Config("a".to_string()));

        let mut request = Warnings::new();
        request.absorb(config);
        request.record(IplError::UnsupportedAction("b".to_string()));

        let messages: Vec<_> = request.entries().iter().map(|w| w.to_string()).collect();
        assert_eq!(messages, vec!["CONFIG/a", "ACTION/b"]);
    }

    #[test]
    fn test_zero_bound_still_keeps_one() {
        let mut warnings = Warnings::with_max_entries(0);
        warnings.record(IplError::Resolution("first".to_string()));
        warnings.record(IplError::Resolution("second".to_string()));

        assert_eq!(warnings.max_entries(), 1);
        assert!(!warnings.is_empty());
        assert_eq!(warnings.joined(), "RESOLVE/first");
        assert_eq!(warnings.dropped(), 1);
    }

    #[test]
    fn test_absorb_honours_bound() {
        let mut config = Warnings::new();
        for i in 0..3 {
            config.record(IplError::Config(format!("bad entry {}", i)));
        }

        let mut request = Warnings::with_max_entries(2);
        request.absorb(config);

        assert_eq!(request.len(), 2);
        assert_eq!(request.dropped(), 1);
        assert_eq!(request.joined(), "CONFIG/bad entry 0\nCONFIG/bad entry 1");
    }
}
