//! Ordered label-to-position mapping.
//!
//! Resolution scans entries in order and the first normalized label match
//! wins, so registry order is significant. Duplicate position ids are allowed
//! and reported, never rejected.

use std::collections::BTreeMap;

use gondola_core::config::default_gondolas;
use gondola_core::constants::FIRST_POSITION_ID;
use gondola_core::{GondolaEntry, PositionId, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of a bulk replace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryReport {
    /// Position ids used by more than one entry, ascending.
    pub duplicates: Vec<PositionId>,
}

impl RegistryReport {
    pub fn has_warnings(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// Runtime-mutable gondola registry.
///
/// # Examples
///
/// ```
/// use gondola_core::GondolaEntry;
/// use gondola_engine::GondolaRegistry;
///
/// let registry = GondolaRegistry::new(vec![
///     GondolaEntry::new("pliers", 71),
///     GondolaEntry::new("hammer", 73),
/// ]);
///
/// assert_eq!(registry.resolve(" Hammer "), Some(73));
/// assert_eq!(registry.resolve_or("drill", 76), 76);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GondolaRegistry {
    entries: Vec<GondolaEntry>,
}

impl GondolaRegistry {
    pub fn new(entries: Vec<GondolaEntry>) -> Self {
        Self { entries }
    }

    /// Seed from bare labels, assigning 71, 72, ... in order.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = labels
            .into_iter()
            .zip(FIRST_POSITION_ID..)
            .map(|(label, position_id)| GondolaEntry::new(label, position_id))
            .collect();
        Self { entries }
    }

    /// Replace every entry, preserving the submitted order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidGondola` if an entry has a blank label or a
    /// negative position. The registry is left unchanged in that case.
    pub fn replace_all(&mut self, entries: Vec<GondolaEntry>) -> Result<RegistryReport> {
        for entry in &entries {
            entry.validate()?;
        }
        self.entries = entries;

        let report = RegistryReport {
            duplicates: self.duplicate_positions(),
        };
        if report.has_warnings() {
            warn!(duplicates = ?report.duplicates, "Gondola registry has duplicate positions");
        }
        info!(count = self.entries.len(), "Gondola registry replaced");
        Ok(report)
    }

    pub fn entries(&self) -> &[GondolaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose label matches, ignoring case and surrounding spaces.
    pub fn find(&self, label: &str) -> Option<&GondolaEntry> {
        self.entries.iter().find(|entry| entry.matches(label))
    }

    pub fn resolve(&self, label: &str) -> Option<PositionId> {
        self.find(label).map(|entry| entry.position_id)
    }

    /// Resolve, falling back to `default` for unmapped labels.
    pub fn resolve_or(&self, label: &str, default: PositionId) -> PositionId {
        self.resolve(label).unwrap_or(default)
    }

    /// Position ids assigned to more than one entry.
    pub fn duplicate_positions(&self) -> Vec<PositionId> {
        let mut counts: BTreeMap<PositionId, usize> = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.position_id).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(position, _)| position)
            .collect()
    }
}

impl Default for GondolaRegistry {
    fn default() -> Self {
        Self::new(default_gondolas())
    }
}
