//! Non-fatal diagnostics collected during a run.
//!
//! Table extrapolation can happen at every iteration for every region. The
//! warnings are folded into a [`WarningLog`] keyed by (material, region) and
//! reported once when the run finishes.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

/// A B-H table was queried beyond its tabulated range plus margin.
#[derive(Debug, Clone, PartialEq)]
pub struct OutOfRangeWarning {
    /// Name of the table
    pub table: String,
    /// Queried field strength magnitude (A/m)
    pub field_strength: f64,
    /// Largest tabulated field strength (A/m)
    pub table_limit: f64,
}

impl fmt::Display for OutOfRangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "H = {:.3e} A/m exceeds table '{}' (last sample {:.3e} A/m), extrapolating",
            self.field_strength, self.table, self.table_limit
        )
    }
}

/// Aggregate of repeated warnings for one (material, region) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct WarningSummary {
    pub table: String,
    pub table_limit: f64,
    /// Number of lookups that went out of range
    pub occurrences: usize,
    /// Largest field strength seen
    pub worst_field_strength: f64,
}

/// Accumulates out-of-range warnings without repeating them.
#[derive(Debug, Clone, Default)]
pub struct WarningLog {
    entries: BTreeMap<(String, String), WarningSummary>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one warning raised while evaluating `material` in `region`.
    pub fn record(&mut self, material: &str, region: &str, warning: &OutOfRangeWarning) {
        let key = (material.to_string(), region.to_string());
        self.entries
            .entry(key)
            .and_modify(|s| {
                s.occurrences += 1;
                s.worst_field_strength = s.worst_field_strength.max(warning.field_strength);
            })
            .or_insert_with(|| WarningSummary {
                table: warning.table.clone(),
                table_limit: warning.table_limit,
                occurrences: 1,
                worst_field_strength: warning.field_strength,
            });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over `((material, region), summary)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&(String, String), &WarningSummary)> {
        self.entries.iter()
    }

    /// Emit one `warn!` line per (material, region) and clear the log.
    pub fn report(&mut self) {
        for ((material, region), s) in &self.entries {
            warn!(
                material = %material,
                region = %region,
                table = %s.table,
                occurrences = s.occurrences,
                "B-H table extrapolated up to H = {:.3e} A/m (last sample {:.3e} A/m)",
                s.worst_field_strength,
                s.table_limit
            );
        }
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(h: f64) -> OutOfRangeWarning {
        OutOfRangeWarning {
            table: "IRON".to_string(),
            field_strength: h,
            table_limit: 1000.0,
        }
    }

    #[test]
    fn test_repeated_warnings_fold_into_one_entry() {
        let mut log = WarningLog::new();
        log.record("Iron", "core", &warning(2000.0));
        log.record("Iron", "core", &warning(5000.0));
        log.record("Iron", "core", &warning(3000.0));

        assert_eq!(log.len(), 1);
        let (_, s) = log.iter().next().unwrap();
        assert_eq!(s.occurrences, 3);
        assert_eq!(s.worst_field_strength, 5000.0);
    }

    #[test]
    fn test_report_clears() {
        let mut log = WarningLog::new();
        log.record("Iron", "core", &warning(2000.0));
        log.record("Iron", "yoke", &warning(1500.0));
        assert_eq!(log.len(), 2);

        log.report();
        assert!(log.is_empty());
    }
}
