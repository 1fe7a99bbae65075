//! Merge-conflict complexity analysis.
//!
//! Scores a conflict's shape over seven independent weighted metrics and
//! maps the total to a resolution strategy. Like the issue classifier, this
//! never fails: malformed input falls back to the most conservative band
//! (Complex) rather than erroring out of the pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::tracker::ConflictSet;

/// Complexity band of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictBand {
    Simple,
    Moderate,
    Complex,
}

/// Resolution path chosen for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Loop back to execution for one automated resolution attempt.
    AutoResolve,
    /// Abort with a human-actionable annotation.
    ManualFix,
    /// Abort, close out, and file a fresh work item.
    CloseAndRecreate,
}

impl ConflictStrategy {
    /// Stable label used in tracker annotations.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConflictStrategy::AutoResolve => "auto_resolve",
            ConflictStrategy::ManualFix => "manual_fix",
            ConflictStrategy::CloseAndRecreate => "close_and_recreate",
        }
    }
}

/// One metric's contribution to a conflict score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricHit {
    /// Stable metric name.
    pub name: String,
    /// Points contributed.
    pub contribution: u32,
}

/// The analysis result, consumed immediately by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Paths in conflict.
    pub paths: Vec<String>,
    /// Total conflicting line count across both sides.
    pub total_lines: u32,
    /// Metric breakdown, in evaluation order.
    pub metrics: Vec<MetricHit>,
    /// Total score.
    pub score: u32,
    /// The band the score landed in.
    pub band: ConflictBand,
    /// The chosen resolution strategy.
    pub strategy: ConflictStrategy,
}

/// Metric weights and band thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Points per conflicting file.
    pub file_weight: u32,
    /// Cap on the file-count contribution.
    pub file_cap: u32,
    /// One point per this many conflicting lines.
    pub lines_per_point: u32,
    /// Cap on the line-count contribution.
    pub lines_cap: u32,
    /// Substrings marking structurally critical paths.
    pub critical_paths: Vec<String>,
    /// Flat contribution when any critical path is in conflict.
    pub critical_weight: u32,
    /// One point per day of conflict age.
    pub age_day_weight: u32,
    /// Cap on the age contribution.
    pub age_cap: u32,
    /// Points per prior failed auto-resolution attempt.
    pub failed_resolve_weight: u32,
    /// Cap on the failed-attempt contribution.
    pub failed_resolve_cap: u32,
    /// One point per this many commits of branch divergence.
    pub divergence_per_point: u32,
    /// Cap on the divergence contribution.
    pub divergence_cap: u32,
    /// Overlap ratio above which the high overlap weight applies.
    pub overlap_high: f64,
    /// Contribution for high overlap.
    pub overlap_high_weight: u32,
    /// Overlap ratio above which the low overlap weight applies.
    pub overlap_low: f64,
    /// Contribution for moderate overlap.
    pub overlap_low_weight: u32,
    /// Scores at or below this are Simple.
    pub simple_max: u32,
    /// Scores at or below this (and above `simple_max`) are Moderate.
    pub moderate_max: u32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            file_weight: 1,
            file_cap: 10,
            lines_per_point: 25,
            lines_cap: 6,
            critical_paths: [
                "migrations/",
                "schema",
                "Cargo.lock",
                ".github/workflows",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            critical_weight: 6,
            age_day_weight: 1,
            age_cap: 4,
            failed_resolve_weight: 3,
            failed_resolve_cap: 6,
            divergence_per_point: 10,
            divergence_cap: 4,
            overlap_high: 0.5,
            overlap_high_weight: 4,
            overlap_low: 0.25,
            overlap_low_weight: 2,
            simple_max: 8,
            moderate_max: 14,
        }
    }
}

/// Scores conflict shapes into resolution strategies.
#[derive(Debug, Clone)]
pub struct ConflictComplexityAnalyzer {
    config: ConflictConfig,
}

impl ConflictComplexityAnalyzer {
    /// Create an analyzer with the given weights.
    pub fn new(config: ConflictConfig) -> Self {
        Self { config }
    }

    /// Analyze a conflict set into a report.
    ///
    /// Malformed input (no entries, or a non-finite overlap ratio) yields a
    /// Complex report with an explanatory metric instead of an error.
    pub fn analyze(&self, conflicts: &ConflictSet) -> ConflictReport {
        if conflicts.entries.is_empty() || !conflicts.overlap_ratio.is_finite() {
            return self.conservative_report(conflicts);
        }

        let c = &self.config;
        let mut metrics = Vec::new();

        let file_count = conflicts.entries.len() as u32;
        metrics.push(MetricHit {
            name: "conflicting_files".to_string(),
            contribution: (file_count * c.file_weight).min(c.file_cap),
        });

        let total_lines: u32 = conflicts
            .entries
            .iter()
            .map(|e| e.ours_lines + e.theirs_lines)
            .sum();
        metrics.push(MetricHit {
            name: "conflicting_lines".to_string(),
            contribution: (total_lines / c.lines_per_point.max(1)).min(c.lines_cap),
        });

        let critical = conflicts.entries.iter().any(|e| {
            c.critical_paths
                .iter()
                .any(|marker| e.path.contains(marker.as_str()))
        });
        metrics.push(MetricHit {
            name: "critical_path".to_string(),
            contribution: if critical { c.critical_weight } else { 0 },
        });

        let age_days = conflicts
            .detected_at
            .map(|at| (Utc::now() - at).num_days().max(0) as u32)
            .unwrap_or(0);
        metrics.push(MetricHit {
            name: "conflict_age".to_string(),
            contribution: (age_days * c.age_day_weight).min(c.age_cap),
        });

        metrics.push(MetricHit {
            name: "failed_auto_resolves".to_string(),
            contribution: (conflicts.failed_auto_resolves * c.failed_resolve_weight)
                .min(c.failed_resolve_cap),
        });

        let divergence = conflicts.ours_ahead + conflicts.theirs_ahead;
        metrics.push(MetricHit {
            name: "branch_divergence".to_string(),
            contribution: (divergence / c.divergence_per_point.max(1)).min(c.divergence_cap),
        });

        let overlap = conflicts.overlap_ratio.clamp(0.0, 1.0);
        let overlap_contribution = if overlap > c.overlap_high {
            c.overlap_high_weight
        } else if overlap > c.overlap_low {
            c.overlap_low_weight
        } else {
            0
        };
        metrics.push(MetricHit {
            name: "changeset_overlap".to_string(),
            contribution: overlap_contribution,
        });

        let score: u32 = metrics.iter().map(|m| m.contribution).sum();
        let band = if score <= c.simple_max {
            ConflictBand::Simple
        } else if score <= c.moderate_max {
            ConflictBand::Moderate
        } else {
            ConflictBand::Complex
        };
        let strategy = self.strategy_for(band, conflicts.failed_auto_resolves);

        ConflictReport {
            paths: conflicts.entries.iter().map(|e| e.path.clone()).collect(),
            total_lines,
            metrics,
            score,
            band,
            strategy,
        }
    }

    /// CloseAndRecreate is reserved for Complex conflicts where an automated
    /// attempt already failed; everything else Complex or Moderate goes to a
    /// human. This keeps the strategy from oscillating between auto attempts
    /// and recreation.
    fn strategy_for(&self, band: ConflictBand, failed_auto_resolves: u32) -> ConflictStrategy {
        match band {
            ConflictBand::Simple => ConflictStrategy::AutoResolve,
            ConflictBand::Moderate => ConflictStrategy::ManualFix,
            ConflictBand::Complex if failed_auto_resolves > 0 => {
                ConflictStrategy::CloseAndRecreate
            }
            ConflictBand::Complex => ConflictStrategy::ManualFix,
        }
    }

    fn conservative_report(&self, conflicts: &ConflictSet) -> ConflictReport {
        ConflictReport {
            paths: conflicts.entries.iter().map(|e| e.path.clone()).collect(),
            total_lines: 0,
            metrics: vec![MetricHit {
                name: "malformed_input".to_string(),
                contribution: self.config.moderate_max + 1,
            }],
            score: self.config.moderate_max + 1,
            band: ConflictBand::Complex,
            strategy: self.strategy_for(ConflictBand::Complex, conflicts.failed_auto_resolves),
        }
    }
}

impl Default for ConflictComplexityAnalyzer {
    fn default() -> Self {
        Self::new(ConflictConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ConflictEntry;

    fn entry(path: &str, ours: u32, theirs: u32) -> ConflictEntry {
        ConflictEntry {
            path: path.to_string(),
            ours_lines: ours,
            theirs_lines: theirs,
        }
    }

    fn set(entries: Vec<ConflictEntry>) -> ConflictSet {
        ConflictSet {
            entries,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_file_single_line_is_auto_resolve() {
        let analyzer = ConflictComplexityAnalyzer::default();
        let report = analyzer.analyze(&set(vec![entry("src/lib.rs", 1, 1)]));
        assert_eq!(report.band, ConflictBand::Simple);
        assert_eq!(report.strategy, ConflictStrategy::AutoResolve);
    }

    #[test]
    fn test_ten_files_with_critical_path_is_complex() {
        let analyzer = ConflictComplexityAnalyzer::default();
        let mut entries: Vec<ConflictEntry> =
            (0..9).map(|i| entry(&format!("src/m{i}.rs"), 2, 2)).collect();
        entries.push(entry("migrations/0042_split.sql", 2, 2));
        let report = analyzer.analyze(&set(entries));
        assert_eq!(report.band, ConflictBand::Complex);
    }

    #[test]
    fn test_complex_without_failed_attempt_is_manual_fix() {
        let analyzer = ConflictComplexityAnalyzer::default();
        let mut entries: Vec<ConflictEntry> =
            (0..9).map(|i| entry(&format!("src/m{i}.rs"), 2, 2)).collect();
        entries.push(entry("migrations/0042_split.sql", 2, 2));
        let report = analyzer.analyze(&set(entries));
        assert_eq!(report.strategy, ConflictStrategy::ManualFix);
    }

    #[test]
    fn test_complex_after_failed_auto_resolve_is_close_and_recreate() {
        let analyzer = ConflictComplexityAnalyzer::default();
        let mut entries: Vec<ConflictEntry> =
            (0..9).map(|i| entry(&format!("src/m{i}.rs"), 2, 2)).collect();
        entries.push(entry("migrations/0042_split.sql", 2, 2));
        let mut conflicts = set(entries);
        conflicts.failed_auto_resolves = 1;
        let report = analyzer.analyze(&conflicts);
        assert_eq!(report.band, ConflictBand::Complex);
        assert_eq!(report.strategy, ConflictStrategy::CloseAndRecreate);
    }

    #[test]
    fn test_empty_conflict_set_is_conservative_complex() {
        let analyzer = ConflictComplexityAnalyzer::default();
        let report = analyzer.analyze(&set(vec![]));
        assert_eq!(report.band, ConflictBand::Complex);
        assert_eq!(report.metrics[0].name, "malformed_input");
    }

    #[test]
    fn test_non_finite_overlap_is_conservative_complex() {
        let analyzer = ConflictComplexityAnalyzer::default();
        let mut conflicts = set(vec![entry("src/lib.rs", 1, 1)]);
        conflicts.overlap_ratio = f64::NAN;
        let report = analyzer.analyze(&conflicts);
        assert_eq!(report.band, ConflictBand::Complex);
    }

    #[test]
    fn test_overlap_bands() {
        let analyzer = ConflictComplexityAnalyzer::default();
        let mut conflicts = set(vec![entry("src/a.rs", 1, 1)]);
        conflicts.overlap_ratio = 0.6;
        let high = analyzer.analyze(&conflicts);
        conflicts.overlap_ratio = 0.3;
        let low = analyzer.analyze(&conflicts);
        conflicts.overlap_ratio = 0.1;
        let none = analyzer.analyze(&conflicts);
        assert!(high.score > low.score);
        assert!(low.score > none.score);
    }

    #[test]
    fn test_divergence_contributes() {
        let analyzer = ConflictComplexityAnalyzer::default();
        let mut conflicts = set(vec![entry("src/a.rs", 1, 1)]);
        conflicts.ours_ahead = 30;
        conflicts.theirs_ahead = 20;
        let report = analyzer.analyze(&conflicts);
        let divergence = report
            .metrics
            .iter()
            .find(|m| m.name == "branch_divergence")
            .unwrap();
        assert_eq!(divergence.contribution, 4);
    }
}
