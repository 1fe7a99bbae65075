//! Signal definitions for complexity scoring.
//!
//! Each signal is evaluated independently over the work item's text and
//! metadata and contributes a bounded amount to the total score. Weights and
//! keyword lists are configuration, not code, so the scoring can be retuned
//! without a redeploy.

use serde::{Deserialize, Serialize};

/// Structured metadata about a work item, supplied alongside its text.
#[derive(Debug, Clone, Default)]
pub struct ItemMetadata {
    /// Number of labels on the item.
    pub label_count: u32,
    /// Number of files the item is known to reference, if any.
    pub referenced_files: u32,
    /// Number of cross-references to other work items.
    pub cross_references: u32,
    /// Number of prior failed execution attempts.
    pub failed_attempts: u32,
}

/// One signal's contribution to a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalHit {
    /// Stable signal name, used in rationale text and audit comments.
    pub name: String,
    /// The observed value that triggered the signal.
    pub observed: u32,
    /// Points contributed to the total score.
    pub contribution: u32,
}

impl SignalHit {
    pub(crate) fn new(name: &str, observed: u32, contribution: u32) -> Self {
        Self {
            name: name.to_string(),
            observed,
            contribution,
        }
    }
}

/// Weights and keyword lists for the signal set.
///
/// Defaults are the reference configuration: contributions cap at a total of
/// 65 points across all signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Keywords suggesting inherent complexity (migrations, refactors, ...).
    pub complexity_keywords: Vec<String>,
    /// Points per complexity keyword hit.
    pub complexity_keyword_weight: u32,
    /// Cap on total complexity-keyword contribution.
    pub complexity_keyword_cap: u32,

    /// Language indicating the reporter is unsure what is wrong.
    pub uncertainty_keywords: Vec<String>,
    /// Flat contribution when any uncertainty keyword is present.
    pub uncertainty_weight: u32,

    /// Body length (chars) above which each band adds `length_band_weight`.
    pub length_bands: Vec<u32>,
    /// Points per length band exceeded.
    pub length_band_weight: u32,

    /// Subsystem names to scan for in the text.
    pub subsystems: Vec<String>,
    /// Points per distinct subsystem mentioned.
    pub subsystem_weight: u32,
    /// Cap on total subsystem contribution.
    pub subsystem_cap: u32,

    /// Points per file the item is known to reference.
    pub referenced_file_weight: u32,
    /// Cap on total referenced-file contribution.
    pub referenced_file_cap: u32,

    /// Points per cross-reference to another work item.
    pub cross_reference_weight: u32,
    /// Cap on total cross-reference contribution.
    pub cross_reference_cap: u32,

    /// Points per label on the item.
    pub label_weight: u32,
    /// Cap on total label contribution.
    pub label_cap: u32,

    /// Points per prior failed attempt.
    pub failed_attempt_weight: u32,
    /// Cap on total failed-attempt contribution.
    pub failed_attempt_cap: u32,

    /// Floor score assigned when the body is empty or whitespace-only.
    pub empty_body_floor: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            complexity_keywords: [
                "migration",
                "refactor",
                "redesign",
                "breaking",
                "architecture",
                "concurrency",
                "deadlock",
                "data loss",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            complexity_keyword_weight: 4,
            complexity_keyword_cap: 16,
            uncertainty_keywords: [
                "investigate",
                "unclear",
                "not sure",
                "intermittent",
                "sometimes",
                "can't reproduce",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            uncertainty_weight: 8,
            length_bands: vec![400, 1200, 3000],
            length_band_weight: 3,
            subsystems: [
                "parser", "scheduler", "storage", "network", "auth", "api", "ui", "ci",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            subsystem_weight: 4,
            subsystem_cap: 9,
            referenced_file_weight: 2,
            referenced_file_cap: 6,
            cross_reference_weight: 2,
            cross_reference_cap: 4,
            label_weight: 1,
            label_cap: 3,
            failed_attempt_weight: 5,
            failed_attempt_cap: 10,
            empty_body_floor: 4,
        }
    }
}

impl SignalConfig {
    /// Maximum achievable score under this configuration.
    pub fn max_score(&self) -> u32 {
        self.complexity_keyword_cap
            + self.uncertainty_weight
            + self.length_bands.len() as u32 * self.length_band_weight
            + self.subsystem_cap
            + self.referenced_file_cap
            + self.cross_reference_cap
            + self.label_cap
            + self.failed_attempt_cap
    }
}

/// Evaluate all signals over the lowercased text and metadata.
///
/// Pure function: same inputs always produce the same hits, in a stable
/// order.
pub(crate) fn evaluate(config: &SignalConfig, text: &str, meta: &ItemMetadata) -> Vec<SignalHit> {
    let lower = text.to_lowercase();
    let mut hits = Vec::new();

    let keyword_matches = config
        .complexity_keywords
        .iter()
        .filter(|k| lower.contains(k.as_str()))
        .count() as u32;
    if keyword_matches > 0 {
        let contribution =
            (keyword_matches * config.complexity_keyword_weight).min(config.complexity_keyword_cap);
        hits.push(SignalHit::new(
            "complexity_keywords",
            keyword_matches,
            contribution,
        ));
    }

    let uncertain = config
        .uncertainty_keywords
        .iter()
        .any(|k| lower.contains(k.as_str()));
    if uncertain {
        hits.push(SignalHit::new(
            "uncertainty_language",
            1,
            config.uncertainty_weight,
        ));
    }

    let len = lower.chars().count() as u32;
    let bands_exceeded = config.length_bands.iter().filter(|b| len > **b).count() as u32;
    if bands_exceeded > 0 {
        hits.push(SignalHit::new(
            "body_length",
            len,
            bands_exceeded * config.length_band_weight,
        ));
    }

    let subsystems = config
        .subsystems
        .iter()
        .filter(|s| lower.contains(s.as_str()))
        .count() as u32;
    if subsystems > 0 {
        let contribution = (subsystems * config.subsystem_weight).min(config.subsystem_cap);
        hits.push(SignalHit::new(
            "subsystems_mentioned",
            subsystems,
            contribution,
        ));
    }

    if meta.referenced_files > 0 {
        let contribution =
            (meta.referenced_files * config.referenced_file_weight).min(config.referenced_file_cap);
        hits.push(SignalHit::new(
            "referenced_files",
            meta.referenced_files,
            contribution,
        ));
    }

    if meta.cross_references > 0 {
        let contribution =
            (meta.cross_references * config.cross_reference_weight).min(config.cross_reference_cap);
        hits.push(SignalHit::new(
            "cross_references",
            meta.cross_references,
            contribution,
        ));
    }

    if meta.label_count > 0 {
        let contribution = (meta.label_count * config.label_weight).min(config.label_cap);
        hits.push(SignalHit::new("label_count", meta.label_count, contribution));
    }

    if meta.failed_attempts > 0 {
        let contribution =
            (meta.failed_attempts * config.failed_attempt_weight).min(config.failed_attempt_cap);
        hits.push(SignalHit::new(
            "failed_attempts",
            meta.failed_attempts,
            contribution,
        ));
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_config_max_score_is_65() {
        assert_eq!(SignalConfig::default().max_score(), 65);
    }

    #[test]
    fn test_no_signals_for_plain_short_text() {
        let hits = evaluate(
            &SignalConfig::default(),
            "fix typo in readme",
            &ItemMetadata::default(),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_keyword_contribution_is_capped() {
        let config = SignalConfig::default();
        let text = "migration refactor redesign breaking architecture concurrency";
        let hits = evaluate(&config, text, &ItemMetadata::default());
        let keyword_hit = hits
            .iter()
            .find(|h| h.name == "complexity_keywords")
            .unwrap();
        assert_eq!(keyword_hit.observed, 6);
        assert_eq!(keyword_hit.contribution, config.complexity_keyword_cap);
    }

    #[test]
    fn test_uncertainty_language_detected_case_insensitive() {
        let hits = evaluate(
            &SignalConfig::default(),
            "Please INVESTIGATE this failure",
            &ItemMetadata::default(),
        );
        assert!(hits.iter().any(|h| h.name == "uncertainty_language"));
    }

    #[test]
    fn test_referenced_files_raise_score_and_cap() {
        let config = SignalConfig::default();
        let few = ItemMetadata {
            referenced_files: 2,
            ..Default::default()
        };
        let hits = evaluate(&config, "touch the listed files", &few);
        let hit = hits.iter().find(|h| h.name == "referenced_files").unwrap();
        assert_eq!(hit.contribution, 2 * config.referenced_file_weight);

        let many = ItemMetadata {
            referenced_files: 20,
            ..Default::default()
        };
        let hits = evaluate(&config, "touch the listed files", &many);
        let hit = hits.iter().find(|h| h.name == "referenced_files").unwrap();
        assert_eq!(hit.contribution, config.referenced_file_cap);
    }

    #[test]
    fn test_failed_attempts_capped() {
        let config = SignalConfig::default();
        let meta = ItemMetadata {
            failed_attempts: 5,
            ..Default::default()
        };
        let hits = evaluate(&config, "", &meta);
        let hit = hits.iter().find(|h| h.name == "failed_attempts").unwrap();
        assert_eq!(hit.contribution, config.failed_attempt_cap);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let config = SignalConfig::default();
        let meta = ItemMetadata {
            label_count: 3,
            cross_references: 2,
            ..Default::default()
        };
        let text = "the scheduler deadlocks during migration, sometimes";
        let a = evaluate(&config, text, &meta);
        let b = evaluate(&config, text, &meta);
        assert_eq!(a, b);
    }
}
