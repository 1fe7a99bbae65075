//! Heuristic complexity classification for inbound work items.
//!
//! The classifier is a pure function from (text, metadata) to a category:
//! no I/O, no clock reads, no randomness. Re-classifying the same item on a
//! retry always produces the same result, which keeps the gateway idempotent.

mod signals;

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use signals::{ItemMetadata, SignalConfig, SignalHit};

/// Count distinct cross-references (`#123` style) in free-form text.
///
/// Used by the gateway to fill [`ItemMetadata::cross_references`] when the
/// tracker does not supply the count itself.
pub fn count_cross_references(text: &str) -> u32 {
    static CROSS_REF: OnceLock<Regex> = OnceLock::new();
    let re = CROSS_REF.get_or_init(|| Regex::new(r"#(\d+)").unwrap());
    let distinct: HashSet<&str> = re
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    distinct.len() as u32
}

/// Count distinct file-path-looking tokens (`src/parser.rs`, `Cargo.toml`)
/// in free-form text.
///
/// Used by the gateway to fill [`ItemMetadata::referenced_files`] when the
/// tracker does not supply the count itself. The extension must be
/// alphabetic and 2-4 characters, which keeps abbreviations like `e.g` and
/// bare version numbers out of the count.
pub fn count_file_references(text: &str) -> u32 {
    static FILE_REF: OnceLock<Regex> = OnceLock::new();
    let re = FILE_REF.get_or_init(|| Regex::new(r"[\w/.-]*\w\.[A-Za-z]{2,4}\b").unwrap());
    let distinct: HashSet<&str> = re.find_iter(text).map(|m| m.as_str()).collect();
    distinct.len() as u32
}

/// Complexity category of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Well-understood, low-risk work.
    Simple,
    /// Ambiguous or under-specified work.
    Uncertain,
    /// High-risk or cross-cutting work.
    Complex,
}

impl Category {
    /// Stable label used in rationale text.
    pub fn as_label(&self) -> &'static str {
        match self {
            Category::Simple => "simple",
            Category::Uncertain => "uncertain",
            Category::Complex => "complex",
        }
    }
}

/// The full classification result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// The resulting category.
    pub category: Category,
    /// Total score across all signals.
    pub score: u32,
    /// The signals that contributed, in evaluation order.
    pub signals: Vec<SignalHit>,
}

/// Category thresholds and signal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Scores at or below this are Simple.
    pub simple_max: u32,
    /// Scores at or below this (and above `simple_max`) are Uncertain.
    pub uncertain_max: u32,
    /// Signal weights and keyword lists.
    pub signals: SignalConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            simple_max: 10,
            uncertain_max: 25,
            signals: SignalConfig::default(),
        }
    }
}

/// Deterministic, side-effect-free complexity scorer.
#[derive(Debug, Clone)]
pub struct ComplexityClassifier {
    config: ClassifierConfig,
}

impl ComplexityClassifier {
    /// Create a classifier with the given configuration.
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Score a work item's text and metadata.
    ///
    /// Never fails: absent or empty text yields the configured floor score
    /// and category Uncertain, because missing information must not be read
    /// as evidenced simplicity.
    pub fn classify(&self, text: &str, meta: &ItemMetadata) -> Classification {
        if text.trim().is_empty() {
            let floor = self.config.signals.empty_body_floor.max(1);
            return Classification {
                category: Category::Uncertain,
                score: floor,
                signals: vec![SignalHit {
                    name: "empty_body".to_string(),
                    observed: 0,
                    contribution: floor,
                }],
            };
        }

        let signals = signals::evaluate(&self.config.signals, text, meta);
        let score: u32 = signals.iter().map(|s| s.contribution).sum();
        let category = if score <= self.config.simple_max {
            Category::Simple
        } else if score <= self.config.uncertain_max {
            Category::Uncertain
        } else {
            Category::Complex
        };

        Classification {
            category,
            score,
            signals,
        }
    }
}

impl Default for ComplexityClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
