//! Abstract remote work-tracker collaborator.
//!
//! The core never talks to a network itself; it is handed an implementation
//! of [`WorkTracker`] (GitHub, GitLab, an in-memory fake in tests) and every
//! call to it goes through the resilience layer. Labels and comments on the
//! tracker are the only durable record of decisions and transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workitem::WorkItem;

/// Conflict status of a change request as reported by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Mergeable as-is.
    Clean,
    /// The tracker reports merge conflicts.
    Conflicting,
    /// The tracker has not computed mergeability yet.
    Unknown,
}

/// A conflicting path with the line ranges each side touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEntry {
    /// Path of the conflicting file.
    pub path: String,
    /// Conflicting line count contributed by our side.
    pub ours_lines: u32,
    /// Conflicting line count contributed by their side.
    pub theirs_lines: u32,
}

/// The raw shape of a merge conflict, as fetched from the tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictSet {
    /// Conflicting paths with per-side line counts.
    pub entries: Vec<ConflictEntry>,
    /// When the conflict was first detected.
    pub detected_at: Option<DateTime<Utc>>,
    /// Commits on our branch tip not on the target branch.
    pub ours_ahead: u32,
    /// Commits on the target branch not on ours.
    pub theirs_ahead: u32,
    /// Number of prior failed auto-resolution attempts for this conflict.
    pub failed_auto_resolves: u32,
    /// Ratio (0.0–1.0) of files touched by both change sets.
    pub overlap_ratio: f64,
}

/// An open change request associated with a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Tracker-assigned identifier.
    pub id: String,
    /// The work item this change request implements.
    pub work_item_id: String,
    /// Mergeability as last reported by the tracker.
    pub conflict_status: ConflictStatus,
    /// Conflict details; populated only when `conflict_status` is Conflicting.
    pub conflicts: Option<ConflictSet>,
    /// Whether an external reviewer has approved the change.
    pub approved: bool,
}

/// Fields for filing a fresh work item (used by close-and-recreate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkItem {
    /// Title of the replacement item.
    pub title: String,
    /// Body of the replacement item.
    pub body: String,
    /// Labels to apply at creation.
    pub labels: Vec<String>,
}

/// The remote work-tracker boundary.
///
/// Implementations must treat labels and comments as append-mostly: labels
/// are added or removed individually and comments are only ever appended, so
/// concurrent annotation from the gateway, escalator, and conflict analyzer
/// cannot overwrite each other's audit trail.
#[async_trait]
pub trait WorkTracker: Send + Sync {
    /// Fetch one work item by id.
    async fn fetch_work_item(&self, id: &str) -> Result<WorkItem>;

    /// List work items carrying the given label.
    async fn list_work_items(&self, label: &str) -> Result<Vec<WorkItem>>;

    /// Add a label to a work item.
    async fn add_label(&self, id: &str, label: &str) -> Result<()>;

    /// Remove a label from a work item. Removing an absent label is not an
    /// error.
    async fn remove_label(&self, id: &str, label: &str) -> Result<()>;

    /// Append a comment to a work item.
    async fn add_comment(&self, id: &str, body: &str) -> Result<()>;

    /// List open change requests for a work item, including conflict status.
    async fn list_change_requests(&self, work_item_id: &str) -> Result<Vec<ChangeRequest>>;

    /// Merge a change request.
    async fn merge_change_request(&self, change_request_id: &str) -> Result<()>;

    /// File a fresh work item; returns its id.
    async fn create_work_item(&self, item: NewWorkItem) -> Result<String>;
}
