//! Lease-based advisory locking for work items.
//!
//! Prevents two execution slots (or two scheduler processes sharing the
//! guard) from driving the same work item at once. Leases expire on their
//! own after the TTL, so a crashed holder cannot block an item forever.
//! Try-semantics only: acquisition never blocks or queues.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One active lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// The locked work item.
    pub work_item_id: String,
    /// Identity of the holder (slot or scheduler instance).
    pub holder: String,
    /// When the lease was acquired or last extended.
    pub acquired_at: DateTime<Utc>,
    /// When the lease expires if not renewed.
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Advisory lease guard.
///
/// Invariant: at most one non-expired [`LockRecord`] per work item id.
/// Re-acquisition by the current holder extends the lease.
#[derive(Debug, Default)]
pub struct LeaseGuard {
    leases: Mutex<HashMap<String, LockRecord>>,
}

impl LeaseGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim `work_item_id` for `holder` for `ttl`.
    ///
    /// Returns `true` on success (including re-entrant extension by the same
    /// holder) and `false` when a different holder owns a non-expired lease.
    /// Never blocks.
    pub fn try_acquire(&self, work_item_id: &str, holder: &str, ttl: Duration) -> bool {
        let now = Utc::now();
        let mut leases = self.lock();
        match leases.get(work_item_id) {
            Some(existing) if !existing.expired(now) && existing.holder != holder => {
                debug!(
                    work_item = work_item_id,
                    holder,
                    current_holder = %existing.holder,
                    "lease contention"
                );
                false
            }
            _ => {
                let expires_at = chrono::Duration::from_std(ttl)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                leases.insert(
                    work_item_id.to_string(),
                    LockRecord {
                        work_item_id: work_item_id.to_string(),
                        holder: holder.to_string(),
                        acquired_at: now,
                        expires_at,
                    },
                );
                true
            }
        }
    }

    /// Release the lease on `work_item_id` if `holder` owns it.
    ///
    /// Releasing a lease held by someone else, or not held at all, is a
    /// no-op: the release may race with expiry-based reclamation.
    pub fn release(&self, work_item_id: &str, holder: &str) {
        let mut leases = self.lock();
        if let Some(existing) = leases.get(work_item_id) {
            if existing.holder == holder {
                leases.remove(work_item_id);
            }
        }
    }

    /// The current non-expired lease on `work_item_id`, if any.
    pub fn current(&self, work_item_id: &str) -> Option<LockRecord> {
        let now = Utc::now();
        self.lock()
            .get(work_item_id)
            .filter(|l| !l.expired(now))
            .cloned()
    }

    /// Drop expired leases. Callers may run this periodically; correctness
    /// does not depend on it since expiry is checked on acquisition.
    pub fn sweep(&self) {
        let now = Utc::now();
        self.lock().retain(|_, lease| !lease.expired(now));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, LockRecord>> {
        self.leases.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_then_contend() {
        let guard = LeaseGuard::new();
        assert!(guard.try_acquire("WI-1", "slot-a", Duration::from_secs(60)));
        assert!(!guard.try_acquire("WI-1", "slot-b", Duration::from_secs(60)));
        // Unrelated items are not serialized.
        assert!(guard.try_acquire("WI-2", "slot-b", Duration::from_secs(60)));
    }

    #[test]
    fn test_reentrant_acquire_extends_lease() {
        let guard = LeaseGuard::new();
        assert!(guard.try_acquire("WI-1", "slot-a", Duration::from_millis(10)));
        let first = guard.current("WI-1").unwrap();
        assert!(guard.try_acquire("WI-1", "slot-a", Duration::from_secs(60)));
        let second = guard.current("WI-1").unwrap();
        assert!(second.expires_at > first.expires_at);
    }

    #[test]
    fn test_expired_lease_is_reclaimable() {
        let guard = LeaseGuard::new();
        assert!(guard.try_acquire("WI-1", "slot-a", Duration::ZERO));
        // TTL of zero expires immediately.
        assert!(guard.try_acquire("WI-1", "slot-b", Duration::from_secs(60)));
        assert_eq!(guard.current("WI-1").unwrap().holder, "slot-b");
    }

    #[test]
    fn test_release_only_by_holder() {
        let guard = LeaseGuard::new();
        assert!(guard.try_acquire("WI-1", "slot-a", Duration::from_secs(60)));
        guard.release("WI-1", "slot-b");
        assert!(guard.current("WI-1").is_some());
        guard.release("WI-1", "slot-a");
        assert!(guard.current("WI-1").is_none());
    }

    #[test]
    fn test_sweep_drops_expired_only() {
        let guard = LeaseGuard::new();
        assert!(guard.try_acquire("WI-1", "slot-a", Duration::ZERO));
        assert!(guard.try_acquire("WI-2", "slot-a", Duration::from_secs(60)));
        guard.sweep();
        assert!(guard.current("WI-1").is_none());
        assert!(guard.current("WI-2").is_some());
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        use std::sync::Arc;

        let guard = Arc::new(LeaseGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || {
                    guard.try_acquire("WI-1", &format!("slot-{i}"), Duration::from_secs(60))
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
