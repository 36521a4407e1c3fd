use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking vault outcomes.
///
/// All counters use relaxed ordering. For a consistent point-in-time view,
/// call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct VaultMetrics {
    /// Documents successfully uploaded.
    pub uploads: AtomicU64,
    /// Authenticated downloads that returned bytes.
    pub downloads: AtomicU64,
    /// Download tokens issued.
    pub tokens_issued: AtomicU64,
    /// Download tokens successfully redeemed.
    pub tokens_redeemed: AtomicU64,
    /// Redemptions rejected as expired, used or unknown.
    pub redemptions_rejected: AtomicU64,
    /// Requests denied by the access policy.
    pub access_denied: AtomicU64,
    /// Expired token records removed by the reaper.
    pub tokens_reaped: AtomicU64,
}

impl VaultMetrics {
    pub fn increment_uploads(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_downloads(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_tokens_issued(&self) {
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_tokens_redeemed(&self) {
        self.tokens_redeemed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_redemptions_rejected(&self) {
        self.redemptions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_access_denied(&self) {
        self.access_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tokens_reaped(&self, n: u64) {
        self.tokens_reaped.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads: self.uploads.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            tokens_issued: self.tokens_issued.load(Ordering::Relaxed),
            tokens_redeemed: self.tokens_redeemed.load(Ordering::Relaxed),
            redemptions_rejected: self.redemptions_rejected.load(Ordering::Relaxed),
            access_denied: self.access_denied.load(Ordering::Relaxed),
            tokens_reaped: self.tokens_reaped.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`VaultMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads: u64,
    pub downloads: u64,
    pub tokens_issued: u64,
    pub tokens_redeemed: u64,
    pub redemptions_rejected: u64,
    pub access_denied: u64,
    pub tokens_reaped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let snap = VaultMetrics::default().snapshot();
        assert_eq!(
            snap,
            MetricsSnapshot {
                uploads: 0,
                downloads: 0,
                tokens_issued: 0,
                tokens_redeemed: 0,
                redemptions_rejected: 0,
                access_denied: 0,
                tokens_reaped: 0,
            }
        );
    }

    #[test]
    fn increments_are_reflected_in_snapshot() {
        let m = VaultMetrics::default();
        m.increment_uploads();
        m.increment_uploads();
        m.increment_tokens_redeemed();
        m.increment_redemptions_rejected();
        m.add_tokens_reaped(3);
        let snap = m.snapshot();
        assert_eq!(snap.uploads, 2);
        assert_eq!(snap.tokens_redeemed, 1);
        assert_eq!(snap.redemptions_rejected, 1);
        assert_eq!(snap.tokens_reaped, 3);
        assert_eq!(snap.downloads, 0);
    }
}
