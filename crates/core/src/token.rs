use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActorId, DocumentId};

/// Persisted record of a single-use download token.
///
/// The token value itself is never stored; records are keyed by the SHA-256
/// digest of the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadToken {
    /// Hex-encoded SHA-256 digest of the token value.
    pub token_digest: String,
    pub document_id: DocumentId,
    /// Actor the token was minted for. Kept for audit only.
    pub issued_to_actor_id: ActorId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub redeemed: bool,
    /// Identifier written by the winning redemption attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redemption_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl DownloadToken {
    /// A token is expired strictly after `expires_at`; the boundary instant
    /// itself is still valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// A token can be redeemed if it is neither used nor expired.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        !self.redeemed && !self.is_expired_at(now)
    }

    /// Short digest prefix safe to include in logs.
    pub fn fingerprint(&self) -> &str {
        let end = self.token_digest.len().min(12);
        &self.token_digest[..end]
    }
}

/// A freshly issued token, holding the only copy of the secret value.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token_value: String,
    pub download_url: String,
    pub record: DownloadToken,
}

impl IssuedToken {
    /// Remaining lifetime at issue time, in whole seconds.
    pub fn ttl_seconds(&self) -> i64 {
        (self.record.expires_at - self.record.issued_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn token(expires_in: Duration) -> DownloadToken {
        let now = Utc::now();
        DownloadToken {
            token_digest: "ab".repeat(32),
            document_id: DocumentId::new("d-1"),
            issued_to_actor_id: ActorId::new("a-1"),
            issued_at: now,
            expires_at: now + expires_in,
            redeemed: false,
            redemption_id: None,
            redeemed_at: None,
        }
    }

    #[test]
    fn expiry_is_exclusive() {
        let t = token(Duration::seconds(60));
        assert!(!t.is_expired_at(t.expires_at));
        assert!(t.is_expired_at(t.expires_at + Duration::milliseconds(1)));
        assert!(t.is_redeemable_at(t.expires_at));
    }

    #[test]
    fn redeemed_token_is_not_redeemable() {
        let mut t = token(Duration::seconds(60));
        t.redeemed = true;
        assert!(!t.is_redeemable_at(t.issued_at));
    }

    #[test]
    fn fingerprint_is_a_prefix() {
        let t = token(Duration::seconds(1));
        assert_eq!(t.fingerprint().len(), 12);
        assert!(t.token_digest.starts_with(t.fingerprint()));
    }
}
