use std::sync::Arc;
use std::time::Duration as StdDuration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use medidoc_core::{AccessContext, Clock, Document, DocumentId, DownloadToken, IssuedToken};
use medidoc_state::{CasResult, KeyKind, StateKey, StateStore};

use crate::error::VaultError;
use crate::policy;

/// Random bytes per token value (256 bits).
const TOKEN_BYTES: usize = 32;

/// Attempts at finding an unused token value before giving up.
const MAX_ISSUE_ATTEMPTS: u32 = 3;

/// Settings for issuing and retaining download tokens.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Lifetime used when the caller does not ask for one.
    pub default_ttl: Duration,
    /// Longest lifetime a caller may request.
    pub max_ttl: Duration,
    /// How long a dead token record is kept before the reaper removes it.
    pub retention: Duration,
    /// Public base URL that download links are built from.
    pub base_url: String,
    /// Re-reads performed when a redemption write fails with an error.
    pub confirm_attempts: u32,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::seconds(300),
            max_ttl: Duration::seconds(3600),
            retention: Duration::seconds(3600),
            base_url: "http://localhost:8080".into(),
            confirm_attempts: 3,
        }
    }
}

/// Hex SHA-256 of a token value. Records are stored and indexed under this.
pub fn token_digest(token_value: &str) -> String {
    hex::encode(Sha256::digest(token_value.as_bytes()))
}

/// Short digest prefix used to correlate log lines without exposing values.
pub fn token_fingerprint(token_value: &str) -> String {
    let mut digest = token_digest(token_value);
    digest.truncate(12);
    digest
}

fn generate_token_value() -> Result<String, VaultError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| VaultError::StorageUnavailable(format!("random source failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn token_key(digest: &str) -> StateKey {
    StateKey::new(KeyKind::DownloadToken, digest)
}

fn document_index_key(document_id: &DocumentId, digest: &str) -> StateKey {
    StateKey::compound(
        KeyKind::TokenDocumentIndex,
        &[document_id.as_str(), digest],
    )
}

/// Issues, stores and atomically redeems single-use download tokens.
pub struct TokenManager {
    state: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    settings: TokenSettings,
}

impl TokenManager {
    pub fn new(state: Arc<dyn StateStore>, clock: Arc<dyn Clock>, settings: TokenSettings) -> Self {
        Self {
            state,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    fn resolve_ttl(&self, ttl: Option<Duration>) -> Result<Duration, VaultError> {
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        if ttl <= Duration::zero() {
            return Err(VaultError::Validation("ttl must be positive".into()));
        }
        if ttl > self.settings.max_ttl {
            return Err(VaultError::Validation(format!(
                "ttl of {}s exceeds the maximum of {}s",
                ttl.num_seconds(),
                self.settings.max_ttl.num_seconds()
            )));
        }
        Ok(ttl)
    }

    /// Build the public download URL for a token value.
    pub fn download_url(&self, token_value: &str) -> String {
        format!(
            "{}/v1/download/{token_value}",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    /// Mint a token for `document` on behalf of `ctx`.
    ///
    /// `ctx` must already carry the relationship facts for the document.
    pub async fn issue(
        &self,
        ctx: &AccessContext,
        document: &Document,
        ttl: Option<Duration>,
    ) -> Result<IssuedToken, VaultError> {
        if !policy::can_read(ctx, document) {
            return Err(VaultError::Forbidden);
        }
        let ttl = self.resolve_ttl(ttl)?;

        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token_value = generate_token_value()?;
            let digest = token_digest(&token_value);
            let issued_at = self.clock.now();
            let record = DownloadToken {
                token_digest: digest.clone(),
                document_id: document.id.clone(),
                issued_to_actor_id: ctx.actor_id.clone(),
                issued_at,
                expires_at: issued_at + ttl,
                redeemed: false,
                redemption_id: None,
                redeemed_at: None,
            };

            // Cleanup bookkeeping goes first so that a record can never exist
            // without the reaper knowing about it.
            let key = token_key(&digest);
            let reap_at = record.expires_at + self.settings.retention;
            self.state
                .index_expiry(&key, reap_at.timestamp_millis())
                .await?;
            self.state
                .check_and_set(&document_index_key(&document.id, &digest), &digest)
                .await?;

            let raw = serde_json::to_string(&record)?;
            if self.state.check_and_set(&key, &raw).await? {
                info!(
                    document.id = %document.id,
                    actor.id = %ctx.actor_id,
                    token = %record.fingerprint(),
                    expires_at = %record.expires_at,
                    "download token issued"
                );
                return Ok(IssuedToken {
                    download_url: self.download_url(&token_value),
                    token_value,
                    record,
                });
            }
            warn!(token = %record.fingerprint(), "token digest collision, regenerating");
        }

        Err(VaultError::StorageUnavailable(
            "could not allocate a unique download token".into(),
        ))
    }

    /// Redeem a token exactly once.
    ///
    /// Exactly one of any number of concurrent callers for the same value
    /// succeeds; the rest see [`VaultError::AlreadyUsed`]. The access policy
    /// is not consulted again.
    pub async fn redeem(&self, token_value: &str) -> Result<DownloadToken, VaultError> {
        let digest = token_digest(token_value);
        let key = token_key(&digest);

        loop {
            let Some(current) = self.state.get_versioned(&key).await? else {
                return Err(VaultError::NotFound("download token".into()));
            };
            let token: DownloadToken = serde_json::from_str(&current.value)?;
            let now = self.clock.now();

            if token.is_expired_at(now) {
                return Err(VaultError::Expired);
            }
            if token.redeemed {
                return Err(VaultError::AlreadyUsed);
            }

            let redemption_id = uuid::Uuid::new_v4().to_string();
            let redeemed = DownloadToken {
                redeemed: true,
                redemption_id: Some(redemption_id.clone()),
                redeemed_at: Some(now),
                ..token
            };
            let raw = serde_json::to_string(&redeemed)?;

            match self.state.compare_and_swap(&key, current.version, &raw).await {
                Ok(CasResult::Ok) => {
                    debug!(token = %redeemed.fingerprint(), "download token redeemed");
                    return Ok(redeemed);
                }
                Ok(CasResult::Conflict {
                    current_value: Some(value),
                    ..
                }) => {
                    let winner: DownloadToken = serde_json::from_str(&value)?;
                    if winner.redeemed {
                        return Err(VaultError::AlreadyUsed);
                    }
                    // Record changed without being redeemed; read it again.
                }
                Ok(CasResult::Conflict {
                    current_value: None,
                    ..
                }) => return Err(VaultError::NotFound("download token".into())),
                Err(e) => {
                    warn!(token = %redeemed.fingerprint(), error = %e, "redemption write failed, confirming");
                    return self.confirm_redemption(&key, &redemption_id).await;
                }
            }
        }
    }

    /// After a failed write, find out whether our redemption landed.
    ///
    /// The write is never retried: it may have been applied, and a second
    /// attempt could serve the document twice.
    async fn confirm_redemption(
        &self,
        key: &StateKey,
        redemption_id: &str,
    ) -> Result<DownloadToken, VaultError> {
        let mut last_error = None;
        for attempt in 0..self.settings.confirm_attempts {
            if attempt > 0 {
                tokio::time::sleep(StdDuration::from_millis(50 * u64::from(attempt))).await;
            }
            match self.state.get(key).await {
                Ok(Some(raw)) => {
                    let token: DownloadToken = serde_json::from_str(&raw)?;
                    return match token.redemption_id.as_deref() {
                        Some(id) if id == redemption_id => Ok(token),
                        Some(_) => Err(VaultError::AlreadyUsed),
                        None => Err(VaultError::StorageUnavailable(
                            "redemption was not recorded".into(),
                        )),
                    };
                }
                Ok(None) => return Err(VaultError::NotFound("download token".into())),
                Err(e) => last_error = Some(e),
            }
        }
        Err(VaultError::StorageUnavailable(last_error.map_or_else(
            || "redemption outcome unknown".into(),
            |e| e.to_string(),
        )))
    }

    /// Token records issued for a document, newest first.
    pub async fn tokens_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<DownloadToken>, VaultError> {
        let prefix = StateKey::compound_prefix(&[document_id.as_str()]);
        let entries = self
            .state
            .scan_keys(KeyKind::TokenDocumentIndex, Some(&prefix))
            .await?;

        let mut tokens = Vec::with_capacity(entries.len());
        for (_, digest) in entries {
            if let Some(raw) = self.state.get(&token_key(&digest)).await? {
                tokens.push(serde_json::from_str::<DownloadToken>(&raw)?);
            }
        }
        tokens.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(tokens)
    }

    /// Delete token records whose retention window ended at or before `now`.
    /// Returns the number of records removed.
    pub async fn reap(&self, now: DateTime<Utc>) -> Result<u64, VaultError> {
        let expired = self
            .state
            .get_expired(KeyKind::DownloadToken, now.timestamp_millis())
            .await?;

        let mut removed = 0;
        for key in expired {
            if let Some(raw) = self.state.get(&key).await? {
                let token: DownloadToken = serde_json::from_str(&raw)?;
                self.state
                    .delete(&document_index_key(&token.document_id, &token.token_digest))
                    .await?;
                if self.state.delete(&key).await? {
                    removed += 1;
                }
            }
            self.state.remove_expiry_index(&key).await?;
        }

        if removed > 0 {
            info!(removed, "reaped expired download tokens");
        }
        Ok(removed)
    }
}
