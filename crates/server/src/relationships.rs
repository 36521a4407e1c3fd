use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use medidoc_core::{ActorId, MappingKind};
use medidoc_vault::{RelationshipError, RelationshipResolver, StaticRelationships};

use crate::config::RelationshipsConfig;
use crate::error::ServerError;

/// Asks a remote relationship service whether a mapping exists.
///
/// Issues `GET {base}/v1/relationships/{kind}/{actor_id}/{patient_id}` and
/// expects `{"mapped": bool}`. A `404` means "not mapped"; `5xx` and
/// transport failures are reported as unavailable.
pub struct HttpRelationshipResolver {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct MappingResponse {
    mapped: bool,
}

impl HttpRelationshipResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelationshipError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelationshipError::Unavailable(e.to_string()))?;
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| RelationshipError::Rejected(format!("invalid url: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn lookup_url(
        &self,
        kind: MappingKind,
        actor_id: &ActorId,
        patient_id: &ActorId,
    ) -> Result<Url, RelationshipError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RelationshipError::Rejected("base url cannot hold a path".into()))?
            .pop_if_empty()
            .extend([
                "v1",
                "relationships",
                &kind.to_string(),
                actor_id.as_str(),
                patient_id.as_str(),
            ]);
        Ok(url)
    }
}

#[async_trait]
impl RelationshipResolver for HttpRelationshipResolver {
    async fn is_mapped(
        &self,
        kind: MappingKind,
        actor_id: &ActorId,
        patient_id: &ActorId,
    ) -> Result<bool, RelationshipError> {
        let url = self.lookup_url(kind, actor_id, patient_id)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelationshipError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if status.is_server_error() {
            return Err(RelationshipError::Unavailable(format!(
                "relationship service returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(RelationshipError::Rejected(format!(
                "relationship service returned {status}"
            )));
        }

        let body: MappingResponse = response
            .json()
            .await
            .map_err(|e| RelationshipError::Rejected(e.to_string()))?;
        Ok(body.mapped)
    }
}

/// Construct the relationship resolver named by configuration.
pub fn create_resolver(
    config: &RelationshipsConfig,
) -> Result<Arc<dyn RelationshipResolver>, ServerError> {
    match config.backend.as_str() {
        "static" => {
            let mut mappings = StaticRelationships::new();
            for m in &config.mappings {
                mappings.insert(m.kind, m.actor_id.as_str(), m.patient_id.as_str());
            }
            tracing::info!(mappings = mappings.len(), "static relationships loaded");
            Ok(Arc::new(mappings))
        }
        "http" => {
            let url = config.url.as_deref().ok_or_else(|| {
                ServerError::Config("http relationships backend requires 'url'".into())
            })?;
            let resolver =
                HttpRelationshipResolver::new(url, Duration::from_millis(config.timeout_ms))
                    .map_err(|e| ServerError::Config(format!("relationships: {e}")))?;
            tracing::info!(url, "http relationship resolver configured");
            Ok(Arc::new(resolver))
        }
        other => Err(ServerError::Config(format!(
            "unsupported relationships backend: {other}"
        ))),
    }
}
