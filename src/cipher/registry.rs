//! Per-version memo of extracted transform programs.

use crate::cipher::{AnchorConfig, BundleText, TransformPrograms};
use crate::error::SigtubeError;
use crate::platform::bundle::BundleFetcher;
use crate::utils::cache::{new_async_cache, AsyncCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How long extracted programs stay cached
pub const PROGRAM_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const MAX_VERSIONS: u64 = 16;

/// Extracted programs keyed by bundle version.
///
/// Only source text is cached; compiled transforms are rebuilt for every
/// decode pass.
#[derive(Clone)]
pub struct TransformRegistry {
    programs: AsyncCache<String, Arc<TransformPrograms>>,
    anchors: Arc<AnchorConfig>,
}

impl TransformRegistry {
    pub fn new(anchors: AnchorConfig) -> Self {
        Self {
            programs: new_async_cache(PROGRAM_TTL, MAX_VERSIONS),
            anchors: Arc::new(anchors),
        }
    }

    pub fn anchors(&self) -> &AnchorConfig {
        &self.anchors
    }

    pub async fn get(&self, version: &str) -> Option<Arc<TransformPrograms>> {
        self.programs.get(version).await
    }

    pub async fn invalidate(&self, version: &str) {
        self.programs.invalidate(version).await;
    }

    /// Programs for an already fetched bundle, extracting on first sight
    pub async fn programs_for(
        &self,
        bundle: BundleText,
    ) -> Result<Arc<TransformPrograms>, SigtubeError> {
        if let Some(cached) = self.get(bundle.version()).await {
            debug!("transform programs for {} served from cache", bundle.version());
            return Ok(cached);
        }

        let anchors = Arc::clone(&self.anchors);
        let programs = tokio::task::spawn_blocking(move || TransformPrograms::extract(&bundle, &anchors))
            .await
            .map_err(|e| SigtubeError::Generic(format!("transform extraction panicked: {}", e)))?;

        info!("Extracted transforms for player {}", programs.version);
        let programs = Arc::new(programs);
        self.programs
            .insert(programs.version.clone(), Arc::clone(&programs))
            .await;
        Ok(programs)
    }

    /// Programs for the current bundle; the bundle body is only fetched for unseen versions
    pub async fn programs(
        &self,
        fetcher: &BundleFetcher,
    ) -> Result<Arc<TransformPrograms>, SigtubeError> {
        let version = fetcher.fetch_version().await?;
        if let Some(cached) = self.get(&version).await {
            debug!("player {} already extracted", version);
            return Ok(cached);
        }
        let bundle = fetcher.fetch_source(&version).await?;
        self.programs_for(bundle).await
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new(AnchorConfig::default())
    }
}
