use async_trait::async_trait;

use crate::error::ProviderError;
use crate::media::{CachedSubtitleFile, SubtitleCandidate, SubtitleQuery};
use crate::subtitles::SubtitleProvider;

/// Placeholder for a source that has no working backend yet. Never enabled.
#[derive(Debug, Clone)]
pub struct DisabledProvider {
    name: String,
}

impl DisabledProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl SubtitleProvider for DisabledProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn search(&self, _query: &SubtitleQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        Err(ProviderError::NotConfigured(self.name.clone()))
    }

    async fn download(
        &self,
        _candidate: &SubtitleCandidate,
    ) -> Result<CachedSubtitleFile, ProviderError> {
        Err(ProviderError::NotConfigured(self.name.clone()))
    }
}
