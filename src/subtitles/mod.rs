pub mod debounce;
pub mod providers;
pub mod resolver;

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::SubtitleCache;
use crate::error::ProviderError;
use crate::media::{CachedSubtitleFile, SubtitleCandidate, SubtitleQuery};
use crate::settings::Settings;

pub use debounce::Debouncer;
pub use resolver::{ResolveOutcome, SubtitleResolver};

/// Upper bound on candidates considered from one provider.
pub const MAX_CANDIDATES: usize = 20;

#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    fn name(&self) -> &str;

    /// True when the provider has what it needs to run (URL, API key).
    fn is_enabled(&self) -> bool;

    /// Whether `search` already restricts results to the query language.
    /// When false the resolver post-filters.
    fn filters_language(&self) -> bool {
        false
    }

    /// Candidates for the query, best first. No matches is `Ok(vec![])`.
    async fn search(&self, query: &SubtitleQuery) -> Result<Vec<SubtitleCandidate>, ProviderError>;

    /// Fetch a candidate into the cache root.
    async fn download(
        &self,
        candidate: &SubtitleCandidate,
    ) -> Result<CachedSubtitleFile, ProviderError>;
}

/// Sources with no backend yet; listed so the provider set stays uniform.
const STUB_PROVIDERS: &[&str] = &["subdl", "podnapisi"];

/// Builds the per-session resolver: configured addons in order, then the REST
/// API, then the stubs.
pub fn create_default_resolver(
    settings: &Settings,
    cache: Arc<SubtitleCache>,
) -> SubtitleResolver {
    let mut resolver = SubtitleResolver::with_debounce_window(settings.debounce_window());
    resolver.set_max_candidates(settings.max_candidates);

    for base_url in &settings.addon_urls {
        resolver.add_provider(providers::AddonCatalogProvider::with_client_options(
            base_url,
            cache.clone(),
            &settings.user_agent,
            settings.request_timeout(),
        ));
    }
    resolver.add_provider(providers::RestApiProvider::with_options(
        &settings.rest_api_base,
        settings.rest_api_key.clone(),
        cache,
        &settings.user_agent,
        settings.request_timeout(),
    ));
    for name in STUB_PROVIDERS {
        resolver.add_provider(providers::DisabledProvider::new(*name));
    }
    resolver
}
