use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ProviderError, ProviderErrorKind};
use crate::media::{languages_match, CachedSubtitleFile, SubtitleCandidate, SubtitleQuery};
use crate::subtitles::{Debouncer, SubtitleProvider, MAX_CANDIDATES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Found(CachedSubtitleFile),
    /// Every enabled provider was tried and none produced a file.
    NotFound,
    /// Dropped because another resolution started inside the debounce window.
    Debounced,
    Cancelled,
}

impl ResolveOutcome {
    pub fn file(&self) -> Option<&CachedSubtitleFile> {
        match self {
            ResolveOutcome::Found(file) => Some(file),
            _ => None,
        }
    }

    pub fn into_file(self) -> Option<CachedSubtitleFile> {
        match self {
            ResolveOutcome::Found(file) => Some(file),
            _ => None,
        }
    }
}

/// Per-session orchestrator: tries providers in order and returns the first
/// subtitle that downloads successfully.
pub struct SubtitleResolver {
    providers: Vec<Box<dyn SubtitleProvider>>,
    debouncer: Debouncer,
    max_candidates: usize,
    auth_disabled: Mutex<HashSet<usize>>,
}

impl SubtitleResolver {
    pub fn new() -> Self {
        Self::with_debounce_window(super::debounce::DEFAULT_DEBOUNCE_WINDOW)
    }

    pub fn with_debounce_window(window: Duration) -> Self {
        Self {
            providers: Vec::new(),
            debouncer: Debouncer::new(window),
            max_candidates: MAX_CANDIDATES,
            auth_disabled: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_max_candidates(&mut self, max: usize) {
        self.max_candidates = max.max(1);
    }

    /// Providers are consulted in the order they are added.
    pub fn add_provider<P: SubtitleProvider + 'static>(&mut self, provider: P) {
        self.providers.push(Box::new(provider));
    }

    pub fn add_boxed_provider(&mut self, provider: Box<dyn SubtitleProvider>) {
        self.providers.push(provider);
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn enabled_provider_names(&self) -> Vec<&str> {
        self.providers
            .iter()
            .enumerate()
            .filter(|(index, p)| p.is_enabled() && !self.is_auth_disabled(*index))
            .map(|(_, p)| p.name())
            .collect()
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Forgets the debounce timestamp and auth-disabled providers so the next
    /// playback starts clean.
    pub fn reset_session(&self) {
        self.debouncer.reset();
        self.auth_disabled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub async fn resolve(&self, query: &SubtitleQuery) -> ResolveOutcome {
        if !self.debouncer.try_accept() {
            debug!(
                "Subtitle search for {} debounced (window {:?})",
                query.video_filename,
                self.debouncer.window()
            );
            return ResolveOutcome::Debounced;
        }

        for (index, provider) in self.providers.iter().enumerate() {
            if !provider.is_enabled() || self.is_auth_disabled(index) {
                continue;
            }
            if let Some(file) = self.try_provider(index, provider.as_ref(), query).await {
                info!(
                    "Subtitle for {} found via {}: {}",
                    query.video_filename,
                    provider.name(),
                    file.absolute_path.display()
                );
                return ResolveOutcome::Found(file);
            }
        }

        info!(
            "No {} subtitle found for {}",
            query.preferred_language, query.video_filename
        );
        ResolveOutcome::NotFound
    }

    /// Like [`resolve`](Self::resolve), but stops as soon as `token` fires.
    /// A download interrupted this way leaves no file behind.
    pub async fn resolve_cancellable(
        &self,
        query: &SubtitleQuery,
        token: &CancellationToken,
    ) -> ResolveOutcome {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Subtitle search for {} cancelled", query.video_filename);
                ResolveOutcome::Cancelled
            }
            outcome = self.resolve(query) => outcome,
        }
    }

    async fn try_provider(
        &self,
        index: usize,
        provider: &dyn SubtitleProvider,
        query: &SubtitleQuery,
    ) -> Option<CachedSubtitleFile> {
        let raw = match provider.search(query).await {
            Ok(raw) => raw,
            Err(e) => {
                self.note_failure(index, provider, "search", &e);
                return None;
            }
        };

        let candidates = self.prepare_candidates(provider, query, raw);
        let candidate = candidates.into_iter().next()?;
        debug!(
            "{}: downloading {} ({})",
            provider.name(),
            candidate.display_label,
            candidate.remote_id
        );

        match provider.download(&candidate).await {
            Ok(file) => Some(file),
            Err(e) => {
                self.note_failure(index, provider, "download", &e);
                None
            }
        }
    }

    /// Caps the provider's list and drops other languages when the provider
    /// does not filter upstream.
    pub fn prepare_candidates(
        &self,
        provider: &dyn SubtitleProvider,
        query: &SubtitleQuery,
        raw: Vec<SubtitleCandidate>,
    ) -> Vec<SubtitleCandidate> {
        let total = raw.len();
        let post_filter = !provider.filters_language();
        let candidates: Vec<_> = raw
            .into_iter()
            .take(self.max_candidates)
            .filter(|c| !post_filter || languages_match(&c.language, &query.preferred_language))
            .collect();

        debug!(
            "{}: {} of {} results usable for language {}",
            provider.name(),
            candidates.len(),
            total,
            query.preferred_language
        );
        candidates
    }

    fn note_failure(
        &self,
        index: usize,
        provider: &dyn SubtitleProvider,
        stage: &str,
        err: &ProviderError,
    ) {
        match err.kind() {
            ProviderErrorKind::NotConfigured => {
                debug!("{} skipped during {}: {}", provider.name(), stage, err);
            }
            ProviderErrorKind::Auth => {
                error!(
                    "{} rejected credentials during {}: {}; disabled for this session",
                    provider.name(),
                    stage,
                    err
                );
                self.auth_disabled
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(index);
            }
            ProviderErrorKind::Transient
            | ProviderErrorKind::Parse
            | ProviderErrorKind::CacheWrite => {
                warn!("{} {} failed: {}", provider.name(), stage, err);
            }
        }
    }

    fn is_auth_disabled(&self, index: usize) -> bool {
        self.auth_disabled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&index)
    }
}

impl Default for SubtitleResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubtitleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtitleResolver")
            .field("providers", &self.provider_names())
            .field("debouncer", &self.debouncer)
            .field("max_candidates", &self.max_candidates)
            .finish()
    }
}
