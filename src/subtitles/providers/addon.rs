use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::cache::{subtitle_extension, SubtitleCache};
use crate::error::ProviderError;
use crate::media::{normalize_language, CachedSubtitleFile, SubtitleCandidate, SubtitleQuery};
use crate::settings::DEFAULT_USER_AGENT;
use crate::subtitles::providers::{build_client, check_status, download_to_cache};
use crate::subtitles::SubtitleProvider;

const SUBTITLES_RESOURCE: &str = "subtitles";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    resources: Vec<ManifestResource>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestResource {
    Name(String),
    Detailed { name: String },
}

impl ManifestResource {
    fn name(&self) -> &str {
        match self {
            ManifestResource::Name(name) => name,
            ManifestResource::Detailed { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubtitlesResponse {
    #[serde(default)]
    subtitles: Vec<AddonSubtitle>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AddonId {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct AddonSubtitle {
    id: Option<AddonId>,
    url: String,
    #[serde(default)]
    lang: String,
    label: Option<String>,
}

/// Client for one manifest-based subtitle addon. Configure several instances
/// to query several addons in order.
pub struct AddonCatalogProvider {
    name: String,
    base: Option<Url>,
    client: reqwest::Client,
    cache: Arc<SubtitleCache>,
    supports_subtitles: OnceCell<bool>,
}

impl AddonCatalogProvider {
    pub fn new(base_url: &str, cache: Arc<SubtitleCache>) -> Self {
        Self::with_client_options(base_url, cache, DEFAULT_USER_AGENT, Duration::from_secs(15))
    }

    pub fn with_client_options(
        base_url: &str,
        cache: Arc<SubtitleCache>,
        user_agent: &str,
        timeout: Duration,
    ) -> Self {
        let base = Self::normalize_base(base_url);
        let name = match base.as_ref().and_then(|u| u.host_str().map(String::from)) {
            Some(host) => format!("addon:{}", host),
            None => String::from("addon"),
        };

        Self {
            name,
            base,
            client: build_client(user_agent, timeout),
            cache,
            supports_subtitles: OnceCell::new(),
        }
    }

    /// Accepts either the addon root or its `manifest.json` URL.
    fn normalize_base(base_url: &str) -> Option<Url> {
        let trimmed = base_url.trim();
        let trimmed = trimmed.strip_suffix("/manifest.json").unwrap_or(trimmed);
        let trimmed = trimmed.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        Url::parse(trimmed)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self
            .base
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured(self.name.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::NotConfigured(format!("{}: unusable base URL", self.name)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn supports_subtitles(&self) -> Result<bool, ProviderError> {
        self.supports_subtitles
            .get_or_try_init(|| async {
                let url = self.endpoint(&["manifest.json"])?;
                let body = check_status(self.client.get(url).send().await?)?
                    .text()
                    .await?;
                let manifest: Manifest = serde_json::from_str(&body)?;
                let supported = manifest
                    .resources
                    .iter()
                    .any(|r| r.name() == SUBTITLES_RESOURCE);
                debug!("{}: manifest subtitles support = {}", self.name, supported);
                Ok::<bool, ProviderError>(supported)
            })
            .await
            .copied()
    }

    /// `(type, id)` path components for the query.
    fn catalog_target(query: &SubtitleQuery) -> (&'static str, String) {
        match (&query.external_id, query.episode) {
            (Some(id), Some(ep)) => ("series", format!("{}:{}:{}", id, ep.season, ep.episode)),
            (Some(id), None) => ("movie", id.clone()),
            (None, Some(_)) => ("series", query.search_text()),
            (None, None) => ("movie", query.search_text()),
        }
    }

    fn parse_subtitles(&self, body: &str) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        let response: SubtitlesResponse = serde_json::from_str(body)?;
        Ok(response
            .subtitles
            .into_iter()
            .filter(|s| !s.url.trim().is_empty())
            .map(|s| {
                let remote_id = match s.id {
                    Some(AddonId::Text(id)) => id,
                    Some(AddonId::Number(id)) => id.to_string(),
                    None => s.url.clone(),
                };
                let display_label = s
                    .label
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| format!("{} ({})", s.lang, self.name));
                SubtitleCandidate {
                    provider_name: self.name.clone(),
                    remote_id,
                    download_url: s.url,
                    language: s.lang,
                    display_label,
                }
            })
            .collect())
    }
}

#[async_trait]
impl SubtitleProvider for AddonCatalogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.base.is_some() && self.supports_subtitles.get() != Some(&false)
    }

    async fn search(&self, query: &SubtitleQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        if !self.supports_subtitles().await? {
            return Err(ProviderError::NotConfigured(format!(
                "{}: manifest does not offer subtitles",
                self.name
            )));
        }

        let (kind, id) = Self::catalog_target(query);
        let file = format!("{}.json", id);
        let url = self.endpoint(&[SUBTITLES_RESOURCE, kind, &file])?;

        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = check_status(response)?.text().await?;
        self.parse_subtitles(&body)
    }

    async fn download(
        &self,
        candidate: &SubtitleCandidate,
    ) -> Result<CachedSubtitleFile, ProviderError> {
        let url = Url::parse(&candidate.download_url)
            .map_err(|e| ProviderError::Parse(format!("bad subtitle URL: {}", e)))?;
        download_to_cache(
            self.client.get(url),
            &self.cache,
            &normalize_language(&candidate.language),
            subtitle_extension(&candidate.download_url),
            &self.name,
        )
        .await
    }
}
