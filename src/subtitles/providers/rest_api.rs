use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::cache::{subtitle_extension, SubtitleCache};
use crate::error::ProviderError;
use crate::media::{normalize_language, CachedSubtitleFile, SubtitleCandidate, SubtitleQuery};
use crate::settings::{DEFAULT_REST_API_BASE, DEFAULT_USER_AGENT};
use crate::subtitles::providers::{build_client, check_status, download_to_cache};
use crate::subtitles::{SubtitleProvider, MAX_CANDIDATES};

const PROVIDER_NAME: &str = "opensubtitles";
const API_KEY_HEADER: &str = "Api-Key";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    attributes: EntryAttributes,
}

#[derive(Debug, Deserialize)]
struct EntryAttributes {
    #[serde(default)]
    language: String,
    #[serde(default)]
    release: String,
    #[serde(default)]
    download_count: u64,
    #[serde(default)]
    files: Vec<EntryFile>,
}

#[derive(Debug, Deserialize)]
struct EntryFile {
    file_id: u64,
    #[serde(default)]
    file_name: String,
}

#[derive(Debug, Serialize)]
struct DownloadRequest {
    file_id: u64,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: String,
    #[serde(default)]
    file_name: String,
    remaining: Option<i64>,
}

/// API-key authenticated search + signed-link download.
pub struct RestApiProvider {
    api_base: String,
    api_key: Option<String>,
    client: reqwest::Client,
    cache: Arc<SubtitleCache>,
    max_results: usize,
}

impl RestApiProvider {
    pub fn new(api_key: Option<String>, cache: Arc<SubtitleCache>) -> Self {
        Self::with_options(
            DEFAULT_REST_API_BASE,
            api_key,
            cache,
            DEFAULT_USER_AGENT,
            Duration::from_secs(15),
        )
    }

    pub fn with_options(
        api_base: &str,
        api_key: Option<String>,
        cache: Arc<SubtitleCache>,
        user_agent: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            client: build_client(user_agent, timeout),
            cache,
            max_results: MAX_CANDIDATES,
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured(format!("{}: no API key", PROVIDER_NAME)))
    }

    fn search_url(&self, query: &SubtitleQuery) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&format!("{}/subtitles", self.api_base))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(id) = &query.external_id {
                pairs.append_pair("imdb_id", id.trim_start_matches("tt"));
            } else {
                pairs.append_pair("query", &query.search_text());
            }
            pairs.append_pair("languages", &query.preferred_language);
            if let Some(ep) = query.episode {
                pairs.append_pair("season_number", &ep.season.to_string());
                pairs.append_pair("episode_number", &ep.episode.to_string());
            }
        }
        Ok(url)
    }

    fn parse_search(&self, body: &str) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        let response: SearchResponse = serde_json::from_str(body)?;
        Ok(response
            .data
            .into_iter()
            .filter_map(|entry| {
                let attributes = entry.attributes;
                let file = attributes.files.into_iter().next()?;
                let label = if attributes.release.is_empty() {
                    file.file_name.clone()
                } else {
                    attributes.release
                };
                Some(SubtitleCandidate {
                    provider_name: PROVIDER_NAME.to_string(),
                    remote_id: file.file_id.to_string(),
                    download_url: format!("{}/download", self.api_base),
                    language: attributes.language,
                    display_label: format!("{} [{} downloads]", label, attributes.download_count),
                })
            })
            .take(self.max_results)
            .collect())
    }
}

#[async_trait]
impl SubtitleProvider for RestApiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn filters_language(&self) -> bool {
        true
    }

    async fn search(&self, query: &SubtitleQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        let api_key = self.api_key()?;
        let url = self.search_url(query)?;

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let body = check_status(response)?.text().await?;
        self.parse_search(&body)
    }

    async fn download(
        &self,
        candidate: &SubtitleCandidate,
    ) -> Result<CachedSubtitleFile, ProviderError> {
        let api_key = self.api_key()?;
        let file_id: u64 = candidate
            .remote_id
            .parse()
            .map_err(|_| ProviderError::Parse(format!("bad file id {}", candidate.remote_id)))?;

        let response = self
            .client
            .post(&candidate.download_url)
            .header(API_KEY_HEADER, api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&DownloadRequest { file_id })
            .send()
            .await?;
        let body = check_status(response)?.text().await?;
        let link: DownloadResponse = serde_json::from_str(&body)?;

        if let Some(remaining) = link.remaining {
            info!("{}: {} downloads remaining today", PROVIDER_NAME, remaining);
        }

        let hint = if link.file_name.is_empty() {
            link.link.as_str()
        } else {
            link.file_name.as_str()
        };
        download_to_cache(
            self.client.get(&link.link),
            &self.cache,
            &normalize_language(&candidate.language),
            subtitle_extension(hint),
            PROVIDER_NAME,
        )
        .await
    }
}
