pub mod addon;
pub mod disabled;
pub mod rest_api;

pub use addon::AddonCatalogProvider;
pub use disabled::DisabledProvider;
pub use rest_api::RestApiProvider;

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

use crate::cache::SubtitleCache;
use crate::error::ProviderError;
use crate::media::CachedSubtitleFile;

pub(crate) fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Maps HTTP failures onto the provider error taxonomy.
pub(crate) fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Auth {
            status: status.as_u16(),
        }),
        _ => Err(ProviderError::Network(format!(
            "HTTP {} from {}",
            status,
            response.url()
        ))),
    }
}

/// Sends `request` and streams the body into a fresh cache file.
pub(crate) async fn download_to_cache(
    request: RequestBuilder,
    cache: &SubtitleCache,
    language: &str,
    extension: &str,
    provider_name: &str,
) -> Result<CachedSubtitleFile, ProviderError> {
    let mut response = check_status(request.send().await?)?;
    let mut writer = cache.begin(language, extension).await?;
    while let Some(chunk) = response.chunk().await? {
        writer.write_chunk(&chunk).await?;
    }
    Ok(writer.commit(provider_name).await?)
}
