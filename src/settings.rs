use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::SubtitleCache;
use crate::error::SettingsError;

pub const DEFAULT_REST_API_BASE: &str = "https://api.opensubtitles.com/api/v1";
pub const DEFAULT_USER_AGENT: &str = "subflow v0.2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub preferred_language: String,
    /// Addon base URLs, tried in this order.
    pub addon_urls: Vec<String>,
    pub rest_api_key: Option<String>,
    pub rest_api_base: String,
    pub user_agent: String,
    pub cache_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub debounce_window_ms: u64,
    pub registration_delay_ms: u64,
    pub restart_timeout_ms: u64,
    pub max_candidates: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            preferred_language: String::from("en"),
            addon_urls: Vec::new(),
            rest_api_key: None,
            rest_api_base: String::from(DEFAULT_REST_API_BASE),
            user_agent: String::from(DEFAULT_USER_AGENT),
            cache_dir: None,
            request_timeout_secs: 15,
            debounce_window_ms: 2000,
            registration_delay_ms: 1000,
            restart_timeout_ms: 10_000,
            max_candidates: 20,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("subflow").join("config.json"))
    }

    /// Loads the config file (defaults when it is missing or unreadable) and
    /// applies `SUBFLOW_*` environment overrides on top.
    pub fn load() -> Self {
        let mut settings = Self::config_path()
            .and_then(|path| match Self::load_from(&path) {
                Ok(settings) => Some(settings),
                Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    warn!("Ignoring settings at {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigPath)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub(crate) fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(lang) = var("SUBFLOW_LANGUAGE").filter(|v| !v.trim().is_empty()) {
            self.preferred_language = lang.trim().to_string();
        }
        if let Some(urls) = var("SUBFLOW_ADDON_URLS") {
            self.addon_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(key) = var("SUBFLOW_API_KEY") {
            self.rest_api_key = Some(key.trim().to_string()).filter(|k| !k.is_empty());
        }
        if let Some(dir) = var("SUBFLOW_CACHE_DIR").filter(|v| !v.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir.trim()));
        }
    }

    /// Copy safe to print: the API key is masked when set.
    pub fn redacted(&self) -> Self {
        Self {
            rest_api_key: self.rest_api_key.as_ref().map(|_| String::from("***")),
            ..self.clone()
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.rest_api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(SubtitleCache::default_root)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn registration_delay(&self) -> Duration {
        Duration::from_millis(self.registration_delay_ms)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"preferred_language":"de","rest_api_key":"k"}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.preferred_language, "de");
        assert!(settings.has_api_key());
        assert_eq!(settings.debounce_window(), Duration::from_millis(2000));
        assert_eq!(settings.max_candidates, 20);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let settings = Settings {
            addon_urls: vec!["https://addon.example".into()],
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.addon_urls, settings.addon_urls);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SUBFLOW_LANGUAGE", "fr"),
            ("SUBFLOW_ADDON_URLS", "https://a.example, ,https://b.example/"),
            ("SUBFLOW_API_KEY", "  "),
            ("SUBFLOW_CACHE_DIR", "/sdcard/subflow"),
        ]);
        let mut settings = Settings {
            rest_api_key: Some("from-file".into()),
            ..Settings::default()
        };
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.preferred_language, "fr");
        assert_eq!(
            settings.addon_urls,
            vec!["https://a.example", "https://b.example/"]
        );
        assert!(!settings.has_api_key());
        assert_eq!(settings.cache_root(), PathBuf::from("/sdcard/subflow"));
    }

    #[test]
    fn redacted_masks_the_api_key() {
        let settings = Settings {
            rest_api_key: Some("super-secret".into()),
            ..Settings::default()
        };
        let printed = serde_json::to_string(&settings.redacted()).unwrap();

        assert!(!printed.contains("super-secret"));
        assert!(printed.contains(r#""rest_api_key":"***""#));
        assert_eq!(Settings::default().redacted().rest_api_key, None);
    }
}
