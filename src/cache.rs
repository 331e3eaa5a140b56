use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::media::CachedSubtitleFile;

const FILE_PREFIX: &str = "subtitle_";
const KNOWN_EXTENSIONS: &[&str] = &["srt", "vtt", "ass", "ssa", "sub"];
const DEFAULT_EXTENSION: &str = "srt";

/// Subtitle extension guessed from a URL or remote file name.
pub fn subtitle_extension(hint: &str) -> &'static str {
    let path = hint.split(['?', '#']).next().unwrap_or(hint);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    KNOWN_EXTENSIONS
        .iter()
        .find(|known| **known == ext)
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn sanitize_language(language: &str) -> String {
    let clean: String = language
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if clean.is_empty() {
        "und".to_string()
    } else {
        clean.to_ascii_lowercase()
    }
}

/// Shared store for downloaded subtitles. Every write goes to a fresh
/// `subtitle_{language}_{epochMillis}.{ext}` file, so writers never contend.
#[derive(Debug)]
pub struct SubtitleCache {
    root: PathBuf,
    last_stamp: AtomicU64,
}

impl SubtitleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_stamp: AtomicU64::new(0),
        }
    }

    /// `<user cache dir>/subflow/subtitles`, falling back to the system temp dir.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("subflow")
            .join("subtitles")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Millisecond stamp that is strictly greater than any stamp this cache
    /// handed out before, even within one clock tick.
    fn next_stamp(&self) -> u64 {
        let now = epoch_millis();
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    fn file_path(&self, language: &str, stamp: u64, extension: &str) -> PathBuf {
        self.root.join(format!(
            "{}{}_{}.{}",
            FILE_PREFIX,
            sanitize_language(language),
            stamp,
            extension
        ))
    }

    /// Opens a new, uniquely named cache file for writing. The parent
    /// directory is created when absent.
    pub async fn begin(&self, language: &str, extension: &str) -> Result<CacheWriter, CacheError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;

        loop {
            let path = self.file_path(language, self.next_stamp(), extension);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    return Ok(CacheWriter {
                        file: Some(file),
                        path,
                        language: language.to_string(),
                        written: 0,
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("Cache file {} exists, picking a new stamp", path.display());
                }
                Err(e) => return Err(CacheError::io(path, e)),
            }
        }
    }

    /// Writes a complete subtitle body in one go.
    pub async fn store(
        &self,
        language: &str,
        extension: &str,
        bytes: &[u8],
        provider_name: &str,
    ) -> Result<CachedSubtitleFile, CacheError> {
        let mut writer = self.begin(language, extension).await?;
        writer.write_chunk(bytes).await?;
        writer.commit(provider_name).await
    }

    /// Whether `path` exists and holds at least one byte. Cached entries are
    /// never trusted without this check.
    pub async fn is_usable(path: &Path) -> bool {
        match fs::metadata(path).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    pub async fn entries(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.root, e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            let is_subtitle = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(FILE_PREFIX))
                .unwrap_or(false);
            if is_subtitle {
                entries.push(entry.path());
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Deletes every cached subtitle and returns how many were removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entries().await? {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(path, e)),
            }
        }
        Ok(removed)
    }
}

/// An open cache file. Dropping it without [`CacheWriter::commit`] removes
/// the file, so interrupted downloads never leave a usable-looking entry.
#[derive(Debug)]
pub struct CacheWriter {
    file: Option<File>,
    path: PathBuf,
    language: String,
    written: u64,
}

impl CacheWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CacheError> {
        let Some(file) = self.file.as_mut() else {
            return Err(CacheError::Empty(self.path.clone()));
        };
        file.write_all(chunk)
            .await
            .map_err(|e| CacheError::io(&self.path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes the file and checks it landed on disk with content.
    pub async fn commit(mut self, provider_name: &str) -> Result<CachedSubtitleFile, CacheError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| CacheError::io(&self.path, e))?;
            file.sync_all()
                .await
                .map_err(|e| CacheError::io(&self.path, e))?;
        }

        let size_bytes = match fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
            _ => return Err(CacheError::Empty(self.path.clone())),
        };

        let absolute_path = fs::canonicalize(&self.path)
            .await
            .unwrap_or_else(|_| self.path.clone());

        // Committed: disarm the drop cleanup.
        let path = std::mem::take(&mut self.path);
        debug!(
            "Cached {} bytes at {} ({} written)",
            size_bytes,
            path.display(),
            self.written
        );

        Ok(CachedSubtitleFile {
            absolute_path,
            size_bytes,
            language: std::mem::take(&mut self.language),
            source_provider_name: provider_name.to_string(),
        })
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial cache file {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_taken_from_url() {
        assert_eq!(subtitle_extension("https://example/sub.srt"), "srt");
        assert_eq!(subtitle_extension("https://example/a.VTT?token=1"), "vtt");
        assert_eq!(subtitle_extension("Movie.2023.ass"), "ass");
        assert_eq!(subtitle_extension("https://example/download/123"), "srt");
    }

    #[tokio::test]
    async fn store_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubtitleCache::new(dir.path().join("nested").join("subs"));

        let file = cache
            .store("en", "srt", b"1\n00:00:01,000 --> 00:00:02,000\nHi\n", "test")
            .await
            .unwrap();

        assert!(file.absolute_path.is_absolute());
        assert!(file.size_bytes > 0);
        assert_eq!(file.source_provider_name, "test");
        assert!(file.file_name().starts_with("subtitle_en_"));
        assert!(file.file_name().ends_with(".srt"));
        assert!(SubtitleCache::is_usable(file.path()).await);
    }

    #[tokio::test]
    async fn same_tick_writes_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubtitleCache::new(dir.path());

        let mut paths = Vec::new();
        for _ in 0..25 {
            let file = cache.store("en", "srt", b"x", "test").await.unwrap();
            paths.push(file.absolute_path);
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 25);
        assert_eq!(cache.entries().await.unwrap().len(), 25);
    }

    #[tokio::test]
    async fn empty_write_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubtitleCache::new(dir.path());

        let err = cache.store("en", "srt", b"", "test").await.unwrap_err();
        assert!(matches!(err, CacheError::Empty(_)));
        assert!(cache.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_writer_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubtitleCache::new(dir.path());

        let mut writer = cache.begin("en", "srt").await.unwrap();
        writer.write_chunk(b"half a subt").await.unwrap();
        let path = writer.path().to_path_buf();
        drop(writer);

        assert!(!path.exists());
        assert!(!SubtitleCache::is_usable(&path).await);
    }

    #[tokio::test]
    async fn clear_only_removes_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubtitleCache::new(dir.path());
        cache.store("en", "srt", b"a", "test").await.unwrap();
        cache.store("de", "vtt", b"b", "test").await.unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"keep").unwrap();

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.entries().await.unwrap().is_empty());
        assert!(dir.path().join("keep.txt").exists());
    }
}
