use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static EPISODE_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bS(\d{1,2})[ ._-]?E(\d{1,3})\b").ok());

static BRACKETED: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").ok());

static RELEASE_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^(
            \d{3,4}p | 4k | uhd |
            blu-?ray | brrip | bdrip | remux |
            web-?dl | webrip | web | hdtv | dvdrip | hdrip | hdcam | cam |
            x26[45] | h26[45] | hevc | avc | xvid | divx |
            aac\d* | ac3 | eac3 | dts | ddp?\d* | atmos |
            hdr\d* | dv | 10bit | 8bit |
            proper | repack | extended | unrated | internal | multi |
            s\d{1,2}e\d{1,3}
        )$",
    )
    .ok()
});

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "m4v", "webm", "ts", "m2ts", "mpg", "mpeg", "flv",
];

/// ISO 639-2 (bibliographic and terminology) to ISO 639-1.
const ISO639_2_TO_1: &[(&str, &str)] = &[
    ("ara", "ar"),
    ("bel", "be"),
    ("bul", "bg"),
    ("ces", "cs"),
    ("chi", "zh"),
    ("cze", "cs"),
    ("dan", "da"),
    ("deu", "de"),
    ("dut", "nl"),
    ("ell", "el"),
    ("eng", "en"),
    ("est", "et"),
    ("fas", "fa"),
    ("fin", "fi"),
    ("fra", "fr"),
    ("fre", "fr"),
    ("ger", "de"),
    ("gre", "el"),
    ("heb", "he"),
    ("hin", "hi"),
    ("hrv", "hr"),
    ("hun", "hu"),
    ("ind", "id"),
    ("ita", "it"),
    ("jpn", "ja"),
    ("kaz", "kk"),
    ("kor", "ko"),
    ("lav", "lv"),
    ("lit", "lt"),
    ("nld", "nl"),
    ("nor", "no"),
    ("per", "fa"),
    ("pob", "pt"),
    ("pol", "pl"),
    ("por", "pt"),
    ("ron", "ro"),
    ("rum", "ro"),
    ("rus", "ru"),
    ("slk", "sk"),
    ("slo", "sk"),
    ("slv", "sl"),
    ("spa", "es"),
    ("srp", "sr"),
    ("swe", "sv"),
    ("tha", "th"),
    ("tur", "tr"),
    ("ukr", "uk"),
    ("vie", "vi"),
    ("zho", "zh"),
];

/// Lowercase ISO 639-1 form of a language tag. Region suffixes are dropped
/// and known three-letter codes are folded to their two-letter equivalent.
pub fn normalize_language(code: &str) -> String {
    let base = code
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    ISO639_2_TO_1
        .iter()
        .find(|(long, _)| *long == base)
        .map(|(_, short)| short.to_string())
        .unwrap_or(base)
}

pub fn languages_match(a: &str, b: &str) -> bool {
    let a = normalize_language(a);
    !a.is_empty() && a == normalize_language(b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub season: u32,
    pub episode: u32,
}

/// One subtitle search, built once per playback start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleQuery {
    pub video_filename: String,
    pub external_id: Option<String>,
    pub preferred_language: String,
    pub episode: Option<EpisodeRef>,
}

impl SubtitleQuery {
    pub fn new(
        video_filename: impl Into<String>,
        external_id: Option<String>,
        preferred_language: impl Into<String>,
    ) -> Self {
        let video_filename = video_filename.into();
        let episode = parse_episode(&video_filename);
        Self {
            external_id: external_id.filter(|id| !id.trim().is_empty()),
            preferred_language: normalize_language(&preferred_language.into()),
            video_filename,
            episode,
        }
    }

    /// Human search text derived from the video filename: extension, bracketed
    /// groups and everything from the first release tag onwards are removed.
    pub fn search_text(&self) -> String {
        let stem = strip_video_extension(file_name(&self.video_filename));
        let stem = match BRACKETED.as_ref() {
            Some(re) => re.replace_all(stem, " ").into_owned(),
            None => stem.to_string(),
        };

        let mut words = Vec::new();
        for token in stem
            .split(|c: char| c == '.' || c == '_' || c == ' ' || c == '(' || c == ')')
            .filter(|t| !t.is_empty())
        {
            let is_tag = RELEASE_TAG
                .as_ref()
                .map(|re| re.is_match(token.trim_matches('-')))
                .unwrap_or(false);
            if is_tag && !words.is_empty() {
                break;
            }
            if token != "-" {
                words.push(token);
            }
        }

        let text = words.join(" ");
        if text.is_empty() {
            stem.trim().to_string()
        } else {
            text
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn strip_video_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => stem,
        _ => name,
    }
}

fn parse_episode(filename: &str) -> Option<EpisodeRef> {
    let caps = EPISODE_MARKER.as_ref()?.captures(filename)?;
    Some(EpisodeRef {
        season: caps[1].parse().ok()?,
        episode: caps[2].parse().ok()?,
    })
}

/// A remote subtitle a provider offered for a query. Discarded after the
/// download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCandidate {
    pub provider_name: String,
    pub remote_id: String,
    pub download_url: String,
    pub language: String,
    pub display_label: String,
}

/// A subtitle stored in the cache root. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSubtitleFile {
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
    pub language: String,
    pub source_provider_name: String,
}

impl CachedSubtitleFile {
    pub fn path(&self) -> &Path {
        &self.absolute_path
    }

    pub fn file_name(&self) -> String {
        self.absolute_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
