//! Finds an external subtitle for the video that is playing, stores it in a
//! shared cache directory and attaches it to the live player session.

pub mod cache;
pub mod error;
pub mod media;
pub mod player;
pub mod settings;
pub mod subtitles;

pub use cache::SubtitleCache;
pub use error::{AttachError, CacheError, PlayerError, ProviderError, SettingsError};
pub use media::{CachedSubtitleFile, EpisodeRef, SubtitleCandidate, SubtitleQuery};
pub use player::{
    AttachmentAdapter, AttachmentAttempt, AttachmentOutcome, AttachmentReport, AttachmentState,
    AttachmentStrategy, MediaSession, PipelineOutcome, PlaybackController, SlaveType,
    SubtitleNotice,
};
pub use settings::Settings;
pub use subtitles::{create_default_resolver, ResolveOutcome, SubtitleProvider, SubtitleResolver};
