pub mod attachment;
pub mod controller;

use async_trait::async_trait;

use crate::error::{AttachError, PlayerError};

pub use attachment::AttachmentAdapter;
pub use controller::{PipelineOutcome, PlaybackController, SubtitleNotice};

/// Track kinds accepted by the native "add slave" call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveType {
    Subtitle,
    Audio,
}

impl SlaveType {
    pub fn code(self) -> i32 {
        match self {
            SlaveType::Subtitle => 0,
            SlaveType::Audio => 1,
        }
    }
}

/// The live playback session, as exposed by the native player layer.
///
/// `attach_live_subtitle` returning `true` only means the call was accepted;
/// whether a track was registered has to be read back through
/// `subtitle_track_ids`.
#[async_trait]
pub trait MediaSession: Send + Sync {
    fn attach_live_subtitle(
        &self,
        slave: SlaveType,
        path_or_uri: &str,
        auto_select: bool,
    ) -> Result<bool, PlayerError>;

    fn subtitle_track_ids(&self) -> Vec<i32>;

    fn subtitle_track_count(&self) -> usize {
        self.subtitle_track_ids().len()
    }

    fn select_subtitle_track(&self, track_id: i32) -> Result<(), PlayerError>;

    fn media_source(&self) -> Option<String>;

    fn position_millis(&self) -> i64;

    fn seek_to(&self, position_millis: i64);

    fn stop(&self);

    /// Rebuilds the session for `media_source` with startup `options`.
    async fn recreate_with_options(
        &self,
        media_source: &str,
        options: &[String],
    ) -> Result<(), PlayerError>;

    fn play(&self) -> Result<(), PlayerError>;

    /// Completes on the next "now playing" signal after the future is first
    /// polled. Implementations must register their listener on that first
    /// poll; the adapter polls once before calling `play`.
    async fn wait_until_playing(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentStrategy {
    DirectUriAttach,
    RawPathAttach,
    SessionRestartWithEmbeddedOption,
}

impl AttachmentStrategy {
    /// Least disruptive first; the restart interrupts playback.
    pub const ORDER: [AttachmentStrategy; 3] = [
        AttachmentStrategy::DirectUriAttach,
        AttachmentStrategy::RawPathAttach,
        AttachmentStrategy::SessionRestartWithEmbeddedOption,
    ];

    pub fn state(self) -> AttachmentState {
        match self {
            AttachmentStrategy::DirectUriAttach => AttachmentState::TryingDirectUri,
            AttachmentStrategy::RawPathAttach => AttachmentState::TryingRawPath,
            AttachmentStrategy::SessionRestartWithEmbeddedOption => {
                AttachmentState::RestartingSession
            }
        }
    }
}

impl std::fmt::Display for AttachmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AttachmentStrategy::DirectUriAttach => "direct URI attach",
            AttachmentStrategy::RawPathAttach => "raw path attach",
            AttachmentStrategy::SessionRestartWithEmbeddedOption => "session restart",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    NotStarted,
    TryingDirectUri,
    TryingRawPath,
    RestartingSession,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentAttempt {
    pub strategy: AttachmentStrategy,
    pub succeeded: bool,
    pub resulting_track_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentOutcome {
    Succeeded {
        strategy: AttachmentStrategy,
        track_id: Option<i32>,
    },
    Failed(AttachError),
}

/// Everything one attachment request did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentReport {
    pub subtitle: std::path::PathBuf,
    pub attempts: Vec<AttachmentAttempt>,
    pub outcome: AttachmentOutcome,
}

impl AttachmentReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttachmentOutcome::Succeeded { .. })
    }

    pub fn winning_strategy(&self) -> Option<AttachmentStrategy> {
        match self.outcome {
            AttachmentOutcome::Succeeded { strategy, .. } => Some(strategy),
            AttachmentOutcome::Failed(_) => None,
        }
    }

    pub fn final_state(&self) -> AttachmentState {
        if self.succeeded() {
            AttachmentState::Succeeded
        } else {
            AttachmentState::Failed
        }
    }
}
