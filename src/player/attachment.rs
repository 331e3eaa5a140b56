use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::SubtitleCache;
use crate::error::{AttachError, PlayerError};
use crate::player::{
    AttachmentAttempt, AttachmentOutcome, AttachmentReport, AttachmentState, AttachmentStrategy,
    MediaSession, SlaveType,
};

pub const DEFAULT_REGISTRATION_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_RESTART_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a single strategy did not make the subtitle visible.
#[derive(Debug)]
enum StrategyError {
    Rejected,
    NoNewTrack,
    Player(PlayerError),
    Cancelled,
}

impl std::fmt::Display for StrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyError::Rejected => write!(f, "attach call returned false"),
            StrategyError::NoNewTrack => write!(f, "no new track registered"),
            StrategyError::Player(e) => write!(f, "{}", e),
            StrategyError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<PlayerError> for StrategyError {
    fn from(err: PlayerError) -> Self {
        StrategyError::Player(err)
    }
}

type StrategyResult = Result<Option<i32>, StrategyError>;

pub fn file_uri(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

pub fn embedded_subtitle_option(path: &Path) -> String {
    format!(":sub-file={}", path.display())
}

/// Makes a cached subtitle visible in the live session, falling back from
/// live attachment to a full session restart.
pub struct AttachmentAdapter {
    session: Arc<dyn MediaSession>,
    registration_delay: Duration,
    restart_timeout: Duration,
    in_flight: tokio::sync::Mutex<()>,
    state: Mutex<AttachmentState>,
    saved_position: Mutex<Option<i64>>,
}

impl AttachmentAdapter {
    pub fn new(session: Arc<dyn MediaSession>) -> Self {
        Self::with_timing(session, DEFAULT_REGISTRATION_DELAY, DEFAULT_RESTART_TIMEOUT)
    }

    pub fn with_timing(
        session: Arc<dyn MediaSession>,
        registration_delay: Duration,
        restart_timeout: Duration,
    ) -> Self {
        Self {
            session,
            registration_delay,
            restart_timeout,
            in_flight: tokio::sync::Mutex::new(()),
            state: Mutex::new(AttachmentState::NotStarted),
            saved_position: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AttachmentState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: AttachmentState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Position captured before a restart and not yet restored.
    pub fn saved_position(&self) -> Option<i64> {
        *self.saved_position.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn take_saved_position(&self) -> Option<i64> {
        self.saved_position
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }

    /// Runs the strategies in order until one succeeds. Requests on the same
    /// adapter are serialized: a second call waits for the first to finish.
    pub async fn attach(&self, subtitle: &Path, token: &CancellationToken) -> AttachmentReport {
        let _guard = self.in_flight.lock().await;
        self.set_state(AttachmentState::NotStarted);

        let mut attempts = Vec::with_capacity(AttachmentStrategy::ORDER.len());
        let outcome = self.run(subtitle, token, &mut attempts).await;

        match &outcome {
            AttachmentOutcome::Succeeded { strategy, track_id } => {
                self.set_state(AttachmentState::Succeeded);
                info!(
                    "Subtitle {} attached via {} (track {:?})",
                    subtitle.display(),
                    strategy,
                    track_id
                );
            }
            AttachmentOutcome::Failed(AttachError::Cancelled) => {
                self.set_state(AttachmentState::Failed);
                debug!("Attachment of {} cancelled", subtitle.display());
            }
            AttachmentOutcome::Failed(e) => {
                self.set_state(AttachmentState::Failed);
                error!("Subtitle {} could not be attached: {}", subtitle.display(), e);
            }
        }

        AttachmentReport {
            subtitle: subtitle.to_path_buf(),
            attempts,
            outcome,
        }
    }

    async fn run(
        &self,
        subtitle: &Path,
        token: &CancellationToken,
        attempts: &mut Vec<AttachmentAttempt>,
    ) -> AttachmentOutcome {
        if !SubtitleCache::is_usable(subtitle).await {
            return AttachmentOutcome::Failed(AttachError::MissingFile(subtitle.to_path_buf()));
        }
        let Some(source) = self.session.media_source() else {
            return AttachmentOutcome::Failed(AttachError::NoMediaSource);
        };
        let path: PathBuf = tokio::fs::canonicalize(subtitle)
            .await
            .unwrap_or_else(|_| subtitle.to_path_buf());

        for strategy in AttachmentStrategy::ORDER {
            if token.is_cancelled() {
                return AttachmentOutcome::Failed(AttachError::Cancelled);
            }
            self.set_state(strategy.state());

            let result = match strategy {
                AttachmentStrategy::DirectUriAttach => match file_uri(&path) {
                    Some(uri) => self.live_attach(&uri, token).await,
                    None => Err(StrategyError::Rejected),
                },
                AttachmentStrategy::RawPathAttach => {
                    self.live_attach(&path.to_string_lossy(), token).await
                }
                AttachmentStrategy::SessionRestartWithEmbeddedOption => {
                    self.restart_with_subtitle(&source, &path, token).await
                }
            };

            match result {
                Ok(track_id) => {
                    attempts.push(AttachmentAttempt {
                        strategy,
                        succeeded: true,
                        resulting_track_id: track_id,
                    });
                    return AttachmentOutcome::Succeeded { strategy, track_id };
                }
                Err(StrategyError::Cancelled) => {
                    attempts.push(AttachmentAttempt {
                        strategy,
                        succeeded: false,
                        resulting_track_id: None,
                    });
                    return AttachmentOutcome::Failed(AttachError::Cancelled);
                }
                Err(e) => {
                    debug!("{} failed for {}: {}", strategy, path.display(), e);
                    attempts.push(AttachmentAttempt {
                        strategy,
                        succeeded: false,
                        resulting_track_id: None,
                    });
                }
            }
        }

        AttachmentOutcome::Failed(AttachError::Exhausted)
    }

    async fn live_attach(&self, target: &str, token: &CancellationToken) -> StrategyResult {
        // Baseline must be read before the call; afterwards it may already
        // include the new track.
        let before = self.session.subtitle_track_ids();

        if !self
            .session
            .attach_live_subtitle(SlaveType::Subtitle, target, true)?
        {
            return Err(StrategyError::Rejected);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(StrategyError::Cancelled),
            _ = tokio::time::sleep(self.registration_delay) => {}
        }

        let after = self.session.subtitle_track_ids();
        if after.len() <= before.len() {
            return Err(StrategyError::NoNewTrack);
        }

        let track_id = after
            .iter()
            .copied()
            .find(|id| !before.contains(id))
            .or_else(|| after.last().copied());

        // auto_select is not reliable; select explicitly.
        if let Some(id) = track_id {
            if let Err(e) = self.session.select_subtitle_track(id) {
                warn!("Track {} registered but could not be selected: {}", id, e);
            }
        }
        Ok(track_id)
    }

    async fn restart_with_subtitle(
        &self,
        source: &str,
        subtitle: &Path,
        token: &CancellationToken,
    ) -> StrategyResult {
        let position = self.session.position_millis();
        *self.saved_position.lock().unwrap_or_else(|p| p.into_inner()) = Some(position);
        debug!("Restarting session for {} at {} ms", source, position);

        let result = self.restart_and_resume(source, subtitle, token).await;
        if result.is_err() {
            self.take_saved_position();
        }
        result
    }

    async fn restart_and_resume(
        &self,
        source: &str,
        subtitle: &Path,
        token: &CancellationToken,
    ) -> StrategyResult {
        self.session.stop();
        if token.is_cancelled() {
            return Err(StrategyError::Cancelled);
        }

        let options = vec![embedded_subtitle_option(subtitle)];
        self.session.recreate_with_options(source, &options).await?;

        // The listener has to be registered before play(), which may emit
        // the signal synchronously.
        let wait = tokio::time::timeout(self.restart_timeout, self.session.wait_until_playing());
        tokio::pin!(wait);
        let early = std::future::poll_fn(|cx| Poll::Ready(wait.as_mut().poll(cx))).await;

        self.session.play()?;

        let playing = match early {
            Poll::Ready(playing) => playing,
            Poll::Pending => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(StrategyError::Cancelled),
                playing = &mut wait => playing,
            },
        };
        if playing.is_err() {
            return Err(StrategyError::Player(PlayerError::PlayingTimeout(
                self.restart_timeout.as_millis() as u64,
            )));
        }

        if let Some(position) = self.take_saved_position() {
            if position > 0 {
                self.session.seek_to(position);
            }
        }

        Ok(self.session.subtitle_track_ids().last().copied())
    }
}

impl std::fmt::Debug for AttachmentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentAdapter")
            .field("registration_delay", &self.registration_delay)
            .field("restart_timeout", &self.restart_timeout)
            .field("state", &self.state())
            .finish()
    }
}
