use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::SubtitleCache;
use crate::error::AttachError;
use crate::media::{CachedSubtitleFile, SubtitleQuery};
use crate::player::{
    AttachmentAdapter, AttachmentAttempt, AttachmentOutcome, AttachmentReport, MediaSession,
};
use crate::settings::Settings;
use crate::subtitles::{create_default_resolver, ResolveOutcome, SubtitleResolver};

/// What the UI layer should tell the user, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleNotice {
    Loaded { file_name: String },
    CouldNotLoad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Attached(AttachmentReport),
    AttachFailed(AttachmentReport),
    NotFound,
    Debounced,
    Cancelled,
    /// `on_media_ready` arrived before `start_playback`.
    NoMedia,
}

impl PipelineOutcome {
    /// Only a successful or a failed attachment is surfaced to the user.
    pub fn notice(&self) -> Option<SubtitleNotice> {
        match self {
            PipelineOutcome::Attached(report) => Some(SubtitleNotice::Loaded {
                file_name: report
                    .subtitle
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }),
            PipelineOutcome::AttachFailed(_) => Some(SubtitleNotice::CouldNotLoad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct NowPlaying {
    video_filename: String,
    external_id: Option<String>,
}

/// Glue between playback events and the subtitle pipeline for one session.
pub struct PlaybackController {
    session: Arc<dyn MediaSession>,
    resolver: Arc<SubtitleResolver>,
    adapter: Arc<AttachmentAdapter>,
    preferred_language: String,
    now_playing: Option<NowPlaying>,
    cancel: CancellationToken,
    last_report: Arc<Mutex<Option<AttachmentReport>>>,
}

impl PlaybackController {
    pub fn new(
        session: Arc<dyn MediaSession>,
        resolver: Arc<SubtitleResolver>,
        adapter: Arc<AttachmentAdapter>,
        preferred_language: impl Into<String>,
    ) -> Self {
        Self {
            session,
            resolver,
            adapter,
            preferred_language: preferred_language.into(),
            now_playing: None,
            cancel: CancellationToken::new(),
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_settings(
        session: Arc<dyn MediaSession>,
        settings: &Settings,
        cache: Arc<SubtitleCache>,
    ) -> Self {
        let resolver = Arc::new(create_default_resolver(settings, cache));
        let adapter = Arc::new(AttachmentAdapter::with_timing(
            session.clone(),
            settings.registration_delay(),
            settings.restart_timeout(),
        ));
        Self::new(session, resolver, adapter, settings.preferred_language.clone())
    }

    /// Records the new video and cancels whatever the previous one left running.
    pub fn start_playback(&mut self, video_filename: impl Into<String>, external_id: Option<String>) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.resolver.reset_session();
        self.now_playing = Some(NowPlaying {
            video_filename: video_filename.into(),
            external_id,
        });
    }

    /// The user navigated away: stop in-flight work and forget the video.
    pub fn end_session(&mut self) {
        self.cancel.cancel();
        self.resolver.reset_session();
        self.now_playing = None;
    }

    pub fn current_position_millis(&self) -> i64 {
        self.session.position_millis()
    }

    pub fn current_media_source(&self) -> Option<String> {
        self.session.media_source()
    }

    pub fn last_attachment_result(&self) -> Option<Vec<AttachmentAttempt>> {
        self.last_report
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|r| r.attempts.clone())
    }

    pub fn last_attachment_report(&self) -> Option<AttachmentReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn query(&self) -> Option<SubtitleQuery> {
        self.now_playing.as_ref().map(|np| {
            SubtitleQuery::new(
                np.video_filename.clone(),
                np.external_id.clone(),
                self.preferred_language.clone(),
            )
        })
    }

    /// "Media ready" from the player: search and attach on a background task.
    pub fn on_media_ready(&self) -> JoinHandle<PipelineOutcome> {
        let query = self.query();
        let resolver = self.resolver.clone();
        let adapter = self.adapter.clone();
        let token = self.cancel.clone();
        let last_report = self.last_report.clone();

        tokio::spawn(async move {
            let Some(query) = query else {
                return PipelineOutcome::NoMedia;
            };
            run_pipeline(&resolver, &adapter, &query, &token, &last_report).await
        })
    }

    /// Same as [`on_media_ready`](Self::on_media_ready) on the caller's task.
    pub async fn load_subtitles(&self) -> PipelineOutcome {
        let Some(query) = self.query() else {
            return PipelineOutcome::NoMedia;
        };
        run_pipeline(
            &self.resolver,
            &self.adapter,
            &query,
            &self.cancel,
            &self.last_report,
        )
        .await
    }

    /// Attaches a subtitle the user picked from the cache.
    pub async fn attach_file(&self, file: &CachedSubtitleFile) -> PipelineOutcome {
        attach(&self.adapter, file, &self.cancel, &self.last_report).await
    }
}

async fn run_pipeline(
    resolver: &SubtitleResolver,
    adapter: &AttachmentAdapter,
    query: &SubtitleQuery,
    token: &CancellationToken,
    last_report: &Mutex<Option<AttachmentReport>>,
) -> PipelineOutcome {
    match resolver.resolve_cancellable(query, token).await {
        ResolveOutcome::Found(file) => attach(adapter, &file, token, last_report).await,
        ResolveOutcome::NotFound => PipelineOutcome::NotFound,
        ResolveOutcome::Debounced => PipelineOutcome::Debounced,
        ResolveOutcome::Cancelled => PipelineOutcome::Cancelled,
    }
}

async fn attach(
    adapter: &AttachmentAdapter,
    file: &CachedSubtitleFile,
    token: &CancellationToken,
    last_report: &Mutex<Option<AttachmentReport>>,
) -> PipelineOutcome {
    if token.is_cancelled() {
        debug!("Session ended before {} could be attached", file.file_name());
        return PipelineOutcome::Cancelled;
    }

    let report = adapter.attach(file.path(), token).await;
    *last_report.lock().unwrap_or_else(|p| p.into_inner()) = Some(report.clone());

    if report.outcome == AttachmentOutcome::Failed(AttachError::Cancelled) {
        return PipelineOutcome::Cancelled;
    }
    if report.succeeded() {
        info!(
            "Subtitle {} from {} is active",
            file.file_name(),
            file.source_provider_name
        );
        PipelineOutcome::Attached(report)
    } else {
        PipelineOutcome::AttachFailed(report)
    }
}
