#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use subflow::{
    CachedSubtitleFile, MediaSession, PlayerError, ProviderError, SlaveType, SubtitleCache,
    SubtitleCandidate, SubtitleProvider, SubtitleQuery,
};

pub const SRT_BODY: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello there.\n\n";

pub fn candidate(provider: &str, id: &str, lang: &str) -> SubtitleCandidate {
    SubtitleCandidate {
        provider_name: provider.to_string(),
        remote_id: id.to_string(),
        download_url: format!("https://example/{}.srt", id),
        language: lang.to_string(),
        display_label: format!("{} {}", provider, id),
    }
}

/// Shared, ordered record of provider calls across all fakes in a test.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Auth,
    Parse,
}

impl Failure {
    fn error(self) -> ProviderError {
        match self {
            Failure::Network => ProviderError::Network("connection reset".into()),
            Failure::Auth => ProviderError::Auth { status: 401 },
            Failure::Parse => ProviderError::Parse("unexpected token".into()),
        }
    }
}

pub struct FakeProvider {
    name: String,
    enabled: bool,
    filters_language: bool,
    results: Vec<SubtitleCandidate>,
    search_failure: Option<Failure>,
    download_failure: Option<Failure>,
    search_delay: Option<Duration>,
    cache: Arc<SubtitleCache>,
    log: CallLog,
}

impl FakeProvider {
    pub fn new(name: &str, cache: Arc<SubtitleCache>, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            filters_language: true,
            results: Vec::new(),
            search_failure: None,
            download_failure: None,
            search_delay: None,
            cache,
            log,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn unfiltered(mut self) -> Self {
        self.filters_language = false;
        self
    }

    pub fn with_results(mut self, results: Vec<SubtitleCandidate>) -> Self {
        self.results = results;
        self
    }

    pub fn with_result(self, id: &str, lang: &str) -> Self {
        let name = self.name.clone();
        self.with_results(vec![candidate(&name, id, lang)])
    }

    pub fn failing_search(mut self, failure: Failure) -> Self {
        self.search_failure = Some(failure);
        self
    }

    pub fn failing_download(mut self, failure: Failure) -> Self {
        self.download_failure = Some(failure);
        self
    }

    pub fn slow_search(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    fn record(&self, op: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, op));
    }
}

#[async_trait]
impl SubtitleProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn filters_language(&self) -> bool {
        self.filters_language
    }

    async fn search(&self, _query: &SubtitleQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        self.record("search");
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        match self.search_failure {
            Some(failure) => Err(failure.error()),
            None => Ok(self.results.clone()),
        }
    }

    async fn download(
        &self,
        candidate: &SubtitleCandidate,
    ) -> Result<CachedSubtitleFile, ProviderError> {
        self.record(&format!("download:{}", candidate.remote_id));
        if let Some(failure) = self.download_failure {
            return Err(failure.error());
        }
        Ok(self
            .cache
            .store(&candidate.language, "srt", SRT_BODY.as_bytes(), &self.name)
            .await?)
    }
}

/// Which attach call form makes the fake register a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOn {
    Never,
    Uri,
    RawPath,
}

#[derive(Debug)]
pub struct SessionState {
    pub source: Option<String>,
    pub tracks: Vec<i32>,
    pub next_track_id: i32,
    pub position: i64,
    pub playing: bool,
    pub selected: Option<i32>,
    pub calls: Vec<String>,
    pub register_on: RegisterOn,
    pub accept_attach: bool,
    pub attach_errors: u32,
    pub reports_playing_after_restart: bool,
    /// Signal "now playing" only to listeners already waiting, like an
    /// event callback, instead of keeping it as readable state.
    pub playing_signal_is_edge: bool,
    pub last_options: Vec<String>,
}

/// Scripted stand-in for the native player session.
pub struct FakeSession {
    state: Mutex<SessionState>,
    playing_changed: Notify,
}

impl FakeSession {
    pub fn playing(source: &str) -> Self {
        Self {
            state: Mutex::new(SessionState {
                source: Some(source.to_string()),
                tracks: Vec::new(),
                next_track_id: 1,
                position: 0,
                playing: true,
                selected: None,
                calls: Vec::new(),
                register_on: RegisterOn::Never,
                accept_attach: true,
                attach_errors: 0,
                reports_playing_after_restart: true,
                playing_signal_is_edge: false,
                last_options: Vec::new(),
            }),
            playing_changed: Notify::new(),
        }
    }

    pub fn configure(&self, f: impl FnOnce(&mut SessionState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn snapshot<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }
}

#[async_trait]
impl MediaSession for FakeSession {
    fn attach_live_subtitle(
        &self,
        slave: SlaveType,
        path_or_uri: &str,
        auto_select: bool,
    ) -> Result<bool, PlayerError> {
        assert_eq!(slave, SlaveType::Subtitle);
        assert!(auto_select);
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("attach:{}", path_or_uri));
        if state.attach_errors > 0 {
            state.attach_errors -= 1;
            return Err(PlayerError::Attach("decoder rejected slave".into()));
        }
        let is_uri = path_or_uri.starts_with("file://");
        let registers = match state.register_on {
            RegisterOn::Never => false,
            RegisterOn::Uri => is_uri,
            RegisterOn::RawPath => !is_uri,
        };
        if registers {
            let id = state.next_track_id;
            state.next_track_id += 1;
            state.tracks.push(id);
        }
        Ok(state.accept_attach)
    }

    fn subtitle_track_ids(&self) -> Vec<i32> {
        self.state.lock().unwrap().tracks.clone()
    }

    fn select_subtitle_track(&self, track_id: i32) -> Result<(), PlayerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("select:{}", track_id));
        state.selected = Some(track_id);
        Ok(())
    }

    fn media_source(&self) -> Option<String> {
        self.state.lock().unwrap().source.clone()
    }

    fn position_millis(&self) -> i64 {
        self.state.lock().unwrap().position
    }

    fn seek_to(&self, position_millis: i64) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("seek:{}", position_millis));
        state.position = position_millis;
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push("stop".into());
        state.playing = false;
    }

    async fn recreate_with_options(
        &self,
        media_source: &str,
        options: &[String],
    ) -> Result<(), PlayerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("recreate:{}", media_source));
        state.last_options = options.to_vec();
        state.position = 0;
        state.tracks.clear();
        if options.iter().any(|o| o.starts_with(":sub-file=")) {
            let id = state.next_track_id;
            state.next_track_id += 1;
            state.tracks.push(id);
        }
        Ok(())
    }

    fn play(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("play".into());
        if state.reports_playing_after_restart {
            state.playing = true;
            if state.playing_signal_is_edge {
                self.playing_changed.notify_waiters();
            } else {
                self.playing_changed.notify_one();
            }
        }
        Ok(())
    }

    async fn wait_until_playing(&self) {
        let edge = self.state.lock().unwrap().playing_signal_is_edge;
        if edge {
            self.playing_changed.notified().await;
            return;
        }
        loop {
            let notified = self.playing_changed.notified();
            if self.state.lock().unwrap().playing {
                return;
            }
            notified.await;
        }
    }
}

/// Writes a subtitle file of `size` bytes into `dir`.
pub fn subtitle_fixture(dir: &Path, name: &str, size: usize) -> PathBuf {
    let mut body = String::with_capacity(size);
    while body.len() < size {
        body.push_str(SRT_BODY);
    }
    body.truncate(size);
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

type Routes = Arc<Mutex<HashMap<String, (u16, String)>>>;

static BYPASS_PROXY: Once = Once::new();

/// Minimal HTTP/1.1 responder serving canned bodies by path.
pub struct StubServer {
    addr: SocketAddr,
    routes: Routes,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start() -> Self {
        // Keep any system proxy away from loopback requests. Set once, before
        // any test in this binary builds a client.
        BYPASS_PROXY.call_once(|| {
            std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
            std::env::set_var("no_proxy", "127.0.0.1,localhost");
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let accept_routes = routes.clone();
        let accept_requests = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = accept_routes.clone();
                let requests = accept_requests.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, routes, requests).await;
                });
            }
        });

        Self {
            addr,
            routes,
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn route(&self, path: &str, status: u16, body: impl Into<String>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.into()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.target.split('?').next() == Some(path))
            .collect()
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

async fn handle(
    mut stream: TcpStream,
    routes: Routes,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).into_owned();

    let path = target.split('?').next().unwrap_or_default().to_string();
    requests.lock().unwrap().push(RecordedRequest {
        method,
        target,
        headers,
        body,
    });

    let (status, body) = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or((404, String::new()));
    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
