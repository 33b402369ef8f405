//! Test doubles for the backend, the avatar SDK, and the video sink.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use raon_core::config::SessionSettings;
use raon_core::events::{DomainEvent, EventBus};
use raon_core::types::{ChatLogEntry, SessionConfig};
use raon_session::backend::{
    Backend, ConfigurationBundle, CreateSessionRequest, CreatedSession, Credentials,
    MessageSaveRequest, StoredMessage,
};
use raon_session::sdk::{
    AvatarSdk, AvatarSession, ChatLogCallback, CloseCallback, SdkError, Subscription, VideoSink,
};
use raon_session::{BackendError, SessionController};
use raon_storage::{MemorySessionStore, SessionStore};

// =============================================================================
// Backend
// =============================================================================

#[derive(Default)]
pub struct FakeBackend {
    pub create_requests: Mutex<Vec<CreateSessionRequest>>,
    pub saved: Mutex<Vec<(String, MessageSaveRequest)>>,
    pub terminated: Mutex<Vec<String>>,
    pub chat_room_history: Mutex<Vec<StoredMessage>>,
    pub fail_create: AtomicBool,
    pub fail_history: AtomicBool,
    counter: AtomicU64,
}

impl FakeBackend {
    pub fn create_count(&self) -> usize {
        self.create_requests.lock().unwrap().len()
    }

    pub fn saved(&self) -> Vec<(String, MessageSaveRequest)> {
        self.saved.lock().unwrap().clone()
    }
}

fn api_error(message: &str) -> BackendError {
    BackendError::Api {
        status: 500,
        message: message.to_string(),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn credentials(&self) -> Result<Credentials, BackendError> {
        Ok(Credentials {
            api_server: "https://live.example.test".into(),
            api_key: "test-key".into(),
        })
    }

    async fn configuration_bundle(&self, _: bool) -> Result<ConfigurationBundle, BackendError> {
        Ok(ConfigurationBundle::default())
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, BackendError> {
        self.create_requests.lock().unwrap().push(request.clone());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(api_error("provider unavailable"));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedSession {
            session_id: format!("plps-{}", n),
            chat_room_id: Some(request.previous_chat_room_id.unwrap_or(100)),
        })
    }

    async fn session_messages(&self, _: &str) -> Result<Vec<StoredMessage>, BackendError> {
        Ok(Vec::new())
    }

    async fn chat_room_messages(&self, _: i64) -> Result<Vec<StoredMessage>, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(api_error("history unavailable"));
        }
        Ok(self.chat_room_history.lock().unwrap().clone())
    }

    async fn save_message(
        &self,
        session_id: &str,
        request: &MessageSaveRequest,
    ) -> Result<(), BackendError> {
        self.saved
            .lock()
            .unwrap()
            .push((session_id.to_string(), request.clone()));
        Ok(())
    }

    async fn terminate_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.terminated.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

// =============================================================================
// Avatar SDK
// =============================================================================

type Registry<T> = Arc<Mutex<Vec<(usize, Arc<T>)>>>;

pub struct FakeAvatarSession {
    pub session_id: String,
    pub src: Mutex<Option<String>>,
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    chat_callbacks: Registry<ChatLogCallback>,
    close_callbacks: Registry<CloseCallback>,
    next_id: AtomicUsize,
}

impl FakeAvatarSession {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            src: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            chat_callbacks: Arc::new(Mutex::new(Vec::new())),
            close_callbacks: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        self.chat_callbacks.lock().unwrap().len() + self.close_callbacks.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Push a full chat log to every subscriber.
    pub fn push_chat_log(&self, entries: Vec<ChatLogEntry>) {
        let callbacks: Vec<_> = self.chat_callbacks.lock().unwrap().clone();
        for (_, callback) in callbacks {
            callback(entries.clone());
        }
    }

    /// Simulate the stream dropping on its own.
    pub fn drop_connection(&self) {
        let callbacks: Vec<_> = self.close_callbacks.lock().unwrap().clone();
        for (_, callback) in callbacks {
            callback(false);
        }
    }

    fn register<T: ?Sized + Send + Sync + 'static>(
        &self,
        registry: &Registry<Box<T>>,
        callback: Box<T>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        registry.lock().unwrap().push((id, Arc::new(callback)));
        let registry = registry.clone();
        Subscription::new(move || {
            registry.lock().unwrap().retain(|(i, _)| *i != id);
        })
    }
}

#[async_trait]
impl AvatarSession for FakeAvatarSession {
    fn set_src(&self, sink: &dyn VideoSink) -> Result<(), SdkError> {
        *self.src.lock().unwrap() = Some(sink.name().to_string());
        Ok(())
    }

    fn subscribe_chat_log(&self, callback: ChatLogCallback) -> Subscription {
        self.register(&self.chat_callbacks, callback)
    }

    fn on_close(&self, callback: CloseCallback) -> Subscription {
        self.register(&self.close_callbacks, callback)
    }

    async fn process_chat(&self, text: &str) -> Result<(), SdkError> {
        if self.is_closed() {
            return Err(SdkError("session is closed".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeSdk {
    pub sessions: Mutex<Vec<Arc<FakeAvatarSession>>>,
    pub fail: AtomicBool,
    /// Simulated connection setup time.
    pub delay: Mutex<Option<Duration>>,
}

impl FakeSdk {
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> Arc<FakeAvatarSession> {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> Arc<FakeAvatarSession> {
        self.sessions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no session created")
    }
}

#[async_trait]
impl AvatarSdk for FakeSdk {
    async fn create_session(
        &self,
        _api_server: &str,
        session_id: &str,
        _width: u32,
        _height: u32,
        _enable_voice: bool,
    ) -> Result<Arc<dyn AvatarSession>, SdkError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SdkError("WebRTC negotiation failed".into()));
        }
        let session = Arc::new(FakeAvatarSession::new(session_id));
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

pub struct FakeVideoSink;

impl VideoSink for FakeVideoSink {
    fn name(&self) -> &str {
        "avatar-video"
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub sdk: Arc<FakeSdk>,
    pub store: Arc<MemorySessionStore>,
    pub events: EventBus,
    pub controller: SessionController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SessionSettings::default())
    }

    pub fn with_settings(settings: SessionSettings) -> Self {
        let backend = Arc::new(FakeBackend::default());
        let sdk = Arc::new(FakeSdk::default());
        let store = Arc::new(MemorySessionStore::new());
        let events = EventBus::default();
        let controller = SessionController::new(
            backend.clone(),
            sdk.clone(),
            store.clone(),
            settings,
            events.clone(),
        );
        controller.attach_video_sink(Arc::new(FakeVideoSink));
        Self {
            backend,
            sdk,
            store,
            events,
            controller,
        }
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }
}

pub fn config() -> SessionConfig {
    SessionConfig {
        llm_type: "azure-gpt-4o".into(),
        tts_type: "yuri".into(),
        stt_type: Some("whisper".into()),
        prompt_id: "plp-275c".into(),
        intro_message: Some("Welcome! Let's begin the interview.".into()),
        ..Default::default()
    }
}

pub fn entry(text: &str, is_user: bool, timestamp: i64) -> ChatLogEntry {
    ChatLogEntry {
        text: text.into(),
        is_user,
        timestamp,
    }
}

/// Let spawned background tasks run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Everything published so far.
pub fn drain(rx: &mut broadcast::Receiver<DomainEvent>) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
