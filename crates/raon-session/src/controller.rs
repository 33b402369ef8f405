//! Streaming session lifecycle controller.
//!
//! Owns the one live `AvatarSession`, its callback subscriptions, the
//! reconnect timer, and the chat log reconciler. State lives behind a
//! `std::sync::Mutex` that is never held across an `.await`.
//!
//! Every creation, close, and shutdown bumps a generation counter. SDK
//! callbacks and in-flight creations carry the generation they started
//! with and are discarded once it is stale.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use raon_core::config::SessionSettings;
use raon_core::error::RaonError;
use raon_core::events::{DomainEvent, EventBus};
use raon_core::types::{
    ChatLogEntry, DisplayMessage, RestoredMessage, SessionConfig, SessionState, Timestamp,
};
use raon_storage::SessionStore;
use raon_voice::TranscriptSink;

use crate::backend::{Backend, CreateSessionRequest, StoredMessage};
use crate::error::SessionError;
use crate::persistence::{spawn_detached, PersistenceBridge};
use crate::reconciler::ChatLogReconciler;
use crate::resolver;
use crate::sdk::{AvatarSdk, AvatarSession, Subscription, VideoSink};

/// Who asked for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    Reconnect,
}

struct ControllerState {
    lifecycle: SessionState,
    generation: u64,
    handle: Option<Arc<dyn AvatarSession>>,
    subscriptions: Vec<Subscription>,
    video_sink: Option<Arc<dyn VideoSink>>,
    session_id: Option<String>,
    config: Option<SessionConfig>,
    reconciler: ChatLogReconciler,
    display: Vec<DisplayMessage>,
    reconnect_task: Option<JoinHandle<()>>,
    reconnect_attempts: u32,
    shut_down: bool,
}

struct Inner {
    backend: Arc<dyn Backend>,
    sdk: Arc<dyn AvatarSdk>,
    store: Arc<dyn SessionStore>,
    persistence: PersistenceBridge,
    settings: SessionSettings,
    events: EventBus,
    runtime: Option<Handle>,
    state: Mutex<ControllerState>,
}

/// Cheaply cloneable handle to the session lifecycle.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn Backend>,
        sdk: Arc<dyn AvatarSdk>,
        store: Arc<dyn SessionStore>,
        settings: SessionSettings,
        events: EventBus,
    ) -> Self {
        let reconciler = ChatLogReconciler::new(settings.default_intro_message.clone());
        let display = reconciler.initial_display();
        let persistence = PersistenceBridge::new(backend.clone(), store.clone());

        Self {
            inner: Arc::new(Inner {
                backend,
                sdk,
                store,
                persistence,
                settings,
                events,
                runtime: Handle::try_current().ok(),
                state: Mutex::new(ControllerState {
                    lifecycle: SessionState::Idle,
                    generation: 0,
                    handle: None,
                    subscriptions: Vec::new(),
                    video_sink: None,
                    session_id: None,
                    config: None,
                    reconciler,
                    display,
                    reconnect_task: None,
                    reconnect_attempts: 0,
                    shut_down: false,
                }),
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.lock().lifecycle
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }

    pub fn config(&self) -> Option<SessionConfig> {
        self.lock().config.clone()
    }

    /// The reconciled message list as last published.
    pub fn display_messages(&self) -> Vec<DisplayMessage> {
        self.lock().display.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.inner.events.subscribe()
    }

    /// Mount the video element sessions render into.
    pub fn attach_video_sink(&self, sink: Arc<dyn VideoSink>) {
        tracing::debug!(sink = sink.name(), "Video sink attached");
        self.lock().video_sink = Some(sink);
    }

    pub fn detach_video_sink(&self) {
        self.lock().video_sink = None;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a streaming session, superseding the active one if any.
    pub async fn create_session(&self, config: SessionConfig) -> Result<(), SessionError> {
        self.create(config, Origin::User).await
    }

    async fn create(&self, config: SessionConfig, origin: Origin) -> Result<(), SessionError> {
        if let Err(e) = resolver::validate(&config) {
            let err = SessionError::from(e);
            self.notify_failure(&err);
            return Err(err);
        }

        let (generation, sink, superseded, old_subscriptions) = {
            let mut st = self.lock();
            if st.shut_down {
                return Err(SessionError::ShutDown);
            }
            if st.lifecycle == SessionState::Creating {
                return Err(SessionError::AlreadyCreating);
            }

            let Some(sink) = st.video_sink.clone() else {
                if st.lifecycle == SessionState::Reconnecting {
                    self.abort_reconnect(&mut st);
                    self.set_state(&mut st, SessionState::Idle);
                }
                drop(st);
                let err = SessionError::Creation("no video sink is mounted".into());
                tracing::error!(error = %err, "Session creation aborted");
                self.notify_failure(&err);
                return Err(err);
            };

            st.generation += 1;
            self.abort_reconnect(&mut st);
            if origin == Origin::User {
                st.reconnect_attempts = 0;
            }
            let superseded = st.handle.take();
            let old_subscriptions = std::mem::take(&mut st.subscriptions);
            st.session_id = None;
            st.config = Some(config.clone());
            let intro = config
                .intro_message
                .clone()
                .unwrap_or_else(|| self.inner.settings.default_intro_message.clone());
            st.reconciler.reset(intro);
            st.display = st.reconciler.initial_display();
            self.set_state(&mut st, SessionState::Creating);
            (st.generation, sink, superseded, old_subscriptions)
        };

        // Old callbacks go away before the old handle is closed or a new
        // one is subscribed.
        drop(old_subscriptions);
        if let Some(old) = superseded {
            tracing::info!("Closing superseded avatar session");
            old.close().await;
        }

        match self.run_creation(generation, &config, sink).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail_creation(generation, &e);
                Err(e)
            }
        }
    }

    async fn run_creation(
        &self,
        generation: u64,
        config: &SessionConfig,
        sink: Arc<dyn VideoSink>,
    ) -> Result<(), SessionError> {
        let inner = &self.inner;

        // Step 1: credentials and backend session.
        let credentials = resolver::fetch_credentials(inner.backend.as_ref()).await?;
        let previous_chat_room_id = inner.store.chat_room_id().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read chat room id");
            None
        });
        let previous_session_id = inner.store.session_id().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read previous session id");
            None
        });
        let request = CreateSessionRequest::from_config(config, previous_chat_room_id);
        let created = inner.backend.create_session(&request).await?;
        tracing::info!(
            session_id = %created.session_id,
            chat_room_id = ?created.chat_room_id,
            "Backend session created"
        );

        if !self.is_current(generation) {
            self.terminate_detached(created.session_id.clone());
            return Err(SessionError::Creation("superseded while creating".into()));
        }

        // Step 2: persist for reload and context continuity.
        warn_on_err("session id", inner.store.set_session_id(&created.session_id));
        if let Some(chat_room_id) = created.chat_room_id {
            warn_on_err("chat room id", inner.store.set_chat_room_id(chat_room_id));
        }
        warn_on_err("session config", inner.store.save_config(config));

        // Step 3: restored history, once per creation.
        let history = self
            .load_history(previous_chat_room_id, previous_session_id.as_deref())
            .await;

        // Step 4: streaming session.
        let settings = &inner.settings;
        let handle = inner
            .sdk
            .create_session(
                &credentials.api_server,
                &created.session_id,
                settings.video_width,
                settings.video_height,
                settings.enable_voice,
            )
            .await?;

        // Step 5: drop the handle if a close or shutdown happened meanwhile.
        let messages = {
            let mut st = self.lock();
            if st.generation != generation || st.shut_down {
                None
            } else {
                st.session_id = Some(created.session_id.clone());
                st.reconciler.restore(history);
                st.display = st.reconciler.initial_display();
                Some(st.display.clone())
            }
        };
        let Some(messages) = messages else {
            tracing::info!(session_id = %created.session_id, "Discarding abandoned session");
            handle.close().await;
            return Err(SessionError::Creation("abandoned while creating".into()));
        };
        self.publish_messages(messages);

        // Step 6: attach to the video sink.
        if let Err(e) = handle.set_src(sink.as_ref()) {
            handle.close().await;
            return Err(e.into());
        }

        // Step 7: subscribe, bound to this generation.
        let weak = Arc::downgrade(&self.inner);
        let chat_subscription = handle.subscribe_chat_log(Box::new(move |entries| {
            if let Some(controller) = Self::from_weak(&weak) {
                controller.on_chat_log(generation, entries);
            }
        }));
        let weak = Arc::downgrade(&self.inner);
        let close_subscription = handle.on_close(Box::new(move |manual| {
            if let Some(controller) = Self::from_weak(&weak) {
                controller.on_close(generation, manual);
            }
        }));

        // Step 8: go live.
        let activated = {
            let mut st = self.lock();
            if st.generation != generation || st.shut_down {
                false
            } else {
                st.handle = Some(handle.clone());
                st.subscriptions = vec![chat_subscription, close_subscription];
                self.set_state(&mut st, SessionState::Active);
                true
            }
        };
        if !activated {
            handle.close().await;
            return Err(SessionError::Creation("abandoned while creating".into()));
        }

        tracing::info!(session_id = %created.session_id, "Avatar session active");
        inner.events.publish(DomainEvent::SessionCreated {
            session_id: created.session_id,
            chat_room_id: created.chat_room_id,
            timestamp: Timestamp::now(),
        });
        Ok(())
    }

    /// History of the previous chat room, or of the previous session when
    /// only that is known. Falls back to the local message cache.
    async fn load_history(
        &self,
        chat_room_id: Option<i64>,
        session_id: Option<&str>,
    ) -> Vec<RestoredMessage> {
        let backend = &self.inner.backend;
        let fetched = match (chat_room_id, session_id) {
            (Some(id), _) => backend.chat_room_messages(id).await,
            (None, Some(id)) => backend.session_messages(id).await,
            (None, None) => return Vec::new(),
        };

        match fetched {
            Ok(rows) => rows.iter().map(StoredMessage::to_restored).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load previous messages");
                session_id
                    .and_then(|id| self.inner.store.cached_messages(id).ok())
                    .unwrap_or_default()
            }
        }
    }

    fn fail_creation(&self, generation: u64, error: &SessionError) {
        let current = {
            let mut st = self.lock();
            if st.generation == generation && st.lifecycle == SessionState::Creating {
                st.session_id = None;
                self.set_state(&mut st, SessionState::Idle);
                true
            } else {
                false
            }
        };
        if current {
            tracing::error!(error = %error, "Session creation failed");
            self.notify_failure(error);
        } else {
            tracing::debug!(error = %error, "Stale session creation ended");
        }
    }

    /// Manual close. Ends in `Idle` with no reconnect.
    pub async fn close(&self) {
        let (handle, subscriptions, session_id) = {
            let mut st = self.lock();
            st.generation += 1;
            self.abort_reconnect(&mut st);
            st.reconnect_attempts = 0;
            let handle = st.handle.take();
            let subscriptions = std::mem::take(&mut st.subscriptions);
            let session_id = st.session_id.take();
            st.config = None;
            let intro = self.inner.settings.default_intro_message.clone();
            st.reconciler.reset(intro);
            st.display = st.reconciler.initial_display();
            self.set_state(&mut st, SessionState::Idle);
            (handle, subscriptions, session_id)
        };

        drop(subscriptions);
        if let Some(handle) = handle {
            handle.close().await;
        }

        let store = &self.inner.store;
        let session_id = session_id.or_else(|| store.session_id().ok().flatten());
        if let Some(id) = &session_id {
            if let Err(e) = self.inner.backend.terminate_session(id).await {
                tracing::warn!(session_id = %id, error = %e, "Failed to terminate session");
            }
            warn_on_err("message cache", store.clear_cached_messages(id));
        }
        warn_on_err("session id", store.clear_session_id());
        warn_on_err("session config", store.clear_config());

        tracing::info!(session_id = ?session_id, "Session closed");
        self.inner.events.publish(DomainEvent::SessionClosed {
            session_id,
            manual: true,
            timestamp: Timestamp::now(),
        });
        self.publish_messages(self.display_messages());
    }

    /// Teardown without touching persisted state, for when the owner goes
    /// away. Any creation still in flight is discarded.
    pub async fn shutdown(&self) {
        let (handle, subscriptions) = {
            let mut st = self.lock();
            st.shut_down = true;
            st.generation += 1;
            self.abort_reconnect(&mut st);
            let handle = st.handle.take();
            let subscriptions = std::mem::take(&mut st.subscriptions);
            self.set_state(&mut st, SessionState::Idle);
            (handle, subscriptions)
        };

        drop(subscriptions);
        if let Some(handle) = handle {
            handle.close().await;
        }
        tracing::info!("Session controller shut down");
    }

    /// Send typed or transcribed text to the avatar.
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let (handle, session_id) = {
            let st = self.lock();
            match (st.lifecycle, &st.handle, &st.session_id) {
                (SessionState::Active, Some(handle), Some(id)) => (handle.clone(), id.clone()),
                _ => return Err(SessionError::NotActive),
            }
        };

        handle.process_chat(text).await?;
        self.inner.persistence.save_user_message(&session_id, text);
        Ok(())
    }

    // =========================================================================
    // SDK callbacks
    // =========================================================================

    fn on_chat_log(&self, generation: u64, entries: Vec<ChatLogEntry>) {
        let (reconciliation, session_id) = {
            let mut st = self.lock();
            if st.generation != generation {
                tracing::debug!("Ignoring chat log from a stale session");
                return;
            }
            let reconciliation = st.reconciler.reconcile(&entries);
            st.display = reconciliation.messages.clone();
            (reconciliation, st.session_id.clone())
        };

        if let Some(id) = session_id {
            for text in &reconciliation.new_assistant_messages {
                self.inner.persistence.save_assistant_message(&id, text);
            }
        }
        self.publish_messages(reconciliation.messages);
    }

    fn on_close(&self, generation: u64, manual: bool) {
        let mut st = self.lock();
        if st.generation != generation {
            tracing::debug!("Ignoring close from a stale session");
            return;
        }
        if manual || st.lifecycle != SessionState::Active {
            return;
        }

        tracing::warn!(session_id = ?st.session_id, "Avatar session closed unexpectedly");
        st.handle = None;
        let subscriptions = std::mem::take(&mut st.subscriptions);
        let session_id = st.session_id.clone();
        self.schedule_reconnect(&mut st);
        drop(st);

        drop(subscriptions);
        self.inner.events.publish(DomainEvent::SessionClosed {
            session_id,
            manual: false,
            timestamp: Timestamp::now(),
        });
    }

    // =========================================================================
    // Reconnect
    // =========================================================================

    fn schedule_reconnect(&self, st: &mut ControllerState) {
        if st.reconnect_task.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::debug!("Reconnect already pending");
            return;
        }

        st.reconnect_attempts += 1;
        let attempt = st.reconnect_attempts;
        if let Some(max) = self.inner.settings.max_reconnect_attempts {
            if attempt > max {
                tracing::error!(max, "Reconnect attempts exhausted");
                self.set_state(st, SessionState::Idle);
                self.inner.events.publish(DomainEvent::SessionFailed {
                    message: format!("Connection lost after {} reconnect attempts", max),
                    timestamp: Timestamp::now(),
                });
                return;
            }
        }

        self.set_state(st, SessionState::Reconnecting);
        let delay = self.inner.settings.reconnect_delay();
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        self.inner.events.publish(DomainEvent::Reconnecting {
            attempt,
            delay_ms: delay.as_millis() as u64,
            timestamp: Timestamp::now(),
        });

        let generation = st.generation;
        let weak = Arc::downgrade(&self.inner);
        st.reconnect_task = spawn_detached(self.inner.runtime.as_ref(), async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = Self::from_weak(&weak) {
                controller.reconnect(generation).await;
            }
        });
    }

    async fn reconnect(&self, generation: u64) {
        let config = {
            let mut st = self.lock();
            if st.generation != generation || st.lifecycle != SessionState::Reconnecting {
                return;
            }
            // Detach our own handle so create() does not abort this task.
            st.reconnect_task = None;
            match st.config.clone() {
                Some(config) => config,
                None => {
                    self.set_state(&mut st, SessionState::Idle);
                    return;
                }
            }
        };

        tracing::info!("Reconnecting avatar session");
        if let Err(e) = self.create(config, Origin::Reconnect).await {
            tracing::warn!(error = %e, "Reconnect failed");
        }
    }

    fn abort_reconnect(&self, st: &mut ControllerState) {
        if let Some(task) = st.reconnect_task.take() {
            tracing::debug!("Cancelling pending reconnect");
            task.abort();
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn is_current(&self, generation: u64) -> bool {
        let st = self.lock();
        st.generation == generation && !st.shut_down
    }

    fn set_state(&self, st: &mut ControllerState, to: SessionState) {
        let from = st.lifecycle;
        if from == to {
            return;
        }
        if !from.can_transition_to(&to) {
            tracing::warn!(%from, %to, "Unexpected session state transition");
        }
        tracing::debug!("Session state: {} -> {}", from, to);
        st.lifecycle = to;
        self.inner.events.publish(DomainEvent::SessionStateChanged {
            from,
            to,
            timestamp: Timestamp::now(),
        });
    }

    fn publish_messages(&self, messages: Vec<DisplayMessage>) {
        self.inner.events.publish(DomainEvent::MessagesUpdated {
            messages,
            timestamp: Timestamp::now(),
        });
    }

    fn notify_failure(&self, error: &SessionError) {
        self.inner.events.publish(DomainEvent::SessionFailed {
            message: error.to_string(),
            timestamp: Timestamp::now(),
        });
    }

    fn terminate_detached(&self, session_id: String) {
        let backend = self.inner.backend.clone();
        spawn_detached(self.inner.runtime.as_ref(), async move {
            if let Err(e) = backend.terminate_session(&session_id).await {
                tracing::warn!(%session_id, error = %e, "Failed to terminate abandoned session");
            }
        });
    }
}

fn warn_on_err(what: &str, result: Result<(), RaonError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to update persisted {}", what);
    }
}

#[async_trait]
impl TranscriptSink for SessionController {
    fn accepts_input(&self) -> bool {
        self.state() == SessionState::Active
    }

    async fn send_text(&self, text: &str) -> Result<(), RaonError> {
        SessionController::send_text(self, text)
            .await
            .map_err(RaonError::from)
    }
}
