//! Avatar streaming SDK seam.
//!
//! The SDK hands out one `AvatarSession` per streaming session. Callbacks
//! registered on it return a `Subscription` that unregisters them when
//! disposed or dropped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use raon_core::types::ChatLogEntry;

/// Error reported by the avatar SDK.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SdkError(pub String);

/// Full-replace chat log push.
pub type ChatLogCallback = Box<dyn Fn(Vec<ChatLogEntry>) + Send + Sync>;

/// Close notification; the flag is `true` when the close was requested by us.
pub type CloseCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Disposer for a registered callback.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn noop() -> Self {
        Self { dispose: None }
    }

    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// The video element the avatar stream renders into.
pub trait VideoSink: Send + Sync {
    fn name(&self) -> &str;
}

/// One live streaming session.
#[async_trait]
pub trait AvatarSession: Send + Sync {
    /// Attach the stream to a video sink.
    fn set_src(&self, sink: &dyn VideoSink) -> Result<(), SdkError>;

    fn subscribe_chat_log(&self, callback: ChatLogCallback) -> Subscription;

    fn on_close(&self, callback: CloseCallback) -> Subscription;

    /// Send user text to the LLM; the reply arrives through the chat log.
    async fn process_chat(&self, text: &str) -> Result<(), SdkError>;

    async fn close(&self);
}

/// Factory for streaming sessions.
#[async_trait]
pub trait AvatarSdk: Send + Sync {
    async fn create_session(
        &self,
        api_server: &str,
        session_id: &str,
        width: u32,
        height: u32,
        enable_voice: bool,
    ) -> Result<Arc<dyn AvatarSession>, SdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscription_disposes_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_disposes_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let c = count.clone();
            let _subs = vec![
                Subscription::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
                Subscription::noop(),
            ];
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
