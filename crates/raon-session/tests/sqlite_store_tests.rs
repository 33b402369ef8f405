//! Session continuity across a restart with the SQLite store.

mod common;

use std::sync::Arc;

use common::{config, settle, FakeBackend, FakeSdk, FakeVideoSink};
use raon_core::config::SessionSettings;
use raon_core::events::EventBus;
use raon_session::resolver::{ConfigResolver, ConfigSource};
use raon_session::SessionController;
use raon_storage::{Database, SessionStore, SqliteSessionStore};

fn controller(store: Arc<SqliteSessionStore>, backend: Arc<FakeBackend>) -> SessionController {
    let controller = SessionController::new(
        backend,
        Arc::new(FakeSdk::default()),
        store,
        SessionSettings::default(),
        EventBus::default(),
    );
    controller.attach_video_sink(Arc::new(FakeVideoSink));
    controller
}

#[tokio::test]
async fn test_reload_resumes_persisted_config_and_chat_room() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raon.db");
    let backend = Arc::new(FakeBackend::default());

    {
        let store = Arc::new(SqliteSessionStore::new(Arc::new(Database::new(&path).unwrap())));
        let session = controller(store.clone(), backend.clone());
        session.create_session(config()).await.unwrap();
        session.send_text("hello").await.unwrap();
        settle().await;
        session.shutdown().await;
    }

    let store = Arc::new(SqliteSessionStore::new(Arc::new(Database::new(&path).unwrap())));
    assert_eq!(store.session_id().unwrap().as_deref(), Some("plps-1"));
    assert_eq!(store.cached_messages("plps-1").unwrap().len(), 1);

    let resolved = ConfigResolver::new(store.clone())
        .resolve(ConfigSource::Persisted)
        .unwrap();
    assert_eq!(resolved, config());

    let session = controller(store.clone(), backend.clone());
    session.create_session(resolved).await.unwrap();

    let requests = backend.create_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].previous_chat_room_id, Some(100));
    assert_eq!(store.session_id().unwrap().as_deref(), Some("plps-2"));
}
