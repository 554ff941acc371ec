use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use services::{PersistenceGateway, SyncEvent, SyncTarget};
use storage::repository::{DocumentStore, InMemoryRepository, LocalStore, Storage, StorageError};
use study_core::model::{AnswerKey, Library, Test, TestId, UserId};

#[derive(Default)]
struct RecordingStore {
    writes: Mutex<Vec<String>>,
    latency: Duration,
    offline: bool,
}

impl RecordingStore {
    fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalStore for RecordingStore {
    async fn get(&self, _namespace: &str) -> Result<Option<String>, StorageError> {
        Ok(self.writes.lock().unwrap().last().cloned())
    }

    async fn set(&self, _namespace: &str, value: &str) -> Result<(), StorageError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline {
            return Err(StorageError::Connection("offline".into()));
        }
        self.writes.lock().unwrap().push(value.to_owned());
        Ok(())
    }

    async fn remove(&self, _namespace: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

fn gateway_over(store: &Arc<RecordingStore>) -> PersistenceGateway {
    let storage = Storage {
        documents: Arc::new(InMemoryRepository::new()),
        local: store.clone(),
    };
    PersistenceGateway::new(&storage, Duration::from_millis(500))
}

fn library_of(n: usize) -> Library {
    let key = AnswerKey::parse(r#"{"A": {"type": "single", "answers": ["B"]}}"#).unwrap();
    (0..n)
        .map(|i| Test::new(TestId::new(format!("test_{i}")), "T", "", key.clone(), 0))
        .collect()
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

#[tokio::test(start_paused = true)]
async fn burst_of_saves_writes_only_the_last_library() {
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway_over(&store);

    for n in 1..=3 {
        gateway.schedule(&library_of(n));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(store.writes().is_empty());
    assert!(gateway.has_pending());

    tokio::time::sleep(Duration::from_millis(600)).await;

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(Library::from_json(&writes[0]).unwrap().len(), 3);
    assert!(!gateway.has_pending());
}

#[tokio::test(start_paused = true)]
async fn firing_during_a_write_is_skipped_not_queued() {
    let store = Arc::new(RecordingStore {
        latency: Duration::from_secs(2),
        ..RecordingStore::default()
    });
    let gateway = gateway_over(&store);
    let mut events = gateway.subscribe();

    gateway.schedule(&library_of(1));
    tokio::time::sleep(Duration::from_millis(600)).await;
    // first write is now in flight until t = 2.5s
    gateway.schedule(&library_of(2));
    tokio::time::sleep(Duration::from_secs(3)).await;

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(Library::from_json(&writes[0]).unwrap().len(), 1);
    assert_eq!(drain(&mut events), vec![SyncEvent::Skipped, SyncEvent::SavedLocal]);

    // the flag is released once the slow write finishes
    gateway.schedule(&library_of(2));
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failures_are_published_not_returned() {
    let store = Arc::new(RecordingStore {
        offline: true,
        ..RecordingStore::default()
    });
    let gateway = gateway_over(&store);
    let mut events = gateway.subscribe();

    gateway.schedule(&library_of(1));
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(
        drain(&mut events),
        vec![SyncEvent::Failed("connection error: offline".into())]
    );
    assert!(matches!(gateway.flush(&library_of(1)).await, SyncEvent::Failed(_)));
}

#[tokio::test(start_paused = true)]
async fn flush_cancels_the_armed_save() {
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway_over(&store);

    gateway.schedule(&library_of(1));
    assert_eq!(gateway.flush(&library_of(2)).await, SyncEvent::SavedLocal);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(Library::from_json(&writes[0]).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn flush_waits_for_the_write_in_flight() {
    let store = Arc::new(RecordingStore {
        latency: Duration::from_secs(2),
        ..RecordingStore::default()
    });
    let gateway = gateway_over(&store);
    let mut events = gateway.subscribe();

    gateway.schedule(&library_of(1));
    tokio::time::sleep(Duration::from_millis(600)).await;
    // the debounced write holds the store until t = 2.5s
    assert_eq!(gateway.flush(&library_of(2)).await, SyncEvent::SavedLocal);

    let sizes: Vec<usize> = store
        .writes()
        .iter()
        .map(|raw| Library::from_json(raw).unwrap().len())
        .collect();
    assert_eq!(sizes, vec![1, 2]);
    assert_eq!(drain(&mut events), vec![SyncEvent::SavedLocal, SyncEvent::SavedLocal]);
}

#[tokio::test(start_paused = true)]
async fn remote_target_writes_the_user_document() {
    let repo = InMemoryRepository::new();
    let storage = Storage {
        documents: Arc::new(repo.clone()),
        local: Arc::new(repo.clone()),
    };
    let gateway = PersistenceGateway::new(&storage, Duration::from_millis(500));
    let user = UserId::new("uid-7");
    gateway.set_target(SyncTarget::Remote {
        user: user.clone(),
        email: Some("me@example.com".into()),
    });

    gateway.schedule(&library_of(2));
    // the armed save keeps the target it was scheduled with
    gateway.set_target(SyncTarget::Local);
    tokio::time::sleep(Duration::from_millis(600)).await;

    let doc = repo.load_document(&user).await.unwrap().unwrap();
    assert_eq!(doc.library.len(), 2);
    assert_eq!(doc.email.as_deref(), Some("me@example.com"));
    assert!(repo.get(storage::namespaces::LIBRARY).await.unwrap().is_none());
}
