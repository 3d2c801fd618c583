#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};

use campus_chat::chat;
use campus_chat::chat::model::ChatListView;
use campus_chat::chat::service::ChatServiceImpl;
use campus_chat::integration::store::{
    Document, DocumentStore, Fields, Filter, InMemoryStore, OrderBy, Snapshot, SnapshotStream,
    Store,
};
use campus_chat::integration::{self, Error};
use campus_chat::user::service::UserServiceImpl;

pub const T1: i64 = 1_700_000_000_000;
pub const T2: i64 = T1 + 60_000;
pub const T3: i64 = T2 + 60_000;

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(fields) => fields,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn chat_doc(id: &str, users: &[&str], last_message: &str, timestamp: i64) -> Document {
    Document::new(
        id,
        fields(json!({ "users": users, "lastMessage": last_message, "timestamp": timestamp })),
    )
}

/// u1 chats with u2 (newer) and u3 (older); u2 and u3 also chat.
pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    for (id, name) in [("u1", "Minsu"), ("u2", "Younghee"), ("u3", "Jihoon")] {
        store.put("users", id, fields(json!({ "name": name }))).await;
    }
    for doc in [
        chat_doc("u1_u2", &["u1", "u2"], "see you at the library", T2),
        chat_doc("u1_u3", &["u1", "u3"], "taxi at 6?", T1),
        chat_doc("u2_u3", &["u2", "u3"], "thanks!", T3),
    ] {
        store.put("chats", doc.id(), doc.fields().clone()).await;
    }
    store
}

pub fn chat_service(store: Store) -> chat::Service {
    let user_service = Arc::new(UserServiceImpl::new(store.clone()));
    Arc::new(ChatServiceImpl::new(store, user_service))
}

pub async fn wait_for(
    view: &mut watch::Receiver<ChatListView>,
    predicate: impl FnMut(&ChatListView) -> bool,
) -> ChatListView {
    tokio::time::timeout(Duration::from_secs(30), view.wait_for(predicate))
        .await
        .expect("timed out waiting for chat list")
        .expect("projector stopped")
        .clone()
}

pub fn loaded(view: &ChatListView) -> bool {
    !view.is_loading && view.error.is_none()
}

pub fn ids(view: &ChatListView) -> Vec<String> {
    view.rooms.iter().map(|r| r.id().to_string()).collect()
}

pub fn names(view: &ChatListView) -> Vec<String> {
    view.rooms
        .iter()
        .map(|r| r.counterpart_name().to_owned())
        .collect()
}

/// Lets the runtime go idle so queued events get processed.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Collects every view the projector publishes.
pub fn record(mut view: watch::Receiver<ChatListView>) -> Arc<Mutex<Vec<ChatListView>>> {
    let seen = Arc::new(Mutex::new(vec![view.borrow_and_update().clone()]));
    let sink = seen.clone();
    tokio::spawn(async move {
        while view.changed().await.is_ok() {
            let current = view.borrow_and_update().clone();
            sink.lock().unwrap().push(current);
        }
    });
    seen
}

/// Store whose live query delivers exactly the snapshots a test pushes,
/// while point reads go to a regular [`InMemoryStore`].
pub struct ScriptedStore {
    snapshots: Mutex<Option<mpsc::UnboundedReceiver<integration::Result<Snapshot>>>>,
    documents: InMemoryStore,
}

impl ScriptedStore {
    pub fn new(
        documents: InMemoryStore,
    ) -> (Self, mpsc::UnboundedSender<integration::Result<Snapshot>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Self {
            snapshots: Mutex::new(Some(rx)),
            documents,
        };
        (store, tx)
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn subscribe(
        &self,
        _collection: &str,
        _filter: Filter,
        _order: OrderBy,
    ) -> integration::Result<SnapshotStream> {
        let Some(mut rx) = self.snapshots.lock().unwrap().take() else {
            return Err(Error::Subscription("script already consumed".into()));
        };

        Ok(Box::pin(async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }))
    }

    async fn find(&self, collection: &str, filter: Filter) -> integration::Result<Vec<Document>> {
        self.documents.find(collection, filter).await
    }

    async fn get(&self, collection: &str, id: &str) -> integration::Result<Option<Document>> {
        self.documents.get(collection, id).await
    }
}
