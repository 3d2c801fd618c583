//! Keeps the chat list of the signed-in user up to date.
//!
//! The projector is a single task reacting to three event sources: identity
//! transitions, snapshots of the live room query, and completed
//! name-resolution batches. Each batch is tagged with the [`Generation`] it
//! was started under and only publishes if no newer snapshot or subscription
//! has come along in the meantime.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use log::{debug, error, info, warn};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::auth::{AuthState, IdentityWatcher};
use crate::integration::store::{Snapshot, SnapshotStream};
use crate::{chat, integration, user};

use super::model::{ChatListView, ChatRoomDto};

/// Tags a subscription and the snapshots delivered on it. Both counters only
/// grow, so a tag identifies exactly one snapshot over the projector's life.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation {
    subscription: u64,
    snapshot: u64,
}

impl Generation {
    fn next_subscription(self) -> Self {
        Self {
            subscription: self.subscription + 1,
            snapshot: 0,
        }
    }

    fn next_snapshot(self) -> Self {
        Self {
            snapshot: self.snapshot + 1,
            ..self
        }
    }
}

type Batch = BoxFuture<'static, (Generation, Vec<ChatRoomDto>)>;

#[derive(Default)]
struct Signals {
    retry: Notify,
    close: Notify,
}

pub struct ChatListProjector {
    chat_service: chat::Service,
    view: watch::Sender<ChatListView>,
    viewer: Option<user::Sub>,
    stream: Option<SnapshotStream>,
    batches: FuturesUnordered<Batch>,
    latest: Generation,
}

impl ChatListProjector {
    /// Starts projecting for whoever `watcher` reports. The task owns the
    /// watcher and stops when the handle is closed or dropped, or when the
    /// identity source goes away.
    pub fn spawn(watcher: IdentityWatcher, chat_service: chat::Service) -> ProjectorHandle {
        let (view, rx) = watch::channel(ChatListView::loading());
        let signals = Arc::new(Signals::default());

        let projector = Self {
            chat_service,
            view,
            viewer: None,
            stream: None,
            batches: FuturesUnordered::new(),
            latest: Generation::default(),
        };

        let task = tokio::spawn(projector.run(watcher, signals.clone()));

        ProjectorHandle {
            view: rx,
            signals,
            task,
        }
    }

    async fn run(mut self, watcher: IdentityWatcher, signals: Arc<Signals>) {
        let mut identity = watcher.subscribe();
        let initial = identity.borrow_and_update().clone();
        self.on_identity(initial).await;

        loop {
            tokio::select! {
                _ = signals.close.notified() => break,

                changed = identity.changed() => {
                    if changed.is_err() {
                        debug!("identity source closed");
                        break;
                    }
                    let state = identity.borrow_and_update().clone();
                    self.on_identity(state).await;
                },

                _ = signals.retry.notified() => self.retry().await,

                item = next_snapshot(&mut self.stream) => self.on_snapshot(item),

                Some((generation, rooms)) = self.batches.next(), if !self.batches.is_empty() => {
                    self.publish(generation, rooms);
                },
            }
        }

        self.cancel();
        debug!("chat list projector stopped");
    }

    async fn on_identity(&mut self, state: AuthState) {
        match state {
            AuthState::Unknown => {
                self.view.send_if_modified(|view| {
                    let modified = !view.is_loading;
                    view.is_loading = true;
                    modified
                });
            }
            AuthState::Absent => {
                self.cancel();
                self.viewer = None;
                self.view.send_replace(ChatListView::signed_out());
            }
            AuthState::Present(sub) => {
                if self.viewer.as_ref() == Some(&sub) && self.stream.is_some() {
                    return;
                }
                self.viewer = Some(sub.clone());
                self.open(sub).await;
            }
        }
    }

    async fn retry(&mut self) {
        match self.viewer.clone() {
            Some(sub) if self.stream.is_none() => {
                info!("retrying chat subscription for {sub}");
                self.open(sub).await;
            }
            Some(_) => debug!("chat subscription is alive, nothing to retry"),
            None => debug!("no signed-in user, nothing to retry"),
        }
    }

    /// Drops the live query and abandons in-flight batches.
    fn cancel(&mut self) {
        if self.stream.take().is_some() {
            debug!("chat subscription {} cancelled", self.latest.subscription);
        }
        self.batches = FuturesUnordered::new();
        self.latest = self.latest.next_subscription();
    }

    /// Replaces any live query with a fresh one for `sub`. The previous
    /// stream is dropped before the new one is requested.
    async fn open(&mut self, sub: user::Sub) {
        self.cancel();
        self.view.send_replace(ChatListView::loading());

        match self.chat_service.subscribe(&sub).await {
            Ok(stream) => {
                info!(
                    "chat subscription {} opened for {sub}",
                    self.latest.subscription
                );
                self.stream = Some(stream);
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_snapshot(&mut self, item: Option<integration::Result<Snapshot>>) {
        match item {
            Some(Ok(snapshot)) => {
                let Some(viewer) = self.viewer.clone() else {
                    return;
                };

                self.latest = self.latest.next_snapshot();
                let generation = self.latest;
                debug!("snapshot {generation:?} with {} chats", snapshot.len());

                let chat_service = self.chat_service.clone();
                self.batches.push(Box::pin(async move {
                    let rooms = chat_service.project(snapshot, &viewer).await;
                    (generation, rooms)
                }));
            }
            Some(Err(e)) => self.fail(chat::Error::from(e)),
            None => {
                warn!("chat subscription {} ended", self.latest.subscription);
                self.fail(chat::Error::from(integration::Error::Subscription(
                    "live query ended".into(),
                )));
            }
        }
    }

    fn fail(&mut self, e: chat::Error) {
        error!("failed to fetch chat rooms: {e}");
        self.cancel();
        self.view.send_replace(ChatListView::failed(e.to_string()));
    }

    fn publish(&mut self, generation: Generation, mut rooms: Vec<ChatRoomDto>) {
        if generation != self.latest {
            debug!(
                "discarding stale batch {generation:?}, latest is {:?}",
                self.latest
            );
            return;
        }

        {
            let previous = self.view.borrow();
            for room in rooms.iter_mut().filter(|r| r.is_pending()) {
                if let Some(before) = previous.rooms.iter().find(|p| p.id() == room.id()) {
                    room.keep_pending_time(before);
                }
            }
        }

        debug!("publishing {} chats from {generation:?}", rooms.len());
        self.view.send_replace(ChatListView::loaded(rooms));
    }
}

async fn next_snapshot(
    stream: &mut Option<SnapshotStream>,
) -> Option<integration::Result<Snapshot>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Consumer side of a running [`ChatListProjector`].
pub struct ProjectorHandle {
    view: watch::Receiver<ChatListView>,
    signals: Arc<Signals>,
    task: JoinHandle<()>,
}

impl ProjectorHandle {
    pub fn view(&self) -> watch::Receiver<ChatListView> {
        self.view.clone()
    }

    pub fn current(&self) -> ChatListView {
        self.view.borrow().clone()
    }

    /// Re-opens the subscription after it failed. No-op while one is alive.
    pub fn retry(&self) {
        self.signals.retry.notify_one();
    }

    pub async fn close(mut self) {
        self.signals.close.notify_one();
        if let Err(e) = (&mut self.task).await {
            error!("chat list projector panicked: {e}");
        }
    }
}

impl Drop for ProjectorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
