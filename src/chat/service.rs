use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, warn};

use crate::integration::store::{Filter, OrderBy, Snapshot, SnapshotStream, Store};
use crate::user::{self, UNKNOWN_USER};

use super::CHATS_COLLECTION;
use super::model::{ChatRoom, ChatRoomDto};

#[async_trait]
pub trait ChatService {
    /// Live query of the rooms `viewer` belongs to, newest activity first.
    async fn subscribe(&self, viewer: &user::Sub) -> super::Result<SnapshotStream>;

    /// Turns one snapshot into list rows, preserving snapshot order.
    /// Never fails: bad rows are skipped or labelled, not propagated.
    async fn project(&self, snapshot: Snapshot, viewer: &user::Sub) -> Vec<ChatRoomDto>;
}

#[derive(Clone)]
pub struct ChatServiceImpl {
    store: Store,
    user_service: user::Service,
}

impl ChatServiceImpl {
    pub fn new(store: Store, user_service: user::Service) -> Self {
        Self {
            store,
            user_service,
        }
    }
}

#[async_trait]
impl ChatService for ChatServiceImpl {
    async fn subscribe(&self, viewer: &user::Sub) -> super::Result<SnapshotStream> {
        let stream = self
            .store
            .subscribe(
                CHATS_COLLECTION,
                Filter::array_contains("users", viewer),
                OrderBy::desc("timestamp"),
            )
            .await?;

        Ok(stream)
    }

    async fn project(&self, snapshot: Snapshot, viewer: &user::Sub) -> Vec<ChatRoomDto> {
        let now = Utc::now();
        debug!("projecting {} chats for {viewer}", snapshot.len());

        let rooms = snapshot
            .docs()
            .iter()
            .filter_map(|doc| match ChatRoom::try_from(doc) {
                Ok(room) => Some(room),
                Err(e) => {
                    warn!("skipping chat document: {e}");
                    None
                }
            })
            .filter(|room| {
                let member = room.includes(viewer);
                if !member {
                    warn!("skipping chat {}: {viewer} is not a member", room.id());
                }
                member
            })
            .collect::<Vec<_>>();

        join_all(
            rooms
                .into_iter()
                .map(|room| async move { self.chat_to_dto(room, viewer, now).await }),
        )
        .await
    }
}

impl ChatServiceImpl {
    async fn chat_to_dto(&self, room: ChatRoom, viewer: &user::Sub, now: DateTime<Utc>) -> ChatRoomDto {
        let name = match room.counterpart(viewer) {
            Some(counterpart) => self.resolve_name(counterpart).await,
            None => {
                warn!(
                    "chat {} has no counterpart for {viewer}, members: {:?}",
                    room.id(),
                    room.members()
                );
                UNKNOWN_USER.to_owned()
            }
        };

        ChatRoomDto::new(room, name, now)
    }

    async fn resolve_name(&self, sub: &user::Sub) -> String {
        match self.user_service.find_user_info(sub).await {
            Ok(info) => info
                .display_name()
                .map(str::to_owned)
                .unwrap_or_else(|| UNKNOWN_USER.to_owned()),
            Err(user::Error::NotFound(_)) => {
                warn!("user document not found for {sub}");
                UNKNOWN_USER.to_owned()
            }
            Err(e) => {
                warn!("failed to resolve name of {sub}: {e}");
                UNKNOWN_USER.to_owned()
            }
        }
    }
}
