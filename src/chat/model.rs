use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::integration::store::Document;
use crate::user;

use super::{Id, NO_MESSAGES, Route};

#[derive(Deserialize)]
struct ChatFields {
    #[serde(default)]
    users: Vec<user::Sub>,
    #[serde(rename = "lastMessage", default)]
    last_message: Option<String>,
    /// Epoch milliseconds; null until the server has stamped the write.
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRoom {
    id: Id,
    members: Vec<user::Sub>,
    last_message: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl ChatRoom {
    pub fn new(
        id: Id,
        members: Vec<user::Sub>,
        last_message: Option<String>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            members,
            last_message,
            updated_at,
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub fn members(&self) -> &[user::Sub] {
        &self.members
    }

    pub fn includes(&self, sub: &user::Sub) -> bool {
        self.members.contains(sub)
    }

    /// The member other than `viewer`.
    ///
    /// `None` for malformed rooms: `viewer` is not a member, or no member
    /// differs from `viewer` (a single member, or the viewer listed twice).
    pub fn counterpart(&self, viewer: &user::Sub) -> Option<&user::Sub> {
        if !self.includes(viewer) {
            return None;
        }
        self.members.iter().find(|m| *m != viewer)
    }
}

impl TryFrom<&Document> for ChatRoom {
    type Error = super::Error;

    fn try_from(doc: &Document) -> super::Result<Self> {
        let id = Id::from(doc.id());
        let fields = doc
            .decode::<ChatFields>()
            .map_err(|e| super::Error::Malformed(id.clone(), e.to_string()))?;

        Ok(Self {
            updated_at: fields
                .timestamp
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            id,
            members: fields.users,
            last_message: fields.last_message,
        })
    }
}

/// One row of the chat list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRoomDto {
    id: Id,
    counterpart_name: String,
    last_message: String,
    updated_at: DateTime<Utc>,
    /// `updated_at` is a local stand-in, the server has not stamped the room.
    #[serde(skip)]
    pending: bool,
}

impl ChatRoomDto {
    /// `now` stands in for a timestamp the server has not assigned yet. See
    /// [`ChatRoomDto::keep_pending_time`] for keeping it stable across
    /// snapshots.
    pub fn new(room: ChatRoom, counterpart_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let last_message = room
            .last_message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| NO_MESSAGES.to_owned());

        Self {
            id: room.id,
            counterpart_name: counterpart_name.into(),
            last_message,
            pending: room.updated_at.is_none(),
            updated_at: room.updated_at.unwrap_or(now),
        }
    }

    /// Reuses the stand-in time of `previous` while the same room is still
    /// waiting for its server timestamp.
    pub fn keep_pending_time(&mut self, previous: &ChatRoomDto) {
        if self.pending && previous.pending && self.id == previous.id {
            self.updated_at = previous.updated_at;
        }
    }

    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub fn counterpart_name(&self) -> &str {
        &self.counterpart_name
    }

    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    pub const fn updated_at(&self) -> &DateTime<Utc> {
        &self.updated_at
    }
}

/// What the chat list screen renders.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatListView {
    pub is_loading: bool,
    pub rooms: Vec<ChatRoomDto>,
    pub error: Option<String>,
}

impl ChatListView {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            rooms: Vec::new(),
            error: None,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            is_loading: false,
            rooms: Vec::new(),
            error: None,
        }
    }

    pub fn loaded(rooms: Vec<ChatRoomDto>) -> Self {
        Self {
            is_loading: false,
            rooms,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_loading: false,
            rooms: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn open_room(&self, index: usize) -> Option<Route> {
        self.rooms.get(index).map(|room| Route::Chat(room.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(id: &str, value: serde_json::Value) -> Document {
        let serde_json::Value::Object(fields) = value else {
            panic!("not an object");
        };
        Document::new(id, fields)
    }

    fn room(members: &[&str]) -> ChatRoom {
        ChatRoom::new(
            Id::from("room"),
            members.iter().map(|m| user::Sub::from(*m)).collect(),
            None,
            None,
        )
    }

    #[test]
    fn should_find_counterpart() {
        let viewer = user::Sub::from("u1");
        assert_eq!(
            room(&["u1", "u2"]).counterpart(&viewer),
            Some(&user::Sub::from("u2"))
        );
        assert_eq!(
            room(&["u2", "u1"]).counterpart(&viewer),
            Some(&user::Sub::from("u2"))
        );
    }

    #[test]
    fn should_not_find_counterpart_in_malformed_room() {
        let viewer = user::Sub::from("u1");
        assert_eq!(room(&["u1"]).counterpart(&viewer), None);
        assert_eq!(room(&["u1", "u1"]).counterpart(&viewer), None);
        assert_eq!(room(&["u2", "u3"]).counterpart(&viewer), None);
        assert_eq!(room(&[]).counterpart(&viewer), None);
    }

    #[test]
    fn should_decode_chat_document() {
        let chat = ChatRoom::try_from(&doc(
            "u1_u2",
            json!({"users": ["u1", "u2"], "lastMessage": "안녕", "timestamp": 1_700_000_000_000_i64}),
        ))
        .unwrap();

        assert_eq!(chat.id(), &Id::from("u1_u2"));
        assert_eq!(chat.members().len(), 2);
        assert_eq!(
            chat.updated_at,
            DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000)
        );
    }

    #[test]
    fn should_reject_malformed_chat_document() {
        let err = ChatRoom::try_from(&doc("x", json!({"users": "u1"}))).unwrap_err();
        assert!(matches!(err, super::super::Error::Malformed(id, _) if id == Id::from("x")));
    }

    #[test]
    fn should_fill_placeholders() {
        let now = Utc::now();
        let chat = ChatRoom::try_from(&doc("u1_u2", json!({"users": ["u1", "u2"], "timestamp": null})))
            .unwrap();

        let dto = ChatRoomDto::new(chat, "이영희", now);
        assert_eq!(dto.last_message(), NO_MESSAGES);
        assert_eq!(dto.updated_at(), &now);
        assert_eq!(dto.counterpart_name(), "이영희");
    }

    #[test]
    fn should_keep_stand_in_time_until_stamped() {
        let earlier = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        let later = DateTime::<Utc>::from_timestamp_millis(1_700_000_060_000).unwrap();
        let pending = || {
            ChatRoom::try_from(&doc("u1_u2", json!({"users": ["u1", "u2"]}))).unwrap()
        };

        let previous = ChatRoomDto::new(pending(), "이영희", earlier);
        let mut next = ChatRoomDto::new(pending(), "이영희", later);
        assert!(next.is_pending());
        next.keep_pending_time(&previous);
        assert_eq!(next, previous);

        let stamped = ChatRoom::try_from(&doc(
            "u1_u2",
            json!({"users": ["u1", "u2"], "timestamp": 1_700_000_120_000_i64}),
        ))
        .unwrap();
        let mut next = ChatRoomDto::new(stamped, "이영희", later);
        next.keep_pending_time(&previous);
        assert!(!next.is_pending());
        assert_eq!(next.updated_at().timestamp_millis(), 1_700_000_120_000);
    }

    #[test]
    fn should_open_selected_room() {
        let now = Utc::now();
        let view = ChatListView::loaded(vec![ChatRoomDto::new(
            ChatRoom::new(Id::from("u1_u2"), vec![], None, None),
            "이영희",
            now,
        )]);

        assert_eq!(view.open_room(0), Some(Route::Chat(Id::from("u1_u2"))));
        assert_eq!(view.open_room(1), None);
    }
}
