use std::fmt::Display;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{integration, user};

pub mod model;
pub mod projector;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn service::ChatService + Send + Sync>;

pub const CHATS_COLLECTION: &str = "chats";
pub const NO_MESSAGES: &str = "대화 내용 없음";

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Room key of a two-party chat: both subs sorted and joined with `_`,
    /// so either member derives the same key.
    pub fn between(a: &user::Sub, b: &user::Sub) -> Self {
        let mut members = [a.as_str(), b.as_str()];
        members.sort_unstable();
        Self(members.join("_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Navigation target emitted when a room is picked from the list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Chat(Id),
}

impl Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Chat(id) => write!(f, "/chat/{id}"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed chat document {0}: {1}")]
    Malformed(Id, String),

    #[error(transparent)]
    _Integration(#[from] integration::Error),
}
