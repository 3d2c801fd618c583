use std::fmt::Display;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::integration;

pub mod model;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn service::UserService + Send + Sync>;

pub const USERS_COLLECTION: &str = "users";
pub const UNKNOWN_USER: &str = "알 수 없는 사용자";

/// Stable identifier of a principal, as issued by the identity provider.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Sub(String);

impl Sub {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Sub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Sub {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Sub {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Sub> for serde_json::Value {
    fn from(sub: &Sub) -> Self {
        serde_json::Value::String(sub.0.clone())
    }
}

impl Serialize for Sub {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sub {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Sub, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Sub(s))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("user not found: {0}")]
    NotFound(Sub),

    #[error(transparent)]
    _Integration(#[from] integration::Error),
}
