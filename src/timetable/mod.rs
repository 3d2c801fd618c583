use std::fmt::Display;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::integration;

pub mod model;
pub mod service;

type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn service::TimetableService + Send + Sync>;

pub const TIMETABLES_COLLECTION: &str = "timetables";
pub const ONLINE_SLOT: &str = "온라인 강의";

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id(String);

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

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed timetable entry {0}: {1}")]
    Malformed(Id, String),

    #[error(transparent)]
    _Integration(#[from] integration::Error),
}
