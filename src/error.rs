use crate::{chat, integration, timetable, user};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("projector stopped while waiting for {0}")]
    Stopped(&'static str),

    #[error(transparent)]
    _Chat(#[from] chat::Error),
    #[error(transparent)]
    _Integration(#[from] integration::Error),
    #[error(transparent)]
    _Timetable(#[from] timetable::Error),
    #[error(transparent)]
    _User(#[from] user::Error),
}
