pub mod auth;
pub mod chat;
pub mod error;
pub mod integration;
pub mod timetable;
pub mod user;

pub use error::{Error, Result};
