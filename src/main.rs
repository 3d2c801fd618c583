use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, Utc};
use log::info;
use serde_json::{Value, json};
use tokio::sync::watch;

use campus_chat::auth::IdentityWatcher;
use campus_chat::chat::CHATS_COLLECTION;
use campus_chat::chat::model::ChatListView;
use campus_chat::chat::projector::ChatListProjector;
use campus_chat::chat::service::ChatServiceImpl;
use campus_chat::integration::idp::{InMemoryIdp, Principal};
use campus_chat::integration::store::{Fields, InMemoryStore, Store};
use campus_chat::integration::{self, Config};
use campus_chat::timetable::model::korean_day;
use campus_chat::timetable::service::{TimetableHandle, TimetableServiceImpl};
use campus_chat::user::service::UserServiceImpl;
use campus_chat::{Error, Result};

const FIXTURE: &str = include_str!("../fixtures/campus.json");
const WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::env()?;
    integration::init_logger(&config)?;

    let store = InMemoryStore::new();
    match &config.fixture_file {
        Some(path) => store.load_file(path).await?,
        None => store.load_json(FIXTURE).await?,
    }
    let shared: Store = Arc::new(store.clone());

    let user_service = Arc::new(UserServiceImpl::with_cache(
        shared.clone(),
        config.user_info_ttl,
    ));
    let chat_service = Arc::new(ChatServiceImpl::new(shared.clone(), user_service));
    let timetable_service = Arc::new(TimetableServiceImpl::new(shared));

    let idp = InMemoryIdp::pending();
    let chats = ChatListProjector::spawn(IdentityWatcher::new(&idp), chat_service);
    let timetable = TimetableHandle::spawn(IdentityWatcher::new(&idp), timetable_service);
    let mut chat_view = chats.view();
    let mut timetable_view = timetable.view();

    info!("restoring session");
    idp.sign_in(Principal::new("u1"));
    let list = wait_for(&mut chat_view, "chat list of u1", |v| {
        !v.is_loading && !v.rooms.is_empty()
    })
    .await?;
    log_chat_list("u1", &list);

    let today = Local::now().weekday();
    let loaded = wait_for(&mut timetable_view, "timetable of u1", |v| {
        v.signed_in && !v.is_loading
    })
    .await?;
    let schedule = loaded.schedule(today);
    info!("today ({}요일): {} classes", korean_day(today), schedule.today.len());
    for entry in &schedule.today {
        let range = entry.slot().map(|s| s.time_range()).unwrap_or_default();
        info!("  {} {range} / {}", entry.course_name, entry.location);
    }
    for entry in &schedule.online {
        info!("  online: {} ({})", entry.course_name, entry.time);
    }

    info!("new message in u1_u3");
    store
        .put(
            CHATS_COLLECTION,
            "u1_u3",
            fields(json!({
                "users": ["u1", "u3"],
                "lastMessage": "지금 정문 앞이에요",
                "timestamp": Utc::now().timestamp_millis(),
            })),
        )
        .await;
    let list = wait_for(&mut chat_view, "reordered chat list", |v| {
        v.rooms.first().is_some_and(|r| r.id().as_str() == "u1_u3")
    })
    .await?;
    log_chat_list("u1", &list);
    if let Some(route) = list.open_room(0) {
        info!("opening {route}");
    }

    info!("switching account");
    idp.sign_in(Principal::new("u2"));
    let list = wait_for(&mut chat_view, "chat list of u2", |v| {
        !v.is_loading && v.rooms.iter().any(|r| r.id().as_str() == "u2_u4")
    })
    .await?;
    log_chat_list("u2", &list);

    info!("signing out");
    idp.sign_out();
    let list = wait_for(&mut chat_view, "signed-out chat list", |v| {
        !v.is_loading && v.rooms.is_empty()
    })
    .await?;
    log_chat_list("nobody", &list);

    chats.close().await;
    Ok(())
}

async fn wait_for<T: Clone>(
    view: &mut watch::Receiver<T>,
    what: &'static str,
    predicate: impl FnMut(&T) -> bool,
) -> Result<T> {
    match tokio::time::timeout(WAIT, view.wait_for(predicate)).await {
        Ok(Ok(value)) => Ok(value.clone()),
        Ok(Err(_)) => Err(Error::Stopped(what)),
        Err(_) => Err(Error::Timeout(what)),
    }
}

fn log_chat_list(owner: &str, view: &ChatListView) {
    if let Some(error) = &view.error {
        info!("chat list of {owner} failed: {error}");
        return;
    }

    info!("chat list of {owner}: {} rooms", view.rooms.len());
    for room in &view.rooms {
        info!(
            "  [{}] {}: {} ({})",
            room.id(),
            room.counterpart_name(),
            room.last_message(),
            room.updated_at().with_timezone(&Local).format("%H:%M")
        );
    }
}

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(fields) => fields,
        _ => Fields::new(),
    }
}
