use async_trait::async_trait;
use chrono::Weekday;
use log::{debug, error, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::{AuthState, IdentityWatcher};
use crate::integration::store::{Filter, Store};
use crate::user;

use super::TIMETABLES_COLLECTION;
use super::model::{DaySchedule, TimetableEntry};

#[async_trait]
pub trait TimetableService {
    async fn find_by_user(&self, sub: &user::Sub) -> super::Result<Vec<TimetableEntry>>;
}

#[derive(Clone)]
pub struct TimetableServiceImpl {
    store: Store,
}

impl TimetableServiceImpl {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TimetableService for TimetableServiceImpl {
    async fn find_by_user(&self, sub: &user::Sub) -> super::Result<Vec<TimetableEntry>> {
        let docs = self
            .store
            .find(TIMETABLES_COLLECTION, Filter::eq("userId", sub))
            .await?;

        let entries = docs
            .iter()
            .filter_map(|doc| match TimetableEntry::try_from(doc) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping timetable entry: {e}");
                    None
                }
            })
            .collect();

        Ok(entries)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimetableView {
    pub is_loading: bool,
    pub signed_in: bool,
    pub entries: Vec<TimetableEntry>,
}

impl TimetableView {
    pub fn schedule(&self, day: Weekday) -> DaySchedule {
        DaySchedule::for_day(&self.entries, day)
    }
}

/// Keeps a [`TimetableView`] in sync with the signed-in user. A fetch still
/// running when the identity changes is abandoned.
pub struct TimetableHandle {
    view: watch::Receiver<TimetableView>,
    task: JoinHandle<()>,
}

impl TimetableHandle {
    pub fn spawn(watcher: IdentityWatcher, service: super::Service) -> Self {
        let (tx, view) = watch::channel(TimetableView {
            is_loading: true,
            signed_in: false,
            entries: Vec::new(),
        });

        let task = tokio::spawn(async move {
            let mut identity = watcher.subscribe();
            loop {
                let state = identity.borrow_and_update().clone();

                let closed = tokio::select! {
                    _ = follow(&tx, &service, state) => identity.changed().await.is_err(),
                    changed = identity.changed() => {
                        debug!("identity changed, timetable fetch abandoned");
                        changed.is_err()
                    },
                };
                if closed {
                    break;
                }
            }
        });

        Self { view, task }
    }

    pub fn view(&self) -> watch::Receiver<TimetableView> {
        self.view.clone()
    }

    pub fn current(&self) -> TimetableView {
        self.view.borrow().clone()
    }
}

impl Drop for TimetableHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn follow(tx: &watch::Sender<TimetableView>, service: &super::Service, state: AuthState) {
    match state {
        AuthState::Unknown => {}
        AuthState::Absent => {
            tx.send_replace(TimetableView {
                is_loading: false,
                signed_in: false,
                entries: Vec::new(),
            });
        }
        AuthState::Present(sub) => {
            tx.send_replace(TimetableView {
                is_loading: true,
                signed_in: true,
                entries: Vec::new(),
            });

            let entries = match service.find_by_user(&sub).await {
                Ok(entries) => {
                    debug!("loaded {} timetable entries for {sub}", entries.len());
                    entries
                }
                Err(e) => {
                    error!("failed to load timetable for {sub}: {e}");
                    Vec::new()
                }
            };

            tx.send_replace(TimetableView {
                is_loading: false,
                signed_in: true,
                entries,
            });
        }
    }
}
