use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicUsize};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{RwLock, watch};

use super::{Error, Result};

pub type Fields = serde_json::Map<String, Value>;
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Snapshot>> + Send>>;
pub type Store = Arc<dyn DocumentStore + Send + Sync>;

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    id: String,
    fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = Value::Object(self.fields.clone());
        Ok(serde_json::from_value(value)?)
    }
}

/// One complete result set of a live query, in query order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    docs: Vec<Document>,
}

impl Snapshot {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    ArrayContains(String, Value),
    Eq(String, Value),
}

impl Filter {
    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::ArrayContains(field.into(), value.into())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::ArrayContains(field, value) => fields
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Filter::Eq(field, value) => fields.get(field) == Some(value),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Missing and null values compare as greatest: a write whose server
    /// timestamp is still pending sorts as the newest entry. Values of
    /// different types order as bool < number < string < array < object.
    pub fn compare(&self, a: &Fields, b: &Fields) -> Ordering {
        let present = |f: &Fields| f.get(&self.field).filter(|v| !v.is_null()).cloned();

        let ordering = match (present(a), present(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => compare_values(&x, &y),
        };

        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[async_trait]
pub trait DocumentStore {
    /// Opens a live query. The stream yields the full result set once on
    /// open and again after every change that alters it. Dropping the
    /// stream cancels the subscription.
    async fn subscribe(
        &self,
        collection: &str,
        filter: Filter,
        order: OrderBy,
    ) -> Result<SnapshotStream>;

    async fn find(&self, collection: &str, filter: Filter) -> Result<Vec<Document>>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;
}

type Collections = HashMap<String, BTreeMap<String, Fields>>;

#[derive(Clone, Debug)]
enum SubscriptionFault {
    Broken(String),
    Denied(String),
}

impl SubscriptionFault {
    fn to_error(&self) -> Error {
        match self {
            SubscriptionFault::Broken(reason) => Error::Subscription(reason.clone()),
            SubscriptionFault::Denied(reason) => Error::PermissionDenied(reason.clone()),
        }
    }
}

#[derive(Default)]
struct Faults {
    subscriptions: Option<SubscriptionFault>,
    reads: HashSet<(String, String)>,
    latency: HashMap<(String, String), Duration>,
}

struct Inner {
    collections: RwLock<Collections>,
    faults: RwLock<Faults>,
    revision: watch::Sender<u64>,
    active: AtomicUsize,
}

impl Inner {
    async fn query(&self, collection: &str, filter: &Filter, order: Option<&OrderBy>) -> Vec<Document> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Vec::new();
        };

        let mut matched = docs
            .iter()
            .filter(|(_, fields)| filter.matches(fields))
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect::<Vec<_>>();

        if let Some(order) = order {
            matched.sort_by(|a, b| order.compare(a.fields(), b.fields()));
        }

        matched
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

/// Counts a live subscription for as long as its stream is alive.
struct ActiveGuard(Arc<Inner>);

impl ActiveGuard {
    fn new(inner: &Arc<Inner>) -> Self {
        inner.active.fetch_add(1, atomic::Ordering::SeqCst);
        Self(inner.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, atomic::Ordering::SeqCst);
    }
}

/// Process-local document store with live queries.
///
/// Besides plain reads and writes it can inject the failures a hosted
/// backend produces: refused, denied or broken subscriptions, failing reads and
/// slow reads of individual documents.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                faults: RwLock::new(Faults::default()),
                revision,
                active: AtomicUsize::new(0),
            }),
        }
    }

    pub async fn put(&self, collection: &str, id: &str, fields: Fields) {
        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_owned())
            .or_default()
            .insert(id.to_owned(), fields);
        self.inner.bump();
    }

    pub async fn remove(&self, collection: &str, id: &str) -> Option<Fields> {
        let removed = self
            .inner
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));
        if removed.is_some() {
            self.inner.bump();
        }
        removed
    }

    /// Loads `{ collection: { id: fields } }` JSON.
    pub async fn load_json(&self, json: &str) -> Result<()> {
        let fixture: HashMap<String, BTreeMap<String, Fields>> = serde_json::from_str(json)?;
        {
            let mut collections = self.inner.collections.write().await;
            for (collection, docs) in fixture {
                collections.entry(collection).or_default().extend(docs);
            }
        }
        self.inner.bump();
        Ok(())
    }

    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = tokio::fs::read_to_string(path).await?;
        self.load_json(&json).await
    }

    /// Refuses new subscriptions and breaks the live ones with `reason`.
    pub async fn break_subscriptions(&self, reason: impl Into<String>) {
        self.inject(SubscriptionFault::Broken(reason.into())).await;
    }

    /// Like [`InMemoryStore::break_subscriptions`], as if the security rules
    /// stopped granting access to `reason`.
    pub async fn deny_subscriptions(&self, reason: impl Into<String>) {
        self.inject(SubscriptionFault::Denied(reason.into())).await;
    }

    async fn inject(&self, fault: SubscriptionFault) {
        self.inner.faults.write().await.subscriptions = Some(fault);
        self.inner.bump();
    }

    pub async fn heal_subscriptions(&self) {
        self.inner.faults.write().await.subscriptions = None;
    }

    pub async fn fail_reads(&self, collection: &str, id: &str) {
        self.inner
            .faults
            .write()
            .await
            .reads
            .insert((collection.to_owned(), id.to_owned()));
    }

    pub async fn delay_reads(&self, collection: &str, id: &str, latency: Duration) {
        self.inner
            .faults
            .write()
            .await
            .latency
            .insert((collection.to_owned(), id.to_owned()), latency);
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.active.load(atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn subscribe(
        &self,
        collection: &str,
        filter: Filter,
        order: OrderBy,
    ) -> Result<SnapshotStream> {
        let fault = self.inner.faults.read().await.subscriptions.clone();
        if let Some(fault) = fault {
            return Err(fault.to_error());
        }

        let guard = ActiveGuard::new(&self.inner);
        let inner = self.inner.clone();
        let mut revision = self.inner.revision.subscribe();
        let collection = collection.to_owned();
        debug!("live query opened on {collection}: {filter:?} {order:?}");

        let stream = async_stream::stream! {
            let _guard = guard;
            let mut last: Option<Vec<Document>> = None;
            loop {
                let fault = inner.faults.read().await.subscriptions.clone();
                if let Some(fault) = fault {
                    yield Err(fault.to_error());
                    break;
                }

                let docs = inner.query(&collection, &filter, Some(&order)).await;
                if last.as_ref() != Some(&docs) {
                    last = Some(docs.clone());
                    yield Ok(Snapshot::new(docs));
                }

                if revision.changed().await.is_err() {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn find(&self, collection: &str, filter: Filter) -> Result<Vec<Document>> {
        Ok(self.inner.query(collection, &filter, None).await)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let key = (collection.to_owned(), id.to_owned());
        let (failing, latency) = {
            let faults = self.inner.faults.read().await;
            (faults.reads.contains(&key), faults.latency.get(&key).copied())
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if failing {
            return Err(Error::Unavailable(format!("{collection}/{id}")));
        }

        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }
}
