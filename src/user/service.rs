use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::integration::cache::Cache;
use crate::integration::store::Store;

use super::model::UserInfo;
use super::{Sub, USERS_COLLECTION};

#[async_trait]
pub trait UserService {
    async fn find_user_info(&self, sub: &Sub) -> super::Result<UserInfo>;
}

#[derive(Clone)]
pub struct UserServiceImpl {
    store: Store,
    cache: Option<Arc<Cache<Sub, UserInfo>>>,
}

impl UserServiceImpl {
    pub fn new(store: Store) -> Self {
        Self { store, cache: None }
    }

    /// Caches found profiles for `ttl`; a zero `ttl` disables caching.
    pub fn with_cache(store: Store, ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| Arc::new(Cache::new(ttl)));
        Self { store, cache }
    }
}

#[async_trait]
impl UserService for UserServiceImpl {
    async fn find_user_info(&self, sub: &Sub) -> super::Result<UserInfo> {
        if let Some(user_info) = self.find_cached_user_info(sub).await {
            return Ok(user_info);
        }

        let doc = self
            .store
            .get(USERS_COLLECTION, sub.as_str())
            .await?
            .ok_or_else(|| super::Error::NotFound(sub.clone()))?;

        let user_info = UserInfo::try_from(&doc)?;
        self.cache_user_info(&user_info).await;
        Ok(user_info)
    }
}

// cache operations
impl UserServiceImpl {
    async fn cache_user_info(&self, user_info: &UserInfo) {
        if let Some(cache) = &self.cache {
            cache.set(user_info.sub.clone(), user_info.clone()).await;
        }
    }

    async fn find_cached_user_info(&self, sub: &Sub) -> Option<UserInfo> {
        let cached = match &self.cache {
            Some(cache) => cache.get(sub).await,
            None => None,
        };
        if cached.is_some() {
            debug!("user info cache hit for {sub}");
        }
        cached
    }
}
