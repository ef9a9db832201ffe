//! Session-scoped cache for the discipline directory.
//!
//! Disciplines rarely change during a session, so each query result is kept
//! until the cache is cleared or the query is explicitly refetched.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::brs::models::{Discipline, DisciplineQuery};
use crate::marks::portal::{DisciplineDirectory, ServiceResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    login: String,
    year: i32,
    term: u8,
    course: u8,
    is_module: bool,
}

pub struct CachedDirectory<D> {
    inner: D,
    login: String,
    /// query → disciplines
    entries: Arc<DashMap<CacheKey, Arc<Vec<Discipline>>>>,
}

impl<D: DisciplineDirectory> CachedDirectory<D> {
    pub fn new(inner: D, login: impl Into<String>) -> Self {
        Self {
            inner,
            login: login.into(),
            entries: Arc::new(DashMap::new()),
        }
    }

    fn key(&self, query: &DisciplineQuery) -> CacheKey {
        CacheKey {
            login: self.login.clone(),
            year: query.year,
            term: query.term,
            course: query.course,
            is_module: query.is_module,
        }
    }

    /// Drop every cached query.
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!(count, "Discipline cache cleared");
    }

    /// Bypass the cache for one query and store the fresh result.
    pub async fn refetch(&self, query: &DisciplineQuery) -> ServiceResult<Arc<Vec<Discipline>>> {
        let disciplines = Arc::new(self.inner.fetch_disciplines(query).await?);
        self.entries.insert(self.key(query), disciplines.clone());
        Ok(disciplines)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl<D: DisciplineDirectory> DisciplineDirectory for CachedDirectory<D> {
    async fn fetch_disciplines(&self, query: &DisciplineQuery) -> ServiceResult<Vec<Discipline>> {
        let key = self.key(query);
        // Clone out of the map before awaiting so no shard lock is held across the fetch.
        let cached = self.entries.get(&key).map(|entry| entry.value().clone());
        if let Some(disciplines) = cached {
            debug!(
                year = query.year,
                term = query.term,
                course = query.course,
                "Discipline cache hit"
            );
            return Ok(disciplines.as_ref().clone());
        }

        let disciplines = self.refetch(query).await?;
        Ok(disciplines.as_ref().clone())
    }
}
