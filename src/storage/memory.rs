//! Process-local storage backend.
//!
//! Backs the `memory` database backend and the test suites. Links live in a
//! `DashMap` so concurrent creates for the same code serialize on the map's
//! entry lock; clicks are an append-only vector.

use crate::models::{ClickEvent, Link, MinuteRow, NewLink};
use crate::storage::rows::{from_unix, minute_of};
use crate::storage::{
    AnalyticsReader, AnalyticsStore, LinkStore, StorageError, StorageResult,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
pub struct MemoryStorage {
    links: DashMap<String, Link>,
    clicks: RwLock<Vec<ClickEvent>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of click rows stored so far
    pub fn click_count(&self) -> usize {
        self.clicks.read().len()
    }
}

#[async_trait]
impl LinkStore for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Link>> {
        let mut links: Vec<Link> = self.links.iter().map(|e| e.value().clone()).collect();
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(links)
    }

    async fn get(&self, short_code: &str) -> Result<Option<Link>> {
        Ok(self.links.get(short_code).map(|e| e.value().clone()))
    }

    async fn create(&self, link: &NewLink) -> StorageResult<Link> {
        match self.links.entry(link.short_code.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict),
            Entry::Vacant(slot) => {
                let stored = Link {
                    short_code: link.short_code.clone(),
                    source_url: link.source_url.clone(),
                    created_at: Utc::now(),
                };
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn exists(&self, short_code: &str) -> Result<bool> {
        Ok(self.links.contains_key(short_code))
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStorage {
    async fn init_analytics(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_batch(&self, events: &[ClickEvent]) -> Result<u64> {
        self.clicks.write().extend_from_slice(events);
        Ok(events.len() as u64)
    }

    async fn read_snapshot(&self) -> Result<Box<dyn AnalyticsReader>> {
        let events = Arc::new(self.clicks.read().clone());
        Ok(Box::new(MemorySnapshot { events }))
    }
}

struct MemorySnapshot {
    events: Arc<Vec<ClickEvent>>,
}

#[async_trait]
impl AnalyticsReader for MemorySnapshot {
    async fn unique_user_agents(&self, short_code: &str) -> Result<i64> {
        let agents: HashSet<&str> = self
            .events
            .iter()
            .filter(|e| e.short_code == short_code)
            .map(|e| e.user_agent.as_str())
            .collect();
        Ok(agents.len() as i64)
    }

    async fn minute_rows(&self, short_code: &str) -> Result<Vec<MinuteRow>> {
        let mut grouped: BTreeMap<(Reverse<i64>, &str), i64> = BTreeMap::new();
        for event in self.events.iter().filter(|e| e.short_code == short_code) {
            *grouped
                .entry((Reverse(minute_of(event.click_at)), event.user_agent.as_str()))
                .or_insert(0) += 1;
        }

        grouped
            .into_iter()
            .map(|((Reverse(minute), user_agent), clicks)| {
                Ok(MinuteRow {
                    minute: from_unix(minute)?,
                    user_agent: user_agent.to_string(),
                    clicks,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_create_same_code() {
        let storage = Arc::new(MemoryStorage::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .create(&NewLink::with_code("race", format!("https://example.com/{i}")))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(StorageError::Conflict) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(conflicts, 15);
    }

    #[tokio::test]
    async fn test_snapshot_ignores_later_writes() {
        let storage = MemoryStorage::new();
        storage
            .insert_batch(&[ClickEvent::new("abc", "UA1")])
            .await
            .unwrap();

        let snapshot = storage.read_snapshot().await.unwrap();
        storage
            .insert_batch(&[ClickEvent::new("abc", "UA2")])
            .await
            .unwrap();

        assert_eq!(snapshot.unique_user_agents("abc").await.unwrap(), 1);
        assert_eq!(storage.click_count(), 2);
    }
}
