//! Bookmarked contest ids, kept in the key-value store and merged back onto
//! every freshly fetched contest list.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use radar_core::Contest;
use radar_storage::KeyValueStore;

pub const BOOKMARKS_KEY: &str = "bookmarks";

#[derive(Clone)]
pub struct BookmarkStore {
    store: Arc<dyn KeyValueStore>,
}

impl BookmarkStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<BTreeSet<String>> {
        Ok(self.store.get(BOOKMARKS_KEY).await?.into_iter().collect())
    }

    /// Applies `change` to the stored ids under the store's write lock and
    /// returns its verdict.
    async fn edit<F>(&self, mut change: F) -> Result<bool>
    where
        F: FnMut(&mut BTreeSet<String>) -> bool + Send,
    {
        let mut verdict = false;
        self.store
            .update(BOOKMARKS_KEY, &mut |values| {
                let mut ids = values.drain(..).collect::<BTreeSet<_>>();
                verdict = change(&mut ids);
                values.extend(ids);
            })
            .await?;
        Ok(verdict)
    }

    /// Returns true when the id was not bookmarked before.
    pub async fn add(&self, id: &str) -> Result<bool> {
        self.edit(|ids| ids.insert(id.to_string())).await
    }

    /// Returns true when the id was bookmarked before.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        self.edit(|ids| ids.remove(id)).await
    }

    /// Flips the bookmark and returns the new state.
    pub async fn toggle(&self, id: &str) -> Result<bool> {
        self.edit(|ids| {
            if ids.remove(id) {
                false
            } else {
                ids.insert(id.to_string())
            }
        })
        .await
    }
}

/// Sets `bookmarked` from the stored ids. Ids with no matching contest are
/// left alone so bookmarks survive a platform being down for one fetch.
pub fn merge_bookmarks(contests: &mut [Contest], bookmarked: &BTreeSet<String>) {
    for contest in contests {
        contest.bookmarked = bookmarked.contains(&contest.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use radar_core::Platform;
    use futures::future::join_all;
    use radar_storage::{JsonFileStore, MemoryStore};

    fn store() -> BookmarkStore {
        BookmarkStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn add_remove_toggle() {
        let bookmarks = store();
        assert!(bookmarks.add("cf-1").await.unwrap());
        assert!(!bookmarks.add("cf-1").await.unwrap());
        assert!(bookmarks.toggle("lc-weekly-1").await.unwrap());
        assert_eq!(
            bookmarks.load().await.unwrap().into_iter().collect::<Vec<_>>(),
            vec!["cf-1".to_string(), "lc-weekly-1".to_string()]
        );
        assert!(!bookmarks.toggle("cf-1").await.unwrap());
        assert!(bookmarks.remove("lc-weekly-1").await.unwrap());
        assert!(!bookmarks.remove("lc-weekly-1").await.unwrap());
        assert!(bookmarks.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_toggles_on_a_file_store_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let bookmarks = BookmarkStore::new(Arc::new(JsonFileStore::new(dir.path().join("store.json"))));
        let ids = (0..10).map(|i| format!("ac-abc{i}")).collect::<Vec<_>>();
        let results = join_all(ids.iter().map(|id| bookmarks.toggle(id))).await;
        assert!(results.into_iter().all(|r| r.unwrap()));
        assert_eq!(bookmarks.load().await.unwrap().len(), 10);

        let results = join_all(ids.iter().take(4).map(|id| bookmarks.remove(id))).await;
        assert!(results.into_iter().all(|r| r.unwrap()));
        assert_eq!(bookmarks.load().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn bookmarks_survive_refetch() {
        let bookmarks = store();
        bookmarks.add("cf-2").await.unwrap();
        bookmarks.add("ac-gone").await.unwrap();

        let start = Utc.with_ymd_and_hms(2026, 10, 20, 14, 35, 0).unwrap();
        let fresh = || {
            vec![
                Contest::with_duration(Platform::Codeforces, "1", "Round 1", start, Duration::hours(2), "u1").unwrap(),
                Contest::with_duration(Platform::Codeforces, "2", "Round 2", start, Duration::hours(2), "u2").unwrap(),
            ]
        };
        for _ in 0..2 {
            let mut contests = fresh();
            merge_bookmarks(&mut contests, &bookmarks.load().await.unwrap());
            assert_eq!(
                contests.iter().map(|c| c.bookmarked).collect::<Vec<_>>(),
                vec![false, true]
            );
        }
        assert!(bookmarks.load().await.unwrap().contains("ac-gone"));
    }
}
