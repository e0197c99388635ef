//! Editing session for a single crime, the model behind a detail screen.
//!
//! The editor follows the store's snapshots on a background task and exposes
//! the one crime it cares about as a `watch` value. Edits are expressed as
//! transforms and go through [`CrimeStore::modify`], so each one is applied to
//! whatever is stored at that moment rather than to the editor's copy.
//!
//! Only the background task writes the editor's value. After a write the
//! editor waits for that task to reach the snapshot the write published, so
//! the value never lags behind the store and never runs ahead of it either.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Crime;
use crate::notifier::CrimeListStream;
use crate::store::CrimeStore;

/// Live view of one crime plus the edits that can be made to it.
pub struct CrimeEditor {
    id: Uuid,
    store: CrimeStore,
    crime: Arc<watch::Sender<Option<Crime>>>,
    /// Version of the last snapshot mirrored into `crime`, `None` before the
    /// first one.
    synced: watch::Receiver<Option<u64>>,
    /// Serializes this session's writes in call order.
    writes: Mutex<()>,
    _follow: DropGuard,
}

impl CrimeEditor {
    /// Start a session for `id`. The crime shows up in [`crime`](Self::crime)
    /// once the background task has looked at the first snapshot; until then
    /// it is `None`, as it is for an id the store does not know.
    ///
    /// Must be called from within a tokio runtime. Dropping the editor stops
    /// the background task.
    pub fn open(store: &CrimeStore, id: Uuid) -> Self {
        let (crime, _) = watch::channel(None);
        let crime = Arc::new(crime);
        let (synced_tx, synced) = watch::channel(None);
        let cancel = CancellationToken::new();

        tokio::spawn(follow(
            id,
            store.subscribe(),
            Arc::clone(&crime),
            synced_tx,
            cancel.clone(),
        ));

        Self {
            id,
            store: store.clone(),
            crime,
            synced,
            writes: Mutex::new(()),
            _follow: cancel.drop_guard(),
        }
    }

    /// Id of the crime being edited.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest known value of the crime.
    pub fn crime(&self) -> Option<Crime> {
        self.crime.borrow().clone()
    }

    /// Receiver that wakes whenever [`crime`](Self::crime) changes, including
    /// when the crime is deleted and it turns `None`.
    pub fn subscribe(&self) -> watch::Receiver<Option<Crime>> {
        self.crime.subscribe()
    }

    /// Wait for the first load and return what it found.
    pub async fn ready(&self) -> Option<Crime> {
        let mut synced = self.synced.clone();
        if synced.wait_for(Option::is_some).await.is_err() {
            return None;
        }
        self.crime()
    }

    /// Apply `transform` to the stored crime and persist the result.
    ///
    /// Returns `Ok(None)` without touching the store while nothing is loaded
    /// (before the first snapshot, or after the crime was deleted). On
    /// success returns the crime as this write stored it; by the time this
    /// returns [`crime`](Self::crime) shows that write or anything committed
    /// after it.
    pub async fn update_crime<F>(&self, transform: F) -> Result<Option<Crime>>
    where
        F: FnOnce(Crime) -> Crime + Send + 'static,
    {
        let _write = self.writes.lock().await;
        if self.crime.borrow().is_none() {
            tracing::debug!(id = %self.id, "crime not loaded, skipping update");
            return Ok(None);
        }

        let updated = self.store.modify(self.id, transform).await?;
        self.catch_up().await;
        Ok(Some(updated))
    }

    /// Wait until the follow task has mirrored every snapshot published up
    /// to now.
    async fn catch_up(&self) {
        let target = self.store.version();
        let mut synced = self.synced.clone();
        if synced
            .wait_for(|seen| seen.is_some_and(|version| version >= target))
            .await
            .is_err()
        {
            tracing::debug!(id = %self.id, "crime editor stopped before catching up");
        }
    }

    /// Replace the title.
    pub async fn set_title(&self, title: impl Into<String>) -> Result<Option<Crime>> {
        let title = title.into();
        self.update_crime(move |crime| Crime { title, ..crime })
            .await
    }

    /// Mark the case closed or reopen it.
    pub async fn set_solved(&self, is_solved: bool) -> Result<Option<Crime>> {
        self.update_crime(move |crime| Crime { is_solved, ..crime })
            .await
    }

    /// Name the suspect; an empty name clears it.
    pub async fn set_suspect(&self, suspect: impl Into<String>) -> Result<Option<Crime>> {
        let suspect = suspect.into();
        self.update_crime(move |crime| Crime { suspect, ..crime })
            .await
    }

    /// Replace date and time of day together.
    pub async fn set_date(&self, date: DateTime<Utc>) -> Result<Option<Crime>> {
        self.update_crime(move |crime| Crime { date, ..crime })
            .await
    }

    /// Move the crime to another time on the same day.
    pub async fn set_time_of_day(&self, time: NaiveTime) -> Result<Option<Crime>> {
        self.update_crime(move |crime| crime.with_time_of_day(time))
            .await
    }

    /// Delete the crime. Returns whether a row was removed. Once this
    /// returns, [`crime`](Self::crime) no longer shows the deleted row.
    pub async fn delete_crime(&self) -> Result<bool> {
        let _write = self.writes.lock().await;
        let removed = self.store.delete_id(self.id).await?;
        self.catch_up().await;
        Ok(removed)
    }
}

/// Mirror the crime with `id` from each store snapshot into `crime` until
/// cancelled or the store goes away.
async fn follow(
    id: Uuid,
    mut updates: CrimeListStream,
    crime: Arc<watch::Sender<Option<Crime>>>,
    synced: watch::Sender<Option<u64>>,
    cancel: CancellationToken,
) {
    let mut snapshot = updates.current().clone();
    loop {
        let found = snapshot.iter().find(|c| c.id == id).cloned();
        crime.send_if_modified(|current| {
            if *current == found {
                false
            } else {
                *current = found;
                true
            }
        });
        synced.send_replace(Some(updates.version()));

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = updates.changed() => match next {
                Some(next) => snapshot = next,
                None => break,
            },
        }
    }
    tracing::debug!(%id, "crime editor stopped following the store");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::StoreError;

    async fn store_with(title: &str) -> (CrimeStore, Crime) {
        let store = CrimeStore::open_in_memory().unwrap();
        let crime = Crime {
            title: title.into(),
            ..Crime::new()
        };
        store.add(&crime).await.unwrap();
        (store, crime)
    }

    #[tokio::test]
    async fn ready_loads_the_crime() {
        let (store, crime) = store_with("loaded").await;
        let editor = CrimeEditor::open(&store, crime.id);

        assert_eq!(editor.ready().await, Some(crime));
    }

    #[tokio::test]
    async fn update_before_load_is_a_no_op() {
        let (store, crime) = store_with("untouched").await;
        let editor = CrimeEditor::open(&store, crime.id);

        // The follow task has not been polled yet on this single-threaded
        // runtime, so nothing is loaded.
        let result = editor.set_title("changed").await.unwrap();
        assert!(result.is_none());
        assert_eq!(store.get(crime.id).await.unwrap().title, "untouched");
    }

    #[tokio::test]
    async fn unknown_id_loads_as_none() {
        let store = CrimeStore::open_in_memory().unwrap();
        let editor = CrimeEditor::open(&store, Uuid::new_v4());

        assert_eq!(editor.ready().await, None);
        assert!(editor.set_solved(true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn edits_from_elsewhere_reach_the_editor() {
        let (store, crime) = store_with("before").await;
        let editor = CrimeEditor::open(&store, crime.id);
        editor.ready().await;
        let mut watched = editor.subscribe();

        store
            .update(&Crime {
                title: "after".into(),
                ..crime.clone()
            })
            .await
            .unwrap();

        let seen = tokio::time::timeout(
            Duration::from_secs(5),
            watched.wait_for(|c| c.as_ref().is_some_and(|c| c.title == "after")),
        )
        .await;
        assert!(seen.is_ok());
    }

    #[tokio::test]
    async fn update_leaves_the_editor_on_the_stored_value() {
        let (store, crime) = store_with("quiet").await;
        let editor = CrimeEditor::open(&store, crime.id);
        editor.ready().await;

        let updated = editor.set_suspect("Mallory").await.unwrap().unwrap();
        assert_eq!(editor.crime(), Some(updated.clone()));
        assert_eq!(store.get(crime.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn delete_clears_the_editor() {
        let (store, crime) = store_with("gone soon").await;
        let editor = CrimeEditor::open(&store, crime.id);
        editor.ready().await;

        assert!(editor.delete_crime().await.unwrap());
        assert_eq!(editor.crime(), None);
        assert!(editor.set_title("too late").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_surfaces_not_found_when_deleted_behind_its_back() {
        let (store, crime) = store_with("doomed").await;
        let editor = CrimeEditor::open(&store, crime.id);
        editor.ready().await;

        // Remove the row directly so the editor still holds its copy.
        let elsewhere = store.clone();
        elsewhere.delete(&crime).await.unwrap();

        match editor.set_title("too late").await {
            Ok(None) => {}
            Err(StoreError::NotFound(id)) => assert_eq!(id, crime.id),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_the_editor_releases_its_subscription() {
        let (store, crime) = store_with("watched").await;
        let editor = CrimeEditor::open(&store, crime.id);
        editor.ready().await;
        assert_eq!(store.subscriber_count(), 1);

        drop(editor);
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.subscriber_count() != 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
