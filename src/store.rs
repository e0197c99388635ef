//! The crime store: one SQLite connection plus the notifier that keeps
//! subscribers in sync with it.
//!
//! SQLite calls block, so every operation hops onto tokio's blocking pool and
//! takes the connection lock there. Writes republish the full crime list
//! before the lock is released, which keeps the order subscribers observe
//! identical to the commit order.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::error::Result;
use crate::models::Crime;
use crate::notifier::{ChangeNotifier, CrimeListStream, CrimeWatchStream, Snapshot, Subscription};

/// Handle to the crime table. Cloning is cheap and every clone talks to the
/// same connection and notifier.
#[derive(Clone)]
pub struct CrimeStore {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Mutex<Connection>,
    notifier: ChangeNotifier,
}

impl CrimeStore {
    /// Open the database file at `path`, creating the file, its directory and
    /// the schema as needed.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open_database(path)?;
        let store = Self::from_connection(conn)?;
        tracing::info!(
            path = %path.display(),
            crimes = store.snapshot().len(),
            "crime database opened"
        );
        Ok(store)
    }

    /// Open the database at its default location in the user's home.
    pub fn open_default() -> Result<Self> {
        Self::open(&db::default_db_path()?)
    }

    /// Private database that lives as long as the store. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(db::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let crimes = db::fetch_crimes(&conn)?;
        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                notifier: ChangeNotifier::new(crimes),
            }),
        })
    }

    /// Live stream of every crime. Starts with the current list and yields a
    /// fresh one after each committed change. Each call is an independent
    /// subscription; dropping the stream ends it.
    pub fn get_all(&self) -> CrimeWatchStream {
        self.subscribe().into_stream()
    }

    /// Subscription with point-in-time access, see [`CrimeListStream`].
    pub fn subscribe(&self) -> CrimeListStream {
        self.inner.notifier.subscribe()
    }

    /// See [`ChangeNotifier::observe`].
    pub fn observe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        self.inner.notifier.observe(handler)
    }

    /// Last published list, without subscribing.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.notifier.snapshot()
    }

    /// Live subscriptions, editors' background tasks included.
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.subscriber_count()
    }

    /// Number of snapshots published so far.
    pub(crate) fn version(&self) -> u64 {
        self.inner.notifier.version()
    }

    /// Point read of one crime. Not reactive.
    pub async fn get(&self, id: Uuid) -> Result<Crime> {
        self.with_connection(move |conn, _| db::fetch_crime(conn, id))
            .await
    }

    /// Insert a new crime. Fails with `DuplicateKey` if the id is taken.
    pub async fn add(&self, crime: &Crime) -> Result<()> {
        let crime = crime.clone();
        self.with_connection(move |conn, notifier| {
            db::insert_crime(conn, &crime)?;
            tracing::debug!(id = %crime.id, "crime added");
            republish(conn, notifier)
        })
        .await
    }

    /// Replace the stored crime with the same id. Fails with `NotFound` if
    /// there is none.
    pub async fn update(&self, crime: &Crime) -> Result<()> {
        let crime = crime.clone();
        self.with_connection(move |conn, notifier| {
            db::update_crime(conn, &crime)?;
            tracing::debug!(id = %crime.id, "crime updated");
            republish(conn, notifier)
        })
        .await
    }

    /// Read the stored crime, apply `transform` and write the result back,
    /// all inside one transaction under the connection lock. Concurrent
    /// callers are applied one after the other, each on top of the previous
    /// result. Returns the crime as it was stored.
    ///
    /// The id is kept even if `transform` returns a different one.
    pub async fn modify<F>(&self, id: Uuid, transform: F) -> Result<Crime>
    where
        F: FnOnce(Crime) -> Crime + Send + 'static,
    {
        self.with_connection(move |conn, notifier| {
            let tx = conn.transaction()?;
            let current = db::fetch_crime(&tx, id)?;
            let mut next = transform(current);
            if next.id != id {
                tracing::warn!(%id, rewritten = %next.id, "ignoring attempt to change a crime id");
                next.id = id;
            }
            db::update_crime(&tx, &next)?;
            let stored = db::fetch_crime(&tx, id)?;
            tx.commit()?;

            tracing::debug!(%id, "crime modified");
            republish(conn, notifier)?;
            Ok(stored)
        })
        .await
    }

    /// Remove `crime` by id. Returns whether a row was removed; an absent id
    /// is not an error and leaves subscribers untouched.
    pub async fn delete(&self, crime: &Crime) -> Result<bool> {
        self.delete_id(crime.id).await
    }

    /// Same as [`delete`](Self::delete) for callers that only hold the id.
    pub async fn delete_id(&self, id: Uuid) -> Result<bool> {
        self.with_connection(move |conn, notifier| {
            if !db::delete_crime(conn, id)? {
                tracing::debug!(%id, "delete of absent crime ignored");
                return Ok(false);
            }
            tracing::debug!(%id, "crime deleted");
            republish(conn, notifier)?;
            Ok(true)
        })
        .await
    }

    /// Run `work` on the blocking pool with exclusive access to the
    /// connection.
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection, &ChangeNotifier) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut conn = inner.conn.lock();
            work(&mut conn, &inner.notifier)
        })
        .await?
    }
}

/// Reload the whole table and hand it to subscribers. Callers hold the
/// connection lock.
fn republish(conn: &Connection, notifier: &ChangeNotifier) -> Result<()> {
    notifier.publish(db::fetch_crimes(conn)?);
    Ok(())
}
