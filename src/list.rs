//! Model behind the crime list: the live list itself plus the "new crime"
//! action, which inserts a blank record that the caller then opens an editor
//! on.

use crate::error::Result;
use crate::models::Crime;
use crate::notifier::{CrimeWatchStream, Snapshot};
use crate::store::CrimeStore;

/// The list screen's view of the store.
pub struct CrimeList {
    store: CrimeStore,
}

impl CrimeList {
    /// List model over `store`.
    pub fn new(store: &CrimeStore) -> Self {
        Self {
            store: store.clone(),
        }
    }

    /// Live list, see [`CrimeStore::get_all`].
    pub fn crimes(&self) -> CrimeWatchStream {
        self.store.get_all()
    }

    /// What the list shows right now.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// True when there is nothing to show, which is when the list offers its
    /// "add your first crime" prompt.
    pub fn is_empty(&self) -> bool {
        self.store.snapshot().is_empty()
    }

    /// Insert a fresh blank crime and return it.
    pub async fn add_crime(&self) -> Result<Crime> {
        let crime = Crime::new();
        self.store.add(&crime).await?;
        Ok(crime)
    }
}
