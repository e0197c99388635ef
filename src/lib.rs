//! Core library surface for the Criminal Intent crime log.
//!
//! The store owns the SQLite table of crimes and republishes the whole list
//! to subscribers after every write. Editors wrap the store for a single
//! crime and apply edits as read-modify-write transforms. The `bin` target is
//! a thin command-line front end over these pieces.
pub mod db;
pub mod editor;
pub mod error;
pub mod list;
pub mod models;
pub mod notifier;
pub mod store;

/// Session types used by list and detail views.
pub use editor::CrimeEditor;
pub use list::CrimeList;

pub use error::{Result, StoreError};
pub use models::Crime;
pub use notifier::{CrimeListStream, CrimeWatchStream, Snapshot, Subscription};
pub use store::CrimeStore;
