//! Persistence module split across logical submodules. Everything here is
//! synchronous and works on a borrowed `Connection`; locking, threading and
//! change notification live one level up in `store`.

mod connection;
mod crimes;

pub use connection::{default_db_path, ensure_schema, open_database, open_in_memory};
pub use crimes::{delete_crime, fetch_crime, fetch_crimes, insert_crime, update_crime};
