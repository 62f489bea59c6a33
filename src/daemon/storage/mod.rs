//! Persistent state of the tracker, the counterpart of extension local storage.
//!  - [store::KeyValueStore] is the raw key/value contract, [store::JsonFileStore] keeps the
//!    whole document in one JSON file.
//!  - [local::LocalStorage] gives the keys meaning: time totals are keyed by domain, everything
//!    else lives under the fixed keys in [keys].

pub mod keys;
pub mod local;
pub mod store;
