//! # Storage Module
//!
//! Durable homes for a [`HomeState`].
//!
//! The app picks a backend at startup and talks to it only through
//! [`StateBackend`]. The redb backend lives here; the plain snapshot file
//! backend lives in the app, next to the rest of the file I/O.

mod redb_store;

pub use redb_store::RedbStore;

use crate::Result;
use crate::home::HomeState;

/// A place a [`HomeState`] can be loaded from and saved to.
pub trait StateBackend: Send + Sync {
    /// Load the stored state, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<HomeState>>;

    /// Replace the stored state with `state`.
    fn save(&self, state: &HomeState) -> Result<()>;

    /// Short backend name for logs ("file", "redb").
    fn kind(&self) -> &'static str;
}
