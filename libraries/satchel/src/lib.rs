//! Satchel keeps small client-side stores (a cart, a wishlist, ...) in step with a remote, per-user authoritative copy.
//! It was pulled out of the Book Bazar client, so it only covers what that client needs.
//!
//! Syncing strategy:
//! 1. Each store is a plain in-memory value that can be replaced wholesale by a snapshot.
//! 2. When the user does something, the store is mutated locally first, so the UI never waits on the network.
//! 3. The mutation is then pushed to the server, and the server's canonical snapshot is pulled back and replaces the local value.
//! 4. Pushes and pulls for one store go through a [`data_model::Lane`]: one reconciliation at a time,
//!    and a pulled snapshot is only applied if nothing newer has been requested since it was issued.
//!
//! The server always wins. A local [`cache::SnapshotCache`] may mirror state between runs, but the next successful pull overwrites it.

pub mod cache;
pub mod data_model;
pub mod retry;

/// A store whose whole state can be captured and replaced by a snapshot.
pub trait SnapshotStore {
    type Snapshot: Clone + serde::Serialize + serde::de::DeserializeOwned;

    /// Capture the current state in its wire form.
    fn snapshot(&self) -> Self::Snapshot;

    /// Replace the local state with `snapshot`, recomputing anything derived.
    fn replace_from_snapshot(&mut self, snapshot: Self::Snapshot);

    /// Drop everything, as on sign-out.
    fn reset(&mut self);

    /// True when there is nothing worth keeping, e.g. before a cached copy is restored.
    fn is_empty(&self) -> bool;
}
