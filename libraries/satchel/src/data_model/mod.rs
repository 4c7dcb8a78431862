#[path = "1-sync-state.rs"]
mod sync_state;
pub use sync_state::*;

#[path = "2-listeners.rs"]
mod listeners;
pub use listeners::*;

#[path = "3-lane.rs"]
mod lane;
pub use lane::*;
