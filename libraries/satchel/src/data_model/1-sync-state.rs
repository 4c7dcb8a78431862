//! # SyncState
//! Each store tracks where it is in the reconciliation loop:
//! `Unauthenticated` → `Pulling` → `Synced` → `Mutating` → `Synced` → ... → `Unauthenticated` on sign-out.
//! A failed pull or push leaves the store `Degraded`: local state is kept and the next successful round trip brings it back to `Synced`.

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    /// No session. The store is local-only.
    #[default]
    Unauthenticated,
    /// Fetching the remote snapshot.
    Pulling,
    /// Local state matches the last snapshot pulled from the server.
    Synced,
    /// A local mutation is waiting on (or running) its push-then-pull.
    Mutating,
    /// Session present, but the last push or pull failed.
    Degraded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncKind {
    Pull,
    Push,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub phase: SyncPhase,
    /// Reconciliations started but not yet finished, including ones queued behind the lane.
    pub in_flight: usize,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn is_authenticated(&self) -> bool {
        self.phase != SyncPhase::Unauthenticated
    }

    pub fn mark_sync_started(&mut self, kind: SyncKind) {
        self.in_flight += 1;
        self.phase = match kind {
            SyncKind::Pull => SyncPhase::Pulling,
            SyncKind::Push => SyncPhase::Mutating,
        };
    }

    /// Record the end of one reconciliation. `error` is `None` on success.
    pub fn mark_sync_finished(&mut self, error: Option<String>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match error {
            Some(error) => {
                self.last_error = Some(error);
                if self.in_flight == 0 {
                    self.phase = SyncPhase::Degraded;
                }
            }
            None => {
                self.last_error = None;
                self.last_synced_at = Some(Utc::now());
                if self.in_flight == 0 {
                    self.phase = SyncPhase::Synced;
                }
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_success_reaches_synced() {
        let mut state = SyncState::default();
        assert!(!state.is_authenticated());

        state.mark_sync_started(SyncKind::Pull);
        assert_eq!(state.phase, SyncPhase::Pulling);

        state.mark_sync_finished(None);
        assert_eq!(state.phase, SyncPhase::Synced);
        assert_eq!(state.in_flight, 0);
        assert!(state.last_synced_at.is_some());
    }

    #[test]
    fn test_failure_degrades_and_success_recovers() {
        let mut state = SyncState::default();
        state.mark_sync_started(SyncKind::Pull);
        state.mark_sync_finished(Some("connection refused".to_string()));
        assert_eq!(state.phase, SyncPhase::Degraded);
        assert_eq!(state.last_error.as_deref(), Some("connection refused"));

        state.mark_sync_started(SyncKind::Push);
        assert_eq!(state.phase, SyncPhase::Mutating);
        state.mark_sync_finished(None);
        assert_eq!(state.phase, SyncPhase::Synced);
        assert_eq!(state.last_error, None);
    }

    #[test]
    fn test_stays_mutating_while_work_is_queued() {
        let mut state = SyncState::default();
        state.mark_sync_started(SyncKind::Push);
        state.mark_sync_started(SyncKind::Push);

        state.mark_sync_finished(None);
        assert_eq!(state.phase, SyncPhase::Mutating);
        assert_eq!(state.in_flight, 1);

        state.mark_sync_finished(Some("500".to_string()));
        assert_eq!(state.phase, SyncPhase::Degraded);
    }

    #[test]
    fn test_reset_returns_to_unauthenticated() {
        let mut state = SyncState::default();
        state.mark_sync_started(SyncKind::Pull);
        state.mark_sync_finished(None);
        state.reset();
        assert_eq!(state, SyncState::default());
    }
}
