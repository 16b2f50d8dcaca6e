//! Reconciliation stores.
//!
//! Each store holds one client-side model, filled by wholesale snapshot
//! replacement and (for conversations and messages) incrementally patched by
//! push events. Stores are plain owned values: they are mutated only from the
//! task that owns them, and publish changes through [`Observable`]s.

mod calls;
mod contacts;
mod conversations;
mod messages;
mod settings;

pub use calls::CallLogStore;
pub use contacts::ContactsStore;
pub use conversations::ConversationListStore;
pub use messages::ConversationStore;
pub use settings::SettingsStore;

use tracing::{debug, warn};

use crate::error::{SyncError, TransportError};
use crate::observable::{Observable, Subscription};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    /// The last accepted fetch failed; holds the error text
    Failed(String),
}

impl LoadState {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Marks one snapshot request. Later tickets compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

/// Request numbering for one store. A completion is applied only when no
/// later-issued request has been applied before it.
#[derive(Debug, Default)]
pub struct Generation {
    issued: u64,
    applied: u64,
}

impl Generation {
    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    /// Record `ticket` as applied, or return false if it is stale.
    pub fn accept(&mut self, ticket: Ticket) -> bool {
        if ticket.0 <= self.applied {
            return false;
        }
        self.applied = ticket.0;
        true
    }

    pub fn latest(&self) -> Option<Ticket> {
        (self.issued > 0).then_some(Ticket(self.issued))
    }

    /// Latest ticket if it has not been applied yet.
    pub fn pending(&self) -> Option<Ticket> {
        (self.issued > self.applied).then_some(Ticket(self.issued))
    }

    /// Treat every ticket up to and including `ticket` as issued and applied.
    /// Continues numbering across store instances for the same key.
    pub fn skip_past(&mut self, ticket: Ticket) {
        self.issued = self.issued.max(ticket.0);
        self.applied = self.applied.max(ticket.0);
    }
}

/// What a failed snapshot does to the held value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnFailure {
    Clear,
    Keep,
}

/// Value + load state + generation counter shared by every store.
pub(crate) struct Snapshot<T> {
    name: &'static str,
    value: Observable<T>,
    state: Observable<LoadState>,
    generation: Generation,
}

impl<T: Clone + Default + 'static> Snapshot<T> {
    pub fn new(name: &'static str) -> Self {
        Self::with_value(name, T::default())
    }
}

impl<T: Clone + 'static> Snapshot<T> {
    pub fn with_value(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: Observable::new(value),
            state: Observable::new(LoadState::Uninitialized),
            generation: Generation::default(),
        }
    }

    pub fn value(&self) -> &Observable<T> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Observable<T> {
        &mut self.value
    }

    pub fn state(&self) -> LoadState {
        self.state.get()
    }

    pub fn subscribe_state(&self, callback: impl FnMut(&LoadState) + Send + 'static) -> Subscription {
        self.state.subscribe(callback)
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn generation_mut(&mut self) -> &mut Generation {
        &mut self.generation
    }

    pub fn begin(&mut self) -> Ticket {
        self.state.update(|state| {
            if *state == LoadState::Loading {
                return false;
            }
            *state = LoadState::Loading;
            true
        });
        self.generation.issue()
    }

    /// Apply a fetch result for `ticket`. Stale results leave the store alone
    /// but a stale error is still reported to the caller.
    pub fn apply(
        &mut self,
        ticket: Ticket,
        result: Result<T, TransportError>,
        on_failure: OnFailure,
        cleared: impl FnOnce() -> T,
    ) -> Result<(), SyncError> {
        if !self.generation.accept(ticket) {
            debug!(store = self.name, ?ticket, "discarding stale snapshot");
            return result.map(|_| ()).map_err(SyncError::from);
        }
        match result {
            Ok(value) => {
                self.value.set(value);
                self.state.set(LoadState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(store = self.name, error = %e, "snapshot fetch failed");
                if on_failure == OnFailure::Clear {
                    self.value.set(cleared());
                }
                self.state.set(LoadState::Failed(e.to_string()));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn generation_accepts_in_order() {
        let mut generation = Generation::default();
        let a = generation.issue();
        let b = generation.issue();
        assert!(generation.accept(a));
        assert!(generation.accept(b));
    }

    #[test]
    fn generation_rejects_older_after_newer() {
        let mut generation = Generation::default();
        let older = generation.issue();
        let newer = generation.issue();
        assert!(generation.accept(newer));
        assert!(!generation.accept(older));
        assert_eq!(generation.latest(), Some(newer));
    }

    #[test]
    fn pending_clears_once_latest_applies() {
        let mut generation = Generation::default();
        assert_eq!(generation.pending(), None);
        let older = generation.issue();
        let newer = generation.issue();
        assert!(generation.accept(older));
        assert_eq!(generation.pending(), Some(newer));
        assert!(generation.accept(newer));
        assert_eq!(generation.pending(), None);
    }

    #[test]
    fn skip_past_continues_numbering() {
        let mut before = Generation::default();
        let old = before.issue();

        let mut after = Generation::default();
        after.skip_past(old);
        assert!(!after.accept(old));
        let fresh = after.issue();
        assert!(fresh > old);
        assert!(after.accept(fresh));
    }

    #[test]
    fn snapshot_replaces_on_success() {
        let mut snap: Snapshot<Vec<i32>> = Snapshot::new("test");
        let t = snap.begin();
        assert_eq!(snap.state(), LoadState::Loading);
        snap.apply(t, Ok(vec![1, 2]), OnFailure::Clear, Vec::new).unwrap();
        assert_eq!(snap.value().get(), vec![1, 2]);
        assert_eq!(snap.state(), LoadState::Ready);
    }

    #[test]
    fn snapshot_failure_clears_and_reports() {
        let mut snap: Snapshot<Vec<i32>> = Snapshot::with_value("test", vec![7]);
        let t = snap.begin();
        let err = snap
            .apply(t, Err(TransportError::Unavailable), OnFailure::Clear, Vec::new)
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(TransportError::Unavailable)));
        assert!(snap.value().get().is_empty());
        assert_eq!(
            snap.state(),
            LoadState::Failed("server is unavailable".into())
        );
    }

    #[test]
    fn snapshot_failure_can_keep_value() {
        let mut snap: Snapshot<i32> = Snapshot::with_value("test", 9);
        let t = snap.begin();
        assert!(snap.apply(t, Err(TransportError::Timeout), OnFailure::Keep, || 0).is_err());
        assert_eq!(snap.value().get(), 9);
        assert!(snap.state().is_failed());
    }

    #[test]
    fn stale_snapshot_is_discarded() {
        let mut snap: Snapshot<Vec<i32>> = Snapshot::new("test");
        let first = snap.begin();
        let second = snap.begin();
        snap.apply(second, Ok(vec![2]), OnFailure::Clear, Vec::new).unwrap();
        snap.apply(first, Ok(vec![1]), OnFailure::Clear, Vec::new).unwrap();
        assert_eq!(snap.value().get(), vec![2]);
    }

    #[test]
    fn repeated_begin_notifies_loading_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut snap: Snapshot<i32> = Snapshot::new("test");
        let log = seen.clone();
        let _sub = snap.subscribe_state(move |s| log.lock().unwrap().push(s.clone()));
        snap.begin();
        snap.begin();
        assert_eq!(*seen.lock().unwrap(), vec![LoadState::Loading]);
    }
}
