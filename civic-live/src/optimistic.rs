//! Optimistic mutations.
//!
//! A mutation is applied locally before the server answers. Each target
//! has at most one pending entry; overlapping mutations on the same target
//! share the baseline recorded by the first one, and only the response to
//! the most recent request reconciles the entry.
//!
//! ```text
//!  apply(3→4)  t1 ─┐
//!  apply(4→3)  t2 ─┼─ baseline stays 3
//!  resolve(t1)     │  Superseded (t2 is newer)
//!  resolve(t2) ────┘  Confirmed(server value) | RolledBack(3)
//! ```

use std::collections::HashMap;

use civic_core::IssueId;

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Vote,
}

/// Identifies the field a mutation speculates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub target: IssueId,
    pub kind: MutationKind,
}

impl MutationKey {
    pub fn vote(target: IssueId) -> Self {
        Self {
            target,
            kind: MutationKind::Vote,
        }
    }
}

/// Handle for one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone)]
struct PendingMutation<V> {
    baseline: V,
    speculative: V,
    latest: Ticket,
}

/// Outcome of reconciling a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<V, E> {
    /// Server value to display.
    Confirmed(V),
    /// Restore `baseline` and tell the user.
    RolledBack { baseline: V, error: E },
    /// A newer request on the same target is pending; nothing to do yet.
    Superseded,
    /// No pending mutation for this response.
    Stale,
}

/// Tracks unresolved optimistic mutations.
#[derive(Debug)]
pub struct MutationCoordinator<V> {
    pending: HashMap<MutationKey, PendingMutation<V>>,
    next_ticket: u64,
}

impl<V> Default for MutationCoordinator<V> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }
}

impl<V: Clone> MutationCoordinator<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a speculative change. `previous` only becomes the baseline
    /// when nothing is pending for `key` yet.
    pub fn apply_optimistic(&mut self, key: MutationKey, previous: V, speculative: V) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);

        match self.pending.get_mut(&key) {
            Some(entry) => {
                log::debug!("Overlapping mutation on {:?}, keeping first baseline", key);
                entry.speculative = speculative;
                entry.latest = ticket;
            }
            None => {
                self.pending.insert(
                    key,
                    PendingMutation {
                        baseline: previous,
                        speculative,
                        latest: ticket,
                    },
                );
            }
        }
        ticket
    }

    /// Reconcile the response to `ticket`.
    pub fn resolve<E>(
        &mut self,
        key: MutationKey,
        ticket: Ticket,
        outcome: Result<V, E>,
    ) -> Resolution<V, E> {
        let Some(entry) = self.pending.get(&key) else {
            log::debug!("Response for {:?} has no pending mutation", key);
            return Resolution::Stale;
        };
        if entry.latest != ticket {
            return if ticket < entry.latest {
                Resolution::Superseded
            } else {
                Resolution::Stale
            };
        }

        let Some(entry) = self.pending.remove(&key) else {
            return Resolution::Stale;
        };
        match outcome {
            Ok(value) => Resolution::Confirmed(value),
            Err(error) => Resolution::RolledBack {
                baseline: entry.baseline,
                error,
            },
        }
    }

    /// Current speculative value, if a mutation is pending.
    pub fn speculative(&self, key: &MutationKey) -> Option<&V> {
        self.pending.get(key).map(|entry| &entry.speculative)
    }

    pub fn baseline(&self, key: &MutationKey) -> Option<&V> {
        self.pending.get(key).map(|entry| &entry.baseline)
    }

    /// Adjust the baseline of a pending mutation after authoritative data
    /// arrived from elsewhere.
    pub fn rebase_baseline(&mut self, key: &MutationKey, rebase: impl FnOnce(&mut V)) -> bool {
        match self.pending.get_mut(key) {
            Some(entry) => {
                rebase(&mut entry.baseline);
                true
            }
            None => false,
        }
    }

    /// Replace both values of a pending mutation.
    pub fn rebase(&mut self, key: &MutationKey, baseline: V, speculative: V) -> bool {
        match self.pending.get_mut(key) {
            Some(entry) => {
                entry.baseline = baseline;
                entry.speculative = speculative;
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &MutationKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending keys, for overlaying speculative values on fresh data.
    pub fn pending_keys(&self) -> impl Iterator<Item = &MutationKey> {
        self.pending.keys()
    }
}
