//! Two-phase structural-mutation guard
//!
//! Every add/remove of a subordinate entity runs through a vote phase and,
//! only after the change has been committed, a notification phase. A single
//! veto aborts the mutation before any state is touched; a notification is
//! never sent without a preceding successful change. Subscription lists are
//! owned per instance; there is no process-wide event state.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Result of the vote phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    Approved,
    Vetoed(String),
}

impl Vote {
    pub fn is_vetoed(&self) -> bool {
        matches!(self, Vote::Vetoed(_))
    }
}

type Voter<P, E> = Box<dyn Fn(DateTime<Utc>, &P, &E) -> Vote + Send + Sync>;
type Subscriber<P, E> = Box<dyn Fn(DateTime<Utc>, &P, &E) + Send + Sync>;

/// Vote-then-notify guard for one mutation kind (e.g. "EVSE addition").
///
/// `P` is the parent identifier, `E` the candidate entity.
pub struct VotingNotificator<P, E> {
    voters: RwLock<Vec<Voter<P, E>>>,
    subscribers: RwLock<Vec<Subscriber<P, E>>>,
}

impl<P, E> VotingNotificator<P, E> {
    pub fn new() -> Self {
        Self {
            voters: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a voter. Returning [`Vote::Vetoed`] aborts the mutation.
    pub fn on_voting<F>(&self, voter: F)
    where
        F: Fn(DateTime<Utc>, &P, &E) -> Vote + Send + Sync + 'static,
    {
        self.voters
            .write()
            .expect("voter list poisoned")
            .push(Box::new(voter));
    }

    /// Register an informational subscriber, fired after a committed change.
    pub fn on_notification<F>(&self, subscriber: F)
    where
        F: Fn(DateTime<Utc>, &P, &E) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .expect("subscriber list poisoned")
            .push(Box::new(subscriber));
    }

    /// Run the vote phase. Every voter is invoked; the first veto wins.
    pub fn send_voting(&self, timestamp: DateTime<Utc>, parent: &P, candidate: &E) -> Vote {
        let voters = self.voters.read().expect("voter list poisoned");
        let mut verdict = Vote::Approved;
        for voter in voters.iter() {
            if let Vote::Vetoed(reason) = voter(timestamp, parent, candidate) {
                if !verdict.is_vetoed() {
                    verdict = Vote::Vetoed(reason);
                }
            }
        }
        verdict
    }

    /// Run the notification phase. Callers must only invoke this after the
    /// structural change has been committed.
    pub fn send_notification(&self, timestamp: DateTime<Utc>, parent: &P, entity: &E) {
        let subscribers = self.subscribers.read().expect("subscriber list poisoned");
        for subscriber in subscribers.iter() {
            subscriber(timestamp, parent, entity);
        }
    }

    pub fn voter_count(&self) -> usize {
        self.voters.read().expect("voter list poisoned").len()
    }
}

impl<P, E> Default for VotingNotificator<P, E> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────
