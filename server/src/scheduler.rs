//! Turn rotation and the delayed start between rounds.
//!
//! At most one start is pending at a time. Every schedule or cancel bumps a
//! generation counter; the timer task hands its generation back when it
//! fires, and [`TurnScheduler::complete`] refuses anything but the current
//! one. A timer that already woke up and is waiting on the coordinator lock
//! while the start gets cancelled is therefore recognized as stale.

use crate::game::GameSession;
use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Which wait applies to a scheduled start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    /// The roster just reached the minimum
    First,
    /// A round just ended
    Restart,
}

#[derive(Debug)]
struct PendingStart {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct TurnScheduler {
    start_delay: Duration,
    restart_delay: Duration,
    pending: Option<PendingStart>,
    generation: u64,
}

impl TurnScheduler {
    pub fn new(start_delay: Duration, restart_delay: Duration) -> Self {
        Self {
            start_delay,
            restart_delay,
            pending: None,
            generation: 0,
        }
    }

    /// Passes the turn on after a guess that did not end the round.
    pub fn advance(&self, session: &mut GameSession, roster_len: usize) -> usize {
        session.advance_turn(roster_len)
    }

    pub fn delay(&self, kind: StartKind) -> Duration {
        match kind {
            StartKind::First => self.start_delay,
            StartKind::Restart => self.restart_delay,
        }
    }

    /// Runs `fire` with the new generation once the delay for `kind` has
    /// elapsed, replacing any start that was already pending.
    pub fn schedule<F, Fut>(&mut self, kind: StartKind, fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay(kind);
        self.cancel();
        self.generation += 1;
        let generation = self.generation;

        debug!("Scheduling start {} in {:?}", generation, delay);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            fire(generation).await;
        });
        self.pending = Some(PendingStart { generation, handle });
        generation
    }

    /// Drops the pending start, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        match self.pending.take() {
            Some(pending) => {
                debug!("Cancelled start {}", pending.generation);
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Claims the pending start for a timer that just fired.
    ///
    /// Only the timer carrying the current generation gets `true`; the task is
    /// not aborted since it is the caller.
    pub fn complete(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for TurnScheduler {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }
}
