//! Frame Sync Gate
//!
//! Decides whether a frame tick may issue a request and whether a response
//! may be composited. Every request gets a generation number; generations only
//! grow, so a response older than the last composited one is stale.

use serde::{Deserialize, Serialize};

/// What to do when a tick fires while a request is still outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Skip the tick; at most one request is ever in flight
    #[default]
    SkipIfBusy,
    /// Send anyway; only responses newer than the last composited one are applied
    LatestWins,
}

/// Why a tick did not produce a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Busy,
    Paused,
    Closed,
}

/// Outcome for a response that came back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Apply,
    /// A newer response was already composited
    Stale,
    /// The session was torn down
    Closed,
}

#[derive(Debug)]
pub struct FrameSync {
    policy: OverlapPolicy,
    next_generation: u64,
    last_applied: Option<u64>,
    in_flight: usize,
    paused: bool,
    closed: bool,
}

impl FrameSync {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            policy,
            next_generation: 0,
            last_applied: None,
            in_flight: 0,
            paused: false,
            closed: false,
        }
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Try to start a request for this tick, returning its generation
    pub fn begin(&mut self) -> Result<u64, Skip> {
        if self.closed {
            return Err(Skip::Closed);
        }
        if self.paused {
            return Err(Skip::Paused);
        }
        if self.policy == OverlapPolicy::SkipIfBusy && self.in_flight > 0 {
            return Err(Skip::Busy);
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.in_flight += 1;
        Ok(generation)
    }

    /// Record a failed response; the buffer stays as it is
    pub fn fail(&mut self, generation: u64) -> Verdict {
        self.settle(generation);
        if self.closed {
            Verdict::Closed
        } else {
            Verdict::Stale
        }
    }

    /// Record a successful response and decide whether to composite it
    pub fn succeed(&mut self, generation: u64) -> Verdict {
        self.settle(generation);
        if self.closed {
            return Verdict::Closed;
        }
        if self.last_applied.is_some_and(|last| generation <= last) {
            return Verdict::Stale;
        }
        self.last_applied = Some(generation);
        Verdict::Apply
    }

    fn settle(&mut self, generation: u64) {
        debug_assert!(generation < self.next_generation, "unknown generation {generation}");
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Stop issuing requests and ignore every later response
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
