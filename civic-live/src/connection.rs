//! Connection lifecycle and reconnect/backoff policy.
//!
//! `ConnectionManager` is a synchronous state machine; the session task
//! drives it with transport outcomes and owns the actual timer and link.
//!
//! ```text
//!                connect()                 handshake ok
//!  Disconnected ──────────► Connecting ─────────────────► Connected
//!       ▲   ▲                   │                             │
//!       │   │ retry timer       │ connect_error               │ disconnect
//!       │   └───────────────────┤◄────────────────────────────┘
//!       │                       │ attempts exhausted
//!       │ disconnect()          ▼
//!       └──────────────────  Abandoned  (manual connect() only)
//! ```
//!
//! Every attempt carries an [`AttemptId`]. `disconnect()` invalidates the
//! attempt in flight, so a handshake finishing after teardown is ignored.

use std::time::Duration;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any retry delay.
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Retries exhausted; only a manual connect leaves this state.
    Abandoned,
}

/// Identifies one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(u64);

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Stop retrying.
    Abandoned,
    /// The failure belonged to a stale attempt or state.
    Ignored,
}

/// Connection state machine.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    policy: ReconnectPolicy,
    status: ConnectionStatus,
    retry_count: u32,
    retry_scheduled: bool,
    generation: u64,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            status: ConnectionStatus::Disconnected,
            retry_count: 0,
            retry_scheduled: false,
            generation: 0,
        }
    }

    /// Manual connect.
    ///
    /// Returns the attempt to start, or `None` when already connecting or
    /// connected. Clears an abandoned state and any scheduled retry.
    pub fn connect(&mut self) -> Option<AttemptId> {
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                log::debug!("Push channel already {:?}", self.status);
                return None;
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Abandoned => {}
        }
        self.retry_count = 0;
        self.retry_scheduled = false;
        Some(self.begin_attempt())
    }

    /// The retry timer fired.
    pub fn retry_due(&mut self) -> Option<AttemptId> {
        if !self.retry_scheduled || self.status != ConnectionStatus::Disconnected {
            return None;
        }
        self.retry_scheduled = false;
        Some(self.begin_attempt())
    }

    fn begin_attempt(&mut self) -> AttemptId {
        self.generation += 1;
        self.status = ConnectionStatus::Connecting;
        AttemptId(self.generation)
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        attempt.0 == self.generation && self.status == ConnectionStatus::Connecting
    }

    /// Handshake succeeded. Returns `false` if the attempt is stale and its
    /// link must be dropped.
    pub fn connected(&mut self, attempt: AttemptId) -> bool {
        if !self.is_current(attempt) {
            return false;
        }
        self.status = ConnectionStatus::Connected;
        self.retry_count = 0;
        true
    }

    /// Handshake failed (`connect_error`).
    pub fn connect_failed(&mut self, attempt: AttemptId) -> RetryDecision {
        if !self.is_current(attempt) {
            return RetryDecision::Ignored;
        }
        self.schedule_retry()
    }

    /// An established link dropped (`disconnect`).
    pub fn link_lost(&mut self) -> RetryDecision {
        if self.status != ConnectionStatus::Connected {
            return RetryDecision::Ignored;
        }
        self.schedule_retry()
    }

    fn schedule_retry(&mut self) -> RetryDecision {
        if self.retry_count >= self.policy.max_attempts {
            log::error!(
                "Max reconnection attempts reached ({}), giving up",
                self.policy.max_attempts
            );
            self.status = ConnectionStatus::Abandoned;
            self.retry_scheduled = false;
            return RetryDecision::Abandoned;
        }

        self.retry_count += 1;
        let delay = self.policy.delay_for(self.retry_count);
        self.status = ConnectionStatus::Disconnected;
        self.retry_scheduled = true;

        log::info!(
            "Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            self.retry_count
        );
        RetryDecision::Retry {
            attempt: self.retry_count,
            delay,
        }
    }

    /// Explicit teardown. Idempotent; returns whether anything changed.
    pub fn disconnect(&mut self) -> bool {
        let changed = self.status != ConnectionStatus::Disconnected || self.retry_scheduled;
        // Invalidate the attempt in flight, if any
        self.generation += 1;
        self.status = ConnectionStatus::Disconnected;
        self.retry_scheduled = false;
        changed
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Consecutive failed attempts so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Delay the next scheduled retry would use.
    pub fn retry_delay(&self) -> Duration {
        self.policy.delay_for(self.retry_count.saturating_add(1))
    }

    pub fn retry_scheduled(&self) -> bool {
        self.retry_scheduled
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}
