//! Per-mirror health bookkeeping for the multi-mirror catalog source.
//!
//! Every configured mirror gets a process-lifetime [`MirrorHealth`] entry.
//! A mirror flips unhealthy after 3 consecutive failures and earns a cooldown
//! of `min(consecutive_failures * 2 minutes, 30 minutes)`; once the cooldown
//! elapses it becomes eligible for a re-probe. Any success restores it
//! immediately. The tracker is backed by a `DashMap` so concurrent searches
//! can share one instance without external locking.
//!
//! Cooldowns are routing decisions, not errors: they surface only through
//! [`MirrorHealthTracker::snapshot`].

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

/// Consecutive failures after which a mirror is marked unhealthy.
const UNHEALTHY_THRESHOLD: u32 = 3;

/// Cooldown added per consecutive failure (2 minutes).
const COOLDOWN_PER_FAILURE: Duration = Duration::from_secs(2 * 60);

/// Upper bound on the cooldown window (30 minutes).
const MAX_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Success/failure history for one mirror endpoint.
#[derive(Debug, Clone)]
pub struct MirrorHealth {
    /// Mirror base URL.
    pub endpoint: String,
    /// False only after [`UNHEALTHY_THRESHOLD`] consecutive failures.
    pub healthy: bool,
    /// Current failure streak; reset to 0 on any success.
    pub consecutive_failures: u32,
    /// When the most recent failure happened.
    pub last_failure: Option<Instant>,
    /// When the mirror was last attempted (success or failure).
    pub last_checked: Option<Instant>,
    /// Most recent successful response time in milliseconds.
    pub response_time_ms: u64,
}

impl MirrorHealth {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            healthy: true,
            consecutive_failures: 0,
            last_failure: None,
            last_checked: None,
            response_time_ms: 0,
        }
    }

    /// Cooldown earned by the current failure streak; zero when streak is zero.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return Duration::ZERO;
        }
        (COOLDOWN_PER_FAILURE * self.consecutive_failures).min(MAX_COOLDOWN)
    }

    fn in_cooldown_at(&self, now: Instant) -> bool {
        match self.last_failure {
            Some(last) => now.duration_since(last) < self.cooldown(),
            None => false,
        }
    }

    fn should_try_at(&self, now: Instant) -> bool {
        self.healthy || !self.in_cooldown_at(now)
    }
}

/// Read-only diagnostic view of one mirror.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorSnapshot {
    /// Mirror base URL.
    pub endpoint: String,
    /// Whether the mirror is currently considered healthy.
    pub healthy: bool,
    /// Current failure streak.
    pub consecutive_failures: u32,
    /// Most recent successful response time in milliseconds.
    pub response_time_ms: u64,
    /// Whether the mirror is inside its cooldown window right now.
    pub in_cooldown: bool,
    /// Length of the earned cooldown window in whole minutes.
    pub cooldown_minutes: u64,
}

/// Process-lifetime success/failure history for all catalog mirrors.
#[derive(Debug, Default)]
pub struct MirrorHealthTracker {
    mirrors: DashMap<String, MirrorHealth>,
}

impl MirrorHealthTracker {
    /// Creates an empty tracker; entries appear as mirrors are attempted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker with an entry per configured mirror.
    #[must_use]
    pub fn with_mirrors<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tracker = Self::new();
        for endpoint in endpoints {
            let endpoint = endpoint.into();
            tracker
                .mirrors
                .insert(endpoint.clone(), MirrorHealth::new(endpoint));
        }
        tracker
    }

    /// Records a successful attempt: clears the streak, restores health.
    pub fn record_success(&self, mirror: &str, response_time_ms: u64) {
        let mut entry = self
            .mirrors
            .entry(mirror.to_string())
            .or_insert_with(|| MirrorHealth::new(mirror));
        entry.healthy = true;
        entry.consecutive_failures = 0;
        entry.last_failure = None;
        entry.last_checked = Some(Instant::now());
        entry.response_time_ms = response_time_ms;
    }

    /// Records a failed attempt; the mirror flips unhealthy at the threshold.
    pub fn record_failure(&self, mirror: &str) {
        let mut entry = self
            .mirrors
            .entry(mirror.to_string())
            .or_insert_with(|| MirrorHealth::new(mirror));
        let now = Instant::now();
        entry.consecutive_failures += 1;
        entry.last_failure = Some(now);
        entry.last_checked = Some(now);
        if entry.consecutive_failures >= UNHEALTHY_THRESHOLD && entry.healthy {
            entry.healthy = false;
            debug!(
                mirror,
                failures = entry.consecutive_failures,
                cooldown_secs = entry.cooldown().as_secs(),
                "mirror marked unhealthy"
            );
        }
    }

    /// Returns true if the mirror is healthy, or unhealthy with an elapsed
    /// cooldown (re-probe policy). Unknown mirrors are always tried.
    #[must_use]
    pub fn should_try(&self, mirror: &str) -> bool {
        self.should_try_at(mirror, Instant::now())
    }

    fn should_try_at(&self, mirror: &str, now: Instant) -> bool {
        self.mirrors
            .get(mirror)
            .map_or(true, |entry| entry.should_try_at(now))
    }

    /// Orders mirrors for an attempt: healthy before unhealthy, then by
    /// ascending recorded response time; configured order breaks ties.
    #[must_use]
    pub fn rank_by_health(&self, mirrors: &[String]) -> Vec<String> {
        let mut ranked: Vec<String> = mirrors.to_vec();
        ranked.sort_by_key(|mirror| {
            self.mirrors.get(mirror).map_or((false, 0), |entry| {
                (!entry.healthy, entry.response_time_ms)
            })
        });
        ranked
    }

    /// Diagnostic view over every known mirror, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MirrorSnapshot> {
        let now = Instant::now();
        self.mirrors
            .iter()
            .map(|entry| MirrorSnapshot {
                endpoint: entry.endpoint.clone(),
                healthy: entry.healthy,
                consecutive_failures: entry.consecutive_failures,
                response_time_ms: entry.response_time_ms,
                in_cooldown: entry.in_cooldown_at(now),
                cooldown_minutes: entry.cooldown().as_secs() / 60,
            })
            .collect()
    }

    /// Operational override: clears all failure history, keeping the entries.
    pub fn reset(&self) {
        for mut entry in self.mirrors.iter_mut() {
            entry.healthy = true;
            entry.consecutive_failures = 0;
            entry.last_failure = None;
            entry.response_time_ms = 0;
        }
        debug!("mirror health history cleared");
    }

    /// Shifts a mirror's last-failure time into the past (test hook).
    #[cfg(test)]
    fn backdate_last_failure(&self, mirror: &str, by: Duration) {
        if let Some(mut entry) = self.mirrors.get_mut(mirror)
            && let Some(last) = entry.last_failure
        {
            entry.last_failure = last.checked_sub(by);
        }
    }
}
