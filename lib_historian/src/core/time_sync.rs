//! # Time Synchronization Engine
//!
//! The server indexes its history by its own clock while callers think in
//! local time, so the client keeps a signed offset `client - server` and
//! refreshes it with round-trip probes.
//!
//! A cycle sends probes one after another until `sample_target` answers are
//! in, then keeps the sample with the smallest round trip (the one least
//! distorted by network jitter) and discards the rest.
//!
//! This type is a pure state machine: the engine owns the socket and the ids,
//! and reports send and receive times to it.

use super::registry::RequestId;

/// One probe answer, kept only while its cycle runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTripSample {
    pub round_trip: f64,
    pub offset: f64,
}

/// What the engine should do after a probe answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncProgress {
    /// The answer does not belong to the running cycle.
    Ignored,
    /// Send another probe.
    NeedMore,
    /// The cycle finished and the offset was updated.
    Complete { offset: f64, first_on_connection: bool },
}

pub struct TimeSync {
    enabled: bool,
    offset: f64,
    sample_target: usize,
    resync_interval: f64,
    samples: Vec<RoundTripSample>,
    running: bool,
    in_flight: Option<(RequestId, f64)>,
    cycle_started: Option<f64>,
    requests_released: bool,
}

impl TimeSync {
    pub fn new(enabled: bool, sample_target: usize, resync_interval_secs: f64) -> Self {
        Self {
            enabled,
            offset: 0.0,
            sample_target: sample_target.max(1),
            resync_interval: resync_interval_secs,
            samples: Vec::with_capacity(sample_target),
            running: false,
            in_flight: None,
            cycle_started: None,
            requests_released: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current `client - server` offset in seconds.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn probe_in_flight(&self) -> Option<RequestId> {
        self.in_flight.map(|(id, _)| id)
    }

    /// Client time to server time. Identity while sync is off.
    pub fn to_server(&self, t: f64) -> f64 {
        if self.enabled {
            t - self.offset
        } else {
            t
        }
    }

    /// Server time to client time. Identity while sync is off.
    pub fn to_client(&self, t: f64) -> f64 {
        if self.enabled {
            t + self.offset
        } else {
            t
        }
    }

    /// True when requests must wait for the first cycle on this connection.
    pub fn blocks_requests(&self) -> bool {
        self.enabled && !self.requests_released
    }

    /// True when an outgoing request should kick off a new cycle.
    pub fn is_due(&self, now: f64) -> bool {
        if !self.enabled || self.running {
            return false;
        }
        match self.cycle_started {
            None => true,
            Some(started) => now - started > self.resync_interval,
        }
    }

    /// A new connection was opened. With sync enabled, requests wait for its
    /// first cycle.
    pub fn connection_opened(&mut self) {
        self.abort_cycle();
        self.requests_released = !self.enabled;
    }

    /// The connection went away; any running cycle is lost with it.
    pub fn connection_lost(&mut self) -> Option<RequestId> {
        self.abort_cycle()
    }

    pub fn start_cycle(&mut self, now: f64) {
        self.samples.clear();
        self.running = true;
        self.cycle_started = Some(now);
    }

    /// Records that probe `id` was written at local time `now`.
    pub fn begin_probe(&mut self, id: RequestId, now: f64) {
        self.in_flight = Some((id, now));
    }

    /// Feeds the server timestamp (ns) of probe `id`, received at local `now`.
    pub fn record(&mut self, id: RequestId, server_ns: u64, now: f64) -> SyncProgress {
        let sent_at = match self.in_flight {
            Some((probe, sent_at)) if probe == id && self.running => sent_at,
            _ => return SyncProgress::Ignored,
        };
        self.in_flight = None;

        let round_trip = now - sent_at;
        let server_at_receive = server_ns as f64 / 1e9 + round_trip / 2.0;
        self.samples.push(RoundTripSample {
            round_trip,
            offset: now - server_at_receive,
        });
        log::trace!("Clock probe {}: rtt {:.6}s, {} sample(s)", id, round_trip, self.samples.len());

        if self.samples.len() < self.sample_target {
            return SyncProgress::NeedMore;
        }

        let best = self
            .samples
            .iter()
            .copied()
            .min_by(|a, b| a.round_trip.total_cmp(&b.round_trip));
        self.samples.clear();
        self.running = false;
        if let Some(best) = best {
            self.offset = best.offset;
        }
        let first_on_connection = !self.requests_released;
        self.requests_released = true;
        SyncProgress::Complete {
            offset: self.offset,
            first_on_connection,
        }
    }

    /// Ends the cycle after probe `id` was rejected, keeping the old offset.
    ///
    /// Returns `Some(first_on_connection)` if `id` was the probe in flight.
    pub fn give_up_cycle(&mut self, id: RequestId) -> Option<bool> {
        if self.probe_in_flight() != Some(id) {
            return None;
        }
        self.abort_cycle();
        let first_on_connection = !self.requests_released;
        self.requests_released = true;
        Some(first_on_connection)
    }

    /// Switches sync on or off. Turning it off drops the running cycle and
    /// returns the probe that was in flight, so its waiter can be failed.
    pub fn set_enabled(&mut self, enabled: bool) -> Option<RequestId> {
        if self.enabled == enabled {
            return None;
        }
        self.enabled = enabled;
        if enabled {
            None
        } else {
            // Requests are released now; re-enabling never holds them back again
            // on this connection.
            self.requests_released = true;
            self.cycle_started = None;
            self.abort_cycle()
        }
    }

    fn abort_cycle(&mut self) -> Option<RequestId> {
        self.samples.clear();
        self.running = false;
        self.in_flight.take().map(|(id, _)| id)
    }
}
