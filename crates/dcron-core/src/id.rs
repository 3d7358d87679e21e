//! Snowflake-style job identifier generator.
//!
//! A 41-bit millisecond timestamp (since a fixed epoch), a 16-bit machine discriminant, and a
//! sequence counter, packed behind a single mutex around `next_id` — mirroring the original's
//! `sonyflake`-backed generator, minus the network lookup (the machine id is a process-local
//! random value instead of the host's private IPv4, since replica identity here is whatever the
//! deployment topology assigns).

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rand::Rng;

const SEQUENCE_BITS: u64 = 8;
const MACHINE_ID_BITS: u64 = 16;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

struct State {
    last_ms: i64,
    sequence: u64,
}

pub struct Snowflake {
    epoch_ms: i64,
    machine_id: u64,
    state: Mutex<State>,
}

impl Snowflake {
    pub fn new() -> Self {
        Self::with_machine_id(rand::thread_rng().gen_range(0..(1u64 << MACHINE_ID_BITS)))
    }

    pub fn with_machine_id(machine_id: u64) -> Self {
        let epoch = Utc.with_ymd_and_hms(1983, 1, 1, 0, 0, 0).unwrap();
        Self {
            epoch_ms: epoch.timestamp_millis(),
            machine_id: machine_id & ((1 << MACHINE_ID_BITS) - 1),
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        let mut now_ms = Utc::now().timestamp_millis() - self.epoch_ms;

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted within this millisecond; spin to the next tick.
                while now_ms <= state.last_ms {
                    now_ms = Utc::now().timestamp_millis() - self.epoch_ms;
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now_ms;

        ((now_ms as u64) << (MACHINE_ID_BITS + SEQUENCE_BITS))
            | (self.machine_id << SEQUENCE_BITS)
            | state.sequence
    }

    pub fn next_id_string(&self) -> String {
        self.next_id().to_string()
    }
}

impl Default for Snowflake {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonically_increasing() {
        let sf = Snowflake::new();
        let mut prev = sf.next_id();
        for _ in 0..1000 {
            let id = sf.next_id();
            assert!(id > prev);
            prev = id;
        }
    }
}
