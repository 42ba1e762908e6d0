//! Time-sortable envelope identifiers.
//!
//! # Format
//! UUIDv7 in hyphenated lowercase form. The first 48 bits are the Unix
//! timestamp in milliseconds, so the string form sorts by creation time.
//! A 12-bit sequence in `rand_a` orders identifiers minted within the same
//! millisecond; the remaining 62 bits are random.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use uuid::Builder;

/// Source of envelope identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a new identifier. Identifiers from one generator never sort
    /// before identifiers it produced earlier.
    fn next_id(&self) -> String;
}

const MAX_SEQUENCE: u16 = 0x0FFF;

#[derive(Debug, Default)]
struct Clock {
    last_ms: u64,
    sequence: u16,
}

/// UUIDv7 generator with a per-instance monotonic clock.
#[derive(Debug, Default)]
pub struct TimeOrderedIds {
    clock: Mutex<Clock>,
}

impl TimeOrderedIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next (millisecond, sequence) slot for `now_ms`.
    fn tick(&self, now_ms: u64) -> (u64, u16) {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        if now_ms > clock.last_ms {
            clock.last_ms = now_ms;
            clock.sequence = 0;
        } else if clock.sequence < MAX_SEQUENCE {
            // Same millisecond, or the wall clock stepped backwards.
            clock.sequence += 1;
        } else {
            clock.last_ms += 1;
            clock.sequence = 0;
        }
        (clock.last_ms, clock.sequence)
    }

    fn id_at(&self, now_ms: u64) -> String {
        let (ms, sequence) = self.tick(now_ms);

        let mut tail = [0u8; 10];
        rand::thread_rng().fill_bytes(&mut tail);
        // The builder overwrites the high nibble of tail[0] with the version.
        tail[0] = (sequence >> 8) as u8 & 0x0F;
        tail[1] = sequence as u8;

        Builder::from_unix_timestamp_millis(ms, &tail)
            .into_uuid()
            .hyphenated()
            .to_string()
    }
}

impl IdGenerator for TimeOrderedIds {
    fn next_id(&self) -> String {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.id_at(now_ms)
    }
}
