//! Hierarchical time-ordered ID allocation.
//!
//! ```text
//! | 1 bit: 0 | 41 bits: ms since 2024-01-01 | 6 bits: top node | 8 bits: low node | 8 bits: sequence |
//! ```
//!
//! The top node identifies a warden deployment and the low node a partition
//! inside it. The warden mints its own IDs under low node 0; every initiated
//! member node is handed a distinct low node so that IDs it mints never
//! collide with the warden's or a sibling's.
//!
//! Each [`IdAllocator`] owns its own counter state. Entity families get
//! separate allocators so unrelated creation paths never contend on a lock.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Custom epoch: 2024-01-01 00:00:00 UTC (milliseconds since Unix epoch).
const EPOCH_MS: u64 = 1_704_067_200_000;

const TIMESTAMP_BITS: u32 = 41;
const TOP_NODE_BITS: u32 = 6;
const LOW_NODE_BITS: u32 = 8;
const SEQUENCE_BITS: u32 = 8;

const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Largest valid top node.
pub const MAX_TOP_NODE: u16 = (1 << TOP_NODE_BITS) - 1;
/// Largest valid low node.
pub const MAX_LOW_NODE: u16 = (1 << LOW_NODE_BITS) - 1;

/// Errors from ID allocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdGenError {
    #[error("top node {0} out of range (max {MAX_TOP_NODE})")]
    TopNodeOutOfRange(u16),

    #[error("low node {0} out of range (max {MAX_LOW_NODE})")]
    LowNodeOutOfRange(u16),

    #[error("system clock is before the allocator epoch")]
    SystemClock,

    #[error("timestamp space exhausted")]
    Exhausted,
}

/// The `(top, low)` pair that scopes an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub top: u16,
    pub low: u16,
}

impl Coordinate {
    /// Build a coordinate, rejecting values that do not fit the ID layout.
    pub const fn new(top: u16, low: u16) -> Result<Self, IdGenError> {
        if top > MAX_TOP_NODE {
            return Err(IdGenError::TopNodeOutOfRange(top));
        }
        if low > MAX_LOW_NODE {
            return Err(IdGenError::LowNodeOutOfRange(low));
        }
        Ok(Self { top, low })
    }
}

struct AllocatorState {
    last_timestamp: u64,
    sequence: u64,
}

/// A single allocator bound to one coordinate.
pub struct IdAllocator {
    coordinate: Coordinate,
    state: Mutex<AllocatorState>,
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("coordinate", &self.coordinate)
            .finish_non_exhaustive()
    }
}

impl IdAllocator {
    pub fn new(coordinate: Coordinate) -> Result<Self, IdGenError> {
        // Re-validate: the fields are public.
        let coordinate = Coordinate::new(coordinate.top, coordinate.low)?;
        Ok(Self {
            coordinate,
            state: Mutex::new(AllocatorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        })
    }

    pub const fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Issue the next ID. Strictly increasing for this allocator.
    pub fn generate(&self) -> Result<i64, IdGenError> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| IdGenError::SystemClock)?
            .as_millis();
        let now_ms = u64::try_from(now_ms).map_err(|_| IdGenError::Exhausted)?;
        let timestamp = now_ms
            .checked_sub(EPOCH_MS)
            .ok_or(IdGenError::SystemClock)?;
        self.generate_at(timestamp)
    }

    fn generate_at(&self, timestamp: u64) -> Result<i64, IdGenError> {
        let mut state = self.state.lock();

        if timestamp > state.last_timestamp {
            state.last_timestamp = timestamp;
            state.sequence = 0;
        } else {
            // Same millisecond, or the clock went backwards: stay on the last
            // timestamp and bump the sequence.
            state.sequence += 1;
            if state.sequence > SEQUENCE_MASK {
                state.last_timestamp += 1;
                state.sequence = 0;
            }
        }

        if state.last_timestamp > TIMESTAMP_MASK {
            return Err(IdGenError::Exhausted);
        }

        let id = (state.last_timestamp << (TOP_NODE_BITS + LOW_NODE_BITS + SEQUENCE_BITS))
            | (u64::from(self.coordinate.top) << (LOW_NODE_BITS + SEQUENCE_BITS))
            | (u64::from(self.coordinate.low) << SEQUENCE_BITS)
            | state.sequence;
        i64::try_from(id).map_err(|_| IdGenError::Exhausted)
    }
}

/// Split an ID back into its coordinate.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub const fn coordinate_of(id: i64) -> Coordinate {
    let id = id as u64;
    Coordinate {
        top: ((id >> (LOW_NODE_BITS + SEQUENCE_BITS)) & MAX_TOP_NODE as u64) as u16,
        low: ((id >> SEQUENCE_BITS) & MAX_LOW_NODE as u64) as u16,
    }
}

/// One allocator per table, all under the warden's own coordinate.
///
/// Allocators on one coordinate only avoid each other's IDs by living in
/// different tables, so both member node kinds draw from `member_nodes`.
#[derive(Debug)]
pub struct IdAllocators {
    pub holders: IdAllocator,
    pub holder_sessions: IdAllocator,
    pub admins: IdAllocator,
    pub admin_sessions: IdAllocator,
    pub member_nodes: IdAllocator,
    pub wardens: IdAllocator,
    pub sent_notifications: IdAllocator,
}

impl IdAllocators {
    /// Build every family allocator for `top`, using low node 0.
    pub fn new(top: u16) -> Result<Self, IdGenError> {
        let coordinate = Coordinate::new(top, 0)?;
        Ok(Self {
            holders: IdAllocator::new(coordinate)?,
            holder_sessions: IdAllocator::new(coordinate)?,
            admins: IdAllocator::new(coordinate)?,
            admin_sessions: IdAllocator::new(coordinate)?,
            member_nodes: IdAllocator::new(coordinate)?,
            wardens: IdAllocator::new(coordinate)?,
            sent_notifications: IdAllocator::new(coordinate)?,
        })
    }

    pub const fn top_node(&self) -> u16 {
        self.holders.coordinate().top
    }
}
