use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bits reserved for the event number (lowest range).
pub const EVENT_BITS: u32 = 21;
/// Bits reserved for the sub-run number (middle range).
pub const SUBRUN_BITS: u32 = 21;
/// Bits reserved for the run number (highest range).
pub const RUN_BITS: u32 = 64 - EVENT_BITS - SUBRUN_BITS;

const SUBRUN_SHIFT: u32 = EVENT_BITS;
const RUN_SHIFT: u32 = EVENT_BITS + SUBRUN_BITS;

const fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Stable 64-bit identity of an event, packed from (run, sub-run, event).
///
/// The three fields occupy disjoint bit ranges, so two distinct in-range
/// triples never produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey(pub u64);

impl EventKey {
    /// Pack a triple whose fields are already known to be in range.
    ///
    /// Out-of-range fields are a caller error; use [`EventKey::try_new`]
    /// when the inputs come straight from a file.
    pub fn encode(run: u32, subrun: u32, event: u32) -> Self {
        debug_assert!(u64::from(run) <= mask(RUN_BITS));
        debug_assert!(u64::from(subrun) <= mask(SUBRUN_BITS));
        debug_assert!(u64::from(event) <= mask(EVENT_BITS));
        EventKey(
            (u64::from(run) << RUN_SHIFT)
                | (u64::from(subrun) << SUBRUN_SHIFT)
                | u64::from(event),
        )
    }

    /// Validate each field against its bit range, then pack.
    pub fn try_new(run: i64, subrun: i64, event: i64) -> Result<Self> {
        let run = check_field("run", run, RUN_BITS)?;
        let subrun = check_field("subrun", subrun, SUBRUN_BITS)?;
        let event = check_field("event", event, EVENT_BITS)?;
        Ok(Self::encode(run, subrun, event))
    }

    pub fn run(&self) -> u32 {
        (self.0 >> RUN_SHIFT) as u32
    }

    pub fn subrun(&self) -> u32 {
        ((self.0 >> SUBRUN_SHIFT) & mask(SUBRUN_BITS)) as u32
    }

    pub fn event(&self) -> u32 {
        (self.0 & mask(EVENT_BITS)) as u32
    }
}

fn check_field(field: &'static str, value: i64, bits: u32) -> Result<u32> {
    if value < 0 || value as u64 > mask(bits) {
        return Err(Error::KeyOutOfRange { field, value, bits });
    }
    Ok(value as u32)
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.run(), self.subrun(), self.event())
    }
}
