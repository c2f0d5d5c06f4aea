// NEAR/SAME address cache (RFC 3284, Section 5.3).
//
// Modes: 0 SELF (absolute), 1 HERE (here - value), 2..=5 NEAR
// (near[i] + value), 6..=8 SAME (same[(mode - 6) * 256 + byte]).
// Reset at the start of every window.

use super::code_table::{NEAR_SLOTS, SAME_GROUPS};
use super::varint;

const SAME_START: u8 = 2 + NEAR_SLOTS as u8;

/// Errors raised while decoding a COPY address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address section exhausted")]
    Exhausted,
    #[error("COPY address {addr} is not below here={here}")]
    OutOfRange { addr: u64, here: u64 },
    #[error("malformed address varint")]
    Malformed,
}

/// An encoded address: a varint for SELF/HERE/NEAR, one byte for SAME.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    Varint(u64),
    Byte(u8),
}

impl Encoded {
    pub fn write(self, out: &mut Vec<u8>) {
        match self {
            Encoded::Varint(v) => varint::push_u64(out, v),
            Encoded::Byte(b) => out.push(b),
        }
    }
}

#[derive(Clone)]
pub struct AddressCache {
    near: [u64; NEAR_SLOTS],
    next_near: usize,
    same: Vec<u64>,
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressCache {
    pub fn new() -> Self {
        Self {
            near: [0; NEAR_SLOTS],
            next_near: 0,
            same: vec![0; SAME_GROUPS * 256],
        }
    }

    pub fn reset(&mut self) {
        self.near = [0; NEAR_SLOTS];
        self.next_near = 0;
        self.same.fill(0);
    }

    fn remember(&mut self, addr: u64) {
        self.near[self.next_near] = addr;
        self.next_near = (self.next_near + 1) % NEAR_SLOTS;
        let slot = (addr % self.same.len() as u64) as usize;
        self.same[slot] = addr;
    }

    /// Pick the cheapest mode for `addr` at position `here`.
    pub fn encode(&mut self, addr: u64, here: u64) -> (u8, Encoded) {
        debug_assert!(addr < here);

        let slot = (addr % self.same.len() as u64) as usize;
        if self.same[slot] == addr {
            self.remember(addr);
            let mode = SAME_START + (slot / 256) as u8;
            return (mode, Encoded::Byte((slot % 256) as u8));
        }

        let mut best = (0u8, addr);
        let mut consider = |mode: u8, value: u64| {
            if varint::sizeof_u64(value) < varint::sizeof_u64(best.1) {
                best = (mode, value);
            }
        };
        consider(1, here - addr);
        for (i, &near) in self.near.iter().enumerate() {
            if addr >= near {
                consider(2 + i as u8, addr - near);
            }
        }

        self.remember(addr);
        (best.0, Encoded::Varint(best.1))
    }

    /// Decode an address in `mode` from the front of `data`; returns the
    /// address and the number of bytes consumed.
    pub fn decode(&mut self, mode: u8, data: &[u8], here: u64) -> Result<(u64, usize), AddressError> {
        let (addr, used) = if mode < SAME_START {
            let (value, used) = varint::read_u64(data).map_err(|e| match e {
                varint::VarIntError::Truncated => AddressError::Exhausted,
                varint::VarIntError::Overflow => AddressError::Malformed,
            })?;
            let addr = match mode {
                0 => Some(value),
                1 => here.checked_sub(value),
                n => self.near[(n - 2) as usize].checked_add(value),
            }
            .ok_or(AddressError::Malformed)?;
            (addr, used)
        } else {
            let byte = *data.first().ok_or(AddressError::Exhausted)?;
            let group = (mode - SAME_START) as usize;
            (self.same[group * 256 + byte as usize], 1)
        };

        if addr >= here {
            return Err(AddressError::OutOfRange { addr, here });
        }
        self.remember(addr);
        Ok((addr, used))
    }
}
