// VCDIFF format layer (RFC 3284).
//
// Pure functions and small state machines over byte slices; nothing here
// knows about sessions, threads or streams.
//
// - `varint`        base-128 integers, most significant group first
// - `code_table`    default 256-entry instruction table
// - `address_cache` NEAR/SAME COPY address cache
// - `header`        file and window headers
// - `encoder`       instruction stream to window bytes
// - `decoder`       chunk-fed decoder with limits and checksums
// - `json`          JSON rendering of the instruction stream

pub mod address_cache;
pub mod code_table;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod json;
pub mod varint;

pub use address_cache::{AddressCache, AddressError};
pub use decoder::{DecoderLimits, StreamDecoder};
pub use encoder::{Layout, WindowEncoder};
pub use header::{FileHeader, VCDIFF_MAGIC, WindowHeader};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything that can go wrong while reading a delta.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// More bytes are needed; only fatal once the input has ended.
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("not a VCDIFF delta (unexpected byte {0:#04x} in magic)")]
    BadMagic(u8),
    #[error("unsupported VCDIFF version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("unsupported VCDIFF feature: {0}")]
    Unsupported(&'static str),
    #[error("invalid {what} indicator {value:#04x}")]
    InvalidIndicator { what: &'static str, value: u8 },
    #[error("malformed delta: {0}")]
    Malformed(String),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("target window of {size} bytes exceeds the {limit}-byte window limit")]
    WindowTooLarge { size: u64, limit: u64 },
    #[error("decoded target exceeds the {limit}-byte file limit")]
    FileTooLarge { limit: u64 },
    #[error("VCD_TARGET windows are not allowed")]
    TargetNotAllowed,
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("invalid JSON delta: {0}")]
    Json(String),
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// One delta instruction as produced by the matcher.
///
/// `Add` carries only a length: the literal bytes are the next `len` bytes
/// of the target window at the point the instruction applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Add { len: u32 },
    /// COPY from the dictionary+target address space of the window.
    Copy { addr: u64, len: u32 },
    Run { byte: u8, len: u32 },
}

impl Instruction {
    /// Number of target bytes the instruction produces.
    pub fn len(&self) -> u32 {
        match *self {
            Instruction::Add { len } | Instruction::Copy { len, .. } | Instruction::Run { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

/// Adler-32 of `data`, as carried by checksummed windows.
pub fn adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + u32::from(byte)) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }
}
