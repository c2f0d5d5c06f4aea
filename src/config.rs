// Session options and their validation.
//
// Callers fill in `EncodeOptions` / `DecodeOptions` (plain structs with
// public fields) and `validate()` turns them into immutable configuration
// records, or a validation error, before any engine state exists.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use bytes::Bytes;

use crate::error::VcdiffError;
use crate::hash::HashedDictionary;
use crate::vcdiff::DecoderLimits;

// ---------------------------------------------------------------------------
// Defaults and bounds
// ---------------------------------------------------------------------------

pub const DEFAULT_MIN_ENCODE_WINDOW_SIZE: usize = 4096;
pub const MIN_MIN_ENCODE_WINDOW_SIZE: usize = 64;
/// Smallest accepted `encode_window_size`.
pub const MIN_ENCODE_WINDOW_SIZE: usize = 64;
pub const DEFAULT_ENCODE_WINDOW_SIZE: usize = 1 << 23; // 8 MiB

pub const DEFAULT_MAX_TARGET_FILE_SIZE: u64 = 1 << 26; // 64 MiB
pub const DEFAULT_MAX_TARGET_WINDOW_SIZE: u64 = 1 << 26;
pub const MIN_MAX_TARGET_FILE_SIZE: u64 = 1;
pub const MAX_MAX_TARGET_FILE_SIZE: u64 = u32::MAX as u64;
pub const MIN_MAX_TARGET_WINDOW_SIZE: u64 = 1;
pub const MAX_MAX_TARGET_WINDOW_SIZE: u64 = u32::MAX as u64;

pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// Mode and format flags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Encode,
    Decode,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Encode => "encode",
            Mode::Decode => "decode",
        })
    }
}

bitflags! {
    /// Encoder output format. The empty set is plain RFC 3284.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatFlags: u32 {
        const INTERLEAVED = 1;
        const CHECKSUM = 2;
        const JSON = 4;
    }
}

impl FormatFlags {
    pub const STANDARD: Self = Self::empty();
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encoder options as supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Required.
    pub dictionary: Option<Arc<HashedDictionary>>,
    /// Buffered bytes that trigger a dispatch. Default 4096, at least 64.
    pub min_encode_window_size: Option<usize>,
    /// Largest VCDIFF window the encoder emits. Default 8 MiB, at least 64.
    pub encode_window_size: Option<usize>,
    pub interleaved: bool,
    pub checksum: bool,
    pub json: bool,
    /// Allow COPY from earlier bytes of the same target window.
    pub target_matches: bool,
    /// Queued input bytes above which the stream asks writers to wait.
    pub high_water_mark: Option<usize>,
}

impl EncodeOptions {
    pub fn new(dictionary: Arc<HashedDictionary>) -> Self {
        Self {
            dictionary: Some(dictionary),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<EncodeConfig, VcdiffError> {
        let dictionary = self
            .dictionary
            .clone()
            .ok_or_else(|| VcdiffError::validation("encoder requires a hashed dictionary"))?;

        let min_encode_window_size = self.min_encode_window_size.unwrap_or(DEFAULT_MIN_ENCODE_WINDOW_SIZE);
        if min_encode_window_size < MIN_MIN_ENCODE_WINDOW_SIZE {
            return Err(VcdiffError::validation(format!(
                "minEncodeWindowSize must be at least {MIN_MIN_ENCODE_WINDOW_SIZE}, got {min_encode_window_size}"
            )));
        }

        let encode_window_size = self.encode_window_size.unwrap_or(DEFAULT_ENCODE_WINDOW_SIZE);
        if encode_window_size < MIN_ENCODE_WINDOW_SIZE {
            return Err(VcdiffError::validation(format!(
                "encodeWindowSize must be at least {MIN_ENCODE_WINDOW_SIZE}, got {encode_window_size}"
            )));
        }

        let mut flags = FormatFlags::STANDARD;
        if self.interleaved {
            flags |= FormatFlags::INTERLEAVED;
        }
        if self.checksum {
            flags |= FormatFlags::CHECKSUM;
        }
        if self.json {
            flags |= FormatFlags::JSON;
        }

        Ok(EncodeConfig {
            dictionary,
            min_encode_window_size,
            encode_window_size,
            flags,
            target_matches: self.target_matches,
            high_water_mark: validate_high_water_mark(self.high_water_mark)?,
        })
    }
}

/// Validated encoder configuration.
#[derive(Debug, Clone)]
pub struct EncodeConfig {
    dictionary: Arc<HashedDictionary>,
    min_encode_window_size: usize,
    encode_window_size: usize,
    flags: FormatFlags,
    target_matches: bool,
    high_water_mark: usize,
}

impl EncodeConfig {
    pub fn dictionary(&self) -> &Arc<HashedDictionary> {
        &self.dictionary
    }

    pub fn min_encode_window_size(&self) -> usize {
        self.min_encode_window_size
    }

    pub fn encode_window_size(&self) -> usize {
        self.encode_window_size
    }

    pub fn flags(&self) -> FormatFlags {
        self.flags
    }

    pub fn target_matches(&self) -> bool {
        self.target_matches
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decoder options as supplied by the caller.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Required, raw dictionary bytes.
    pub dictionary: Option<Bytes>,
    /// Accept windows whose source segment is earlier target output.
    pub allow_vcd_target: bool,
    /// Default 64 MiB, within [1, 2^32 - 1].
    pub max_target_file_size: Option<u64>,
    /// Default 64 MiB, within [1, 2^32 - 1].
    pub max_target_window_size: Option<u64>,
    pub high_water_mark: Option<usize>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            dictionary: None,
            allow_vcd_target: true,
            max_target_file_size: None,
            max_target_window_size: None,
            high_water_mark: None,
        }
    }
}

impl DecodeOptions {
    pub fn new(dictionary: impl Into<Bytes>) -> Self {
        Self {
            dictionary: Some(dictionary.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<DecodeConfig, VcdiffError> {
        let dictionary = self
            .dictionary
            .clone()
            .ok_or_else(|| VcdiffError::validation("decoder requires dictionary bytes"))?;
        if dictionary.is_empty() {
            return Err(VcdiffError::validation("dictionary must not be empty"));
        }

        let max_target_file_size = check_range(
            "maxTargetFileSize",
            self.max_target_file_size,
            DEFAULT_MAX_TARGET_FILE_SIZE,
            MIN_MAX_TARGET_FILE_SIZE,
            MAX_MAX_TARGET_FILE_SIZE,
        )?;
        let max_target_window_size = check_range(
            "maxTargetWindowSize",
            self.max_target_window_size,
            DEFAULT_MAX_TARGET_WINDOW_SIZE,
            MIN_MAX_TARGET_WINDOW_SIZE,
            MAX_MAX_TARGET_WINDOW_SIZE,
        )?;

        Ok(DecodeConfig {
            dictionary,
            limits: DecoderLimits {
                max_target_file_size,
                max_target_window_size,
                allow_vcd_target: self.allow_vcd_target,
            },
            high_water_mark: validate_high_water_mark(self.high_water_mark)?,
        })
    }
}

/// Validated decoder configuration.
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    dictionary: Bytes,
    limits: DecoderLimits,
    high_water_mark: usize,
}

impl DecodeConfig {
    pub fn dictionary(&self) -> &Bytes {
        &self.dictionary
    }

    pub fn limits(&self) -> DecoderLimits {
        self.limits
    }

    pub fn allow_vcd_target(&self) -> bool {
        self.limits.allow_vcd_target
    }

    pub fn max_target_file_size(&self) -> u64 {
        self.limits.max_target_file_size
    }

    pub fn max_target_window_size(&self) -> u64 {
        self.limits.max_target_window_size
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
}

// ---------------------------------------------------------------------------
// Either mode
// ---------------------------------------------------------------------------

/// A validated configuration for one session.
#[derive(Debug, Clone)]
pub enum SessionConfig {
    Encode(EncodeConfig),
    Decode(DecodeConfig),
}

impl SessionConfig {
    pub fn mode(&self) -> Mode {
        match self {
            SessionConfig::Encode(_) => Mode::Encode,
            SessionConfig::Decode(_) => Mode::Decode,
        }
    }

    pub fn high_water_mark(&self) -> usize {
        match self {
            SessionConfig::Encode(c) => c.high_water_mark,
            SessionConfig::Decode(c) => c.high_water_mark,
        }
    }

    /// Buffered bytes that trigger a dispatch. Decoders dispatch every write.
    pub fn dispatch_threshold(&self) -> usize {
        match self {
            SessionConfig::Encode(c) => c.min_encode_window_size,
            SessionConfig::Decode(_) => 0,
        }
    }
}

impl From<EncodeConfig> for SessionConfig {
    fn from(c: EncodeConfig) -> Self {
        SessionConfig::Encode(c)
    }
}

impl From<DecodeConfig> for SessionConfig {
    fn from(c: DecodeConfig) -> Self {
        SessionConfig::Decode(c)
    }
}

fn check_range(name: &str, value: Option<u64>, default: u64, min: u64, max: u64) -> Result<u64, VcdiffError> {
    let value = value.unwrap_or(default);
    if !(min..=max).contains(&value) {
        return Err(VcdiffError::validation(format!(
            "{name} must be within [{min}, {max}], got {value}"
        )));
    }
    Ok(value)
}

fn validate_high_water_mark(value: Option<usize>) -> Result<usize, VcdiffError> {
    match value.unwrap_or(DEFAULT_HIGH_WATER_MARK) {
        0 => Err(VcdiffError::validation("highWaterMark must be at least 1")),
        hwm => Ok(hwm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn dict() -> Arc<HashedDictionary> {
        Arc::new(HashedDictionary::new(&b"abcabc"[..]).unwrap())
    }

    #[test]
    fn encode_defaults() {
        let cfg = EncodeOptions::new(dict()).validate().unwrap();
        assert_eq!(cfg.min_encode_window_size(), 4096);
        assert_eq!(cfg.encode_window_size(), DEFAULT_ENCODE_WINDOW_SIZE);
        assert_eq!(cfg.flags(), FormatFlags::STANDARD);
        assert_eq!(cfg.high_water_mark(), DEFAULT_HIGH_WATER_MARK);
    }

    #[test]
    fn flags_combine_by_or() {
        let opts = EncodeOptions {
            interleaved: true,
            json: true,
            ..EncodeOptions::new(dict())
        };
        let flags = opts.validate().unwrap().flags();
        assert_eq!(flags.bits(), 1 | 4);
    }

    #[test]
    fn encoder_needs_a_dictionary() {
        let err = EncodeOptions::default().validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn window_size_lower_bounds() {
        for (min, win, ok) in [(Some(63), None, false), (Some(64), None, true), (None, Some(63), false), (None, Some(64), true)] {
            let opts = EncodeOptions {
                min_encode_window_size: min,
                encode_window_size: win,
                ..EncodeOptions::new(dict())
            };
            assert_eq!(opts.validate().is_ok(), ok, "min={min:?} win={win:?}");
        }
    }

    #[test]
    fn decode_defaults() {
        let cfg = DecodeOptions::new(&b"abc"[..]).validate().unwrap();
        assert!(cfg.allow_vcd_target());
        assert_eq!(cfg.max_target_file_size(), 1 << 26);
        assert_eq!(cfg.max_target_window_size(), 1 << 26);
    }

    #[test]
    fn decode_limits_range() {
        for (value, ok) in [(0u64, false), (1, true), (u32::MAX as u64, true), (1 << 32, false)] {
            let opts = DecodeOptions {
                max_target_window_size: Some(value),
                ..DecodeOptions::new(&b"abc"[..])
            };
            assert_eq!(opts.validate().is_ok(), ok, "{value}");
        }
    }

    #[test]
    fn decoder_dictionary_must_be_present_and_non_empty() {
        assert!(DecodeOptions::default().validate().is_err());
        assert!(DecodeOptions::new(Bytes::new()).validate().is_err());
    }

    #[test]
    fn zero_high_water_mark_is_rejected() {
        let opts = DecodeOptions {
            high_water_mark: Some(0),
            ..DecodeOptions::new(&b"abc"[..])
        };
        assert_eq!(opts.validate().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn session_config_dispatches_decoders_eagerly() {
        let cfg: SessionConfig = DecodeOptions::new(&b"abc"[..]).validate().unwrap().into();
        assert_eq!(cfg.mode(), Mode::Decode);
        assert_eq!(cfg.dispatch_threshold(), 0);
    }
}
