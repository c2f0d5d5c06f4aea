// VCDIFF file header and per-window header (RFC 3284, Section 4).
//
// Parsing works on a byte slice that may end anywhere; running out of
// bytes is reported as `FormatError::Truncated` so a chunk-fed decoder can
// wait for more input instead of failing.

use super::FormatError;
use super::varint::{self, VarIntError};

pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];

/// Plain RFC 3284.
pub const VERSION_STANDARD: u8 = 0x00;
/// Extended format: interleaved sections and per-window checksums.
pub const VERSION_EXTENDED: u8 = b'S';

// Header indicator bits.
pub const VCD_DECOMPRESS: u8 = 0x01;
pub const VCD_CODETABLE: u8 = 0x02;
pub const VCD_APPHEADER: u8 = 0x04;

// Window indicator bits.
pub const VCD_SOURCE: u8 = 0x01;
pub const VCD_TARGET: u8 = 0x02;
pub const VCD_CHECKSUM: u8 = 0x04;

/// Byte cursor over possibly incomplete input.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    pub(crate) fn byte(&mut self, what: &'static str) -> Result<u8, FormatError> {
        let b = *self.data.get(self.pos).ok_or(FormatError::Truncated(what))?;
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn varint(&mut self, what: &'static str) -> Result<u64, FormatError> {
        let (value, used) = varint::read_u64(&self.data[self.pos..]).map_err(|e| match e {
            VarIntError::Truncated => FormatError::Truncated(what),
            VarIntError::Overflow => FormatError::Malformed(format!("{what} overflows")),
        })?;
        self.pos += used;
        Ok(value)
    }

    pub(crate) fn bytes(&mut self, len: u64, what: &'static str) -> Result<&'a [u8], FormatError> {
        let len = usize::try_from(len).map_err(|_| FormatError::Malformed(format!("{what} too long")))?;
        let end = self.pos.checked_add(len).ok_or(FormatError::Truncated(what))?;
        let slice = self.data.get(self.pos..end).ok_or(FormatError::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }
}

/// The file header: magic, version and header indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
}

impl FileHeader {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&VCDIFF_MAGIC);
        out.push(self.version);
        out.push(0);
    }

    /// Parse a header from the front of `data`; returns it and its length.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), FormatError> {
        let mut r = Reader::new(data);
        let mut magic = [0u8; 3];
        for (i, slot) in magic.iter_mut().enumerate() {
            *slot = r.byte("file header")?;
            if *slot != VCDIFF_MAGIC[i] {
                return Err(FormatError::BadMagic(*slot));
            }
        }

        let version = r.byte("file header")?;
        if version != VERSION_STANDARD && version != VERSION_EXTENDED {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let indicator = r.byte("file header")?;
        if indicator & VCD_DECOMPRESS != 0 {
            return Err(FormatError::Unsupported("secondary compression"));
        }
        if indicator & VCD_CODETABLE != 0 {
            return Err(FormatError::Unsupported("application-defined code table"));
        }
        if indicator & !VCD_APPHEADER != 0 {
            return Err(FormatError::InvalidIndicator {
                what: "header",
                value: indicator,
            });
        }
        if indicator & VCD_APPHEADER != 0 {
            let len = r.varint("application header")?;
            r.bytes(len, "application header")?;
        }

        Ok((Self { version }, r.position()))
    }
}

/// Source or target segment referenced by a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub len: u64,
    pub offset: u64,
}

/// A parsed or to-be-written window header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowHeader {
    pub indicator: u8,
    pub segment: Option<Segment>,
    pub target_len: u64,
    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    pub checksum: Option<u32>,
}

impl WindowHeader {
    /// Length of the delta encoding as recorded in the header.
    fn delta_encoding_len(&self) -> u64 {
        let mut len = (varint::sizeof_u64(self.target_len)
            + 1
            + varint::sizeof_u64(self.data_len)
            + varint::sizeof_u64(self.inst_len)
            + varint::sizeof_u64(self.addr_len)) as u64;
        if let Some(sum) = self.checksum {
            len += varint::sizeof_u64(u64::from(sum)) as u64;
        }
        len.saturating_add(self.body_len())
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.indicator);
        if let Some(seg) = self.segment {
            varint::push_u64(out, seg.len);
            varint::push_u64(out, seg.offset);
        }
        varint::push_u64(out, self.delta_encoding_len());
        varint::push_u64(out, self.target_len);
        out.push(0);
        varint::push_u64(out, self.data_len);
        varint::push_u64(out, self.inst_len);
        varint::push_u64(out, self.addr_len);
        if let Some(sum) = self.checksum {
            varint::push_u64(out, u64::from(sum));
        }
    }

    /// Parse a window header; `version` is the file header's version byte.
    /// Returns the header and the number of bytes it occupied.
    pub fn parse(data: &[u8], version: u8) -> Result<(Self, usize), FormatError> {
        let mut r = Reader::new(data);
        let indicator = r.byte("window header")?;

        let allowed = if version == VERSION_EXTENDED {
            VCD_SOURCE | VCD_TARGET | VCD_CHECKSUM
        } else {
            VCD_SOURCE | VCD_TARGET
        };
        if indicator & !allowed != 0 || indicator & (VCD_SOURCE | VCD_TARGET) == VCD_SOURCE | VCD_TARGET {
            return Err(FormatError::InvalidIndicator {
                what: "window",
                value: indicator,
            });
        }

        let segment = if indicator & (VCD_SOURCE | VCD_TARGET) != 0 {
            let len = r.varint("window header")?;
            let offset = r.varint("window header")?;
            Some(Segment { len, offset })
        } else {
            None
        };

        let encoding_len = r.varint("window header")?;
        let target_len = r.varint("window header")?;
        let delta_indicator = r.byte("window header")?;
        if delta_indicator != 0 {
            return Err(FormatError::Unsupported("secondary-compressed sections"));
        }
        let data_len = r.varint("window header")?;
        let inst_len = r.varint("window header")?;
        let addr_len = r.varint("window header")?;
        let checksum = if indicator & VCD_CHECKSUM != 0 {
            let raw = r.varint("window header")?;
            Some(u32::try_from(raw).map_err(|_| FormatError::Malformed("checksum exceeds 32 bits".into()))?)
        } else {
            None
        };

        let header = Self {
            indicator,
            segment,
            target_len,
            data_len,
            inst_len,
            addr_len,
            checksum,
        };
        let expected = header.delta_encoding_len();
        if encoding_len != expected {
            return Err(FormatError::Malformed(format!(
                "delta encoding length {encoding_len} disagrees with sections ({expected})"
            )));
        }
        Ok((header, r.position()))
    }

    /// Total bytes of the three sections following the header.
    pub fn body_len(&self) -> u64 {
        self.data_len
            .saturating_add(self.inst_len)
            .saturating_add(self.addr_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_layout() {
        let mut out = Vec::new();
        FileHeader { version: VERSION_EXTENDED }.write(&mut out);
        assert_eq!(out, [0xD6, 0xC3, 0xC4, b'S', 0]);
        assert_eq!(FileHeader::parse(&out).unwrap(), (FileHeader { version: b'S' }, 5));
    }

    #[test]
    fn file_header_needs_all_bytes() {
        let mut out = Vec::new();
        FileHeader { version: 0 }.write(&mut out);
        for cut in 0..out.len() {
            assert!(matches!(FileHeader::parse(&out[..cut]), Err(FormatError::Truncated(_))));
        }
    }

    #[test]
    fn file_header_rejects_foreign_data() {
        assert_eq!(FileHeader::parse(b"PK\x03\x04"), Err(FormatError::BadMagic(b'P')));
        assert_eq!(
            FileHeader::parse(&[0xD6, 0xC3, 0xC4, 0x00, VCD_DECOMPRESS]),
            Err(FormatError::Unsupported("secondary compression"))
        );
        assert_eq!(FileHeader::parse(&[0xD6, 0xC3, 0xC4, 0x07]), Err(FormatError::UnsupportedVersion(7)));
    }

    #[test]
    fn application_header_is_skipped() {
        let data = [0xD6, 0xC3, 0xC4, 0x00, VCD_APPHEADER, 3, b'a', b'b', b'c', 0xEE];
        assert_eq!(FileHeader::parse(&data).unwrap().1, 9);
    }

    #[test]
    fn window_header_with_checksum() {
        let header = WindowHeader {
            indicator: VCD_SOURCE | VCD_CHECKSUM,
            segment: Some(Segment { len: 300, offset: 0 }),
            target_len: 1000,
            data_len: 10,
            inst_len: 4,
            addr_len: 2,
            checksum: Some(0xDEAD_BEEF),
        };
        let mut out = Vec::new();
        header.write(&mut out);
        let (parsed, used) = WindowHeader::parse(&out, VERSION_EXTENDED).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(used, out.len());
        assert_eq!(parsed.body_len(), 16);
    }

    #[test]
    fn checksum_bit_needs_extended_version() {
        let header = WindowHeader {
            indicator: VCD_CHECKSUM,
            checksum: Some(1),
            ..Default::default()
        };
        let mut out = Vec::new();
        header.write(&mut out);
        assert!(matches!(
            WindowHeader::parse(&out, VERSION_STANDARD),
            Err(FormatError::InvalidIndicator { what: "window", .. })
        ));
    }

    #[test]
    fn inconsistent_encoding_length_is_rejected() {
        let header = WindowHeader {
            target_len: 5,
            data_len: 5,
            inst_len: 1,
            ..Default::default()
        };
        let mut out = Vec::new();
        header.write(&mut out);
        out[1] += 1;
        assert!(matches!(WindowHeader::parse(&out, VERSION_STANDARD), Err(FormatError::Malformed(_))));
    }
}
