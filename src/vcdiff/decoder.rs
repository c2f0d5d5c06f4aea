// VCDIFF decoder: window reconstruction and a chunk-fed stream decoder.
//
// Input may arrive split at any byte. The stream decoder keeps the
// unconsumed tail, parses the file header once and then decodes each
// window as soon as its header and body are complete. Limits are checked
// from the window header alone, before the body is buffered.

use bytes::Bytes;

use super::address_cache::AddressCache;
use super::code_table::{self, Op};
use super::header::{FileHeader, Reader, Segment, VCD_SOURCE, VCD_TARGET, VERSION_EXTENDED, WindowHeader};
use super::{FormatError, adler32, json};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Safety bounds applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderLimits {
    pub max_target_file_size: u64,
    pub max_target_window_size: u64,
    pub allow_vcd_target: bool,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_target_file_size: 1 << 26,
            max_target_window_size: 1 << 26,
            allow_vcd_target: true,
        }
    }
}

/// JSON text allowed per byte of target: a literal byte costs at most a
/// six-character escape plus its share of separators.
const JSON_BYTES_PER_TARGET_BYTE: u64 = 8;
const JSON_SLACK: u64 = 1024;

impl DecoderLimits {
    /// Most JSON delta text buffered before it is decoded.
    pub(crate) fn max_json_len(&self) -> u64 {
        self.max_target_file_size
            .saturating_mul(JSON_BYTES_PER_TARGET_BYTE)
            .saturating_add(JSON_SLACK)
    }

    pub(crate) fn check_window(&self, target_len: u64, decoded_so_far: u64) -> Result<(), FormatError> {
        if target_len > self.max_target_window_size {
            return Err(FormatError::WindowTooLarge {
                size: target_len,
                limit: self.max_target_window_size,
            });
        }
        if decoded_so_far.saturating_add(target_len) > self.max_target_file_size {
            return Err(FormatError::FileTooLarge {
                limit: self.max_target_file_size,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Window reconstruction
// ---------------------------------------------------------------------------

/// Running out of bytes inside a complete window body is corruption, not a
/// reason to wait for more input.
fn underflow(e: FormatError) -> FormatError {
    match e {
        FormatError::Truncated(what) => FormatError::Malformed(format!("{what} underflow")),
        other => other,
    }
}

/// Cursors over the three sections; interleaved windows read everything
/// from the instruction section.
struct Sections<'a> {
    data: Reader<'a>,
    inst: Reader<'a>,
    addr: Reader<'a>,
    interleaved: bool,
}

impl<'a> Sections<'a> {
    fn new(header: &WindowHeader, body: &'a [u8], interleaved: bool) -> Self {
        let data_len = header.data_len as usize;
        let inst_len = header.inst_len as usize;
        Self {
            data: Reader::new(&body[..data_len]),
            inst: Reader::new(&body[data_len..data_len + inst_len]),
            addr: Reader::new(&body[data_len + inst_len..]),
            interleaved,
        }
    }

    fn data(&mut self) -> &mut Reader<'a> {
        if self.interleaved { &mut self.inst } else { &mut self.data }
    }

    fn addr(&mut self) -> &mut Reader<'a> {
        if self.interleaved { &mut self.inst } else { &mut self.addr }
    }
}

/// Decode one window whose body is fully available, appending its target
/// bytes to `out`. `source` is the resolved source or target segment.
pub fn decode_window(
    header: &WindowHeader,
    body: &[u8],
    interleaved: bool,
    source: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), FormatError> {
    let target_len = header.target_len;
    let source_len = source.len() as u64;
    let base = out.len();
    out.reserve(usize::try_from(target_len).map_err(|_| FormatError::Malformed("target window too large".into()))?);

    let table = code_table::default_table();
    let mut cache = AddressCache::new();
    let mut sections = Sections::new(header, body, interleaved);
    let mut produced: u64 = 0;

    while !sections.inst.is_empty() {
        let entry = table[sections.inst.byte("instruction section")? as usize];
        for (op, implicit) in [(entry.op1, entry.size1), (entry.op2, entry.size2)] {
            if op == Op::Noop {
                continue;
            }
            let size = if implicit == 0 {
                sections.inst.varint("instruction size").map_err(underflow)?
            } else {
                u64::from(implicit)
            };
            if produced.checked_add(size).is_none_or(|end| end > target_len) {
                return Err(FormatError::Malformed(format!(
                    "instructions overrun the {target_len}-byte target window"
                )));
            }
            let len = size as usize;

            match op {
                Op::Add => {
                    let literal = sections.data().bytes(size, "data section").map_err(underflow)?;
                    out.extend_from_slice(literal);
                }
                Op::Run => {
                    let byte = sections.data().byte("data section").map_err(underflow)?;
                    out.resize(out.len() + len, byte);
                }
                Op::Copy(mode) => {
                    let here = source_len + produced;
                    let reader = sections.addr();
                    let (addr, used) = cache.decode(mode, reader.rest(), here)?;
                    reader.advance(used);

                    if addr < source_len {
                        if addr.saturating_add(size) > source_len {
                            return Err(FormatError::Malformed("COPY spans source and target".into()));
                        }
                        let start = addr as usize;
                        out.extend_from_slice(&source[start..start + len]);
                    } else {
                        let start = base + (addr - source_len) as usize;
                        if start + len <= out.len() {
                            out.extend_from_within(start..start + len);
                        } else {
                            // Overlapping copy: each byte may be one just written.
                            for i in 0..len {
                                let byte = out[start + i];
                                out.push(byte);
                            }
                        }
                    }
                }
                Op::Noop => unreachable!(),
            }
            produced += size;
        }
    }

    if produced != target_len {
        return Err(FormatError::Malformed(format!(
            "window produced {produced} bytes, header says {target_len}"
        )));
    }

    if let Some(expected) = header.checksum {
        let actual = adler32(&out[base..]);
        if actual != expected {
            return Err(FormatError::ChecksumMismatch { expected, actual });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stream decoder
// ---------------------------------------------------------------------------

/// Decoder fed with arbitrary slices of a delta.
pub struct StreamDecoder {
    dictionary: Bytes,
    limits: DecoderLimits,
    pending: Vec<u8>,
    version: Option<u8>,
    json: bool,
    /// Everything decoded so far; only kept when VCD_TARGET is allowed.
    history: Vec<u8>,
    decoded: u64,
    windows: u64,
}

impl StreamDecoder {
    pub fn new(dictionary: Bytes, limits: DecoderLimits) -> Self {
        Self {
            dictionary,
            limits,
            pending: Vec::new(),
            version: None,
            json: false,
            history: Vec::new(),
            decoded: 0,
            windows: 0,
        }
    }

    /// Total target bytes produced.
    pub fn decoded_len(&self) -> u64 {
        self.decoded
    }

    pub fn windows(&self) -> u64 {
        self.windows
    }

    /// Bytes received but not yet decoded.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed `chunk`, appending every window it completes to `out`.
    pub fn decode_chunk(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), FormatError> {
        self.pending.extend_from_slice(chunk);
        if self.json {
            return self.check_json_len();
        }

        let mut input = std::mem::take(&mut self.pending);
        let mut pos = 0;
        let result = loop {
            match self.step(&input[pos..], out) {
                Ok(Some(used)) => pos += used,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        input.drain(..pos);
        self.pending = input;
        result?;
        if self.json {
            return self.check_json_len();
        }
        Ok(())
    }

    /// JSON deltas are decoded whole at `finish`; bound what is held until then.
    fn check_json_len(&mut self) -> Result<(), FormatError> {
        if self.pending.len() as u64 > self.limits.max_json_len() {
            self.pending = Vec::new();
            return Err(FormatError::FileTooLarge {
                limit: self.limits.max_target_file_size,
            });
        }
        Ok(())
    }

    /// Signal the end of the delta.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), FormatError> {
        if self.json {
            let input = std::mem::take(&mut self.pending);
            let start = out.len();
            json::decode(&input, &self.dictionary, &self.limits, out)?;
            self.decoded += (out.len() - start) as u64;
            return Ok(());
        }
        if !self.pending.is_empty() {
            return Err(FormatError::Truncated(if self.version.is_none() {
                "file header"
            } else {
                "window"
            }));
        }
        Ok(())
    }

    /// Consume one unit (file header or window) from the front of `rest`.
    /// `None` means more input is needed.
    fn step(&mut self, rest: &[u8], out: &mut Vec<u8>) -> Result<Option<usize>, FormatError> {
        if rest.is_empty() {
            return Ok(None);
        }
        let Some(version) = self.version else {
            if rest[0] == b'[' {
                log::debug!("JSON delta detected, buffering until finish");
                self.json = true;
                return Ok(None);
            }
            return match FileHeader::parse(rest) {
                Ok((header, used)) => {
                    log::trace!("VCDIFF file header, version {:#04x}", header.version);
                    self.version = Some(header.version);
                    Ok(Some(used))
                }
                Err(FormatError::Truncated(_)) => Ok(None),
                Err(e) => Err(e),
            };
        };

        let (header, used) = match WindowHeader::parse(rest, version) {
            Ok(parsed) => parsed,
            Err(FormatError::Truncated(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.limits.check_window(header.target_len, self.decoded)?;
        if header.indicator & VCD_TARGET != 0 && !self.limits.allow_vcd_target {
            return Err(FormatError::TargetNotAllowed);
        }

        let body_len = usize::try_from(header.body_len())
            .map_err(|_| FormatError::Malformed("window body too large".into()))?;
        let Some(body) = used.checked_add(body_len).and_then(|end| rest.get(used..end)) else {
            return Ok(None);
        };

        let interleaved = version == VERSION_EXTENDED && header.data_len == 0 && header.addr_len == 0;
        let source = match header.segment {
            None => &[][..],
            Some(seg) if header.indicator & VCD_SOURCE != 0 => segment(&self.dictionary, seg, "source")?,
            Some(seg) => segment(&self.history, seg, "target")?,
        };

        let start = out.len();
        decode_window(&header, body, interleaved, source, out)?;
        if self.limits.allow_vcd_target {
            self.history.extend_from_slice(&out[start..]);
        }
        self.decoded += header.target_len;
        self.windows += 1;
        log::trace!("decoded window {} ({} bytes)", self.windows, header.target_len);
        Ok(Some(used + body_len))
    }
}

fn segment<'a>(data: &'a [u8], seg: Segment, what: &str) -> Result<&'a [u8], FormatError> {
    seg.offset
        .checked_add(seg.len)
        .filter(|&end| end <= data.len() as u64)
        .map(|end| &data[seg.offset as usize..end as usize])
        .ok_or_else(|| {
            FormatError::Malformed(format!(
                "{what} segment {}+{} exceeds {} available bytes",
                seg.offset,
                seg.len,
                data.len()
            ))
        })
}
