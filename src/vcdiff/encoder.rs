// Window encoder: turns ADD/COPY/RUN instructions into one VCDIFF window.
//
// Instructions are held back by one so that a small ADD followed by a
// short COPY (or the reverse) can share a double opcode. In the
// interleaved layout every size, literal and address follows its opcode
// inside the instruction section.

use super::address_cache::AddressCache;
use super::code_table::{self, Op};
use super::header::{Segment, VCD_CHECKSUM, VCD_SOURCE, WindowHeader};
use super::varint;

/// Section layout of an encoded window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Separate data, instruction and address sections (RFC 3284).
    Separate,
    /// Everything inline in the instruction section.
    Interleaved,
}

struct Held {
    op: Op,
    size: u32,
    /// Literal bytes (ADD/RUN) or encoded address (COPY).
    payload: Vec<u8>,
}

pub struct WindowEncoder {
    layout: Layout,
    dictionary_len: u64,
    target_len: u64,
    data: Vec<u8>,
    inst: Vec<u8>,
    addr: Vec<u8>,
    cache: AddressCache,
    held: Option<Held>,
}

impl WindowEncoder {
    pub fn new(layout: Layout, dictionary_len: u64) -> Self {
        Self {
            layout,
            dictionary_len,
            target_len: 0,
            data: Vec::new(),
            inst: Vec::new(),
            addr: Vec::new(),
            cache: AddressCache::new(),
            held: None,
        }
    }

    /// Target bytes described so far.
    pub fn target_len(&self) -> u64 {
        self.target_len
    }

    pub fn add(&mut self, literal: &[u8]) {
        if literal.is_empty() {
            return;
        }
        self.target_len += literal.len() as u64;
        self.push(Held {
            op: Op::Add,
            size: literal.len() as u32,
            payload: literal.to_vec(),
        });
    }

    pub fn run(&mut self, byte: u8, len: u32) {
        if len == 0 {
            return;
        }
        self.target_len += u64::from(len);
        self.push(Held {
            op: Op::Run,
            size: len,
            payload: vec![byte],
        });
    }

    /// COPY `len` bytes from `addr` in the dictionary+target address space.
    pub fn copy(&mut self, addr: u64, len: u32) {
        if len == 0 {
            return;
        }
        let here = self.dictionary_len + self.target_len;
        let (mode, encoded) = self.cache.encode(addr, here);
        let mut payload = Vec::with_capacity(varint::MAX_VARINT_LEN);
        encoded.write(&mut payload);
        self.target_len += u64::from(len);
        self.push(Held {
            op: Op::Copy(mode),
            size: len,
            payload,
        });
    }

    fn push(&mut self, next: Held) {
        match self.held.take() {
            Some(prev) => match code_table::double_opcode((prev.op, prev.size), (next.op, next.size)) {
                Some(code) => {
                    self.inst.push(code);
                    self.emit_payload(&prev);
                    self.emit_payload(&next);
                }
                None => {
                    self.emit_single(&prev);
                    self.held = Some(next);
                }
            },
            None => self.held = Some(next),
        }
    }

    fn emit_single(&mut self, inst: &Held) {
        let (code, size_inline) = code_table::single_opcode(inst.op, inst.size);
        self.inst.push(code);
        if size_inline {
            varint::push_u64(&mut self.inst, u64::from(inst.size));
        }
        self.emit_payload(inst);
    }

    fn emit_payload(&mut self, inst: &Held) {
        let section = match (self.layout, inst.op) {
            (Layout::Interleaved, _) => &mut self.inst,
            (Layout::Separate, Op::Copy(_)) => &mut self.addr,
            (Layout::Separate, _) => &mut self.data,
        };
        section.extend_from_slice(&inst.payload);
    }

    /// Append the finished window to `out`. `checksum` is the Adler-32 of
    /// the window's target bytes when checksums are enabled.
    pub fn finish(mut self, checksum: Option<u32>, out: &mut Vec<u8>) {
        if let Some(held) = self.held.take() {
            self.emit_single(&held);
        }

        let mut indicator = 0;
        let segment = (self.dictionary_len > 0).then(|| {
            indicator |= VCD_SOURCE;
            Segment {
                len: self.dictionary_len,
                offset: 0,
            }
        });
        if checksum.is_some() {
            indicator |= VCD_CHECKSUM;
        }

        WindowHeader {
            indicator,
            segment,
            target_len: self.target_len,
            data_len: self.data.len() as u64,
            inst_len: self.inst.len() as u64,
            addr_len: self.addr.len() as u64,
            checksum,
        }
        .write(out);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.inst);
        out.extend_from_slice(&self.addr);
    }
}
