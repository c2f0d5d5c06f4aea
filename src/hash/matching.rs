// Greedy matcher: target window to ADD/COPY/RUN instructions.
//
// At each position, in order:
//   1. a run of at least MIN_RUN identical bytes becomes RUN
//   2. the dictionary block index is probed with the rolling checksum;
//      a hit is verified, extended forward, and backward into pending
//      literal bytes
//   3. with target matching on, the 4-byte hash of earlier window
//      positions is probed and extended forward
// The longer of (2) and (3) wins if it reaches MIN_MATCH bytes; otherwise
// the byte joins the pending literal.

use std::sync::Arc;

use super::dictionary::HashedDictionary;
use super::rolling::{self, short_hash};
use super::table::ShortTable;
use crate::vcdiff::Instruction;

/// Shortest COPY worth emitting.
pub const MIN_MATCH: usize = 4;
/// Shortest run turned into RUN.
pub const MIN_RUN: usize = 8;

/// Longest instruction; windows never exceed it.
pub const MAX_INSTRUCTION: usize = u32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    /// Start of the match in the target window.
    start: usize,
    /// Address in the dictionary+target space.
    addr: u64,
    len: usize,
}

/// Reusable per-session matcher.
pub struct Matcher {
    dictionary: Arc<HashedDictionary>,
    target_matches: bool,
}

impl Matcher {
    pub fn new(dictionary: Arc<HashedDictionary>, target_matches: bool) -> Self {
        Self {
            dictionary,
            target_matches,
        }
    }

    pub fn dictionary(&self) -> &HashedDictionary {
        &self.dictionary
    }

    /// Instructions describing `target` exactly, in order.
    pub fn window(&self, target: &[u8]) -> Vec<Instruction> {
        debug_assert!(target.len() <= MAX_INSTRUCTION);
        let dict = self.dictionary.bytes().as_ref();
        let dict_len = dict.len() as u64;
        let hash = self.dictionary.block_hash();
        let look = hash.look();
        let n = target.len();

        let mut out = Vec::new();
        let mut short = self.target_matches.then(|| ShortTable::new(n));
        let mut lit_start = 0usize;
        let mut pos = 0usize;
        // Block checksum at `pos`, while it is valid.
        let mut rolling: Option<u32> = None;

        while pos < n {
            let run = rolling::run_length(&target[pos..], target[pos], MAX_INSTRUCTION);
            if run >= MIN_RUN {
                flush_literal(&mut out, pos - lit_start);
                out.push(Instruction::Run {
                    byte: target[pos],
                    len: run as u32,
                });
                if let Some(table) = short.as_mut() {
                    index_span(table, target, pos, pos + run);
                }
                pos += run;
                lit_start = pos;
                rolling = None;
                continue;
            }

            let mut best: Option<Candidate> = None;

            if pos + look <= n {
                let ck = match rolling {
                    Some(ck) => ck,
                    None => hash.checksum(&target[pos..]),
                };
                rolling = Some(ck);
                if let Some(src) = self.dictionary.candidate(ck) {
                    let fwd = rolling::forward_match(&dict[src..], &target[pos..], MAX_INSTRUCTION);
                    if fwd >= MIN_MATCH {
                        let back = rolling::backward_match(&dict[..src], &target[lit_start..pos], src.min(pos - lit_start));
                        best = Some(Candidate {
                            start: pos - back,
                            addr: (src - back) as u64,
                            len: (fwd + back).min(MAX_INSTRUCTION),
                        });
                    }
                }
            }

            if let Some(table) = short.as_mut()
                && pos + MIN_MATCH <= n
            {
                let h = short_hash(&target[pos..]);
                if let Some(prev) = table.lookup(h) {
                    let prev = prev as usize;
                    let fwd = rolling::forward_match(&target[prev..], &target[pos..], MAX_INSTRUCTION);
                    if fwd >= MIN_MATCH && best.is_none_or(|b| fwd > b.len) {
                        best = Some(Candidate {
                            start: pos,
                            addr: dict_len + prev as u64,
                            len: fwd,
                        });
                    }
                }
                table.insert(h, pos as u32);
            }

            match best {
                Some(c) => {
                    flush_literal(&mut out, c.start - lit_start);
                    out.push(Instruction::Copy {
                        addr: c.addr,
                        len: c.len as u32,
                    });
                    let end = c.start + c.len;
                    if let Some(table) = short.as_mut() {
                        index_span(table, target, pos + 1, end);
                    }
                    pos = end;
                    lit_start = end;
                    rolling = None;
                }
                None => {
                    pos += 1;
                    rolling = match rolling {
                        Some(ck) if pos + look <= n => Some(hash.update(ck, &target[pos - 1..])),
                        _ => None,
                    };
                }
            }
        }
        flush_literal(&mut out, n - lit_start);
        out
    }
}

fn flush_literal(out: &mut Vec<Instruction>, len: usize) {
    if len > 0 {
        out.push(Instruction::Add { len: len as u32 });
    }
}

/// Record target positions `from..to` that a COPY or RUN skipped over.
fn index_span(table: &mut ShortTable, target: &[u8], from: usize, to: usize) {
    let last = to.min(target.len().saturating_sub(MIN_MATCH - 1));
    for p in from..last {
        table.insert(short_hash(&target[p..]), p as u32);
    }
}
