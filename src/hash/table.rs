// Hash tables for the matcher.
//
//   - `BlockTable`: dictionary block checksums. Built once, last write wins.
//   - `ShortTable`: 4-byte hashes of earlier positions in the current
//     target window. Rebuilt for every window.
//
// Both store `pos + HASH_CKOFFSET` so a zero bucket means "empty".

use super::rolling::{HASH_CKOFFSET, HashCfg};

/// Single-entry buckets keyed by checksum.
#[derive(Clone, Debug)]
struct Buckets {
    table: Vec<u32>,
    cfg: HashCfg,
}

impl Buckets {
    fn new(slots: usize) -> Self {
        let cfg = HashCfg::new(slots.max(8));
        Self {
            table: vec![0; cfg.size],
            cfg,
        }
    }

    #[inline]
    fn lookup(&self, cksum: u32) -> Option<u32> {
        match self.table[self.cfg.bucket(cksum)] {
            0 => None,
            val => Some(val - HASH_CKOFFSET),
        }
    }

    #[inline]
    fn insert(&mut self, cksum: u32, pos: u32) {
        let bucket = self.cfg.bucket(cksum);
        self.table[bucket] = pos + HASH_CKOFFSET;
    }
}

/// Dictionary block index.
#[derive(Clone, Debug)]
pub struct BlockTable(Buckets);

impl BlockTable {
    pub fn new(blocks: usize) -> Self {
        Self(Buckets::new(blocks))
    }

    pub fn lookup(&self, cksum: u32) -> Option<u32> {
        self.0.lookup(cksum)
    }

    pub fn insert(&mut self, cksum: u32, pos: u32) {
        self.0.insert(cksum, pos);
    }

    /// Bucket count.
    pub fn size(&self) -> usize {
        self.0.cfg.size
    }
}

/// Positions of the current target window.
#[derive(Clone, Debug)]
pub struct ShortTable(Buckets);

impl ShortTable {
    pub fn new(window_len: usize) -> Self {
        Self(Buckets::new(window_len))
    }

    pub fn lookup(&self, hash: u32) -> Option<u32> {
        self.0.lookup(hash)
    }

    pub fn insert(&mut self, hash: u32, pos: u32) {
        self.0.insert(hash, pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_inserted() {
        let mut t = BlockTable::new(64);
        assert_eq!(t.lookup(0xABCD), None);
        t.insert(0xABCD, 0);
        assert_eq!(t.lookup(0xABCD), Some(0));
    }

    #[test]
    fn last_write_wins() {
        let mut t = ShortTable::new(16);
        t.insert(7, 3);
        t.insert(7, 11);
        assert_eq!(t.lookup(7), Some(11));
    }
}
