// Pre-hashed dictionary.
//
// Hashing a dictionary costs a pass over it; doing it once and sharing the
// result through an `Arc` lets many encoders reuse the same index.

use bytes::Bytes;

use super::rolling::BlockHash;
use super::table::BlockTable;
use crate::error::VcdiffError;

/// Width of the indexed dictionary blocks.
pub const BLOCK_SIZE: usize = 16;

/// Dictionary bytes plus a checksum index of their block-aligned blocks.
#[derive(Clone)]
pub struct HashedDictionary {
    bytes: Bytes,
    hash: BlockHash,
    table: BlockTable,
}

impl std::fmt::Debug for HashedDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashedDictionary")
            .field("len", &self.bytes.len())
            .field("buckets", &self.table.size())
            .finish()
    }
}

impl HashedDictionary {
    /// Index `bytes`. Fails with an init error when the dictionary is empty
    /// or too large to address.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, VcdiffError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(VcdiffError::init("dictionary must not be empty"));
        }
        if u32::try_from(bytes.len()).is_err() {
            return Err(VcdiffError::init(format!(
                "dictionary of {} bytes exceeds the 4 GiB limit",
                bytes.len()
            )));
        }

        let hash = BlockHash::new(BLOCK_SIZE);
        let blocks = bytes.len() / BLOCK_SIZE;
        // At least one bucket per block, so aligned blocks rarely evict each other.
        let mut table = BlockTable::new(blocks * 2);
        for (i, block) in bytes.chunks_exact(BLOCK_SIZE).enumerate() {
            table.insert(hash.checksum(block), (i * BLOCK_SIZE) as u32);
        }
        log::debug!(
            "hashed dictionary: {} bytes, {} blocks, {} buckets",
            bytes.len(),
            blocks,
            table.size()
        );

        Ok(Self { bytes, hash, table })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; empty dictionaries are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn block_hash(&self) -> BlockHash {
        self.hash
    }

    /// Dictionary offset of a block whose checksum is `cksum`, if any.
    /// Collisions are possible; callers compare bytes.
    pub(crate) fn candidate(&self, cksum: u32) -> Option<usize> {
        self.table.lookup(cksum).map(|pos| pos as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_dictionary_is_an_init_error() {
        let err = HashedDictionary::new(Bytes::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Init);
        assert_eq!(err.native_code(), Some(1));
    }

    #[test]
    fn finds_aligned_blocks() {
        let data: Vec<u8> = (0..=255u8).collect();
        let dict = HashedDictionary::new(data.clone()).unwrap();
        let hash = dict.block_hash();
        assert_eq!(dict.len(), 256);
        assert!(dict.table.size() >= 16);

        // The last block inserted always owns its bucket.
        assert_eq!(dict.candidate(hash.checksum(&data[240..256])), Some(240));

        // Every indexed block leads to some aligned block; a colliding one
        // is told apart by comparing bytes.
        let mut exact = 0;
        for block in data.chunks_exact(BLOCK_SIZE) {
            let off = dict.candidate(hash.checksum(block)).unwrap();
            assert_eq!(off % BLOCK_SIZE, 0);
            if &data[off..off + BLOCK_SIZE] == block {
                exact += 1;
            }
        }
        assert!(exact >= 1);
    }

    #[test]
    fn short_dictionary_has_no_blocks() {
        let dict = HashedDictionary::new(&b"abcabc"[..]).unwrap();
        let hash = dict.block_hash();
        assert_eq!(dict.candidate(hash.checksum(b"abcabcabcabcabca")), None);
    }
}
