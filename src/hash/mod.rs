// Dictionary hashing and match finding for the encoder.
//
// - `rolling`    block checksum, 4-byte hash, byte comparisons
// - `table`      single-entry hash tables
// - `dictionary` `HashedDictionary`, built once and shared
// - `matching`   greedy matcher producing `Instruction`s

pub mod dictionary;
pub mod matching;
pub mod rolling;
pub mod table;

pub use dictionary::HashedDictionary;
pub use matching::Matcher;
