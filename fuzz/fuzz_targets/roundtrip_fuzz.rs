#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use vcdiff_stream::{DecodeOptions, EncodeOptions, HashedDictionary, vcdiff_decode_sync, vcdiff_encode_sync};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let flags = data[0];
    let split = data.len() / 2;
    let (dictionary, target) = data[1..].split_at(split.max(2) - 1);
    let Ok(hashed) = HashedDictionary::new(dictionary.to_vec()) else {
        return;
    };
    let options = EncodeOptions {
        interleaved: flags & 1 != 0,
        checksum: flags & 2 != 0,
        json: flags & 4 != 0,
        target_matches: flags & 8 != 0,
        ..EncodeOptions::new(Arc::new(hashed))
    };
    let delta = vcdiff_encode_sync(target, &options).expect("encode");
    let decoded = vcdiff_decode_sync(&delta, &DecodeOptions::new(dictionary.to_vec())).expect("decode");
    assert_eq!(decoded.as_ref(), target);
});
