#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdiff_stream::vcdiff::{DecoderLimits, StreamDecoder};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors, never panics.
    if data.is_empty() {
        return;
    }
    let split = (data[0] as usize).min(data.len() - 1) + 1;
    let (dictionary, delta) = data.split_at(split);
    let limits = DecoderLimits {
        max_target_file_size: 1 << 20,
        max_target_window_size: 1 << 20,
        allow_vcd_target: true,
    };

    // Feed in uneven pieces so header and window boundaries split.
    let mut decoder = StreamDecoder::new(dictionary.to_vec().into(), limits);
    let mut out = Vec::new();
    for piece in delta.chunks(7) {
        if decoder.decode_chunk(piece, &mut out).is_err() {
            return;
        }
    }
    let _ = decoder.finish(&mut out);
});
