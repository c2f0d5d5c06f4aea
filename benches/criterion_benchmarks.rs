use std::fs;
use std::path::Path;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use vcdiff_stream::{
    DecodeOptions, EncodeOptions, HashedDictionary, StreamState, VcdiffStream, vcdiff_decode_sync, vcdiff_encode_sync,
};

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn mutate(base: &[u8], stride: usize) -> Vec<u8> {
    let mut out = base.to_vec();
    for i in (0..out.len()).step_by(stride.max(1)) {
        out[i] = out[i].wrapping_add(1);
    }
    out
}

fn encode_options(dictionary: &[u8], min_window: usize) -> EncodeOptions {
    EncodeOptions {
        min_encode_window_size: Some(min_window),
        ..EncodeOptions::new(Arc::new(HashedDictionary::new(dictionary.to_vec()).unwrap()))
    }
}

fn stream_encode(options: &EncodeOptions, target: &[u8], piece: usize) -> usize {
    let mut stream = VcdiffStream::encoder(options).unwrap();
    let mut produced = 0;
    for chunk in target.chunks(piece) {
        stream.write(chunk.to_vec()).unwrap();
        loop {
            while let Some(out) = stream.read() {
                produced += out.len();
            }
            if !stream.needs_drain() {
                break;
            }
            stream.wait();
        }
    }
    stream.end().unwrap();
    while stream.state() != StreamState::Closed {
        while let Some(out) = stream.read() {
            produced += out.len();
        }
        stream.wait();
    }
    produced
}

fn write_ratio_snapshot() {
    let dictionary = gen_data(2 * 1024 * 1024, 123);
    let mut csv = String::from("stride,delta_bytes,target_bytes,ratio\n");
    for stride in [64usize, 512, 4096, 32768] {
        let target = mutate(&dictionary, stride);
        let delta = vcdiff_encode_sync(&target, &encode_options(&dictionary, 4096)).unwrap();
        let ratio = delta.len() as f64 / target.len() as f64;
        csv.push_str(&format!("{stride},{},{},{}\n", delta.len(), target.len(), ratio));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("ratio_snapshot.csv"), csv);
}

fn bench_dictionary_hashing(c: &mut Criterion) {
    let mut g = c.benchmark_group("dictionary_hashing");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let dictionary = gen_data(size, 7);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(HashedDictionary::new(black_box(dictionary.clone())).unwrap()));
        });
    }
    g.finish();
}

fn bench_sync_encode(c: &mut Criterion) {
    let mut g = c.benchmark_group("sync_encode_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let dictionary = gen_data(size, 1);
        let target = mutate(&dictionary, 1024);
        let options = encode_options(&dictionary, 4096);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(vcdiff_encode_sync(black_box(&target), &options).unwrap()));
        });
    }
    g.finish();
}

fn bench_sync_decode(c: &mut Criterion) {
    let mut g = c.benchmark_group("sync_decode_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let dictionary = gen_data(size, 2);
        let target = mutate(&dictionary, 2048);
        let delta = vcdiff_encode_sync(&target, &encode_options(&dictionary, 4096)).unwrap();
        let options = DecodeOptions::new(dictionary);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(vcdiff_decode_sync(black_box(&delta), &options).unwrap()));
        });
    }
    g.finish();
}

fn bench_stream_window_size(c: &mut Criterion) {
    write_ratio_snapshot();
    let mut g = c.benchmark_group("stream_encode_vs_min_window");
    let dictionary = gen_data(1024 * 1024, 3);
    let target = mutate(&dictionary, 4096);
    g.throughput(Throughput::Bytes(target.len() as u64));
    for min_window in [64usize, 4096, 64 * 1024] {
        let options = encode_options(&dictionary, min_window);
        g.bench_with_input(BenchmarkId::from_parameter(min_window), &min_window, |b, _| {
            b.iter(|| black_box(stream_encode(&options, &target, 1024)));
        });
    }
    g.finish();
}

criterion_group!(
    benches,
    bench_dictionary_hashing,
    bench_sync_encode,
    bench_sync_decode,
    bench_stream_window_size
);
criterion_main!(benches);
