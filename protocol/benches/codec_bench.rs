use criterion::{black_box, criterion_group, criterion_main, Criterion};

use peerlink_protocol::{encode_frame, read_frame};
use peerlink_types::{EncryptMode, Priority};

fn encode_1kb_bench(c: &mut Criterion) {
    let payload = vec![0x5Au8; 1024];

    c.bench_function("encode_frame_1KB", |b| {
        b.iter(|| {
            encode_frame(
                black_box(&payload),
                "Bench",
                Priority::MIDDLE_0,
                false,
                EncryptMode::None,
            )
        })
    });
}

fn encode_compressed_bench(c: &mut Criterion) {
    let payload = vec![0x5Au8; 16 * 1024];

    c.bench_function("encode_frame_16KB_compressed", |b| {
        b.iter(|| {
            encode_frame(
                black_box(&payload),
                "Bench",
                Priority::MIDDLE_0,
                true,
                EncryptMode::None,
            )
        })
    });
}

fn read_frame_bench(c: &mut Criterion) {
    let frame =
        encode_frame(&[7u8; 1024], "Bench", Priority::HIGH_0, false, EncryptMode::None).unwrap();

    c.bench_function("read_frame_1KB", |b| b.iter(|| read_frame(black_box(&frame))));
}

criterion_group!(
    benches,
    encode_1kb_bench,
    encode_compressed_bench,
    read_frame_bench
);
criterion_main!(benches);
