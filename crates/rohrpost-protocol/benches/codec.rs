//! Codec benchmarks for rohrpost-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rohrpost_protocol::{codec, Envelope};
use serde_json::json;

fn small_envelope() -> Envelope {
    Envelope::new("a.ping", json!({"foo": "bar", "seq": 42}))
}

fn bench_encode_small(c: &mut Criterion) {
    let envelope = small_envelope();

    let mut group = c.benchmark_group("encode");
    group.bench_function("small", |b| b.iter(|| codec::encode(black_box(&envelope))));
    group.finish();
}

fn bench_decode_small(c: &mut Criterion) {
    let encoded = codec::encode(&small_envelope()).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("small", |b| b.iter(|| codec::decode(black_box(&encoded))));
    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let items: Vec<u32> = (0..64).collect();
    let envelope = Envelope::new("chat.room.lobby", json!({"items": items, "from": "bench"}));

    c.bench_function("roundtrip_list", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&envelope)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_small,
    bench_decode_small,
    bench_roundtrip
);
criterion_main!(benches);
