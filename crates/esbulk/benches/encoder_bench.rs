use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use esbulk::bulk::{BulkAction, BulkMeta};
use esbulk::encoder::{BodyEncoder, Doc, Encoder};
use serde_json::json;

fn sample_docs(count: usize) -> Vec<Doc> {
    let mut docs = Vec::with_capacity(count * 2);
    for i in 0..count {
        docs.push(Doc::Action(BulkAction::Index(BulkMeta::new("bench-logs"))));
        docs.push(Doc::Json(json!({
            "message": format!("benchmark event number {i} with some filler text"),
            "level": "info",
            "sequence": i,
            "tags": ["bench", "encoder", "ndjson"],
        })));
    }
    docs
}

fn raw_bytes(docs: &[Doc]) -> usize {
    let mut enc = Encoder::for_level(0, false).unwrap();
    for doc in docs {
        enc.add_raw(doc).unwrap();
    }
    enc.raw_len()
}

fn bench_encoders(c: &mut Criterion) {
    let docs = sample_docs(1_000);
    let bytes = raw_bytes(&docs);

    let mut group = c.benchmark_group("encode_bulk_body");
    group.throughput(Throughput::Bytes(bytes as u64));

    group.bench_function("json", |b| {
        b.iter_batched(
            || Encoder::for_level(0, false).unwrap(),
            |mut enc| {
                for doc in &docs {
                    enc.add_raw(doc).unwrap();
                }
                enc.finish().unwrap()
            },
            BatchSize::SmallInput,
        )
    });

    for level in [1u32, 6] {
        group.bench_function(format!("gzip_level_{level}"), |b| {
            b.iter_batched(
                || Encoder::for_level(level, false).unwrap(),
                |mut enc| {
                    for doc in &docs {
                        enc.add_raw(doc).unwrap();
                    }
                    enc.finish().unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encoders);
criterion_main!(benches);
