use allm::core::stream_decoder::{decode_chunk, SseDecoder};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn make_body(n_events: usize, token: &str) -> String {
    let mut body = String::new();
    for i in 0..n_events {
        body.push_str(&format!(
            "data: {{\"id\":\"chatcmpl-{i}\",\"object\":\"chat.completion.chunk\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{token}\"}}}}]}}\n\n"
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn bench_stream_decode(c: &mut Criterion) {
    for &events in &[100usize, 1000usize] {
        let body = make_body(events, "lorem ipsum ");

        let mut group = c.benchmark_group(format!("stream_decode_events{}", events));
        group.throughput(Throughput::Bytes(body.len() as u64));

        group.bench_function(BenchmarkId::new("whole_chunk", events), |b| {
            b.iter(|| decode_chunk(&body))
        });

        // Network-sized reads split events across chunk boundaries
        for &chunk_size in &[64usize, 1024usize] {
            group.bench_function(BenchmarkId::new("buffered", chunk_size), |b| {
                b.iter(|| {
                    let mut decoder = SseDecoder::new();
                    let mut text = String::new();
                    for chunk in body.as_bytes().chunks(chunk_size) {
                        text.push_str(&decoder.push(chunk).text);
                    }
                    text.push_str(&decoder.finish().text);
                    text
                })
            });
        }

        group.finish();
    }
}

criterion_group!(benches, bench_stream_decode);
criterion_main!(benches);
