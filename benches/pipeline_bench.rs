use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;
use video_ingest_rust::probe::parse_probe_output;
use video_ingest_rust::thumbnail::evenly_spaced_timestamps;
use video_ingest_rust::Validator;

const PROBE_OUTPUT: &str = r#"{
    "streams": [
        {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
         "r_frame_rate": "30000/1001", "bit_rate": "4500000"},
        {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000",
         "channels": 2, "bit_rate": "128000"}
    ],
    "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "912.733",
               "size": "52428800", "bit_rate": "4600000"}
}"#;

/// Benchmark parsing of engine probe output
fn bench_probe_parsing(c: &mut Criterion) {
    let path = Path::new("sample.mp4");
    c.bench_function("parse_probe_output", |b| {
        b.iter(|| parse_probe_output(black_box(path), black_box(PROBE_OUTPUT)))
    });
}

/// Benchmark the validation rules
fn bench_validation(c: &mut Criterion) {
    let metadata = match parse_probe_output(Path::new("sample.mp4"), PROBE_OUTPUT) {
        Ok(metadata) => metadata,
        Err(e) => panic!("benchmark fixture does not parse: {e}"),
    };
    let validator = Validator::default();

    c.bench_function("validate_metadata", |b| {
        b.iter(|| validator.validate(black_box(&metadata)))
    });
}

/// Benchmark thumbnail timestamp planning
fn bench_timestamp_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("evenly_spaced_timestamps");

    for count in [1usize, 3, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| evenly_spaced_timestamps(black_box(7_200), count))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_probe_parsing,
    bench_validation,
    bench_timestamp_planning
);
criterion_main!(benches);
