//! e7 log reading benchmark
//!
//! A one-hour dynamic scan produces histogramming logs with hundreds of
//! thousands of lines, so repair and fixed-width parsing dominate the
//! e7 analysis time.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench log_parsing
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use petbench::e7_log::{parse_log, repair_text, LogLayout};
use petbench::timings::{histogram_timings, SinogramPairHeuristic};

/// Synthetic histogramming log with `frames` frames of sinogram output
fn synthetic_log(frames: usize) -> String {
    let mut log = String::from("T Time                    Message\n");
    let mut second = 0usize;
    let mut line = |message: &str| {
        let (m, s) = ((second / 60) % 60, second % 60);
        log.push_str(&format!("I 2024-03-01 10:{m:02}:{s:02}.000 {message}\n"));
        second += 1;
    };
    for i in 0..600 {
        line(&format!("setup step {i}"));
    }
    line("Frame_write: Just sent Frame 0");
    for frame in 1..=frames {
        for plane in 0..40 {
            line(&format!("Sinogram no = {plane}"));
        }
        line(&format!("Frame_write: Just sent Frame {frame}"));
    }
    log
}

fn bench_repair(c: &mut Criterion) {
    let mut group = c.benchmark_group("repair_text");
    for frames in [10, 100] {
        let raw = synthetic_log(frames);
        group.bench_with_input(BenchmarkId::from_parameter(frames), &raw, |b, raw| {
            b.iter(|| repair_text(black_box(raw)))
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let layout = LogLayout::default();
    let mut group = c.benchmark_group("parse_log");
    for frames in [10, 100] {
        let (repaired, _) = repair_text(&synthetic_log(frames));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &repaired, |b, text| {
            b.iter(|| parse_log(black_box(text), &layout).unwrap())
        });
    }
    group.finish();
}

fn bench_histogram_markers(c: &mut Criterion) {
    let (repaired, _) = repair_text(&synthetic_log(100));
    let entries = parse_log(&repaired, &LogLayout::default()).unwrap();
    let strategy = SinogramPairHeuristic::default();

    c.bench_function("histogram_timings_100_frames", |b| {
        b.iter(|| histogram_timings(black_box(&entries), &strategy))
    });
}

criterion_group!(benches, bench_repair, bench_parse, bench_histogram_markers);
criterion_main!(benches);
