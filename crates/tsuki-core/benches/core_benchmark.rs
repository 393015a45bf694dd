//! Benchmark tests for tsuki-core hot paths
//!
//! Run with: cargo bench -p tsuki-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tsuki_core::clock::buffered_percent;
use tsuki_core::controls::{format_time, seek_preview};
use tsuki_core::stream::normalize_resume_offset;
use tsuki_core::subtitles::derive_label;
use tsuki_core::types::*;
use tsuki_core::{is_in_window, NativeTextTrack, SkipWindow, SkipWindows};

// ============================================================================
// Gesture Zones
// ============================================================================

fn bench_zone_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("Zone Partition");

    for width in [390.0, 1280.0, 3840.0] {
        group.bench_with_input(BenchmarkId::from_parameter(width as u32), &width, |b, &width| {
            b.iter(|| {
                let mut center = 0;
                for step in 0..100 {
                    let x = width * step as f64 / 100.0;
                    if Zone::from_position(black_box(x), black_box(width)) == Zone::Center {
                        center += 1;
                    }
                }
                center
            });
        });
    }

    group.finish();
}

// ============================================================================
// Skip Windows
// ============================================================================

fn bench_skip_windows(c: &mut Criterion) {
    let mut group = c.benchmark_group("Skip Windows");
    let intro = SkipWindow::new(5.0, 90.0);
    let windows = SkipWindows::new(Some(intro), Some(SkipWindow::new(1300.0, 1400.0)));

    group.bench_function("is_in_window", |b| {
        b.iter(|| is_in_window(black_box(45.0), black_box(Some(&intro))))
    });

    group.bench_function("visibility", |b| b.iter(|| windows.visibility(black_box(1350.0))));

    group.finish();
}

// ============================================================================
// Clock Helpers
// ============================================================================

fn bench_clock_helpers(c: &mut Criterion) {
    let mut group = c.benchmark_group("Clock Helpers");
    let ranges: Vec<TimeRange> = (0..32)
        .map(|i| TimeRange::new(i as f64 * 40.0, i as f64 * 40.0 + 30.0))
        .collect();

    group.bench_function("buffered_percent", |b| {
        b.iter(|| buffered_percent(black_box(&ranges), black_box(1440.0)))
    });

    group.bench_function("normalize_resume_offset", |b| {
        b.iter(|| normalize_resume_offset(black_box(Some(9000.0)), black_box(Some(1440.0)), 1.0))
    });

    group.finish();
}

// ============================================================================
// Control Surface
// ============================================================================

fn bench_control_surface(c: &mut Criterion) {
    let mut group = c.benchmark_group("Control Surface");

    group.bench_function("format_time_short", |b| b.iter(|| format_time(black_box(754.3))));
    group.bench_function("format_time_long", |b| b.iter(|| format_time(black_box(8123.9))));
    group.bench_function("seek_preview", |b| {
        b.iter(|| seek_preview(black_box(0.42), black_box(1440.0), 10.0))
    });

    group.finish();
}

// ============================================================================
// Subtitle Labels
// ============================================================================

fn bench_subtitle_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("Subtitle Labels");
    let external = vec![
        SubtitleTrack::new("en.vtt", "English"),
        SubtitleTrack::new("ja.vtt", "Japanese"),
    ];
    let native = NativeTextTrack::new("", "");

    group.bench_function("external_label", |b| {
        b.iter(|| derive_label(black_box(1), &external, &native))
    });
    group.bench_function("placeholder_label", |b| {
        b.iter(|| derive_label(black_box(7), &external, &native))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_zone_partition,
    bench_skip_windows,
    bench_clock_helpers,
    bench_control_surface,
    bench_subtitle_labels,
);
criterion_main!(benches);
