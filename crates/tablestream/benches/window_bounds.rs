use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tablestream::{Bounds, Duration, Time, Window};

fn bench_overlapping(c: &mut Criterion) {
    let start = Time::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
    let mut group = c.benchmark_group("get_overlapping_bounds");
    for (name, every, period) in [
        ("tumbling_1m", "1m", "1m"),
        ("sliding_1m_10m", "1m", "10m"),
        ("calendar_1mo", "1mo", "1mo"),
    ] {
        let w = Window::new(every.parse().unwrap(), period.parse().unwrap(), Duration::ZERO).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &w, |b, w| {
            let mut t = start;
            b.iter(|| {
                t = t.add_nanos(1_234_567_891);
                black_box(w.get_overlapping_bounds(t, t.add_nanos(1)))
            })
        });
    }
    group.finish();
}

fn bench_clipped(c: &mut Criterion) {
    let start = Time::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
    let bounds = Bounds::new(start, start.add(Duration::from_days(1)));
    let w = Window::new(Duration::from_minutes(1), Duration::from_minutes(5), Duration::from_secs(-15))
        .unwrap();
    c.bench_function("clipped_bounds_one_day", |b| {
        b.iter(|| black_box(w.clipped_bounds(black_box(&bounds))))
    });
}

criterion_group!(benches, bench_overlapping, bench_clipped);
criterion_main!(benches);
