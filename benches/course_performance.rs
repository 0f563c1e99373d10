use criterion::{Criterion, black_box, criterion_group, criterion_main};
use peloton::{PositionTracker, Route, Waypoint};
use std::sync::Arc;
use std::time::Duration;

/// A winding stage of `len` waypoints heading roughly north-east.
fn create_sample_route(len: usize) -> Route {
    Route::load((0..len).map(|i| {
        let t = i as f64 * 0.0005;
        Waypoint::new(44.0 + t, 5.0 + t + (i as f64 * 0.05).sin() * 0.002)
    }))
    .unwrap()
}

fn bench_closest_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_projection");

    for len in [1_000, 10_000] {
        let route = create_sample_route(len);
        let point = Waypoint::new(44.0 + len as f64 * 0.00025, 5.0 + len as f64 * 0.00025);
        group.bench_function(format!("closest_index_{}", len), |b| {
            b.iter(|| black_box(route.closest_index(black_box(point))));
        });
    }

    group.finish();
}

fn bench_record_head(c: &mut Criterion) {
    let mut group = c.benchmark_group("position_tracker");
    group.measurement_time(Duration::from_secs(10));

    let route = Arc::new(create_sample_route(10_000));
    group.bench_function("record_full_stage_every_10_waypoints", |b| {
        b.iter(|| {
            let mut tracker = PositionTracker::new(route.clone());
            for (i, waypoint) in route.waypoints().iter().enumerate().step_by(10) {
                tracker.record_head(*waypoint, 1_436_700_000 + i as i64);
            }
            black_box(tracker.crossings().filled())
        });
    });

    let mut tracker = PositionTracker::new(route.clone());
    for (i, waypoint) in route.waypoints().iter().enumerate() {
        tracker.record_head(*waypoint, 1_436_700_000 + i as i64 * 2);
    }
    let point = route.waypoint(5_000).unwrap();
    group.bench_function("time_behind_head", |b| {
        b.iter(|| black_box(tracker.time_behind_head(black_box(point), 1_436_720_000)));
    });

    group.finish();
}

criterion_group!(benches, bench_closest_index, bench_record_head);
criterion_main!(benches);
