//! Candidate enumeration benchmark
//!
//! Measures the two exponential stages of the pipeline on synthetic batches:
//! - cluster combinations over N timestamp groups (2^(N-1) partitions)
//! - full variant creation (combinations, loop filter, connection chains, slicing,
//!   deduplication) for a batch with split odometry and a dense IMU stream
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --bench candidate_enumeration
//! ```

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fusion_graph::candidates::{CombinationFactory, VariantsFactory, group_by_timestamp};
use fusion_graph::config::CandidateConfig;
use fusion_graph::measurement::{
    GpsMeasurement, ImuSample, Measurement, MeasurementId, OdometryMeasurement, TimeRange,
};
use nalgebra::{Isometry3, Vector3};

fn gps_batch(num_groups: usize) -> Vec<Measurement> {
    (0..num_groups)
        .map(|i| {
            let timestamp = (i as i64 + 1) * 10;
            GpsMeasurement::new(MeasurementId(i as u64), timestamp, Vector3::zeros()).into()
        })
        .collect()
}

/// Odometry over `[0, 10 * num_keyframes]` in steps of 10, GPS at every keyframe and IMU
/// samples every tick.
fn mixed_batch(num_keyframes: usize) -> Vec<Measurement> {
    let mut id = 0;
    let mut next_id = || {
        id += 1;
        MeasurementId(id)
    };
    let mut measurements = Vec::new();
    for k in 0..num_keyframes as i64 {
        let (start, stop) = (k * 10, (k + 1) * 10);
        if let Ok(range) = TimeRange::new(start, stop)
            && let Ok(odometry) =
                OdometryMeasurement::new(next_id(), range, Isometry3::translation(1.0, 0.0, 0.0))
        {
            measurements.push(odometry.into());
        }
        measurements.push(GpsMeasurement::new(next_id(), stop, Vector3::zeros()).into());
        for t in start..stop {
            measurements.push(
                ImuSample::new(next_id(), t, Vector3::zeros(), Vector3::new(0.0, 0.0, 9.81)).into(),
            );
        }
    }
    measurements
}

fn bench_combinations(c: &mut Criterion) {
    let mut group = c.benchmark_group("combinations");
    for num_groups in [4, 8, 12] {
        let groups = group_by_timestamp(gps_batch(num_groups));
        group.bench_with_input(BenchmarkId::from_parameter(num_groups), &groups, |b, groups| {
            b.iter(|| CombinationFactory::combine(black_box(groups)))
        });
    }
    group.finish();
}

fn bench_variants(c: &mut Criterion) {
    let factory = VariantsFactory::new(CandidateConfig::default());
    let mut group = c.benchmark_group("variants");
    group.sample_size(20);
    for num_keyframes in [1, 2, 3] {
        let batch = mixed_batch(num_keyframes);
        group.bench_with_input(BenchmarkId::from_parameter(num_keyframes), &batch, |b, batch| {
            b.iter(|| factory.create(black_box(batch.clone())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_combinations, bench_variants);
criterion_main!(benches);
