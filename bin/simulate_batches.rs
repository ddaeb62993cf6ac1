use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use fusion_graph::builder::{BatchOutcome, BatchSummary, GraphBuilder};
use fusion_graph::candidates::{CandidateFactory, OptimalCandidateFactory};
use fusion_graph::config::{CandidateConfig, IsolationStrategy};
use fusion_graph::edge_factories::{EdgeFactoryRegistry, ImuEdgeFactory};
use fusion_graph::init_logger_with_levels;
use fusion_graph::measurement::{
    GpsMeasurement, ImuSample, Measurement, MeasurementId, MeasurementKind, OdometryMeasurement,
    PoseMeasurement, TimeRange, Timestamp,
};
use nalgebra::{Isometry3, Vector3};
use serde::Serialize;
use tracing::{Level, info, warn};

/// Timestamps are in milliseconds.
const SECONDS_PER_TICK: f64 = 1e-3;

#[derive(Parser)]
#[command(name = "simulate_batches")]
#[command(about = "Feed a synthetic multi-sensor trajectory through the graph builder")]
struct Args {
    /// Number of batches after the initial pose prior
    #[arg(short, long, default_value = "20")]
    batches: usize,

    /// Time between odometry keyframes in milliseconds
    #[arg(long, default_value = "100")]
    period_ms: i64,

    /// Time between IMU samples in milliseconds
    #[arg(long, default_value = "10")]
    imu_period_ms: i64,

    /// Forward speed in m/s
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Emit a GPS fix every N batches (0 disables GPS)
    #[arg(long, default_value = "2")]
    gps_every: usize,

    /// Milliseconds by which GPS fixes precede the keyframe
    #[arg(long, default_value = "0")]
    gps_offset_ms: i64,

    /// Isolation strategy: "copy" or "undo"
    #[arg(short, long, default_value = "copy")]
    isolation: String,

    /// Evaluate candidates sequentially
    #[arg(long)]
    sequential: bool,

    /// Maximum number of timestamp groups per batch
    #[arg(long, default_value = "12")]
    max_groups: usize,

    /// Log skipped measurements and discarded branches of the candidate pipeline
    #[arg(long)]
    trace_pipeline: bool,

    /// Optional path for a CSV summary of every batch
    #[arg(long)]
    save_output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct BatchRecord {
    batch: usize,
    measurements: usize,
    candidates: usize,
    dropped: usize,
    connected: bool,
    residual: f64,
    time_shift: Timestamp,
    new_edges: usize,
    new_vertices: usize,
    skipped: usize,
    leftovers: usize,
    deferred: usize,
    vertices: usize,
    edges: usize,
    clusters: usize,
    elapsed_ms: f64,
}

impl BatchRecord {
    fn new(summary: &BatchSummary, elapsed_ms: f64) -> Self {
        Self {
            batch: summary.batch,
            measurements: summary.num_measurements,
            candidates: summary.num_candidates,
            dropped: summary.dropped,
            connected: summary.score.connected,
            residual: summary.score.residual,
            time_shift: summary.score.time_shift,
            new_edges: summary.new_edges,
            new_vertices: summary.new_vertices,
            skipped: summary.skipped,
            leftovers: summary.leftovers,
            deferred: summary.deferred,
            vertices: summary.graph.num_vertices,
            edges: summary.graph.num_edges,
            clusters: summary.graph.num_clusters,
            elapsed_ms,
        }
    }
}

/// Constant-velocity motion along x with gravity-compensated IMU readings.
struct Trajectory {
    period: Timestamp,
    imu_period: Timestamp,
    speed: f64,
    gps_every: usize,
    gps_offset: Timestamp,
    next_id: u64,
}

impl Trajectory {
    fn next_id(&mut self) -> MeasurementId {
        self.next_id += 1;
        MeasurementId(self.next_id)
    }

    fn pose_at(&self, timestamp: Timestamp) -> Isometry3<f64> {
        Isometry3::translation(self.speed * timestamp as f64 * SECONDS_PER_TICK, 0.0, 0.0)
    }

    fn initial(&mut self) -> Vec<Measurement> {
        let id = self.next_id();
        vec![PoseMeasurement::new(id, 0, self.pose_at(0)).into()]
    }

    /// Measurements covering `(batch - 1) * period .. batch * period`.
    fn batch(&mut self, batch: usize) -> Result<Vec<Measurement>, Box<dyn Error>> {
        let stop = batch as Timestamp * self.period;
        let start = stop - self.period;
        let mut measurements = Vec::new();

        let relative = self.pose_at(start).inverse() * self.pose_at(stop);
        let id = self.next_id();
        measurements.push(OdometryMeasurement::new(id, TimeRange::new(start, stop)?, relative)?.into());

        let mut timestamp = start;
        while timestamp < stop {
            let id = self.next_id();
            measurements.push(
                ImuSample::new(id, timestamp, Vector3::zeros(), Vector3::new(0.0, 0.0, 9.81)).into(),
            );
            timestamp += self.imu_period;
        }

        if self.gps_every > 0 && batch % self.gps_every == 0 {
            let fix = stop - self.gps_offset;
            let id = self.next_id();
            measurements.push(GpsMeasurement::new(id, fix, self.pose_at(fix).translation.vector).into());
        }
        Ok(measurements)
    }
}

fn parse_isolation(name: &str) -> Result<IsolationStrategy, Box<dyn Error>> {
    match name.to_lowercase().as_str() {
        "copy" => Ok(IsolationStrategy::CopyPerCandidate),
        "undo" => Ok(IsolationStrategy::MutateAndUndo),
        other => Err(format!("Unknown isolation strategy: {other}").into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logger_with_levels(Level::INFO, args.trace_pipeline.then_some(Level::DEBUG));

    if args.period_ms <= 0 || args.imu_period_ms <= 0 {
        return Err("Periods must be positive".into());
    }
    if args.gps_offset_ms < 0 || args.gps_offset_ms >= args.period_ms {
        return Err("GPS offset must lie within one period".into());
    }

    let config = CandidateConfig::new()
        .with_isolation(parse_isolation(&args.isolation)?)
        .with_parallel(!args.sequential)
        .with_max_groups(args.max_groups);
    config.validate()?;

    let registry = EdgeFactoryRegistry::with_defaults().with_factory(
        MeasurementKind::Continuous,
        Arc::new(ImuEdgeFactory::new(SECONDS_PER_TICK)),
    );
    let factory = CandidateFactory::new(config.clone()).with_registry(registry);
    let mut builder = GraphBuilder::with_factory(OptimalCandidateFactory::from_factory(factory));

    info!("FUSION-GRAPH BATCH SIMULATION");
    info!("  Batches: {}", args.batches);
    info!("  Keyframe period: {} ms", args.period_ms);
    info!("  IMU period: {} ms", args.imu_period_ms);
    info!("  Isolation: {:?} (parallel: {})", config.isolation, config.runs_parallel());

    let mut trajectory = Trajectory {
        period: args.period_ms,
        imu_period: args.imu_period_ms,
        speed: args.speed,
        gps_every: args.gps_every,
        gps_offset: args.gps_offset_ms,
        next_id: 0,
    };

    let mut records = Vec::new();
    let mut waiting = 0;
    for batch in 0..=args.batches {
        let measurements = if batch == 0 {
            trajectory.initial()
        } else {
            trajectory.batch(batch)?
        };
        builder.add_measurements(measurements)?;

        let start = Instant::now();
        match builder.process_batch()? {
            BatchOutcome::Committed(summary) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                records.push(BatchRecord::new(&summary, elapsed_ms));
            }
            BatchOutcome::Waiting => waiting += 1,
        }
    }

    let graph = builder.graph();
    graph.check_consistency()?;
    info!("");
    info!("Committed {} batches ({} waiting)", builder.num_batches(), waiting);
    info!("{}", graph.statistics());
    if !builder.storage().is_empty() {
        warn!("{} measurements left in storage", builder.storage().len());
    }

    if let Some(path) = args.save_output {
        let mut writer = csv::Writer::from_path(&path)?;
        for record in &records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        info!("Batch summary written to {}", path.display());
    }
    Ok(())
}
