//! IMU pre-integration factor.
//!
//! Integrates a run of IMU samples between two states and compares the result with the
//! change between the two states. The integration is redone with the current bias
//! estimate every time the residual is evaluated, which keeps the factor exact for
//! short bursts without bias Jacobians.

use nalgebra::{DMatrix, DVector, Matrix3, UnitQuaternion, Vector3};

use super::{Factor, check_arity, expect_pose};
use crate::error::{FusionError, FusionResult};
use crate::graph::VertexValue;
use crate::measurement::{ImuSample, TimeRange, Timestamp};

/// Gravity in the world frame (m/s^2).
pub const GRAVITY: Vector3<f64> = Vector3::new(0.0, 0.0, -9.81);

/// Pre-integrated relative motion.
#[derive(Debug, Clone, PartialEq)]
pub struct PreintegratedMotion {
    pub delta_rotation: UnitQuaternion<f64>,
    pub delta_velocity: Vector3<f64>,
    pub delta_position: Vector3<f64>,
    /// Integration time in seconds
    pub delta_time: f64,
}

/// Inertial constraint over `[pose_i, velocity_i, pose_j, velocity_j, bias_i]`.
///
/// # Mathematical Formulation
///
/// With pre-integrated `ΔR`, `Δv`, `Δp` over `Δt`:
///
/// ```text
/// r_R = log(ΔRᵀ · R_iᵀ · R_j)
/// r_v = R_iᵀ · (v_j − v_i − g·Δt) − Δv
/// r_p = R_iᵀ · (p_j − p_i − v_i·Δt − ½·g·Δt²) − Δp
/// ```
///
/// The residual is 9D `[r_R, r_v, r_p]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuPreintegrationFactor {
    samples: Vec<ImuSample>,
    time_range: TimeRange,
    seconds_per_tick: f64,
    information: Matrix3<f64>,
}

impl ImuPreintegrationFactor {
    /// # Errors
    /// Returns a solver error if there are no samples or the tick length is not positive.
    pub fn new(samples: Vec<ImuSample>, time_range: TimeRange, seconds_per_tick: f64) -> FusionResult<Self> {
        if samples.is_empty() {
            return Err(FusionError::Solver(
                "IMU pre-integration needs at least one sample".to_string(),
            ));
        }
        if seconds_per_tick <= 0.0 {
            return Err(FusionError::Solver(format!(
                "Tick length must be positive, got {seconds_per_tick}"
            )));
        }
        Ok(Self {
            samples,
            time_range,
            seconds_per_tick,
            information: Matrix3::identity(),
        })
    }

    /// Information block applied to each of the three residual parts.
    pub fn with_information(mut self, information: Matrix3<f64>) -> Self {
        self.information = information;
        self
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    /// Integrate the samples with the given bias, holding each reading until the next
    /// sample (the first reading also covers the gap from the start of the range).
    pub fn preintegrate(&self, gyroscope_bias: &Vector3<f64>, accelerometer_bias: &Vector3<f64>) -> PreintegratedMotion {
        let mut delta_rotation = UnitQuaternion::identity();
        let mut delta_velocity = Vector3::zeros();
        let mut delta_position = Vector3::zeros();
        let mut delta_time = 0.0;

        for (k, sample) in self.samples.iter().enumerate() {
            let begin: Timestamp = if k == 0 {
                self.time_range.start
            } else {
                sample.timestamp
            };
            let end: Timestamp = self
                .samples
                .get(k + 1)
                .map_or(self.time_range.stop, |next| next.timestamp);
            let dt = (end - begin).max(0) as f64 * self.seconds_per_tick;

            let omega = sample.angular_velocity - gyroscope_bias;
            let acceleration = delta_rotation * (sample.acceleration - accelerometer_bias);

            delta_position += delta_velocity * dt + 0.5 * acceleration * dt * dt;
            delta_velocity += acceleration * dt;
            delta_rotation *= UnitQuaternion::from_scaled_axis(omega * dt);
            delta_time += dt;
        }

        PreintegratedMotion {
            delta_rotation,
            delta_velocity,
            delta_position,
            delta_time,
        }
    }
}

fn expect_vector<'a>(values: &[&'a VertexValue], position: usize) -> FusionResult<&'a Vector3<f64>> {
    values
        .get(position)
        .and_then(|v| v.as_velocity())
        .ok_or_else(|| {
            FusionError::Solver(format!(
                "ImuPreintegrationFactor expects a velocity at position {position}"
            ))
        })
}

impl Factor for ImuPreintegrationFactor {
    fn residual(&self, values: &[&VertexValue]) -> FusionResult<DVector<f64>> {
        check_arity(values, 5, "ImuPreintegrationFactor")?;
        let pose_i = expect_pose(values, 0, "ImuPreintegrationFactor")?;
        let velocity_i = expect_vector(values, 1)?;
        let pose_j = expect_pose(values, 2, "ImuPreintegrationFactor")?;
        let velocity_j = expect_vector(values, 3)?;
        let (gyroscope_bias, accelerometer_bias) = values[4].as_imu_bias().ok_or_else(|| {
            FusionError::Solver("ImuPreintegrationFactor expects a bias at position 4".to_string())
        })?;

        let motion = self.preintegrate(gyroscope_bias, accelerometer_bias);
        let dt = motion.delta_time;
        let rotation_i_inv = pose_i.rotation.inverse();
        let p_i = pose_i.translation.vector;
        let p_j = pose_j.translation.vector;

        let r_rotation = (motion.delta_rotation.inverse() * rotation_i_inv * pose_j.rotation).scaled_axis();
        let r_velocity = rotation_i_inv * (velocity_j - velocity_i - GRAVITY * dt) - motion.delta_velocity;
        let r_position = rotation_i_inv * (p_j - p_i - velocity_i * dt - 0.5 * GRAVITY * dt * dt)
            - motion.delta_position;

        let mut residual = DVector::zeros(9);
        residual.fixed_rows_mut::<3>(0).copy_from(&r_rotation);
        residual.fixed_rows_mut::<3>(3).copy_from(&r_velocity);
        residual.fixed_rows_mut::<3>(6).copy_from(&r_position);
        Ok(residual)
    }

    fn get_dimension(&self) -> usize {
        9
    }

    fn information(&self) -> DMatrix<f64> {
        let mut information = DMatrix::zeros(9, 9);
        for block in 0..3 {
            information
                .fixed_view_mut::<3, 3>(3 * block, 3 * block)
                .copy_from(&self.information);
        }
        information
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::MeasurementId;
    use nalgebra::Isometry3;

    const SECONDS_PER_TICK: f64 = 0.1;

    fn stationary_samples(timestamps: &[Timestamp]) -> Vec<ImuSample> {
        timestamps
            .iter()
            .enumerate()
            .map(|(i, &t)| ImuSample::new(MeasurementId(i as u64), t, Vector3::zeros(), -GRAVITY))
            .collect()
    }

    fn zero_bias() -> VertexValue {
        VertexValue::ImuBias {
            gyroscope: Vector3::zeros(),
            accelerometer: Vector3::zeros(),
        }
    }

    #[test]
    fn test_rejects_empty_samples() -> Result<(), Box<dyn std::error::Error>> {
        assert!(ImuPreintegrationFactor::new(Vec::new(), TimeRange::new(0, 1)?, 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_preintegration_covers_range() -> Result<(), Box<dyn std::error::Error>> {
        let factor = ImuPreintegrationFactor::new(
            stationary_samples(&[2, 3, 4]),
            TimeRange::new(1, 5)?,
            SECONDS_PER_TICK,
        )?;
        let motion = factor.preintegrate(&Vector3::zeros(), &Vector3::zeros());

        assert!((motion.delta_time - 0.4).abs() < 1e-12);
        assert!(motion.delta_rotation.angle() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_stationary_vehicle_has_zero_residual() -> Result<(), Box<dyn std::error::Error>> {
        let factor = ImuPreintegrationFactor::new(
            stationary_samples(&[0, 1, 2, 3, 4]),
            TimeRange::new(0, 5)?,
            SECONDS_PER_TICK,
        )?;
        let pose = VertexValue::Pose(Isometry3::identity());
        let velocity = VertexValue::Velocity(Vector3::zeros());
        let bias = zero_bias();

        let residual = factor.residual(&[&pose, &velocity, &pose, &velocity, &bias])?;
        assert_eq!(residual.len(), factor.get_dimension());
        assert!(residual.norm() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_constant_velocity_has_zero_residual() -> Result<(), Box<dyn std::error::Error>> {
        let factor = ImuPreintegrationFactor::new(
            stationary_samples(&[0, 5]),
            TimeRange::new(0, 10)?,
            SECONDS_PER_TICK,
        )?;
        let velocity = VertexValue::Velocity(Vector3::new(2.0, 0.0, 0.0));
        let pose_i = VertexValue::Pose(Isometry3::identity());
        let pose_j = VertexValue::Pose(Isometry3::translation(2.0, 0.0, 0.0));
        let bias = zero_bias();

        let residual = factor.residual(&[&pose_i, &velocity, &pose_j, &velocity, &bias])?;
        assert!(residual.norm() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_arity() -> Result<(), Box<dyn std::error::Error>> {
        let factor =
            ImuPreintegrationFactor::new(stationary_samples(&[0]), TimeRange::new(0, 1)?, 1.0)?;
        let pose = VertexValue::Pose(Isometry3::identity());
        assert!(factor.residual(&[&pose]).is_err());
        Ok(())
    }
}
