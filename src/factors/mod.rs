//! Factor implementations attached to graph edges
//!
//! Every edge carries an opaque backend factor. The candidate pipeline never inspects a
//! factor beyond this trait: the solver evaluates residuals, the graph store only moves
//! factors around.
//!
//! # Module Structure
//!
//! - `pose_prior_factor`: absolute SE(3) pose prior
//! - `gps_factor`: absolute position constraint
//! - `between_factor`: relative SE(3) motion between two poses
//! - `imu_preintegration_factor`: inertial constraint over two states and a bias

use std::fmt;

use nalgebra::{DMatrix, DVector, Isometry3, Vector6};

use crate::error::{FusionError, FusionResult};
use crate::graph::VertexValue;

pub mod between_factor;
pub mod gps_factor;
pub mod imu_preintegration_factor;
pub mod pose_prior_factor;

pub use between_factor::BetweenFactor;
pub use gps_factor::GpsFactor;
pub use imu_preintegration_factor::ImuPreintegrationFactor;
pub use pose_prior_factor::PosePriorFactor;

/// Backend constraint attached to an edge.
pub trait Factor: fmt::Debug + Send + Sync {
    /// Residual at the given vertex values, in the order of the edge's vertices.
    fn residual(&self, values: &[&VertexValue]) -> FusionResult<DVector<f64>>;

    /// Dimension of the residual vector.
    fn get_dimension(&self) -> usize;

    /// Information (inverse covariance) matrix of the residual.
    fn information(&self) -> DMatrix<f64>;

    /// Information-weighted squared error `r^T Ω r`.
    fn weighted_error(&self, values: &[&VertexValue]) -> FusionResult<f64> {
        let residual = self.residual(values)?;
        let information = self.information();
        if information.nrows() != residual.len() || information.ncols() != residual.len() {
            return Err(FusionError::Solver(format!(
                "Information matrix {}x{} does not match residual dimension {}",
                information.nrows(),
                information.ncols(),
                residual.len()
            )));
        }
        Ok(residual.dot(&(information * &residual)))
    }
}

/// Tangent-space difference between two poses: `[translation, rotation]` of
/// `measured⁻¹ · estimate`.
pub(crate) fn pose_error(measured: &Isometry3<f64>, estimate: &Isometry3<f64>) -> Vector6<f64> {
    let delta = measured.inverse() * estimate;
    let translation = delta.translation.vector;
    let rotation = delta.rotation.scaled_axis();
    Vector6::new(
        translation.x,
        translation.y,
        translation.z,
        rotation.x,
        rotation.y,
        rotation.z,
    )
}

/// Check arity and fetch the value at `position` as a pose.
pub(crate) fn expect_pose<'a>(
    values: &[&'a VertexValue],
    position: usize,
    factor: &str,
) -> FusionResult<&'a Isometry3<f64>> {
    values
        .get(position)
        .and_then(|v| v.as_pose())
        .ok_or_else(|| {
            FusionError::Solver(format!("{factor} expects a pose at position {position}"))
        })
}

pub(crate) fn check_arity(values: &[&VertexValue], expected: usize, factor: &str) -> FusionResult<()> {
    if values.len() != expected {
        return Err(FusionError::Solver(format!(
            "{factor} expects {expected} values, got {}",
            values.len()
        )));
    }
    Ok(())
}
