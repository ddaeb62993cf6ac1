//! SE(3) between factor for odometry constraints.

use nalgebra::{DMatrix, DVector, Isometry3, Matrix6};

use super::{Factor, check_arity, expect_pose, pose_error};
use crate::error::FusionResult;
use crate::graph::VertexValue;

/// Between factor for two SE(3) poses.
///
/// # Mathematical Formulation
///
/// Given poses `T_i`, `T_j` and a measured relative motion `T_ij`:
///
/// ```text
/// r = [t(T_ij⁻¹ · T_i⁻¹ · T_j), ω(T_ij⁻¹ · T_i⁻¹ · T_j)]
/// ```
///
/// The residual is 6D: translation followed by the scaled rotation axis.
#[derive(Debug, Clone, PartialEq)]
pub struct BetweenFactor {
    pub relative: Isometry3<f64>,
    pub information: Matrix6<f64>,
}

impl BetweenFactor {
    pub fn new(relative: Isometry3<f64>) -> Self {
        Self {
            relative,
            information: Matrix6::identity(),
        }
    }

    pub fn with_information(mut self, information: Matrix6<f64>) -> Self {
        self.information = information;
        self
    }
}

impl Factor for BetweenFactor {
    fn residual(&self, values: &[&VertexValue]) -> FusionResult<DVector<f64>> {
        check_arity(values, 2, "BetweenFactor")?;
        let pose_i = expect_pose(values, 0, "BetweenFactor")?;
        let pose_j = expect_pose(values, 1, "BetweenFactor")?;
        let estimate = pose_i.inverse() * pose_j;
        Ok(DVector::from_column_slice(
            pose_error(&self.relative, &estimate).as_slice(),
        ))
    }

    fn get_dimension(&self) -> usize {
        6
    }

    fn information(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(6, 6, self.information.as_slice())
    }
}
