//! Absolute SE(3) pose prior.

use nalgebra::{DMatrix, DVector, Isometry3, Matrix6};

use super::{Factor, check_arity, expect_pose, pose_error};
use crate::error::FusionResult;
use crate::graph::VertexValue;

/// Unary factor pulling one pose towards a measured pose.
///
/// # Mathematical Formulation
///
/// ```text
/// r = [t(T_m⁻¹ · T), ω(T_m⁻¹ · T)]
/// ```
///
/// where `t` is the translation part and `ω` the scaled rotation axis. The residual is 6D.
#[derive(Debug, Clone, PartialEq)]
pub struct PosePriorFactor {
    pub pose: Isometry3<f64>,
    pub information: Matrix6<f64>,
}

impl PosePriorFactor {
    pub fn new(pose: Isometry3<f64>) -> Self {
        Self {
            pose,
            information: Matrix6::identity(),
        }
    }

    pub fn with_information(mut self, information: Matrix6<f64>) -> Self {
        self.information = information;
        self
    }
}

impl Factor for PosePriorFactor {
    fn residual(&self, values: &[&VertexValue]) -> FusionResult<DVector<f64>> {
        check_arity(values, 1, "PosePriorFactor")?;
        let estimate = expect_pose(values, 0, "PosePriorFactor")?;
        Ok(DVector::from_column_slice(pose_error(&self.pose, estimate).as_slice()))
    }

    fn get_dimension(&self) -> usize {
        6
    }

    fn information(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(6, 6, self.information.as_slice())
    }
}
