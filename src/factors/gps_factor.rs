//! GPS position factor.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use super::{Factor, check_arity, expect_pose};
use crate::error::FusionResult;
use crate::graph::VertexValue;

/// Unary factor tying the translation of a pose to a measured position.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFactor {
    pub position: Vector3<f64>,
    pub information: Matrix3<f64>,
}

impl GpsFactor {
    pub fn new(position: Vector3<f64>) -> Self {
        Self {
            position,
            information: Matrix3::identity(),
        }
    }

    pub fn with_information(mut self, information: Matrix3<f64>) -> Self {
        self.information = information;
        self
    }
}

impl Factor for GpsFactor {
    fn residual(&self, values: &[&VertexValue]) -> FusionResult<DVector<f64>> {
        check_arity(values, 1, "GpsFactor")?;
        let pose = expect_pose(values, 0, "GpsFactor")?;
        let residual = pose.translation.vector - self.position;
        Ok(DVector::from_column_slice(residual.as_slice()))
    }

    fn get_dimension(&self) -> usize {
        3
    }

    fn information(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(3, 3, self.information.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Isometry3;

    #[test]
    fn test_residual_is_position_difference() -> Result<(), Box<dyn std::error::Error>> {
        let factor = GpsFactor::new(Vector3::new(1.0, 0.0, 0.0));
        let value = VertexValue::Pose(Isometry3::translation(1.5, -1.0, 0.0));

        let residual = factor.residual(&[&value])?;
        assert!((residual - DVector::from_vec(vec![0.5, -1.0, 0.0])).norm() < 1e-12);
        Ok(())
    }
}
