//! Optimization vertices.

use std::fmt;

use nalgebra::{Isometry3, Vector3};

/// Kind of optimization unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexKind {
    Pose,
    Velocity,
    ImuBias,
}

impl VertexKind {
    pub const ALL: [VertexKind; 3] = [VertexKind::Pose, VertexKind::Velocity, VertexKind::ImuBias];
}

impl fmt::Display for VertexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VertexKind::Pose => "Pose",
            VertexKind::Velocity => "Velocity",
            VertexKind::ImuBias => "ImuBias",
        };
        write!(f, "{name}")
    }
}

/// Type-scoped handle of a vertex. Indices are assigned once and never reused
/// within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId {
    pub kind: VertexKind,
    pub index: usize,
}

impl VertexId {
    pub fn new(kind: VertexKind, index: usize) -> Self {
        Self { kind, index }
    }

    pub fn pose(index: usize) -> Self {
        Self::new(VertexKind::Pose, index)
    }

    pub fn velocity(index: usize) -> Self {
        Self::new(VertexKind::Velocity, index)
    }

    pub fn imu_bias(index: usize) -> Self {
        Self::new(VertexKind::ImuBias, index)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.index)
    }
}

/// Current estimate of a vertex.
#[derive(Debug, Clone, PartialEq)]
pub enum VertexValue {
    Pose(Isometry3<f64>),
    Velocity(Vector3<f64>),
    ImuBias {
        gyroscope: Vector3<f64>,
        accelerometer: Vector3<f64>,
    },
}

impl VertexValue {
    pub fn kind(&self) -> VertexKind {
        match self {
            VertexValue::Pose(_) => VertexKind::Pose,
            VertexValue::Velocity(_) => VertexKind::Velocity,
            VertexValue::ImuBias { .. } => VertexKind::ImuBias,
        }
    }

    /// Identity pose, zero velocity or zero bias.
    pub fn identity(kind: VertexKind) -> Self {
        match kind {
            VertexKind::Pose => VertexValue::Pose(Isometry3::identity()),
            VertexKind::Velocity => VertexValue::Velocity(Vector3::zeros()),
            VertexKind::ImuBias => VertexValue::ImuBias {
                gyroscope: Vector3::zeros(),
                accelerometer: Vector3::zeros(),
            },
        }
    }

    pub fn as_pose(&self) -> Option<&Isometry3<f64>> {
        match self {
            VertexValue::Pose(pose) => Some(pose),
            _ => None,
        }
    }

    pub fn as_velocity(&self) -> Option<&Vector3<f64>> {
        match self {
            VertexValue::Velocity(velocity) => Some(velocity),
            _ => None,
        }
    }

    pub fn as_imu_bias(&self) -> Option<(&Vector3<f64>, &Vector3<f64>)> {
        match self {
            VertexValue::ImuBias {
                gyroscope,
                accelerometer,
            } => Some((gyroscope, accelerometer)),
            _ => None,
        }
    }
}

/// One optimization unknown with its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub id: VertexId,
    pub value: VertexValue,
}

impl Vertex {
    /// Create a vertex, returning `None` if the value kind does not match the handle.
    pub fn new(id: VertexId, value: VertexValue) -> Option<Self> {
        (id.kind == value.kind()).then_some(Self { id, value })
    }

    /// Vertex initialized with [`VertexValue::identity`].
    pub fn identity(id: VertexId) -> Self {
        Self {
            id,
            value: VertexValue::identity(id.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_id_display() {
        assert_eq!(VertexId::pose(3).to_string(), "Pose(3)");
        assert_eq!(VertexId::imu_bias(0).to_string(), "ImuBias(0)");
    }

    #[test]
    fn test_vertex_rejects_mismatched_value() {
        let value = VertexValue::Velocity(Vector3::zeros());
        assert!(Vertex::new(VertexId::pose(0), value.clone()).is_none());
        assert!(Vertex::new(VertexId::velocity(0), value).is_some());
    }

    #[test]
    fn test_identity_values() {
        for kind in VertexKind::ALL {
            assert_eq!(VertexValue::identity(kind).kind(), kind);
        }
        assert!(VertexValue::identity(VertexKind::Pose).as_pose().is_some());
        assert!(VertexValue::identity(VertexKind::Pose).as_velocity().is_none());
    }
}
