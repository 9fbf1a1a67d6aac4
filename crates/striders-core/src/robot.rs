//! Robot description and the per-tick dynamics payload.
//!
//! Rigid-body quantities (mass matrix, bias forces, frame Jacobians) are
//! computed by an external dynamics evaluator each control tick; this
//! module only defines the plain-data shapes the allocators borrow. The
//! first six velocity coordinates are the floating base, the remainder
//! are actuated joints.

use nalgebra::{DMatrix, DVector, Isometry3, Vector6};

use crate::error::SettingsError;

/// Fixed description of the controlled robot, resolved once at startup.
#[derive(Clone, Debug)]
pub struct RobotModel {
    /// Number of configuration coordinates.
    pub nq: usize,
    /// Number of velocity coordinates (first six: floating base).
    pub nv: usize,
    /// Actuation effort limits, one per velocity coordinate; the first
    /// six entries are ignored.
    pub effort_limit: DVector<f64>,
}

impl RobotModel {
    pub fn new(nq: usize, nv: usize, effort_limit: DVector<f64>) -> Result<Self, SettingsError> {
        if nv <= 6 {
            return Err(SettingsError::InvalidValue {
                field: "nv",
                message: format!("need at least one actuated joint, got nv = {nv}"),
            });
        }
        if effort_limit.len() != nv {
            return Err(SettingsError::SettingsMismatch {
                what: "effort limit",
                expected: nv,
                got: effort_limit.len(),
            });
        }
        Ok(Self {
            nq,
            nv,
            effort_limit,
        })
    }

    /// Number of actuated joints.
    pub const fn nu(&self) -> usize {
        self.nv - 6
    }
}

/// Kinematics of one robot frame, refreshed each tick by the dynamics
/// evaluator. Spatial quantities stack linear over angular components.
#[derive(Clone, Debug)]
pub struct FrameMotion {
    /// Frame placement.
    pub pose: Isometry3<f64>,
    /// Spatial velocity [v; ω].
    pub velocity: Vector6<f64>,
    /// Frame Jacobian, 6 × nv.
    pub jacobian: DMatrix<f64>,
    /// Time derivative of the frame Jacobian, 6 × nv.
    pub jacobian_dot: DMatrix<f64>,
}

impl FrameMotion {
    /// Identity pose, zero velocity, zero Jacobians.
    pub fn zeros(nv: usize) -> Self {
        Self {
            pose: Isometry3::identity(),
            velocity: Vector6::zeros(),
            jacobian: DMatrix::zeros(6, nv),
            jacobian_dot: DMatrix::zeros(6, nv),
        }
    }
}

/// Per-tick rigid-body quantities, borrowed read-only by the allocators.
///
/// `contact_frames` is indexed by end-effector index; `fixed_frames` holds
/// the frames whose world orientation is regulated (e.g. the trunk).
#[derive(Clone, Debug)]
pub struct DynamicsData {
    /// Nonlinear bias forces (Coriolis, centrifugal, gravity), length nv.
    pub bias: DVector<f64>,
    /// One entry per configured contact frame.
    pub contact_frames: Vec<FrameMotion>,
    /// Orientation-regulated frames (IK-ID only).
    pub fixed_frames: Vec<FrameMotion>,
    /// Centroidal momentum matrix Ag, 6 × nv.
    pub momentum_jacobian: DMatrix<f64>,
    /// Time derivative of Ag, 6 × nv.
    pub momentum_jacobian_dot: DMatrix<f64>,
}

impl DynamicsData {
    /// All-zero payload for the given dimensions.
    pub fn zeros(nv: usize, n_contacts: usize, n_fixed: usize) -> Self {
        Self {
            bias: DVector::zeros(nv),
            contact_frames: (0..n_contacts).map(|_| FrameMotion::zeros(nv)).collect(),
            fixed_frames: (0..n_fixed).map(|_| FrameMotion::zeros(nv)).collect(),
            momentum_jacobian: DMatrix::zeros(6, nv),
            momentum_jacobian_dot: DMatrix::zeros(6, nv),
        }
    }
}
