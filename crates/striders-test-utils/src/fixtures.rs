//! Deterministic fixtures for horizon and allocation tests.

use nalgebra::{DMatrix, DVector, Isometry3};

use striders_core::robot::{DynamicsData, RobotModel};
use striders_core::schedule::{ContactPhase, ContactSchedule, EndEffectorMap, ForceSize};

/// The two-foot end-effector map used across the test suites.
pub fn biped_end_effectors() -> EndEffectorMap {
    EndEffectorMap::new(["left_sole", "right_sole"])
}

/// Reference force with the given vertical component (moments zero).
pub fn foot_force(force_size: ForceSize, fz: f64) -> DVector<f64> {
    let mut force = DVector::zeros(force_size.dim());
    force[2] = fz;
    force
}

/// One biped horizon step: active feet carry `fz`, swing feet are
/// zero-force at the same target position.
pub fn biped_step(
    force_size: ForceSize,
    left_active: bool,
    right_active: bool,
    left_pos: [f64; 3],
    right_pos: [f64; 3],
    fz: f64,
) -> ContactSchedule {
    let phase = |active: bool, pos: [f64; 3]| {
        let pose = Isometry3::translation(pos[0], pos[1], pos[2]);
        if active {
            ContactPhase::stance(pose, foot_force(force_size, fz))
        } else {
            ContactPhase::swing(pose, force_size)
        }
    };
    ContactSchedule::new(
        force_size,
        vec![phase(left_active, left_pos), phase(right_active, right_pos)],
    )
    .expect("fixture force dimensions are consistent")
}

/// Statically balanced floating-base biped.
///
/// Nine velocity coordinates (six base + three joints), diagonal mass
/// matrix, both feet in contact with Jacobians selecting the base linear
/// coordinates, gravity bias balanced exactly by the reference forces.
/// With zero velocity and zero reference acceleration the allocation
/// optimum is the reference itself and the torque equals the actuated
/// bias, so solver outputs can be checked in closed form.
pub struct BalancedBiped {
    pub model: RobotModel,
    pub data: DynamicsData,
    pub mass_matrix: DMatrix<f64>,
    pub velocity: DVector<f64>,
    pub accel_ref: DVector<f64>,
    /// Stacked per-contact reference forces.
    pub force_ref: DVector<f64>,
    /// Torque the dynamics imply at the reference.
    pub expected_torque: DVector<f64>,
    pub force_size: ForceSize,
    /// Total gravity load carried by the feet.
    pub weight: f64,
}

impl BalancedBiped {
    pub fn new(force_size: ForceSize) -> Self {
        let nq = 10;
        let nv = 9;
        let total_mass = 30.0;
        let gravity = 9.81;
        let weight = total_mass * gravity;

        let mut effort_limit = DVector::zeros(nv);
        effort_limit.rows_mut(6, 3).fill(60.0);
        let model = RobotModel::new(nq, nv, effort_limit).expect("fixture model is valid");

        let mass_matrix = DMatrix::from_diagonal(&DVector::from_vec(vec![
            total_mass, total_mass, total_mass, 2.1, 2.1, 2.1, 0.9, 0.9, 0.9,
        ]));

        let mut data = DynamicsData::zeros(nv, 2, 1);
        data.bias[2] = weight;
        data.bias[6] = 0.5;
        data.bias[7] = -0.3;
        data.bias[8] = 0.2;

        // Feet: linear rows select the base translation.
        for (i, y) in [(0usize, 0.1), (1usize, -0.1)] {
            let frame = &mut data.contact_frames[i];
            frame.pose = Isometry3::translation(0.0, y, 0.0);
            for r in 0..3 {
                frame.jacobian[(r, r)] = 1.0;
            }
        }

        // Trunk frame: angular rows select the base rotation.
        for r in 0..3 {
            data.fixed_frames[0].jacobian[(3 + r, 3 + r)] = 1.0;
        }

        // Centroidal momentum map: linear momentum from base translation,
        // angular momentum from base rotation.
        for r in 0..3 {
            data.momentum_jacobian[(r, r)] = total_mass;
            data.momentum_jacobian[(3 + r, 3 + r)] = 1.0;
        }

        let fdim = 2 * force_size.dim();
        let mut force_ref = DVector::zeros(fdim);
        force_ref[2] = weight / 2.0;
        force_ref[force_size.dim() + 2] = weight / 2.0;

        let expected_torque = DVector::from_vec(vec![0.5, -0.3, 0.2]);

        Self {
            model,
            data,
            mass_matrix,
            velocity: DVector::zeros(nv),
            accel_ref: DVector::zeros(nv),
            force_ref,
            expected_torque,
            force_size,
            weight,
        }
    }

    /// Measured state `[q; v]` that coincides with the tracking reference:
    /// base at the origin with identity orientation, joints at their
    /// reference posture, zero velocity.
    pub fn x_reference(&self) -> DVector<f64> {
        let mut x = DVector::zeros(self.model.nq + self.model.nv);
        x[6] = 1.0; // unit quaternion (x, y, z, w)
        x[7] = 0.2;
        x[8] = -0.4;
        x[9] = 0.3;
        x
    }

    /// Current foot placements, doubling as the tracking references.
    pub fn foot_pose_refs(&self) -> Vec<Isometry3<f64>> {
        self.data.contact_frames.iter().map(|f| f.pose).collect()
    }
}
