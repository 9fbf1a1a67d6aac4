//! Inverse-kinematics + inverse-dynamics allocator.
//!
//! Extends the ID machinery with Cartesian and posture tracking folded
//! into the cost rather than hard constraints: joint-posture PD,
//! centroidal-momentum-rate tracking through the momentum matrix,
//! per-contact 6-DOF foot-pose PD, and fixed-frame orientation PD. Each
//! term contributes a weighted `JᵀJ` Hessian block and `Jᵀe` gradient
//! block. The decision vector is `[a, Δf, τ]` with an *absolute* joint
//! acceleration; actuator effort limits enter as box rows.
//!
//! [`IkIdSolver::compute_differences`] must run on fresh dynamics data
//! before each solve; it caches the tracking errors the next
//! [`IkIdSolver::solve_qp`] consumes.

use nalgebra::{DMatrix, DVector, Isometry3, Quaternion, UnitQuaternion, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use striders_core::error::{ConfigError, SettingsError};
use striders_core::robot::{DynamicsData, RobotModel};
use striders_core::schedule::ForceSize;

use crate::cone::{cone_block, fill_cone_lower, CONE_ROWS};
use crate::id::SolvedAllocation;
use crate::workspace::{Block, QpWorkspace};

const BOX_FREE: f64 = 1e5;

const fn default_half_extent() -> f64 {
    0.05
}

const fn default_ikid_iters() -> usize {
    150
}

/// IK-ID allocator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IkIdSettings {
    /// Contact frame names, in end-effector index order.
    pub contact_names: Vec<String>,
    /// Frames whose world orientation is regulated (e.g. the trunk).
    pub fixed_frame_names: Vec<String>,
    /// Per-contact force parameterization.
    pub force_size: ForceSize,
    /// Coulomb friction coefficient.
    pub mu: f64,
    #[serde(default = "default_half_extent")]
    pub half_width: f64,
    #[serde(default = "default_half_extent")]
    pub half_length: f64,
    /// Reference state `[q_ref; v_ref]` the posture terms track.
    pub x0: DVector<f64>,
    /// Timestep used to finite-difference the foot pose references.
    pub dt: f64,
    /// Posture tracking weight.
    pub w_qref: f64,
    /// Centroidal-momentum-rate tracking weight.
    pub w_centroidal: f64,
    /// Foot-pose tracking weight.
    pub w_footpose: f64,
    /// Fixed-frame orientation tracking weight.
    pub w_baserot: f64,
    /// Weight on the force correction.
    pub w_force: f64,
    /// Posture PD gains, one per velocity coordinate.
    pub kp_joint: DVector<f64>,
    pub kd_joint: DVector<f64>,
    /// Foot-pose PD gains (linear stacked over angular).
    pub kp_foot: Vector6<f64>,
    pub kd_foot: Vector6<f64>,
    /// Fixed-frame orientation PD gains.
    pub kp_frame: Vector3<f64>,
    pub kd_frame: Vector3<f64>,
    /// QP iteration budget per solve (richer cost than the ID variant,
    /// hence the larger default).
    #[serde(default = "default_ikid_iters")]
    pub max_iters: usize,
}

impl IkIdSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.contact_names.is_empty() {
            return Err(SettingsError::InvalidValue {
                field: "contact_names",
                message: "need at least one contact frame".into(),
            });
        }
        if self.mu <= 0.0 {
            return Err(SettingsError::InvalidValue {
                field: "mu",
                message: "must be positive".into(),
            });
        }
        if self.dt <= 0.0 {
            return Err(SettingsError::InvalidValue {
                field: "dt",
                message: "must be positive".into(),
            });
        }
        if self.force_size == ForceSize::Wrench
            && (self.half_width <= 0.0 || self.half_length <= 0.0)
        {
            return Err(SettingsError::InvalidValue {
                field: "half_width/half_length",
                message: "wrench contacts need positive patch extents".into(),
            });
        }
        if self.w_force <= 0.0 {
            return Err(SettingsError::InvalidValue {
                field: "w_force",
                message: "force correction weight must be positive".into(),
            });
        }
        if self.max_iters == 0 {
            return Err(SettingsError::InvalidValue {
                field: "max_iters",
                message: "need at least one QP iteration".into(),
            });
        }
        Ok(())
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Per-tick IK-ID QP.
#[derive(Debug)]
pub struct IkIdSolver {
    settings: IkIdSettings,
    nq: usize,
    nv: usize,
    nk: usize,
    nfix: usize,
    fdim: usize,
    neg_cone: DMatrix<f64>,
    q_diff: DVector<f64>,
    dq_diff: DVector<f64>,
    foot_diffs: Vec<Vector6<f64>>,
    dfoot_diffs: Vec<Vector6<f64>>,
    frame_diffs: Vec<Vector3<f64>>,
    dframe_diffs: Vec<Vector3<f64>>,
    ws: QpWorkspace,
    solved: SolvedAllocation,
    converged: bool,
}

impl IkIdSolver {
    pub fn new(settings: IkIdSettings, model: &RobotModel) -> Result<Self, SettingsError> {
        settings.validate()?;
        let nq = model.nq;
        let nv = model.nv;
        if settings.x0.len() != nq + nv {
            return Err(SettingsError::SettingsMismatch {
                what: "reference state",
                expected: nq + nv,
                got: settings.x0.len(),
            });
        }
        if settings.kp_joint.len() != nv || settings.kd_joint.len() != nv {
            return Err(SettingsError::SettingsMismatch {
                what: "posture gains",
                expected: nv,
                got: settings.kp_joint.len(),
            });
        }
        let nk = settings.contact_names.len();
        let nfix = settings.fixed_frame_names.len();
        let fs = settings.force_size.dim();
        let fdim = nk * fs;
        let n = 2 * nv - 6 + fdim;
        let n_eq = nv + fdim;
        let n_in = CONE_ROWS * nk;

        let h_blocks = [
            Block::Rect {
                row: 0,
                col: 0,
                rows: nv,
                cols: nv,
            },
            Block::Diag {
                row: nv,
                col: nv,
                len: fdim,
            },
        ];
        let mut a_blocks = vec![
            Block::Rect {
                row: 0,
                col: 0,
                rows: nv,
                cols: nv,
            },
            Block::Rect {
                row: 0,
                col: nv,
                rows: nv,
                cols: fdim,
            },
            Block::Diag {
                row: 6,
                col: nv + fdim,
                len: nv - 6,
            },
            Block::Rect {
                row: nv,
                col: 0,
                rows: fdim,
                cols: nv,
            },
        ];
        for i in 0..nk {
            a_blocks.push(Block::Rect {
                row: n_eq + CONE_ROWS * i,
                col: nv + fs * i,
                rows: CONE_ROWS,
                cols: fs,
            });
        }
        let mut ws = QpWorkspace::new(n, n_eq, n_in, true, &h_blocks, &a_blocks);

        for i in 0..fdim {
            ws.h[(nv + i, nv + i)] = settings.w_force;
        }
        for j in 0..nv - 6 {
            ws.a[(6 + j, nv + fdim + j)] = -1.0;
        }
        // Box rows: free on acceleration and force corrections, actuator
        // effort limits on the torque segment.
        let box_row = n_eq + n_in;
        for j in 0..n {
            ws.a[(box_row + j, j)] = 1.0;
            ws.a[(box_row + n + j, j)] = -1.0;
            ws.b[box_row + j] = BOX_FREE;
            ws.b[box_row + n + j] = BOX_FREE;
        }
        for j in 0..nv - 6 {
            let limit = model.effort_limit[6 + j];
            ws.b[box_row + nv + fdim + j] = limit;
            ws.b[box_row + n + nv + fdim + j] = limit;
        }

        let neg_cone = -cone_block(
            settings.force_size,
            settings.mu,
            settings.half_width,
            settings.half_length,
        );

        Ok(Self {
            nq,
            nv,
            nk,
            nfix,
            fdim,
            neg_cone,
            q_diff: DVector::zeros(nv),
            dq_diff: DVector::zeros(nv),
            foot_diffs: vec![Vector6::zeros(); nk],
            dfoot_diffs: vec![Vector6::zeros(); nk],
            frame_diffs: vec![Vector3::zeros(); nfix],
            dframe_diffs: vec![Vector3::zeros(); nfix],
            ws,
            solved: SolvedAllocation {
                acc: DVector::zeros(nv),
                forces: DVector::zeros(fdim),
                torque: DVector::zeros(nv - 6),
            },
            converged: false,
            settings,
        })
    }

    /// Cache the tracking errors for the next solve: joint posture and
    /// velocity against the reference state, per-foot pose error
    /// (translation plus rotation-log orientation, velocity error by
    /// finite difference of the next pose reference), and fixed-frame
    /// orientation error.
    pub fn compute_differences(
        &mut self,
        data: &DynamicsData,
        x_measured: &DVector<f64>,
        foot_refs: &[Isometry3<f64>],
        foot_refs_next: &[Isometry3<f64>],
    ) {
        debug_assert_eq!(x_measured.len(), self.nq + self.nv);
        debug_assert_eq!(foot_refs.len(), self.nk);
        debug_assert_eq!(foot_refs_next.len(), self.nk);

        configuration_difference(
            &x_measured.as_slice()[..self.nq],
            &self.settings.x0.as_slice()[..self.nq],
            &mut self.q_diff,
        );
        for i in 0..self.nv {
            self.dq_diff[i] = self.settings.x0[self.nq + i] - x_measured[self.nq + i];
        }

        let dt = self.settings.dt;
        for i in 0..self.nk {
            let frame = &data.contact_frames[i];
            let current = foot_refs[i];
            let next = foot_refs_next[i];

            let lin_err = current.translation.vector - frame.pose.translation.vector;
            let ang_err = -(current.rotation.inverse() * frame.pose.rotation).scaled_axis();
            self.foot_diffs[i].fixed_rows_mut::<3>(0).copy_from(&lin_err);
            self.foot_diffs[i].fixed_rows_mut::<3>(3).copy_from(&ang_err);

            let dlin_err = (next.translation.vector - current.translation.vector) / dt
                - frame.velocity.fixed_rows::<3>(0).into_owned();
            let dang_err = (current.rotation.inverse() * next.rotation).scaled_axis() / dt
                - frame.velocity.fixed_rows::<3>(3).into_owned();
            self.dfoot_diffs[i]
                .fixed_rows_mut::<3>(0)
                .copy_from(&dlin_err);
            self.dfoot_diffs[i]
                .fixed_rows_mut::<3>(3)
                .copy_from(&dang_err);
        }

        for i in 0..self.nfix {
            let frame = &data.fixed_frames[i];
            self.frame_diffs[i] = -frame.pose.rotation.scaled_axis();
            self.dframe_diffs[i] = -frame.velocity.fixed_rows::<3>(3).into_owned();
        }
    }

    /// Assemble the weighted least-squares cost and the constraint
    /// blocks for the currently active contacts.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_matrices(
        &mut self,
        data: &DynamicsData,
        contact_states: &[bool],
        velocity: &DVector<f64>,
        force_ref: &DVector<f64>,
        momentum_rate_ref: &Vector6<f64>,
        mass_matrix: &DMatrix<f64>,
    ) {
        let nv = self.nv;
        let fs = self.settings.force_size.dim();
        let n_eq = self.ws.n_eq;
        debug_assert_eq!(contact_states.len(), self.nk);
        debug_assert_eq!(data.contact_frames.len(), self.nk);
        debug_assert_eq!(data.fixed_frames.len(), self.nfix);
        debug_assert_eq!(force_ref.len(), self.fdim);

        // Posture and centroidal-momentum-rate terms.
        {
            let mut h_tl = self.ws.h.view_mut((0, 0), (nv, nv));
            h_tl.fill(0.0);
            h_tl.fill_diagonal(self.settings.w_qref);
            h_tl.gemm_tr(
                self.settings.w_centroidal,
                &data.momentum_jacobian,
                &data.momentum_jacobian,
                1.0,
            );
        }
        {
            let mut g_head = self.ws.g.rows_mut(0, nv);
            for i in 0..nv {
                g_head[i] = -self.settings.w_qref
                    * (self.settings.kp_joint[i] * self.q_diff[i]
                        + self.settings.kd_joint[i] * self.dq_diff[i]);
            }
            let mut momentum_err = *momentum_rate_ref;
            momentum_err.gemv(-1.0, &data.momentum_jacobian_dot, velocity, 1.0);
            g_head.gemv_tr(
                -self.settings.w_centroidal,
                &data.momentum_jacobian,
                &momentum_err,
                1.0,
            );
        }

        self.ws.a.view_mut((0, 0), (nv, nv)).copy_from(mass_matrix);
        {
            let mut head = self.ws.b.rows_mut(0, nv);
            head.copy_from(&data.bias);
            head *= -1.0;
        }
        self.ws.b.rows_mut(nv, self.fdim).fill(0.0);

        for i in 0..self.nk {
            let frame = &data.contact_frames[i];
            let jacobian = &frame.jacobian;

            // Pose tracking applies to every foot, in contact or not.
            {
                let mut h_tl = self.ws.h.view_mut((0, 0), (nv, nv));
                h_tl.gemm_tr(self.settings.w_footpose, jacobian, jacobian, 1.0);
            }
            {
                let mut err = Vector6::zeros();
                err.gemv(1.0, &frame.jacobian_dot, velocity, 0.0);
                err -= self.settings.kp_foot.component_mul(&self.foot_diffs[i]);
                err -= self.settings.kd_foot.component_mul(&self.dfoot_diffs[i]);
                let mut g_head = self.ws.g.rows_mut(0, nv);
                g_head.gemv_tr(self.settings.w_footpose, jacobian, &err, 1.0);
            }

            let cone_row = n_eq + CONE_ROWS * i;
            let force_col = nv + fs * i;
            if contact_states[i] {
                for r in 0..nv {
                    for c in 0..fs {
                        self.ws.a[(r, nv + fs * i + c)] = -jacobian[(c, r)];
                    }
                }
                self.ws
                    .a
                    .view_mut((nv + fs * i, 0), (fs, nv))
                    .copy_from(&jacobian.view((0, 0), (fs, nv)));
                {
                    let mut head = self.ws.b.rows_mut(0, nv);
                    head.gemv_tr(
                        1.0,
                        &jacobian.view((0, 0), (fs, nv)),
                        &force_ref.rows(fs * i, fs),
                        1.0,
                    );
                }
                self.ws.b.rows_mut(nv + fs * i, fs).gemv(
                    -1.0,
                    &frame.jacobian_dot.view((0, 0), (fs, nv)),
                    velocity,
                    0.0,
                );

                let mut lower = [0.0; CONE_ROWS];
                fill_cone_lower(
                    self.settings.force_size,
                    self.settings.mu,
                    self.settings.half_width,
                    self.settings.half_length,
                    &force_ref.as_slice()[fs * i..fs * (i + 1)],
                    &mut lower,
                );
                for (r, lv) in lower.iter().enumerate() {
                    self.ws.b[cone_row + r] = -lv;
                }
                self.ws
                    .a
                    .view_mut((cone_row, force_col), (CONE_ROWS, fs))
                    .copy_from(&self.neg_cone);
            } else {
                // Zeroed, not skipped: the sparsity pattern is fixed.
                self.ws.a.view_mut((0, nv + fs * i), (nv, fs)).fill(0.0);
                self.ws.a.view_mut((nv + fs * i, 0), (fs, nv)).fill(0.0);
                self.ws
                    .a
                    .view_mut((cone_row, force_col), (CONE_ROWS, fs))
                    .fill(0.0);
                self.ws.b.rows_mut(cone_row, CONE_ROWS).fill(0.0);
            }
        }

        for i in 0..self.nfix {
            let frame = &data.fixed_frames[i];
            let j_ang = frame.jacobian.view((3, 0), (3, nv));
            {
                let mut h_tl = self.ws.h.view_mut((0, 0), (nv, nv));
                h_tl.gemm_tr(self.settings.w_baserot, &j_ang, &j_ang, 1.0);
            }
            let mut err = Vector3::zeros();
            err.gemv(1.0, &frame.jacobian_dot.view((3, 0), (3, nv)), velocity, 0.0);
            err -= self.settings.kp_frame.component_mul(&self.frame_diffs[i]);
            err -= self.settings.kd_frame.component_mul(&self.dframe_diffs[i]);
            let mut g_head = self.ws.g.rows_mut(0, nv);
            g_head.gemv_tr(self.settings.w_baserot, &j_ang, &err, 1.0);
        }
    }

    /// One atomic solve cycle. Unlike the ID variant the acceleration is
    /// solved absolutely; forces remain corrections around the reference.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_qp(
        &mut self,
        data: &DynamicsData,
        contact_states: &[bool],
        velocity: &DVector<f64>,
        force_ref: &DVector<f64>,
        momentum_rate_ref: &Vector6<f64>,
        mass_matrix: &DMatrix<f64>,
    ) -> &SolvedAllocation {
        self.compute_matrices(
            data,
            contact_states,
            velocity,
            force_ref,
            momentum_rate_ref,
            mass_matrix,
        );
        let max_iter = u32::try_from(self.settings.max_iters).unwrap_or(u32::MAX);
        self.converged = self.ws.solve(max_iter);

        let x = &self.ws.x;
        for i in 0..self.nv {
            self.solved.acc[i] = x[i];
        }
        for i in 0..self.fdim {
            self.solved.forces[i] = force_ref[i] + x[self.nv + i];
        }
        for j in 0..self.nv - 6 {
            self.solved.torque[j] = x[self.nv + self.fdim + j];
        }
        &self.solved
    }

    pub fn solved(&self) -> &SolvedAllocation {
        &self.solved
    }

    /// Whether the last QP solve converged cleanly (informational).
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn settings(&self) -> &IkIdSettings {
        &self.settings
    }
}

/// Tangent-space difference from one configuration to another:
/// world-frame base translation error, body-frame base orientation error
/// from the rotation log, plain subtraction on the actuated joints.
/// Configurations are laid out `[p(3), quat(x, y, z, w), joints]`.
fn configuration_difference(q_from: &[f64], q_to: &[f64], out: &mut DVector<f64>) {
    for r in 0..3 {
        out[r] = q_to[r] - q_from[r];
    }
    let rotation = |q: &[f64]| {
        UnitQuaternion::from_quaternion(Quaternion::new(q[6], q[3], q[4], q[5]))
    };
    let rot_err = (rotation(q_from).inverse() * rotation(q_to)).scaled_axis();
    out.fixed_rows_mut::<3>(3).copy_from(&rot_err);
    for j in 7..q_from.len() {
        out[j - 1] = q_to[j] - q_from[j];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use striders_test_utils::BalancedBiped;

    fn settings(fixture: &BalancedBiped) -> IkIdSettings {
        IkIdSettings {
            contact_names: vec!["left_sole".into(), "right_sole".into()],
            fixed_frame_names: vec!["trunk".into()],
            force_size: fixture.force_size,
            mu: 0.8,
            half_width: 0.05,
            half_length: 0.1,
            x0: fixture.x_reference(),
            dt: 0.01,
            w_qref: 1.0,
            w_centroidal: 0.1,
            w_footpose: 10.0,
            w_baserot: 5.0,
            w_force: 100.0,
            kp_joint: DVector::from_element(9, 10.0),
            kd_joint: DVector::from_element(9, 1.0),
            kp_foot: Vector6::from_element(50.0),
            kd_foot: Vector6::from_element(5.0),
            kp_frame: Vector3::from_element(20.0),
            kd_frame: Vector3::from_element(2.0),
            max_iters: 150,
        }
    }

    #[test]
    fn tracking_at_the_reference_recovers_the_reference() {
        for force_size in [ForceSize::Point, ForceSize::Wrench] {
            let fixture = BalancedBiped::new(force_size);
            let mut solver = IkIdSolver::new(settings(&fixture), &fixture.model).unwrap();

            let foot_refs = fixture.foot_pose_refs();
            solver.compute_differences(
                &fixture.data,
                &fixture.x_reference(),
                &foot_refs,
                &foot_refs,
            );
            let allocation = solver
                .solve_qp(
                    &fixture.data,
                    &[true, true],
                    &fixture.velocity,
                    &fixture.force_ref,
                    &Vector6::zeros(),
                    &fixture.mass_matrix,
                )
                .clone();

            assert!(solver.converged());
            for i in 0..9 {
                assert_relative_eq!(allocation.acc[i], 0.0, epsilon = 1e-3);
            }
            for i in 0..fixture.force_ref.len() {
                assert_relative_eq!(
                    allocation.forces[i],
                    fixture.force_ref[i],
                    epsilon = 1e-3
                );
            }
            for j in 0..3 {
                assert_relative_eq!(
                    allocation.torque[j],
                    fixture.expected_torque[j],
                    epsilon = 1e-3
                );
            }
        }
    }

    #[test]
    fn posture_error_pulls_toward_the_reference() {
        let fixture = BalancedBiped::new(ForceSize::Point);
        let mut solver = IkIdSolver::new(settings(&fixture), &fixture.model).unwrap();

        // Measured joints displaced from the reference posture.
        let mut x_measured = fixture.x_reference();
        x_measured[7] += 0.3;

        let foot_refs = fixture.foot_pose_refs();
        solver.compute_differences(&fixture.data, &x_measured, &foot_refs, &foot_refs);
        assert_relative_eq!(solver.q_diff[6], -0.3, epsilon = 1e-12);

        let allocation = solver.solve_qp(
            &fixture.data,
            &[true, true],
            &fixture.velocity,
            &fixture.force_ref,
            &Vector6::zeros(),
            &fixture.mass_matrix,
        );
        // The first actuated joint accelerates back toward the posture
        // reference (negative error, negative commanded acceleration).
        assert!(allocation.acc[6] < -1e-4);
    }

    #[test]
    fn base_rotation_error_uses_the_rotation_log() {
        let fixture = BalancedBiped::new(ForceSize::Point);
        let mut solver = IkIdSolver::new(settings(&fixture), &fixture.model).unwrap();

        // Base yawed by 0.2 rad relative to the reference.
        let mut x_measured = fixture.x_reference();
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.2);
        x_measured[3] = yaw.i;
        x_measured[4] = yaw.j;
        x_measured[5] = yaw.k;
        x_measured[6] = yaw.w;

        let foot_refs = fixture.foot_pose_refs();
        solver.compute_differences(&fixture.data, &x_measured, &foot_refs, &foot_refs);
        assert_relative_eq!(solver.q_diff[5], -0.2, epsilon = 1e-12);
        assert_relative_eq!(solver.q_diff[3], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn foot_pose_error_mixes_translation_and_finite_difference_velocity() {
        let fixture = BalancedBiped::new(ForceSize::Point);
        let mut solver = IkIdSolver::new(settings(&fixture), &fixture.model).unwrap();

        let current = fixture.foot_pose_refs();
        // The left-foot reference steps 1 cm forward over one dt.
        let mut next = current.clone();
        next[0].translation.vector.x += 0.01;

        solver.compute_differences(&fixture.data, &fixture.x_reference(), &current, &next);
        assert_relative_eq!(solver.foot_diffs[0][0], 0.0, epsilon = 1e-12);
        // 0.01 m over dt = 0.01 s → 1 m/s reference velocity.
        assert_relative_eq!(solver.dfoot_diffs[0][0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(solver.dfoot_diffs[1][0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn torque_respects_effort_limits() {
        let mut fixture = BalancedBiped::new(ForceSize::Point);
        // Clamp the actuators well below the bias torque.
        fixture.model.effort_limit.rows_mut(6, 3).fill(0.1);
        let mut solver = IkIdSolver::new(settings(&fixture), &fixture.model).unwrap();

        let foot_refs = fixture.foot_pose_refs();
        solver.compute_differences(
            &fixture.data,
            &fixture.x_reference(),
            &foot_refs,
            &foot_refs,
        );
        let allocation = solver.solve_qp(
            &fixture.data,
            &[true, true],
            &fixture.velocity,
            &fixture.force_ref,
            &Vector6::zeros(),
            &fixture.mass_matrix,
        );
        for j in 0..3 {
            assert!(
                allocation.torque[j].abs() <= 0.1 + 1e-4,
                "torque {} exceeds the 0.1 Nm limit",
                allocation.torque[j]
            );
        }
    }

    #[test]
    fn settings_reject_mismatched_reference_state() {
        let fixture = BalancedBiped::new(ForceSize::Point);
        let mut bad = settings(&fixture);
        bad.x0 = DVector::zeros(5);
        let err = IkIdSolver::new(bad, &fixture.model).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::SettingsMismatch {
                what: "reference state",
                ..
            }
        ));
    }

    #[test]
    fn configuration_difference_handles_the_free_flyer() {
        let mut q_from = vec![0.0; 10];
        q_from[6] = 1.0;
        let mut q_to = q_from.clone();
        q_to[0] = 0.5;
        q_to[9] = -0.25;

        let mut out = DVector::zeros(9);
        configuration_difference(&q_from, &q_to, &mut out);
        assert_relative_eq!(out[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(out[5], 0.0, epsilon = 1e-12);
        assert_relative_eq!(out[8], -0.25, epsilon = 1e-12);
    }
}
