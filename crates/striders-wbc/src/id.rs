//! Inverse-dynamics allocator.
//!
//! Solves, once per control tick, a dense QP for corrections
//! `x = [Δa, Δf, τ]` around reference joint accelerations and contact
//! forces. Equalities enforce dynamics consistency
//! (`M·Δa − Jcᵀ·Δf − S·τ = −b − M·a_ref + Jcᵀ·f_ref`) and zero relative
//! contact acceleration (`Jc·Δa = −γ − Jc·a_ref`); inequalities are the
//! linearized contact cones evaluated at the force reference. Inactive
//! contacts contribute explicitly zeroed rows, keeping the workspace
//! dimensions and sparsity pattern fixed.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use striders_core::error::{ConfigError, SettingsError};
use striders_core::robot::{DynamicsData, RobotModel};
use striders_core::schedule::ForceSize;

use crate::cone::{cone_block, fill_cone_lower, CONE_ROWS};
use crate::workspace::{Block, QpWorkspace};

const fn default_half_extent() -> f64 {
    0.05
}

const fn default_id_iters() -> usize {
    50
}

/// Inverse-dynamics allocator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdSettings {
    /// Contact frame names, in end-effector index order.
    pub contact_names: Vec<String>,
    /// Per-contact force parameterization.
    pub force_size: ForceSize,
    /// Coulomb friction coefficient.
    pub mu: f64,
    /// Contact patch half-width (wrench contacts).
    #[serde(default = "default_half_extent")]
    pub half_width: f64,
    /// Contact patch half-length (wrench contacts).
    #[serde(default = "default_half_extent")]
    pub half_length: f64,
    /// Constraint-stabilization gain on the contact velocity error.
    #[serde(default)]
    pub kd: f64,
    /// Weight on the acceleration correction.
    pub w_acc: f64,
    /// Weight on the force correction.
    pub w_force: f64,
    /// QP iteration budget per solve.
    #[serde(default = "default_id_iters")]
    pub max_iters: usize,
}

impl IdSettings {
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
        if self.force_size == ForceSize::Wrench
            && (self.half_width <= 0.0 || self.half_length <= 0.0)
        {
            return Err(SettingsError::InvalidValue {
                field: "half_width/half_length",
                message: "wrench contacts need positive patch extents".into(),
            });
        }
        if self.w_acc <= 0.0 || self.w_force <= 0.0 {
            return Err(SettingsError::InvalidValue {
                field: "w_acc/w_force",
                message: "correction weights must be positive".into(),
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

/// The allocator's externally visible output, overwritten each solve.
#[derive(Clone, Debug)]
pub struct SolvedAllocation {
    /// Corrected joint acceleration, length nv.
    pub acc: DVector<f64>,
    /// Corrected per-contact forces, stacked.
    pub forces: DVector<f64>,
    /// Actuated joint torque, length nv − 6.
    pub torque: DVector<f64>,
}

impl SolvedAllocation {
    fn zeros(nv: usize, fdim: usize) -> Self {
        Self {
            acc: DVector::zeros(nv),
            forces: DVector::zeros(fdim),
            torque: DVector::zeros(nv - 6),
        }
    }
}

/// Per-tick inverse-dynamics QP.
pub struct IdSolver {
    settings: IdSettings,
    nv: usize,
    nk: usize,
    fdim: usize,
    neg_cone: DMatrix<f64>,
    /// Stacked contact Jacobian rows, fdim × nv.
    jc: DMatrix<f64>,
    /// Contact drift terms J̇·v plus velocity stabilization.
    gamma: DVector<f64>,
    ws: QpWorkspace,
    solved: SolvedAllocation,
    converged: bool,
}

impl IdSolver {
    /// Size the workspace from the contact count, force size, and joint
    /// velocity dimension; the sparsity pattern built here is final.
    pub fn new(settings: IdSettings, model: &RobotModel) -> Result<Self, SettingsError> {
        settings.validate()?;
        let nv = model.nv;
        let nk = settings.contact_names.len();
        let fs = settings.force_size.dim();
        let fdim = nk * fs;
        let n = 2 * nv - 6 + fdim;
        let n_eq = nv + fdim;
        let n_in = CONE_ROWS * nk;

        let h_blocks = [Block::Diag {
            row: 0,
            col: 0,
            len: nv + fdim,
        }];
        let mut a_blocks = vec![
            // Dynamics consistency: M, −Jcᵀ, −S.
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
            // Contact consistency: Jc.
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
        let mut ws = QpWorkspace::new(n, n_eq, n_in, false, &h_blocks, &a_blocks);

        for i in 0..nv {
            ws.h[(i, i)] = settings.w_acc;
        }
        for i in 0..fdim {
            ws.h[(nv + i, nv + i)] = settings.w_force;
        }
        for j in 0..nv - 6 {
            ws.a[(6 + j, nv + fdim + j)] = -1.0;
        }

        let neg_cone = -cone_block(
            settings.force_size,
            settings.mu,
            settings.half_width,
            settings.half_length,
        );

        Ok(Self {
            settings,
            nv,
            nk,
            fdim,
            neg_cone,
            jc: DMatrix::zeros(fdim, nv),
            gamma: DVector::zeros(fdim),
            ws,
            solved: SolvedAllocation::zeros(nv, fdim),
            converged: false,
        })
    }

    /// Rebuild the contact-dependent blocks for the currently active
    /// contacts; inactive contacts are written as zero rows.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_matrices(
        &mut self,
        data: &DynamicsData,
        contact_states: &[bool],
        velocity: &DVector<f64>,
        accel_ref: &DVector<f64>,
        force_ref: &DVector<f64>,
        mass_matrix: &DMatrix<f64>,
    ) {
        let nv = self.nv;
        let fs = self.settings.force_size.dim();
        let n_eq = self.ws.n_eq;
        debug_assert_eq!(contact_states.len(), self.nk);
        debug_assert_eq!(data.contact_frames.len(), self.nk);
        debug_assert_eq!(velocity.len(), nv);
        debug_assert_eq!(accel_ref.len(), nv);
        debug_assert_eq!(force_ref.len(), self.fdim);
        debug_assert_eq!(mass_matrix.shape(), (nv, nv));

        self.jc.fill(0.0);
        self.gamma.fill(0.0);

        for i in 0..self.nk {
            let cone_row = n_eq + CONE_ROWS * i;
            let force_col = nv + fs * i;
            if contact_states[i] {
                let frame = &data.contact_frames[i];
                self.jc
                    .view_mut((fs * i, 0), (fs, nv))
                    .copy_from(&frame.jacobian.view((0, 0), (fs, nv)));
                self.gamma.rows_mut(fs * i, fs).gemv(
                    1.0,
                    &frame.jacobian_dot.view((0, 0), (fs, nv)),
                    velocity,
                    0.0,
                );
                // Stabilization against contact drift.
                for r in 0..3 {
                    self.gamma[fs * i + r] +=
                        self.settings.kd * (frame.velocity[r] + frame.velocity[3 + r]);
                }

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
                self.ws
                    .a
                    .view_mut((cone_row, force_col), (CONE_ROWS, fs))
                    .fill(0.0);
                self.ws.b.rows_mut(cone_row, CONE_ROWS).fill(0.0);
            }
        }

        self.ws.a.view_mut((0, 0), (nv, nv)).copy_from(mass_matrix);
        for r in 0..nv {
            for c in 0..self.fdim {
                self.ws.a[(r, nv + c)] = -self.jc[(c, r)];
            }
        }
        self.ws
            .a
            .view_mut((nv, 0), (self.fdim, nv))
            .copy_from(&self.jc);

        {
            let mut head = self.ws.b.rows_mut(0, nv);
            head.copy_from(&data.bias);
            head *= -1.0;
            head.gemv(-1.0, mass_matrix, accel_ref, 1.0);
            head.gemv_tr(1.0, &self.jc, force_ref, 1.0);
        }
        {
            let mut tail = self.ws.b.rows_mut(nv, self.fdim);
            tail.copy_from(&self.gamma);
            tail *= -1.0;
            tail.gemv(-1.0, &self.jc, accel_ref, 1.0);
        }
    }

    /// One atomic solve cycle: refresh, solve with the bounded iteration
    /// budget, and write the corrected allocation.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_qp(
        &mut self,
        data: &DynamicsData,
        contact_states: &[bool],
        velocity: &DVector<f64>,
        accel_ref: &DVector<f64>,
        force_ref: &DVector<f64>,
        mass_matrix: &DMatrix<f64>,
    ) -> &SolvedAllocation {
        self.compute_matrices(
            data,
            contact_states,
            velocity,
            accel_ref,
            force_ref,
            mass_matrix,
        );
        let max_iter = u32::try_from(self.settings.max_iters).unwrap_or(u32::MAX);
        self.converged = self.ws.solve(max_iter);

        let x = &self.ws.x;
        for i in 0..self.nv {
            self.solved.acc[i] = accel_ref[i] + x[i];
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

    /// Whether the last QP solve converged cleanly (informational; the
    /// allocation is usable either way).
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn settings(&self) -> &IdSettings {
        &self.settings
    }
}
