//! The per-tick MPC loop.
//!
//! [`Mpc`] wires a generated [`HorizonWindow`] to an external nonlinear
//! trajectory optimizer. Each [`Mpc::iterate`] call assembles the current
//! state, runs the optimizer for its configured iteration budget, and
//! recedes the window — one synchronous call per control tick. A
//! non-converged optimizer still produces a usable trajectory; the loop
//! propagates the best iterate unconditionally and leaves validation to
//! the caller.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use striders_core::error::{ConfigError, HorizonError, SettingsError};
use striders_core::stage::{Stage, StageBuilder, TrajectoryOptimizer};

use crate::window::HorizonWindow;

const fn default_max_iters() -> usize {
    1
}

const fn default_num_threads() -> usize {
    1
}

/// MPC loop configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpcSettings {
    /// Number of configuration coordinates.
    pub nq: usize,
    /// Number of velocity coordinates.
    pub nv: usize,
    /// Control dimension of every stage.
    pub nu: usize,
    /// Optimizer iterations per tick (default: 1, the classic
    /// real-time-iteration scheme).
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,
    /// Thread count handed to the external optimizer (default: 1).
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl MpcSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.nq == 0 || self.nv == 0 {
            return Err(SettingsError::InvalidValue {
                field: "nq/nv",
                message: "state dimensions must be positive".into(),
            });
        }
        if self.max_iters == 0 {
            return Err(SettingsError::InvalidValue {
                field: "max_iters",
                message: "need at least one optimizer iteration per tick".into(),
            });
        }
        if self.num_threads == 0 {
            return Err(SettingsError::InvalidValue {
                field: "num_threads",
                message: "need at least one optimizer thread".into(),
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

/// Receding-horizon control loop around an external trajectory optimizer.
pub struct Mpc<B, O>
where
    B: StageBuilder,
    O: TrajectoryOptimizer<B>,
{
    settings: MpcSettings,
    window: HorizonWindow<B>,
    optimizer: O,
    x0: DVector<f64>,
    xs: Vec<DVector<f64>>,
    us: Vec<DVector<f64>>,
    k0: DMatrix<f64>,
    horizon_iteration: u64,
}

impl<B, O> std::fmt::Debug for Mpc<B, O>
where
    B: StageBuilder,
    O: TrajectoryOptimizer<B>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mpc")
            .field("settings", &self.settings)
            .field("horizon_iteration", &self.horizon_iteration)
            .finish_non_exhaustive()
    }
}

impl<B, O> Mpc<B, O>
where
    B: StageBuilder,
    O: TrajectoryOptimizer<B>,
{
    /// Validate the settings against the generated window and allocate
    /// the trajectory buffers (`xs`: T+1, `us`: T).
    pub fn new(
        settings: MpcSettings,
        window: HorizonWindow<B>,
        optimizer: O,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        let Some(first) = window.stages().first() else {
            return Err(SettingsError::InvalidValue {
                field: "window",
                message: "horizon must be generated before building the MPC loop".into(),
            });
        };
        let nx = settings.nq + settings.nv;
        if first.state_dim() != nx {
            return Err(SettingsError::SettingsMismatch {
                what: "state dimension",
                expected: first.state_dim(),
                got: nx,
            });
        }
        if first.control_dim() != settings.nu {
            return Err(SettingsError::SettingsMismatch {
                what: "control dimension",
                expected: first.control_dim(),
                got: settings.nu,
            });
        }

        let horizon = window.horizon();
        let xs = vec![DVector::zeros(nx); horizon + 1];
        let us = vec![DVector::zeros(settings.nu); horizon];
        let k0 = DMatrix::zeros(settings.nu, nx);
        Ok(Self {
            settings,
            window,
            optimizer,
            x0: DVector::zeros(nx),
            xs,
            us,
            k0,
            horizon_iteration: 0,
        })
    }

    /// Run one control tick: set the stage-0 initial condition, solve,
    /// and recede the window.
    pub fn iterate(
        &mut self,
        position: &DVector<f64>,
        velocity: &DVector<f64>,
    ) -> Result<(), HorizonError> {
        debug_assert_eq!(position.len(), self.settings.nq);
        debug_assert_eq!(velocity.len(), self.settings.nv);
        self.x0.rows_mut(0, self.settings.nq).copy_from(position);
        self.x0
            .rows_mut(self.settings.nq, self.settings.nv)
            .copy_from(velocity);

        let converged = self.optimizer.solve(
            self.window.stages(),
            self.window.terminal(),
            &self.x0,
            &mut self.xs,
            &mut self.us,
            &mut self.k0,
            self.settings.max_iters,
            self.settings.num_threads,
        );
        if !converged {
            debug!(
                iteration = self.horizon_iteration,
                "optimizer returned a non-converged iterate"
            );
        }

        self.window.recede()?;
        self.horizon_iteration += 1;
        Ok(())
    }

    /// State trajectory from the last solve, length T+1.
    pub fn xs(&self) -> &[DVector<f64>] {
        &self.xs
    }

    /// Control trajectory from the last solve, length T.
    pub fn us(&self) -> &[DVector<f64>] {
        &self.us
    }

    /// First-step feedback gain from the last solve, nu × (nq + nv).
    pub fn k0(&self) -> &DMatrix<f64> {
        &self.k0
    }

    /// Number of completed `iterate` calls.
    pub fn horizon_iteration(&self) -> u64 {
        self.horizon_iteration
    }

    pub fn settings(&self) -> &MpcSettings {
        &self.settings
    }

    pub fn window(&self) -> &HorizonWindow<B> {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut HorizonWindow<B> {
        &mut self.window
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    // -- forwards to the owned window ---------------------------------------

    pub fn set_reference_pose(
        &mut self,
        step: usize,
        ee_name: &str,
        pose: &nalgebra::Isometry3<f64>,
    ) -> Result<(), HorizonError> {
        self.window.set_reference_pose(step, ee_name, pose)
    }

    pub fn reference_pose(
        &self,
        step: usize,
        ee_name: &str,
    ) -> Result<nalgebra::Isometry3<f64>, HorizonError> {
        self.window.reference_pose(step, ee_name)
    }

    pub fn set_terminal_reference_pose(
        &mut self,
        ee_name: &str,
        pose: &nalgebra::Isometry3<f64>,
    ) -> Result<(), HorizonError> {
        self.window.set_terminal_reference_pose(ee_name, pose)
    }

    pub fn foot_takeoff_timings(&self, ee_name: &str) -> Result<&[usize], HorizonError> {
        self.window.foot_takeoff_timings(ee_name)
    }

    pub fn foot_land_timings(&self, ee_name: &str) -> Result<&[usize], HorizonError> {
        self.window.foot_land_timings(ee_name)
    }
}
