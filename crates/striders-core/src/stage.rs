//! Trait seams to the external stage-model builder and nonlinear
//! trajectory optimizer.
//!
//! The horizon window only ever reaches a stage's embedded contact
//! references through the typed setters below; it never depends on the
//! builder's internal cost or dynamics structure. End effectors are
//! addressed by their stable index (see
//! [`EndEffectorMap`](crate::schedule::EndEffectorMap)).

use nalgebra::{DMatrix, DVector, Isometry3};

use crate::schedule::ContactSchedule;

/// One slot of the optimization horizon: a stage cost/dynamics/constraint
/// problem with typed access to its embedded contact references.
pub trait Stage {
    /// Dimension of the stage's state vector.
    fn state_dim(&self) -> usize;

    /// Dimension of the stage's control vector.
    fn control_dim(&self) -> usize;

    /// Whether the given end effector is in contact at this stage.
    fn contact(&self, ee: usize) -> bool;

    fn reference_pose(&self, ee: usize) -> Isometry3<f64>;

    fn set_reference_pose(&mut self, ee: usize, pose: &Isometry3<f64>);

    fn reference_force(&self, ee: usize) -> DVector<f64>;

    fn set_reference_force(&mut self, ee: usize, force: &DVector<f64>);
}

/// Terminal cost slot at the end of the horizon.
pub trait TerminalStage {
    fn reference_pose(&self, ee: usize) -> Isometry3<f64>;

    fn set_reference_pose(&mut self, ee: usize, pose: &Isometry3<f64>);
}

/// Factory for horizon slots, supplied by the external stage-model
/// builder.
pub trait StageBuilder {
    type Stage: Stage;
    type Terminal: TerminalStage;

    /// Build one stage problem from a contact schedule.
    fn create_stage(&self, schedule: &ContactSchedule) -> Self::Stage;

    /// Build the terminal cost slot.
    fn create_terminal(&self) -> Self::Terminal;
}

/// External nonlinear trajectory optimizer, driven once per control tick.
///
/// The optimizer writes its best iterate into `xs`/`us`/`k0` in place
/// even when it did not converge — the returned flag is informational
/// only, never an error. The previous contents of `xs`/`us` double as the
/// warm start.
pub trait TrajectoryOptimizer<B: StageBuilder> {
    #[allow(clippy::too_many_arguments)]
    fn solve(
        &mut self,
        stages: &[B::Stage],
        terminal: &B::Terminal,
        x0: &DVector<f64>,
        xs: &mut [DVector<f64>],
        us: &mut [DVector<f64>],
        k0: &mut DMatrix<f64>,
        max_iters: usize,
        num_threads: usize,
    ) -> bool;
}
