//! Mock implementations of the stage-builder and optimizer seams.

use nalgebra::{DMatrix, DVector, Isometry3};

use striders_core::schedule::ContactSchedule;
use striders_core::stage::{Stage, StageBuilder, TerminalStage, TrajectoryOptimizer};

// ---------------------------------------------------------------------------
// MockStage
// ---------------------------------------------------------------------------

/// A stage that simply records the contact schedule it was built from,
/// with typed reference storage.
#[derive(Clone, Debug)]
pub struct MockStage {
    schedule: ContactSchedule,
    state_dim: usize,
    control_dim: usize,
}

impl MockStage {
    /// The schedule this stage currently embeds.
    pub fn schedule(&self) -> &ContactSchedule {
        &self.schedule
    }
}

impl Stage for MockStage {
    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn control_dim(&self) -> usize {
        self.control_dim
    }

    fn contact(&self, ee: usize) -> bool {
        self.schedule.active(ee)
    }

    fn reference_pose(&self, ee: usize) -> Isometry3<f64> {
        self.schedule.phase(ee).pose
    }

    fn set_reference_pose(&mut self, ee: usize, pose: &Isometry3<f64>) {
        self.schedule.phase_mut(ee).pose = *pose;
    }

    fn reference_force(&self, ee: usize) -> DVector<f64> {
        self.schedule.phase(ee).force.clone()
    }

    fn set_reference_force(&mut self, ee: usize, force: &DVector<f64>) {
        self.schedule.phase_mut(ee).force = force.clone();
    }
}

// ---------------------------------------------------------------------------
// MockTerminal
// ---------------------------------------------------------------------------

/// Terminal slot holding one reference pose per end effector.
#[derive(Clone, Debug)]
pub struct MockTerminal {
    poses: Vec<Isometry3<f64>>,
}

impl TerminalStage for MockTerminal {
    fn reference_pose(&self, ee: usize) -> Isometry3<f64> {
        self.poses[ee]
    }

    fn set_reference_pose(&mut self, ee: usize, pose: &Isometry3<f64>) {
        self.poses[ee] = *pose;
    }
}

// ---------------------------------------------------------------------------
// MockStageBuilder
// ---------------------------------------------------------------------------

/// Builder producing [`MockStage`]s with fixed dimensions.
#[derive(Clone, Debug)]
pub struct MockStageBuilder {
    pub n_end_effectors: usize,
    pub state_dim: usize,
    pub control_dim: usize,
}

impl MockStageBuilder {
    pub const fn new(n_end_effectors: usize, state_dim: usize, control_dim: usize) -> Self {
        Self {
            n_end_effectors,
            state_dim,
            control_dim,
        }
    }
}

impl StageBuilder for MockStageBuilder {
    type Stage = MockStage;
    type Terminal = MockTerminal;

    fn create_stage(&self, schedule: &ContactSchedule) -> MockStage {
        MockStage {
            schedule: schedule.clone(),
            state_dim: self.state_dim,
            control_dim: self.control_dim,
        }
    }

    fn create_terminal(&self) -> MockTerminal {
        MockTerminal {
            poses: vec![Isometry3::identity(); self.n_end_effectors],
        }
    }
}

// ---------------------------------------------------------------------------
// MockOptimizer
// ---------------------------------------------------------------------------

/// Optimizer stub: propagates the initial state across the horizon,
/// zeroes controls and gain, and records how it was invoked.
#[derive(Clone, Debug)]
pub struct MockOptimizer {
    /// Convergence flag to report.
    pub converged: bool,
    /// Number of `solve` invocations so far.
    pub calls: u64,
    /// Iteration budget seen on the last call.
    pub last_max_iters: usize,
    /// Thread count seen on the last call.
    pub last_num_threads: usize,
}

impl MockOptimizer {
    pub const fn new() -> Self {
        Self {
            converged: true,
            calls: 0,
            last_max_iters: 0,
            last_num_threads: 0,
        }
    }
}

impl Default for MockOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: StageBuilder> TrajectoryOptimizer<B> for MockOptimizer {
    fn solve(
        &mut self,
        _stages: &[B::Stage],
        _terminal: &B::Terminal,
        x0: &DVector<f64>,
        xs: &mut [DVector<f64>],
        us: &mut [DVector<f64>],
        k0: &mut DMatrix<f64>,
        max_iters: usize,
        num_threads: usize,
    ) -> bool {
        for x in xs.iter_mut() {
            x.copy_from(x0);
        }
        for u in us.iter_mut() {
            u.fill(0.0);
        }
        k0.fill(0.0);
        self.calls += 1;
        self.last_max_iters = max_iters;
        self.last_num_threads = num_threads;
        self.converged
    }
}
