//! Shared test doubles for the striders workspace.
//!
//! Provides a schedule-backed mock stage builder, a constant-iterate mock
//! trajectory optimizer, and a statically balanced biped fixture whose
//! allocation optimum is known in closed form.

pub mod fixtures;
pub mod mocks;

pub use fixtures::{biped_end_effectors, biped_step, foot_force, BalancedBiped};
pub use mocks::{MockOptimizer, MockStage, MockStageBuilder, MockTerminal};
