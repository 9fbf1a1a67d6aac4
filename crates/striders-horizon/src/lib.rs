//! Receding-horizon bookkeeping and the per-tick MPC loop.
//!
//! The [`HorizonWindow`] holds a fixed number of stage problems built by
//! an external stage-model builder and slides forward one step per
//! control tick, keeping per-end-effector takeoff/landing timings
//! ([`TimingTable`]) in sync. The [`Mpc`] loop wires the window to an
//! external nonlinear trajectory optimizer and exposes the resulting
//! trajectories and first-step feedback gain.

pub mod mpc;
pub mod timing;
pub mod window;

pub use mpc::{Mpc, MpcSettings};
pub use timing::TimingTable;
pub use window::HorizonWindow;
