//! Contact schedules: per-step contact state, target pose, and target
//! force for every end effector.
//!
//! End effectors are identified by a stable `usize` index resolved once
//! through an [`EndEffectorMap`]; names only appear at the public API
//! boundary. Schedules are indexed by that same index, so every known end
//! effector has exactly one entry by construction.

use std::collections::HashMap;

use nalgebra::{DVector, Isometry3};
use serde::{Deserialize, Serialize};

use crate::error::{HorizonError, SettingsError};

/// Per-contact force parameterization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceSize {
    /// 3-dim point-contact force (fx, fy, fz).
    Point,
    /// 6-dim contact wrench (fx, fy, fz, mx, my, mz).
    Wrench,
}

impl ForceSize {
    /// Force vector dimension for one contact.
    pub const fn dim(self) -> usize {
        match self {
            Self::Point => 3,
            Self::Wrench => 6,
        }
    }
}

/// Name → index table for the configured contact frames.
///
/// Built once at startup; everything downstream keys by index.
#[derive(Clone, Debug)]
pub struct EndEffectorMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl EndEffectorMap {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, index }
    }

    /// Resolve a name to its stable index.
    pub fn resolve(&self, name: &str) -> Result<usize, HorizonError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| HorizonError::UnknownEndEffector(name.to_owned()))
    }

    /// Name of the end effector at `index`.
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Contact state of one end effector over one horizon step.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactPhase {
    /// Whether the end effector is in contact.
    pub active: bool,
    /// Target placement.
    pub pose: Isometry3<f64>,
    /// Target contact force, dimension = the schedule's [`ForceSize`].
    pub force: DVector<f64>,
}

impl ContactPhase {
    /// Swing phase: out of contact, zero target force.
    pub fn swing(pose: Isometry3<f64>, force_size: ForceSize) -> Self {
        Self {
            active: false,
            pose,
            force: DVector::zeros(force_size.dim()),
        }
    }

    /// Stance phase with the given target force.
    pub fn stance(pose: Isometry3<f64>, force: DVector<f64>) -> Self {
        Self {
            active: true,
            pose,
            force,
        }
    }
}

/// Per-step assignment of contact state, target pose, and target force
/// for every end effector.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactSchedule {
    force_size: ForceSize,
    phases: Vec<ContactPhase>,
}

impl ContactSchedule {
    /// Build a schedule from one phase per end effector, in index order.
    ///
    /// Every force vector must match the configured force size.
    pub fn new(force_size: ForceSize, phases: Vec<ContactPhase>) -> Result<Self, SettingsError> {
        for phase in &phases {
            if phase.force.len() != force_size.dim() {
                return Err(SettingsError::SettingsMismatch {
                    what: "contact force dimension",
                    expected: force_size.dim(),
                    got: phase.force.len(),
                });
            }
        }
        Ok(Self { force_size, phases })
    }

    pub const fn force_size(&self) -> ForceSize {
        self.force_size
    }

    /// Number of end effectors covered by this schedule.
    pub fn n_end_effectors(&self) -> usize {
        self.phases.len()
    }

    pub fn phase(&self, ee: usize) -> &ContactPhase {
        &self.phases[ee]
    }

    pub fn phase_mut(&mut self, ee: usize) -> &mut ContactPhase {
        &mut self.phases[ee]
    }

    /// Contact flag of one end effector.
    pub fn active(&self, ee: usize) -> bool {
        self.phases[ee].active
    }

    /// Number of end effectors in contact.
    pub fn support_count(&self) -> usize {
        self.phases.iter().filter(|p| p.active).count()
    }
}
