//! The sliding optimization window.
//!
//! A [`HorizonWindow`] owns exactly `T` stage problems built by the
//! external stage-model builder, the contact trace they embed, and the
//! [`TimingTable`] derived from that trace. Two generation modes are
//! supported: an explicit full reference (a finite tail consumed one
//! schedule per recession) and a repeating cyclic pattern (never
//! exhausted). `recede()` is the physical-shift variant: slot 0 is
//! dropped, the rest shift down, and a freshly built stage is appended.

use std::collections::VecDeque;

use nalgebra::{DVector, Isometry3};
use tracing::debug;

use striders_core::error::HorizonError;
use striders_core::schedule::{ContactSchedule, EndEffectorMap};
use striders_core::stage::{Stage, StageBuilder, TerminalStage};

use crate::timing::TimingTable;

/// Where the schedule for each appended final stage comes from.
enum Tail {
    /// No horizon generated yet.
    Ungenerated,
    /// Explicit finite reference; once empty, the last consumed schedule
    /// is held.
    Reference(VecDeque<ContactSchedule>),
    /// Repeating pattern with the current phase counter.
    Cycle {
        pattern: Vec<ContactSchedule>,
        phase: usize,
    },
}

/// Fixed-length sliding sequence of stage problems.
pub struct HorizonWindow<B: StageBuilder> {
    builder: B,
    ee_map: EndEffectorMap,
    horizon: usize,
    stages: Vec<B::Stage>,
    terminal: B::Terminal,
    /// Contact schedule currently embedded in each slot.
    trace: Vec<ContactSchedule>,
    tail: Tail,
    timing: TimingTable,
}

impl<B: StageBuilder> HorizonWindow<B> {
    /// Create an empty window of length `horizon`; call one of the
    /// `generate_*` methods before receding.
    pub fn new(builder: B, ee_map: EndEffectorMap, horizon: usize) -> Self {
        let terminal = builder.create_terminal();
        let timing = TimingTable::new(ee_map.len());
        Self {
            builder,
            ee_map,
            horizon,
            stages: Vec::with_capacity(horizon),
            terminal,
            trace: Vec::with_capacity(horizon),
            tail: Tail::Ungenerated,
            timing,
        }
    }

    /// Materialize the first `T` schedules into the window and keep the
    /// remainder as the reference tail.
    pub fn generate_full_horizon(
        &mut self,
        mut schedules: Vec<ContactSchedule>,
    ) -> Result<(), HorizonError> {
        if schedules.len() < self.horizon {
            return Err(HorizonError::InvalidLength {
                given: schedules.len(),
                required: self.horizon,
            });
        }
        let tail: VecDeque<ContactSchedule> = schedules.split_off(self.horizon).into();
        self.materialize(schedules);
        debug!(
            horizon = self.horizon,
            tail = tail.len(),
            "generated full horizon"
        );
        self.tail = Tail::Reference(tail);
        Ok(())
    }

    /// Tile the pattern across the window starting at phase 0 and keep
    /// it for future recessions.
    pub fn generate_cycle_horizon(
        &mut self,
        pattern: Vec<ContactSchedule>,
    ) -> Result<(), HorizonError> {
        if pattern.is_empty() {
            return Err(HorizonError::InvalidLength {
                given: 0,
                required: 1,
            });
        }
        let schedules: Vec<ContactSchedule> = (0..self.horizon)
            .map(|k| pattern[k % pattern.len()].clone())
            .collect();
        self.materialize(schedules);
        debug!(
            horizon = self.horizon,
            period = pattern.len(),
            "generated cycle horizon"
        );
        self.tail = Tail::Cycle { pattern, phase: 0 };
        Ok(())
    }

    fn materialize(&mut self, schedules: Vec<ContactSchedule>) {
        self.stages.clear();
        self.trace.clear();
        for schedule in schedules {
            debug_assert_eq!(schedule.n_end_effectors(), self.ee_map.len());
            self.stages.push(self.builder.create_stage(&schedule));
            self.trace.push(schedule);
        }
        self.timing.rebuild(&self.trace);
    }

    /// Slide the window forward one step.
    ///
    /// Must be invoked exactly once per logical control step. In full
    /// mode an exhausted tail holds the last consumed schedule; the call
    /// only fails when no horizon was ever generated.
    pub fn recede(&mut self) -> Result<(), HorizonError> {
        let next = match &mut self.tail {
            Tail::Ungenerated => return Err(HorizonError::HorizonExhausted),
            Tail::Reference(tail) => match tail.pop_front() {
                Some(schedule) => schedule,
                None => {
                    debug!("reference tail exhausted, holding last schedule");
                    self.trace[self.horizon - 1].clone()
                }
            },
            Tail::Cycle { pattern, phase } => {
                let next = pattern[(*phase + self.horizon) % pattern.len()].clone();
                *phase = (*phase + 1) % pattern.len();
                next
            }
        };

        let stage = self.builder.create_stage(&next);
        self.timing.recede(&self.trace[self.horizon - 1], &next, self.horizon);

        self.stages.remove(0);
        self.stages.push(stage);
        self.trace.remove(0);
        self.trace.push(next);
        Ok(())
    }

    // -- reference accessors ------------------------------------------------

    pub fn set_reference_pose(
        &mut self,
        step: usize,
        ee_name: &str,
        pose: &Isometry3<f64>,
    ) -> Result<(), HorizonError> {
        let ee = self.ee_map.resolve(ee_name)?;
        self.stage_mut(step)?.set_reference_pose(ee, pose);
        Ok(())
    }

    /// Set the reference pose of every end effector at one step, in
    /// end-effector index order.
    pub fn set_reference_poses(
        &mut self,
        step: usize,
        poses: &[Isometry3<f64>],
    ) -> Result<(), HorizonError> {
        if poses.len() != self.ee_map.len() {
            return Err(HorizonError::InvalidLength {
                given: poses.len(),
                required: self.ee_map.len(),
            });
        }
        let stage = self.stage_mut(step)?;
        for (ee, pose) in poses.iter().enumerate() {
            stage.set_reference_pose(ee, pose);
        }
        Ok(())
    }

    pub fn reference_pose(&self, step: usize, ee_name: &str) -> Result<Isometry3<f64>, HorizonError> {
        let ee = self.ee_map.resolve(ee_name)?;
        Ok(self.stage(step)?.reference_pose(ee))
    }

    pub fn set_terminal_reference_pose(
        &mut self,
        ee_name: &str,
        pose: &Isometry3<f64>,
    ) -> Result<(), HorizonError> {
        let ee = self.ee_map.resolve(ee_name)?;
        self.terminal.set_reference_pose(ee, pose);
        Ok(())
    }

    pub fn set_reference_force(
        &mut self,
        step: usize,
        ee_name: &str,
        force: &DVector<f64>,
    ) -> Result<(), HorizonError> {
        let ee = self.ee_map.resolve(ee_name)?;
        self.stage_mut(step)?.set_reference_force(ee, force);
        Ok(())
    }

    /// Set the reference force of every end effector at one step, in
    /// end-effector index order.
    pub fn set_reference_forces(
        &mut self,
        step: usize,
        forces: &[DVector<f64>],
    ) -> Result<(), HorizonError> {
        if forces.len() != self.ee_map.len() {
            return Err(HorizonError::InvalidLength {
                given: forces.len(),
                required: self.ee_map.len(),
            });
        }
        let stage = self.stage_mut(step)?;
        for (ee, force) in forces.iter().enumerate() {
            stage.set_reference_force(ee, force);
        }
        Ok(())
    }

    pub fn reference_force(&self, step: usize, ee_name: &str) -> Result<DVector<f64>, HorizonError> {
        let ee = self.ee_map.resolve(ee_name)?;
        Ok(self.stage(step)?.reference_force(ee))
    }

    // -- timing accessors ---------------------------------------------------

    /// Steps at which the end effector leaves contact, ascending.
    pub fn foot_takeoff_timings(&self, ee_name: &str) -> Result<&[usize], HorizonError> {
        let ee = self.ee_map.resolve(ee_name)?;
        Ok(self.timing.takeoff(ee))
    }

    /// Steps at which the end effector regains contact, ascending.
    pub fn foot_land_timings(&self, ee_name: &str) -> Result<&[usize], HorizonError> {
        let ee = self.ee_map.resolve(ee_name)?;
        Ok(self.timing.landing(ee))
    }

    // -- introspection ------------------------------------------------------

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn end_effectors(&self) -> &EndEffectorMap {
        &self.ee_map
    }

    pub fn stages(&self) -> &[B::Stage] {
        &self.stages
    }

    pub fn terminal(&self) -> &B::Terminal {
        &self.terminal
    }

    /// Contact schedule currently embedded at one step.
    pub fn schedule(&self, step: usize) -> Result<&ContactSchedule, HorizonError> {
        self.check_step(step)?;
        Ok(&self.trace[step])
    }

    /// Number of end effectors in contact at one step.
    pub fn contact_support(&self, step: usize) -> Result<usize, HorizonError> {
        Ok(self.schedule(step)?.support_count())
    }

    /// Schedules remaining in the reference tail (full mode; 0 otherwise).
    pub fn tail_len(&self) -> usize {
        match &self.tail {
            Tail::Reference(tail) => tail.len(),
            _ => 0,
        }
    }

    fn check_step(&self, step: usize) -> Result<(), HorizonError> {
        if step >= self.stages.len() {
            return Err(HorizonError::IndexOutOfRange {
                step,
                horizon: self.stages.len(),
            });
        }
        Ok(())
    }

    fn stage(&self, step: usize) -> Result<&B::Stage, HorizonError> {
        self.check_step(step)?;
        Ok(&self.stages[step])
    }

    fn stage_mut(&mut self, step: usize) -> Result<&mut B::Stage, HorizonError> {
        self.check_step(step)?;
        Ok(&mut self.stages[step])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use striders_core::schedule::ForceSize;
    use striders_test_utils::{biped_end_effectors, biped_step, MockStageBuilder};

    const LEFT: [f64; 3] = [0.0, 0.1, 0.0];
    const RIGHT: [f64; 3] = [0.0, -0.1, 0.0];

    fn window(horizon: usize) -> HorizonWindow<MockStageBuilder> {
        HorizonWindow::new(MockStageBuilder::new(2, 13, 6), biped_end_effectors(), horizon)
    }

    fn step(left: bool, right: bool) -> ContactSchedule {
        biped_step(ForceSize::Point, left, right, LEFT, RIGHT, 100.0)
    }

    #[test]
    fn full_horizon_rejects_short_input() {
        let mut w = window(10);
        let err = w
            .generate_full_horizon(vec![step(true, true); 4])
            .unwrap_err();
        assert_eq!(
            err,
            HorizonError::InvalidLength {
                given: 4,
                required: 10
            }
        );
    }

    #[test]
    fn cycle_horizon_rejects_empty_pattern() {
        let mut w = window(10);
        assert!(w.generate_cycle_horizon(Vec::new()).is_err());
    }

    #[test]
    fn recede_before_generation_fails() {
        let mut w = window(10);
        assert_eq!(w.recede().unwrap_err(), HorizonError::HorizonExhausted);
    }

    #[test]
    fn cycle_slots_follow_pattern_under_recession() {
        // Period-4 biped pattern, window of 6.
        let pattern = vec![
            step(true, true),
            step(true, false),
            step(true, true),
            step(false, true),
        ];
        let mut w = window(6);
        w.generate_cycle_horizon(pattern.clone()).unwrap();

        for n in 0..10 {
            for k in 0..6 {
                let expected = &pattern[(k + n) % 4];
                let got = w.schedule(k).unwrap();
                assert_eq!(got.active(0), expected.active(0), "n={n} k={k}");
                assert_eq!(got.active(1), expected.active(1), "n={n} k={k}");
            }
            w.recede().unwrap();
        }
    }

    #[test]
    fn full_horizon_tail_consumed_then_held() {
        let mut schedules = vec![step(true, true); 5];
        schedules.push(step(true, false));
        // Window of 4 + tail of 2.
        let mut w = window(4);
        w.generate_full_horizon(schedules).unwrap();
        assert_eq!(w.tail_len(), 2);

        w.recede().unwrap();
        w.recede().unwrap();
        assert_eq!(w.tail_len(), 0);
        assert!(!w.schedule(3).unwrap().active(1));

        // Exhausted: the last schedule is held.
        w.recede().unwrap();
        assert_eq!(w.tail_len(), 0);
        assert!(!w.schedule(3).unwrap().active(1));
        assert!(!w.schedule(2).unwrap().active(1));
    }

    #[test]
    fn reference_accessors_validate_step_and_name() {
        let mut w = window(4);
        w.generate_cycle_horizon(vec![step(true, true)]).unwrap();

        let pose = Isometry3::translation(0.3, 0.0, 0.0);
        assert_eq!(
            w.set_reference_pose(4, "left_sole", &pose).unwrap_err(),
            HorizonError::IndexOutOfRange { step: 4, horizon: 4 }
        );
        assert!(matches!(
            w.set_reference_pose(0, "left_hand", &pose).unwrap_err(),
            HorizonError::UnknownEndEffector(_)
        ));

        w.set_reference_pose(2, "left_sole", &pose).unwrap();
        assert_eq!(w.reference_pose(2, "left_sole").unwrap(), pose);

        let force = DVector::from_vec(vec![0.0, 0.0, 250.0]);
        w.set_reference_force(1, "right_sole", &force).unwrap();
        assert_eq!(w.reference_force(1, "right_sole").unwrap(), force);

        w.set_terminal_reference_pose("right_sole", &pose).unwrap();
        assert_eq!(w.terminal().reference_pose(1), pose);
    }

    #[test]
    fn bulk_setters_cover_all_end_effectors() {
        let mut w = window(4);
        w.generate_cycle_horizon(vec![step(true, true)]).unwrap();

        let poses = vec![
            Isometry3::translation(1.0, 0.1, 0.0),
            Isometry3::translation(1.0, -0.1, 0.0),
        ];
        w.set_reference_poses(0, &poses).unwrap();
        assert_eq!(w.reference_pose(0, "right_sole").unwrap(), poses[1]);

        assert!(w.set_reference_poses(0, &poses[..1]).is_err());

        let forces = vec![
            DVector::from_vec(vec![0.0, 0.0, 120.0]),
            DVector::from_vec(vec![0.0, 0.0, 80.0]),
        ];
        w.set_reference_forces(3, &forces).unwrap();
        assert_eq!(w.reference_force(3, "left_sole").unwrap(), forces[0]);
    }

    #[test]
    fn contact_support_counts_stance_feet() {
        let mut w = window(4);
        w.generate_cycle_horizon(vec![step(true, false), step(true, true)])
            .unwrap();
        assert_eq!(w.contact_support(0).unwrap(), 1);
        assert_eq!(w.contact_support(1).unwrap(), 2);
    }

    #[test]
    fn timing_tracks_recessions() {
        // Right foot: stance for 3 steps, swing for 3, stance for 2.
        let mut schedules = Vec::new();
        for _ in 0..3 {
            schedules.push(step(true, true));
        }
        for _ in 0..3 {
            schedules.push(step(true, false));
        }
        for _ in 0..2 {
            schedules.push(step(true, true));
        }
        let mut w = window(6);
        w.generate_full_horizon(schedules).unwrap();

        assert_eq!(w.foot_takeoff_timings("right_sole").unwrap(), &[3]);
        assert_eq!(w.foot_land_timings("right_sole").unwrap(), &[] as &[usize]);

        // Landing at absolute step 6 enters the window as index 5.
        w.recede().unwrap();
        assert_eq!(w.foot_takeoff_timings("right_sole").unwrap(), &[2]);
        assert_eq!(w.foot_land_timings("right_sole").unwrap(), &[5]);

        w.recede().unwrap();
        w.recede().unwrap();
        assert_eq!(w.foot_takeoff_timings("right_sole").unwrap(), &[0]);
        assert_eq!(w.foot_land_timings("right_sole").unwrap(), &[3]);

        w.recede().unwrap();
        assert_eq!(w.foot_takeoff_timings("right_sole").unwrap(), &[] as &[usize]);
        assert_eq!(w.foot_land_timings("right_sole").unwrap(), &[2]);
    }
}
