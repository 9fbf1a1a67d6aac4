//! Contact-event timing: per end effector, the ordered step indices at
//! which contact is lost (takeoff) or gained (landing), expressed
//! relative to the current window origin.

use striders_core::schedule::ContactSchedule;

/// Takeoff and landing step indices per end effector.
///
/// Indices always lie in `[0, T)`. The table is rebuilt whenever a
/// horizon is generated and updated incrementally on every recession:
/// every index shifts down by one, indices leaving the window are
/// dropped, and a transition introduced by the newly appended final
/// stage is recorded at `T - 1`.
#[derive(Clone, Debug, Default)]
pub struct TimingTable {
    takeoff: Vec<Vec<usize>>,
    landing: Vec<Vec<usize>>,
}

impl TimingTable {
    pub fn new(n_end_effectors: usize) -> Self {
        Self {
            takeoff: vec![Vec::new(); n_end_effectors],
            landing: vec![Vec::new(); n_end_effectors],
        }
    }

    /// Takeoff indices for one end effector, ascending.
    pub fn takeoff(&self, ee: usize) -> &[usize] {
        &self.takeoff[ee]
    }

    /// Landing indices for one end effector, ascending.
    pub fn landing(&self, ee: usize) -> &[usize] {
        &self.landing[ee]
    }

    /// Rebuild both lists from a full contact trace.
    pub(crate) fn rebuild(&mut self, trace: &[ContactSchedule]) {
        for ee in 0..self.takeoff.len() {
            self.takeoff[ee].clear();
            self.landing[ee].clear();
            for step in 1..trace.len() {
                let prev = trace[step - 1].active(ee);
                let cur = trace[step].active(ee);
                if prev && !cur {
                    self.takeoff[ee].push(step);
                } else if !prev && cur {
                    self.landing[ee].push(step);
                }
            }
        }
    }

    /// Apply one recession: shift all indices by −1 (dropping those that
    /// leave the window) and record the transition between the previous
    /// final schedule and the appended one.
    pub(crate) fn recede(
        &mut self,
        previous_last: &ContactSchedule,
        appended: &ContactSchedule,
        horizon: usize,
    ) {
        for ee in 0..self.takeoff.len() {
            shift_down(&mut self.takeoff[ee]);
            shift_down(&mut self.landing[ee]);

            let was = previous_last.active(ee);
            let is = appended.active(ee);
            if was && !is {
                self.takeoff[ee].push(horizon - 1);
            } else if !was && is {
                self.landing[ee].push(horizon - 1);
            }
        }
    }
}

fn shift_down(indices: &mut Vec<usize>) {
    indices.retain(|&step| step > 0);
    for step in indices.iter_mut() {
        *step -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use striders_core::schedule::{ContactPhase, ForceSize};
    use nalgebra::Isometry3;

    fn step(flags: [bool; 2]) -> ContactSchedule {
        let phase = |active| {
            if active {
                ContactPhase::stance(
                    Isometry3::identity(),
                    nalgebra::DVector::from_vec(vec![0.0, 0.0, 100.0]),
                )
            } else {
                ContactPhase::swing(Isometry3::identity(), ForceSize::Point)
            }
        };
        ContactSchedule::new(ForceSize::Point, vec![phase(flags[0]), phase(flags[1])]).unwrap()
    }

    #[test]
    fn rebuild_finds_transitions() {
        // ee 0: contact over steps 0..3, swing 3..5, contact 5..6
        // ee 1: swing 0..2, contact 2..6
        let trace: Vec<_> = [
            [true, false],
            [true, false],
            [true, true],
            [false, true],
            [false, true],
            [true, true],
        ]
        .iter()
        .map(|&f| step(f))
        .collect();

        let mut table = TimingTable::new(2);
        table.rebuild(&trace);

        assert_eq!(table.takeoff(0), &[3]);
        assert_eq!(table.landing(0), &[5]);
        assert_eq!(table.takeoff(1), &[] as &[usize]);
        assert_eq!(table.landing(1), &[2]);
    }

    #[test]
    fn recede_shifts_and_drops() {
        let trace: Vec<_> = [[true, true], [false, true], [true, true], [true, true]]
            .iter()
            .map(|&f| step(f))
            .collect();
        let mut table = TimingTable::new(2);
        table.rebuild(&trace);
        assert_eq!(table.takeoff(0), &[1]);
        assert_eq!(table.landing(0), &[2]);

        // Appending an identical-contact step introduces no transition.
        table.recede(&step([true, true]), &step([true, true]), 4);
        assert_eq!(table.takeoff(0), &[0]);
        assert_eq!(table.landing(0), &[1]);

        // Index 0 leaves the window on the next shift.
        table.recede(&step([true, true]), &step([true, true]), 4);
        assert_eq!(table.takeoff(0), &[] as &[usize]);
        assert_eq!(table.landing(0), &[0]);
    }

    #[test]
    fn recede_records_appended_transition() {
        let trace: Vec<_> = (0..4).map(|_| step([true, true])).collect();
        let mut table = TimingTable::new(2);
        table.rebuild(&trace);

        table.recede(&step([true, true]), &step([true, false]), 4);
        assert_eq!(table.takeoff(1), &[3]);

        table.recede(&step([true, false]), &step([true, true]), 4);
        assert_eq!(table.takeoff(1), &[2]);
        assert_eq!(table.landing(1), &[3]);
    }
}
