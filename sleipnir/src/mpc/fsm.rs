use crate::types::{ReferenceVelocity, Side, SupportPhase, SupportState};

/// Finite state machine advancing the support situation along the preview
/// horizon.
///
/// The same machine serves two purposes: previewing future support states
/// for the rolling optimization (by calling [`SupportFsm::set_support_state`]
/// with increasing preview instants on a copy of the current state) and
/// advancing the real state at the end of every tick.
#[derive(Debug, Clone)]
pub struct SupportFsm {
    /// Duration of a single support phase.
    single_support_duration: f64,
    /// Duration of the double support between two steps.
    double_support_duration: f64,
    /// Reference speeds below this mean the walk should stop.
    stationary_threshold: f64,
    /// Small slack when comparing times against phase limits.
    epsilon: f64,
}

impl SupportFsm {
    #[must_use]
    pub fn new(
        single_support_duration: f64,
        double_support_duration: f64,
        stationary_threshold: f64,
    ) -> Self {
        Self {
            single_support_duration,
            double_support_duration,
            stationary_threshold,
            epsilon: 1e-6,
        }
    }

    /// The state the machine starts and ends a walk in: both feet on the
    /// ground around the given stance foot.
    ///
    /// `steps_left` is the number of squaring-up steps the robot still
    /// takes once the reference velocity drops to zero.
    #[must_use]
    pub fn initial_state(&self, time: f64, stance: Side, steps_left: usize) -> SupportState {
        SupportState {
            foot: stance,
            phase: SupportPhase::Double,
            steps_left,
            step_number: 0,
            time_limit: time + self.double_support_duration,
            state_changed: false,
            ..SupportState::default()
        }
    }

    /// Advance `state` to the previewed instant `time` (the current time
    /// plus `sample` preview periods, computed by the caller).
    ///
    /// A single support that ran past its limit transitions into a brief
    /// double support; a double support transitions onto the opposite foot
    /// unless the reference asks to stand still with no steps left.
    pub fn set_support_state(
        &self,
        time: f64,
        state: &mut SupportState,
        reference: &ReferenceVelocity,
    ) {
        state.state_changed = false;

        if time < state.time_limit - self.epsilon {
            return;
        }

        match state.phase {
            SupportPhase::Single => {
                // a finished step always lands in a brief double support
                state.phase = SupportPhase::Double;
                state.time_limit = time + self.double_support_duration;
                if reference.is_stationary(self.stationary_threshold) {
                    // one less squaring-up step before the full stop
                    state.steps_left = state.steps_left.saturating_sub(1);
                }
                state.state_changed = true;
            }
            SupportPhase::Double => {
                let stopping =
                    reference.is_stationary(self.stationary_threshold) && state.steps_left == 0;
                if stopping {
                    // terminal double support, keep standing
                    state.time_limit = f64::INFINITY;
                } else {
                    state.phase = SupportPhase::Single;
                    state.foot = state.foot.opposite();
                    state.time_limit = time + self.single_support_duration;
                    state.step_number += 1;
                    state.state_changed = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walking_reference() -> ReferenceVelocity {
        ReferenceVelocity {
            forward: 0.2,
            lateral: 0.0,
            turn: 0.0,
        }
    }

    #[test]
    fn alternates_feet_through_a_preview() {
        let fsm = SupportFsm::new(0.7, 0.1, 1e-3);
        let mut state = fsm.initial_state(0.0, Side::Left, 3);
        let reference = walking_reference();

        let mut feet = Vec::new();
        for sample in 1..=30 {
            let time = f64::from(sample) * 0.1;
            fsm.set_support_state(time, &mut state, &reference);
            if state.state_changed && state.phase == SupportPhase::Single {
                feet.push(state.foot);
            }
        }

        // feet must strictly alternate
        for pair in feet.windows(2) {
            assert_eq!(pair[0], pair[1].opposite());
        }
        assert!(feet.len() >= 3);
    }

    #[test]
    fn step_number_is_monotone_within_a_preview() {
        let fsm = SupportFsm::new(0.7, 0.1, 1e-3);
        let mut state = fsm.initial_state(0.0, Side::Left, 5);
        let reference = walking_reference();

        let mut previous = state.step_number;
        for sample in 1..=16 {
            let time = f64::from(sample) * 0.1;
            fsm.set_support_state(time, &mut state, &reference);
            assert!(state.step_number >= previous);
            previous = state.step_number;
        }
        // the horizon cannot hold more steps than its duration allows
        assert!(previous <= (16.0_f64 * 0.1 / 0.7).ceil() as usize + 1);
    }

    #[test]
    fn stationary_reference_ends_in_double_support() {
        let fsm = SupportFsm::new(0.7, 0.1, 1e-3);
        let mut state = fsm.initial_state(0.0, Side::Left, 1);
        let stop = ReferenceVelocity::default();

        for sample in 1..=40 {
            let time = f64::from(sample) * 0.1;
            fsm.set_support_state(time, &mut state, &stop);
        }

        assert_eq!(state.phase, SupportPhase::Double);
        assert_eq!(state.steps_left, 0);
        assert!(state.time_limit.is_infinite());
    }

    #[test]
    fn exactly_one_stance_foot_at_all_times() {
        let fsm = SupportFsm::new(0.7, 0.1, 1e-3);
        let mut state = fsm.initial_state(0.0, Side::Right, 4);
        let reference = walking_reference();

        for sample in 1..=50 {
            let time = f64::from(sample) * 0.1;
            fsm.set_support_state(time, &mut state, &reference);
            // the swing foot is always the opposite of the stance foot
            assert_eq!(state.foot.opposite().opposite(), state.foot);
        }
    }
}
