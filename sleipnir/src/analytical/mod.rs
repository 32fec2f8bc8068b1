//! Closed-form pattern generation from a footstep stack.
//!
//! The pressure point is described as a piecewise polynomial over a
//! sequence of support intervals, the center of mass as the analytical
//! response of the pendulum to it. All polynomial weights follow from one
//! linear system whose LU decomposition is cached, so editing a future
//! landing mid-walk is a matter of rewriting the boundary conditions and
//! re-solving, in closed form, within one control tick.

pub mod filtering;
pub mod linear_system;
pub mod trajectory;

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::{
    config::WalkConfig,
    error::{Error, Result},
    foot_trajectory::{FootTrajectoryGenerator, LandingTarget},
    math::PreviewController,
    types::{
        ComPosition, FootAbsolutePosition, RelativeFootPosition, Side, TrajectoryQueues,
        ZmpPosition, STEP_TYPE_REST,
    },
};

use filtering::{OrthogonalFilter, FILTER_WINDOW};
use linear_system::{LinearSystem, TrajectoryConditions};
use trajectory::AnalyticalTrajectory;

/// Landing edits closer than this to the end of the current interval are
/// refused: the remaining time is too short to bend the trajectory.
pub const TOO_LATE_MARGIN: f64 = 0.05;

/// Duration of the trailing interval that lets the center of mass settle.
const SETTLE_DURATION: f64 = 1.6;

/// Reference frame of an online landing change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// World coordinates.
    Absolute,
    /// Relative to the support foot the step is taken from.
    Relative,
}

/// The discontinuity a landing change introduces at the edit time, per
/// axis: the state of the old trajectory against the state the new boundary
/// conditions prescribe.
#[derive(Debug, Default, Clone, Copy)]
pub struct FluctuationParameters {
    pub com_init: f64,
    pub com_new: f64,
    pub com_velocity_init: f64,
    pub com_velocity_new: f64,
    pub zmp_init: f64,
    pub zmp_new: f64,
    pub zmp_velocity_init: f64,
    pub zmp_velocity_new: f64,
}

/// Small time extension of the running interval that lets the pressure
/// point catch up with an edited reference, minimizing the squared
/// discontinuity. Closed form since the center of mass terms are pinned by
/// the re-anchoring.
fn time_compensation(fluctuation: &FluctuationParameters, remaining: f64) -> f64 {
    let jump = fluctuation.zmp_init - fluctuation.zmp_new;
    let slope = fluctuation.zmp_velocity_init;
    if slope.abs() < 1e-9 {
        return 0.0;
    }
    (jump / slope).clamp(0.0, remaining / 2.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntervalKind {
    SingleSupport,
    DoubleSupport,
    /// Trailing interval holding the final stance.
    Rest,
}

/// One entry of the support schedule backing the trajectories.
#[derive(Debug, Clone, Copy)]
struct IntervalPlan {
    kind: IntervalKind,
    duration: f64,
    /// Index of the stance foot in the support list.
    stance: usize,
    /// For a single support: index of the landing this swing realizes.
    landing: Option<usize>,
}

/// An absolute support foot pose on the ground.
#[derive(Debug, Clone, Copy)]
struct SupportPose {
    x: f64,
    y: f64,
    yaw: f64,
    side: Side,
}

impl SupportPose {
    /// Compose a relative step onto this support.
    fn compose(&self, step: &RelativeFootPosition) -> Self {
        Self {
            x: self.x + self.yaw.cos() * step.dx - self.yaw.sin() * step.dy,
            y: self.y + self.yaw.sin() * step.dx + self.yaw.cos() * step.dy,
            yaw: self.yaw + step.dyaw,
            side: self.side.opposite(),
        }
    }

    fn target(&self) -> LandingTarget {
        LandingTarget {
            x: self.x,
            y: self.y,
            yaw: self.yaw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Footstep-driven pattern generator with closed-form online edits.
pub struct AnalyticalPatternGenerator {
    config: WalkConfig,
    system: LinearSystem,
    trajectory_x: AnalyticalTrajectory,
    trajectory_y: AnalyticalTrajectory,
    conditions_x: TrajectoryConditions,
    conditions_y: TrajectoryConditions,
    foot_generator: FootTrajectoryGenerator,
    controller: PreviewController,
    filter: Option<(Axis, OrthogonalFilter)>,
    filtering_enabled: bool,

    supports: Vec<SupportPose>,
    intervals: Vec<IntervalPlan>,

    left_foot: FootAbsolutePosition,
    right_foot: FootAbsolutePosition,
    /// Interval index and absolute start time of the running swing.
    active_swing: Option<(usize, f64)>,

    /// Absolute time the first interval is anchored at.
    reference_time: f64,
    /// Absolute time of the last emitted sample.
    last_emitted: f64,
    /// Beyond this time the stacks hold the terminal posture.
    upper_time_limit: f64,
    ended: bool,
    initialized: bool,
}

impl AnalyticalPatternGenerator {
    #[must_use]
    pub fn new(config: WalkConfig) -> Self {
        let foot_generator = FootTrajectoryGenerator::new(
            config.feet.step_height,
            config.feet.back,
            config.feet.height,
            config.feet.front,
        );
        let controller = PreviewController::new(
            config.timing.sampling_period,
            config.pendulum.com_height,
            config.pendulum.gravity,
            (FILTER_WINDOW / config.timing.sampling_period).round() as usize,
        );

        Self {
            system: LinearSystem::new(config.pendulum.gravity),
            trajectory_x: AnalyticalTrajectory::new(),
            trajectory_y: AnalyticalTrajectory::new(),
            conditions_x: TrajectoryConditions::default(),
            conditions_y: TrajectoryConditions::default(),
            foot_generator,
            controller,
            filter: None,
            filtering_enabled: true,
            supports: Vec::new(),
            intervals: Vec::new(),
            left_foot: FootAbsolutePosition::default(),
            right_foot: FootAbsolutePosition::default(),
            active_swing: None,
            reference_time: 0.0,
            last_emitted: 0.0,
            upper_time_limit: 0.0,
            ended: false,
            initialized: false,
            config,
        }
    }

    /// Enable or disable the orthogonal preview filtering after shifted
    /// edits.
    pub fn set_filtering(&mut self, enabled: bool) {
        self.filtering_enabled = enabled;
        if !enabled {
            self.filter = None;
        }
    }

    #[must_use]
    pub fn upper_time_limit(&self) -> f64 {
        self.upper_time_limit
    }

    #[must_use]
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Build the interval schedule and solve both axes for a fresh walk.
    ///
    /// The first relative step determines the initial stance foot: a step
    /// landing to the right is taken with the right foot, so the robot
    /// starts standing on the left.
    pub fn init_online(
        &mut self,
        com: &ComPosition,
        left_foot: FootAbsolutePosition,
        right_foot: FootAbsolutePosition,
        steps: &[RelativeFootPosition],
        time: f64,
    ) -> Result<()> {
        if steps.is_empty() {
            return Err(Error::NotEnoughSteps {
                available: 0,
                required: 1,
            });
        }

        let stance_side = if steps[0].dy <= 0.0 {
            Side::Left
        } else {
            Side::Right
        };
        let stance_foot = match stance_side {
            Side::Left => &left_foot,
            Side::Right => &right_foot,
        };

        self.supports = vec![SupportPose {
            x: stance_foot.x,
            y: stance_foot.y,
            yaw: stance_foot.theta,
            side: stance_side,
        }];
        for step in steps {
            let next = self
                .supports
                .last()
                .expect("the initial stance is always present")
                .compose(step);
            self.supports.push(next);
        }

        self.intervals = Vec::with_capacity(2 * steps.len() + 1);
        for (index, step) in steps.iter().enumerate() {
            self.intervals.push(IntervalPlan {
                kind: IntervalKind::SingleSupport,
                duration: step.single_support_duration,
                stance: index,
                landing: Some(index + 1),
            });
            self.intervals.push(IntervalPlan {
                kind: IntervalKind::DoubleSupport,
                duration: step.double_support_duration,
                stance: index,
                landing: None,
            });
        }
        self.intervals.push(IntervalPlan {
            kind: IntervalKind::Rest,
            duration: SETTLE_DURATION,
            stance: steps.len(),
            landing: None,
        });

        self.conditions_x.initial_com = com.position.x;
        self.conditions_x.initial_com_velocity = com.velocity.x;
        self.conditions_y.initial_com = com.position.y;
        self.conditions_y.initial_com_velocity = com.velocity.y;

        self.left_foot = left_foot;
        self.right_foot = right_foot;
        self.reference_time = time;
        self.last_emitted = time;
        self.ended = false;
        self.active_swing = None;
        self.filter = None;

        self.rebuild_conditions();
        // standing at rest the pressure point sits under the center of
        // mass; the first interval sweeps it onto the stance foot
        self.conditions_x.initial_zmp = com.position.x;
        self.conditions_y.initial_zmp = com.position.y;
        self.solve_axes()?;
        self.initialized = true;

        info!(
            intervals = self.intervals.len(),
            horizon = self.upper_time_limit,
            "walk initialized"
        );
        Ok(())
    }

    /// The prescribed pressure point at the end of an interval.
    ///
    /// A single support holds the stance foot center, a double support ends
    /// on the landing foot (passing through the midpoint of the two feet at
    /// mid-transfer), and the settle interval ends between the final feet
    /// once the walk is over.
    fn interval_end_zmp(&self, plan: &IntervalPlan) -> (f64, f64) {
        match plan.kind {
            IntervalKind::SingleSupport => {
                let stance = &self.supports[plan.stance];
                (stance.x, stance.y)
            }
            IntervalKind::DoubleSupport => {
                let landing = &self.supports[plan.stance + 1];
                (landing.x, landing.y)
            }
            IntervalKind::Rest => {
                if self.ended {
                    let last = &self.supports[self.supports.len() - 1];
                    let previous = &self.supports[self.supports.len() - 2];
                    ((last.x + previous.x) / 2.0, (last.y + previous.y) / 2.0)
                } else {
                    let stance = &self.supports[plan.stance];
                    (stance.x, stance.y)
                }
            }
        }
    }

    /// Refresh profiles, durations and heights from the schedule; initial
    /// conditions are left untouched.
    fn rebuild_conditions(&mut self) {
        let m = self.intervals.len();
        let mut durations = Vec::with_capacity(m);
        let mut profile_x = Vec::with_capacity(m);
        let mut profile_y = Vec::with_capacity(m);

        for plan in &self.intervals {
            let (end_x, end_y) = self.interval_end_zmp(plan);
            durations.push(plan.duration);
            profile_x.push(end_x);
            profile_y.push(end_y);
        }

        let com_heights = vec![self.config.pendulum.com_height; m];
        let zmp_heights = vec![0.0; m];

        self.conditions_x.final_com = *profile_x.last().expect("schedule is never empty");
        self.conditions_y.final_com = *profile_y.last().expect("schedule is never empty");
        self.conditions_x.zmp_profile = profile_x;
        self.conditions_y.zmp_profile = profile_y;
        self.conditions_x.com_heights.clone_from(&com_heights);
        self.conditions_x.zmp_heights.clone_from(&zmp_heights);
        self.conditions_y.com_heights.clone_from(&com_heights);
        self.conditions_y.zmp_heights.clone_from(&zmp_heights);

        self.system
            .configure(&durations, &com_heights, &zmp_heights);
    }

    /// Solve both axes against the cached decomposition.
    fn solve_axes(&mut self) -> Result<()> {
        self.system
            .compute_trajectory(&self.conditions_x, &mut self.trajectory_x)?;
        self.system
            .compute_trajectory(&self.conditions_y, &mut self.trajectory_y)?;
        self.trajectory_x
            .set_absolute_time_reference(self.reference_time);
        self.trajectory_y
            .set_absolute_time_reference(self.reference_time);
        self.upper_time_limit = self.reference_time + self.trajectory_x.total_duration();
        Ok(())
    }

    /// Locate the schedule interval containing an absolute time.
    fn interval_at(&self, time: f64) -> (usize, f64) {
        let mut local = (time - self.reference_time).max(0.0);
        for (index, plan) in self.intervals.iter().enumerate() {
            if local <= plan.duration || index == self.intervals.len() - 1 {
                return (index, local.min(plan.duration));
            }
            local -= plan.duration;
        }
        unreachable!("the schedule is never empty")
    }

    /// Absolute start time of a schedule interval.
    fn interval_start(&self, index: usize) -> f64 {
        self.reference_time
            + self.intervals[..index]
                .iter()
                .map(|plan| plan.duration)
                .sum::<f64>()
    }

    /// Emit samples up to `time`, one per control period.
    pub fn online(&mut self, time: f64, queues: &mut TrajectoryQueues) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        let dt = self.config.timing.sampling_period;
        while self.last_emitted + dt <= time + dt / 2.0 {
            let sample_time = self.last_emitted + dt;
            self.emit_sample(sample_time, queues);
            self.last_emitted = sample_time;
        }

        let filter_exhausted = self
            .filter
            .as_ref()
            .is_some_and(|(_, filter)| filter.is_exhausted(self.last_emitted));
        if filter_exhausted {
            self.filter = None;
        }
        Ok(())
    }

    fn emit_sample(&mut self, time: f64, queues: &mut TrajectoryQueues) {
        let mut com_x = (
            self.trajectory_x.com(time),
            self.trajectory_x.com_velocity(time),
            self.trajectory_x.com_acceleration(time),
        );
        let mut com_y = (
            self.trajectory_y.com(time),
            self.trajectory_y.com_velocity(time),
            self.trajectory_y.com_acceleration(time),
        );
        let mut zmp_x = self.trajectory_x.zmp(time);
        let mut zmp_y = self.trajectory_y.zmp(time);

        if let Some((axis, filter)) = &self.filter {
            if let Some(sample) = filter.sample_at(time) {
                let (com, zmp) = match axis {
                    Axis::X => (&mut com_x, &mut zmp_x),
                    Axis::Y => (&mut com_y, &mut zmp_y),
                };
                *com = (sample.com, sample.com_velocity, sample.com_acceleration);
                *zmp = sample.zmp;
            }
        }

        let (interval, _) = self.interval_at(time);
        let plan = self.intervals[interval];
        let resting = self.ended && time >= self.upper_time_limit;
        let support_type = if resting { STEP_TYPE_REST } else { -1 };

        let (left, right) = match (plan.kind, plan.landing) {
            (IntervalKind::SingleSupport, Some(landing)) if !resting => {
                if self.active_swing.is_none_or(|(index, _)| index != interval) {
                    let start_time = self.interval_start(interval);
                    let target = self.supports[landing].target();
                    let swing_foot = match self.supports[landing].side {
                        Side::Left => &self.left_foot,
                        Side::Right => &self.right_foot,
                    };
                    self.foot_generator
                        .begin_swing(plan.duration, swing_foot, target);
                    self.active_swing = Some((interval, start_time));
                    debug!(interval, ?target, "swing started");
                }

                let (_, swing_start) = self.active_swing.expect("the swing was just started");
                let elapsed = time - swing_start;
                match self.supports[landing].side {
                    Side::Left => (
                        self.foot_generator
                            .swing_sample(elapsed, &self.left_foot, time, 1),
                        FootTrajectoryGenerator::support_sample(&self.right_foot, time, -1),
                    ),
                    Side::Right => (
                        FootTrajectoryGenerator::support_sample(&self.left_foot, time, -1),
                        self.foot_generator
                            .swing_sample(elapsed, &self.right_foot, time, 1),
                    ),
                }
            }
            _ => (
                FootTrajectoryGenerator::support_sample(&self.left_foot, time, support_type),
                FootTrajectoryGenerator::support_sample(&self.right_foot, time, support_type),
            ),
        };

        self.left_foot = left;
        self.right_foot = right;
        let trunk_yaw = (left.theta + right.theta) / 2.0;

        queues.zmp.push_back(ZmpPosition {
            x: zmp_x,
            y: zmp_y,
            z: 0.0,
            yaw: trunk_yaw,
            time,
        });
        queues.com.push_back(ComPosition {
            position: Vector3::new(com_x.0, com_y.0, self.config.pendulum.com_height),
            velocity: Vector3::new(com_x.1, com_y.1, 0.0),
            acceleration: Vector3::new(com_x.2, com_y.2, 0.0),
            yaw: trunk_yaw,
            yaw_rate: 0.0,
            time,
        });
        queues.left_foot.push_back(left);
        queues.right_foot.push_back(right);
    }

    /// Re-anchor the schedule at `anchor`: the interval containing it
    /// becomes the first one with only its remaining duration, and the
    /// initial conditions are taken from the current trajectories so the
    /// streams stay continuous.
    ///
    /// Returns the number of dropped intervals.
    fn re_anchor(&mut self, anchor: f64) -> usize {
        let (index, local) = self.interval_at(anchor);
        let remaining = self.intervals[index].duration - local;

        self.conditions_x.initial_com = self.trajectory_x.com(anchor);
        self.conditions_x.initial_com_velocity = self.trajectory_x.com_velocity(anchor);
        self.conditions_x.initial_zmp = self.trajectory_x.zmp(anchor);
        self.conditions_y.initial_com = self.trajectory_y.com(anchor);
        self.conditions_y.initial_com_velocity = self.trajectory_y.com_velocity(anchor);
        self.conditions_y.initial_zmp = self.trajectory_y.zmp(anchor);

        self.intervals.drain(..index);
        self.intervals[0].duration = remaining;
        self.reference_time = anchor;

        self.active_swing = self
            .active_swing
            .and_then(|(swing, start)| Some((swing.checked_sub(index)?, start)));

        index
    }

    /// Append a relative footstep and slide the schedule window by one
    /// step (its single and double support), the way a controller feeds the
    /// generator one footstep at a time.
    ///
    /// The anchor moves to the boundary behind the completed step. When the
    /// step durations repeat, the interval durations are unchanged and the
    /// cached decomposition is reused; only the right hand side is rebuilt.
    pub fn online_add_foot(&mut self, step: RelativeFootPosition) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        if self.intervals.len() < 3 {
            return Err(Error::NotEnoughSteps {
                available: 0,
                required: 1,
            });
        }

        let boundary =
            self.reference_time + self.intervals[0].duration + self.intervals[1].duration;

        self.conditions_x.initial_com = self.trajectory_x.com(boundary);
        self.conditions_x.initial_com_velocity = self.trajectory_x.com_velocity(boundary);
        self.conditions_x.initial_zmp = self.trajectory_x.zmp(boundary);
        self.conditions_y.initial_com = self.trajectory_y.com(boundary);
        self.conditions_y.initial_com_velocity = self.trajectory_y.com_velocity(boundary);
        self.conditions_y.initial_zmp = self.trajectory_y.zmp(boundary);

        // drop the completed step and its support
        self.intervals.drain(..2);
        self.supports.remove(0);
        for plan in &mut self.intervals {
            plan.stance = plan.stance.saturating_sub(1);
            plan.landing = plan.landing.map(|landing| landing - 1);
        }
        self.active_swing = self
            .active_swing
            .and_then(|(swing, start)| Some((swing.checked_sub(2)?, start)));

        // schedule the new step in front of the settle interval
        let next = self
            .supports
            .last()
            .expect("at least the stance support remains")
            .compose(&step);
        self.supports.push(next);
        let stance = self.supports.len() - 2;
        let rest = self.intervals.pop().expect("the settle interval is always last");
        self.intervals.push(IntervalPlan {
            kind: IntervalKind::SingleSupport,
            duration: step.single_support_duration,
            stance,
            landing: Some(stance + 1),
        });
        self.intervals.push(IntervalPlan {
            kind: IntervalKind::DoubleSupport,
            duration: step.double_support_duration,
            stance,
            landing: None,
        });
        self.intervals.push(IntervalPlan {
            kind: IntervalKind::Rest,
            duration: rest.duration,
            stance: stance + 1,
            landing: None,
        });

        self.reference_time = boundary;
        self.rebuild_conditions();
        self.solve_axes()
    }

    /// Change the landing of the upcoming step, in the given frame.
    pub fn online_foot_change(
        &mut self,
        time: f64,
        new_position: LandingTarget,
        frame: Frame,
        temporal_shift: bool,
    ) -> Result<()> {
        self.online_foot_changes(time, &[(0, new_position)], frame, temporal_shift)
    }

    /// Change the landing of several upcoming steps at once.
    ///
    /// Each entry maps a step offset (0 = the landing currently in flight)
    /// to its new position.
    pub fn online_foot_changes(
        &mut self,
        time: f64,
        changes: &[(usize, LandingTarget)],
        frame: Frame,
        temporal_shift: bool,
    ) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        let (current, _) = self.interval_at(time);
        let first_editable = match self.intervals[current].kind {
            IntervalKind::SingleSupport => current + 1,
            _ => current,
        };
        let double_supports: Vec<usize> = (first_editable..self.intervals.len())
            .filter(|&index| self.intervals[index].kind == IntervalKind::DoubleSupport)
            .collect();

        let mut interval_indices = Vec::with_capacity(changes.len());
        let mut targets = Vec::with_capacity(changes.len());
        for &(offset, target) in changes {
            let index = *double_supports
                .get(offset)
                .ok_or(Error::NotEnoughSteps {
                    available: double_supports.len(),
                    required: offset + 1,
                })?;
            let target = match frame {
                Frame::Absolute => target,
                Frame::Relative => {
                    let stance = &self.supports[self.intervals[index].stance];
                    let step = RelativeFootPosition {
                        dx: target.x,
                        dy: target.y,
                        dyaw: target.yaw,
                        ..RelativeFootPosition::default()
                    };
                    stance.compose(&step).target()
                }
            };
            interval_indices.push(index);
            targets.push(target);
        }

        self.change_foot_landing_position(time, &interval_indices, &targets, temporal_shift)
    }

    /// Core of the online edit: rewrite the boundary conditions of the
    /// edited intervals and re-solve from the current time.
    fn change_foot_landing_position(
        &mut self,
        time: f64,
        interval_indices: &[usize],
        targets: &[LandingTarget],
        temporal_shift: bool,
    ) -> Result<()> {
        let (current, local) = self.interval_at(time);
        let remaining = self.intervals[current].duration - local;
        if remaining < TOO_LATE_MARGIN {
            debug!(remaining, "landing change refused, too late");
            return Err(Error::TooLateForModification { remaining });
        }
        for &index in interval_indices {
            if self.intervals[index].kind != IntervalKind::DoubleSupport {
                return Err(Error::WrongFootType { interval: index });
            }
        }

        // the end value of the running interval before and after the edit
        // quantifies the discontinuity the edit introduces at `time`
        let old_end = self.interval_end_zmp(&self.intervals[current]);

        for (&index, target) in interval_indices.iter().zip(targets) {
            let landing = self.intervals[index].stance + 1;
            let side = self.supports[landing].side;
            self.supports[landing] = SupportPose {
                x: target.x,
                y: target.y,
                yaw: target.yaw,
                side,
            };
        }

        let new_end = self.interval_end_zmp(&self.intervals[current]);
        let fluctuation_x = FluctuationParameters {
            com_init: self.trajectory_x.com(time),
            com_new: self.trajectory_x.com(time),
            com_velocity_init: self.trajectory_x.com_velocity(time),
            com_velocity_new: self.trajectory_x.com_velocity(time),
            zmp_init: self.trajectory_x.zmp(time),
            zmp_new: self.trajectory_x.zmp(time) + new_end.0 - old_end.0,
            zmp_velocity_init: self.trajectory_x.zmp_velocity(time),
            zmp_velocity_new: self.trajectory_x.zmp_velocity(time),
        };
        let fluctuation_y = FluctuationParameters {
            com_init: self.trajectory_y.com(time),
            com_new: self.trajectory_y.com(time),
            com_velocity_init: self.trajectory_y.com_velocity(time),
            com_velocity_new: self.trajectory_y.com_velocity(time),
            zmp_init: self.trajectory_y.zmp(time),
            zmp_new: self.trajectory_y.zmp(time) + new_end.1 - old_end.1,
            zmp_velocity_init: self.trajectory_y.zmp_velocity(time),
            zmp_velocity_new: self.trajectory_y.zmp_velocity(time),
        };

        // the axis with the larger discontinuity drives the shift, the
        // other one is smoothed by the preview filter
        let mut shift = 0.0;
        let mut shifted_axis = None;
        if temporal_shift {
            let jump_x = (fluctuation_x.zmp_init - fluctuation_x.zmp_new).abs();
            let jump_y = (fluctuation_y.zmp_init - fluctuation_y.zmp_new).abs();
            let (axis, fluctuation) = if jump_x >= jump_y {
                (Axis::X, &fluctuation_x)
            } else {
                (Axis::Y, &fluctuation_y)
            };
            shift = time_compensation(fluctuation, remaining);
            if shift > 0.0 {
                shifted_axis = Some(axis);
            }
        }

        // state of the orthogonal axis before the trajectories change
        let anchor = time - shift;
        let orthogonal_state = shifted_axis.map(|axis| match axis {
            Axis::X => (
                Axis::Y,
                Vector3::new(
                    self.trajectory_y.com(time),
                    self.trajectory_y.com_velocity(time),
                    self.trajectory_y.com_acceleration(time),
                ),
            ),
            Axis::Y => (
                Axis::X,
                Vector3::new(
                    self.trajectory_x.com(time),
                    self.trajectory_x.com_velocity(time),
                    self.trajectory_x.com_acceleration(time),
                ),
            ),
        });

        // anchoring `shift` in the past stretches the running interval by
        // the same amount, which is the adjusted time vector
        let dropped = self.re_anchor(anchor);
        self.rebuild_conditions();
        self.solve_axes()?;

        // keep a running swing aimed at its (possibly moved) landing
        if let Some((swing, start)) = self.active_swing {
            if let Some(landing) = self.intervals[swing].landing {
                if interval_indices
                    .iter()
                    .any(|&index| self.intervals[index - dropped].stance + 1 == landing)
                {
                    let pose = self.supports[landing];
                    let foot = match pose.side {
                        Side::Left => &self.left_foot,
                        Side::Right => &self.right_foot,
                    };
                    self.foot_generator.retarget(time - start, foot, pose.target());
                }
            }
        }

        if let Some((axis, state)) = orthogonal_state {
            if self.filtering_enabled {
                let trajectory = match axis {
                    Axis::X => &self.trajectory_x,
                    Axis::Y => &self.trajectory_y,
                };
                self.filter = Some((
                    axis,
                    OrthogonalFilter::new(
                        &self.controller,
                        trajectory,
                        state,
                        time,
                        self.config.timing.sampling_period,
                    ),
                ));
            }
        }

        info!(shift, "landing changed online");
        Ok(())
    }

    /// Schedule the end of the walk: the trailing foot joins the stance at
    /// the configured distance and the trajectories settle onto the final
    /// double support.
    pub fn end_phase_of_the_walking(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        if self.ended {
            return Ok(());
        }

        self.re_anchor(self.last_emitted.max(self.reference_time));

        let last = self.supports.len() - 1;
        let stance = self.supports[last];
        let sign = match stance.side.opposite() {
            Side::Right => -1.0,
            Side::Left => 1.0,
        };
        let distance = self.config.feet.final_stance_distance;
        self.supports.push(SupportPose {
            x: stance.x - sign * stance.yaw.sin() * distance,
            y: stance.y + sign * stance.yaw.cos() * distance,
            yaw: stance.yaw,
            side: stance.side.opposite(),
        });

        let rest = self.intervals.pop().expect("the settle interval is always last");
        if rest.kind != IntervalKind::Rest {
            self.intervals.push(rest);
        }
        self.intervals.push(IntervalPlan {
            kind: IntervalKind::SingleSupport,
            duration: self.config.timing.single_support_duration,
            stance: last,
            landing: Some(last + 1),
        });
        self.intervals.push(IntervalPlan {
            kind: IntervalKind::DoubleSupport,
            duration: self.config.timing.double_support_duration,
            stance: last,
            landing: None,
        });
        self.intervals.push(IntervalPlan {
            kind: IntervalKind::Rest,
            duration: SETTLE_DURATION,
            stance: last + 1,
            landing: None,
        });

        self.ended = true;
        self.rebuild_conditions();
        self.solve_axes()?;
        info!("end of walk scheduled");
        Ok(())
    }

    /// Number of control samples left in which a landing change of the
    /// upcoming step can still be requested before it is refused.
    #[must_use]
    pub fn optimal_time_to_regenerate_step(&self) -> usize {
        let (index, local) = self.interval_at(self.last_emitted);
        let remaining = self.intervals[index].duration - local - TOO_LATE_MARGIN;
        if remaining <= 0.0 {
            0
        } else {
            (remaining / self.config.timing.sampling_period).floor() as usize
        }
    }

    /// Generate the complete walk in one call: initialize from the whole
    /// footstep stack, schedule the terminal posture and emit every sample
    /// to the queues.
    pub fn generate_full_sequence(
        &mut self,
        com: &ComPosition,
        left_foot: FootAbsolutePosition,
        right_foot: FootAbsolutePosition,
        steps: &[RelativeFootPosition],
        time: f64,
        queues: &mut TrajectoryQueues,
    ) -> Result<()> {
        self.init_online(com, left_foot, right_foot, steps, time)?;
        self.end_phase_of_the_walking()?;
        self.online(self.upper_time_limit, queues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelativeFootPosition;

    fn straight_steps(count: usize) -> Vec<RelativeFootPosition> {
        (0..count)
            .map(|index| RelativeFootPosition {
                dx: 0.2,
                dy: if index % 2 == 0 { -0.2 } else { 0.2 },
                dyaw: 0.0,
                single_support_duration: 0.7,
                double_support_duration: 0.1,
                step_type: 0,
            })
            .collect()
    }

    fn standing_start() -> (ComPosition, FootAbsolutePosition, FootAbsolutePosition) {
        let com = ComPosition {
            position: Vector3::new(0.0, 0.0, 0.814),
            ..ComPosition::default()
        };
        let left = FootAbsolutePosition {
            y: 0.1,
            ..FootAbsolutePosition::default()
        };
        let right = FootAbsolutePosition {
            y: -0.1,
            ..FootAbsolutePosition::default()
        };
        (com, left, right)
    }

    #[test]
    fn initializes_a_schedule_from_the_step_stack() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(4), 0.0)
            .unwrap();

        // 4 steps, each a single and a double support, plus the settle tail
        assert_eq!(generator.intervals.len(), 9);
        assert_eq!(generator.supports.len(), 5);
        // the first step lands to the right, so the walk starts on the left
        assert_eq!(generator.supports[0].side, Side::Left);
        assert!((generator.upper_time_limit - (4.0 * 0.8 + 1.6)).abs() < 1e-9);
    }

    #[test]
    fn supports_accumulate_the_relative_steps() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(4), 0.0)
            .unwrap();

        let expected_x = [0.0, 0.2, 0.4, 0.6, 0.8];
        for (support, &x) in generator.supports.iter().zip(&expected_x) {
            assert!((support.x - x).abs() < 1e-12);
        }
        // feet alternate between the two lateral lines
        for pair in generator.supports.windows(2) {
            assert!((pair[0].y + pair[1].y).abs() < 1e-12);
        }
    }

    #[test]
    fn emitted_queues_are_synchronized() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(2), 0.0)
            .unwrap();

        let mut queues = TrajectoryQueues::new();
        for k in 1..=200 {
            generator
                .online(f64::from(k) * 0.005, &mut queues)
                .unwrap();
        }

        assert_eq!(queues.zmp.len(), 200);
        assert_eq!(queues.com.len(), 200);
        assert_eq!(queues.left_foot.len(), 200);
        assert_eq!(queues.right_foot.len(), 200);
        for i in 0..200 {
            assert_eq!(queues.zmp[i].time, queues.com[i].time);
            assert_eq!(queues.zmp[i].time, queues.left_foot[i].time);
            assert_eq!(queues.zmp[i].time, queues.right_foot[i].time);
        }
    }

    #[test]
    fn late_change_is_refused_and_stacks_unchanged() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(4), 0.0)
            .unwrap();

        let mut queues = TrajectoryQueues::new();
        generator.online(0.68, &mut queues).unwrap();
        let supports_before: Vec<f64> = generator.supports.iter().map(|s| s.x).collect();

        // 0.02 s before the swing ends is too late
        let result = generator.online_foot_change(
            0.68,
            LandingTarget {
                x: 0.3,
                y: -0.1,
                yaw: 0.0,
            },
            Frame::Absolute,
            true,
        );

        let error = result.unwrap_err();
        assert_eq!(error.code(), -2);
        let supports_after: Vec<f64> = generator.supports.iter().map(|s| s.x).collect();
        assert_eq!(supports_before, supports_after);
    }

    #[test]
    fn editing_a_single_support_interval_is_structurally_refused() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(4), 0.0)
            .unwrap();

        // interval 2 is the second single support
        let error = generator
            .change_foot_landing_position(
                0.1,
                &[2],
                &[LandingTarget::default()],
                false,
            )
            .unwrap_err();
        assert_eq!(error.code(), -1);
    }

    #[test]
    fn mid_swing_edit_moves_the_landing() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(4), 0.0)
            .unwrap();

        let mut queues = TrajectoryQueues::new();
        generator.online(0.21, &mut queues).unwrap();

        generator
            .online_foot_change(
                0.21,
                LandingTarget {
                    x: 0.05,
                    y: -0.2,
                    yaw: 0.0,
                },
                Frame::Absolute,
                false,
            )
            .unwrap();

        assert!((generator.supports[1].x - 0.05).abs() < 1e-12);
        // the swing in flight follows the new landing
        while queues.pop_front().is_some() {}
        for k in 43..=160 {
            generator
                .online(f64::from(k) * 0.005, &mut queues)
                .unwrap();
        }
        let right_at_landing = queues
            .right_foot
            .iter()
            .find(|sample| (sample.time - 0.7).abs() < 1e-9)
            .unwrap();
        assert!((right_at_landing.x - 0.05).abs() < 1e-4);
        assert!(right_at_landing.z.abs() < 1e-4);
    }

    #[test]
    fn add_foot_slides_the_window_and_keeps_continuity() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(3), 0.0)
            .unwrap();

        let mut queues = TrajectoryQueues::new();
        generator.online(0.8, &mut queues).unwrap();
        let com_before = generator.trajectory_x.com(0.8);

        generator
            .online_add_foot(RelativeFootPosition {
                dx: 0.2,
                dy: 0.2,
                dyaw: 0.0,
                single_support_duration: 0.7,
                double_support_duration: 0.1,
                step_type: 0,
            })
            .unwrap();

        // the trajectory did not jump at the window boundary
        let com_after = generator.trajectory_x.com(0.8);
        assert!((com_before - com_after).abs() < 1e-9);
        assert_eq!(generator.supports.len(), 4);
        assert_eq!(generator.intervals.len(), 7);
    }

    #[test]
    fn end_phase_brings_the_feet_together() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(2), 0.0)
            .unwrap();
        generator.end_phase_of_the_walking().unwrap();

        let last = generator.supports.last().unwrap();
        let stance = &generator.supports[generator.supports.len() - 2];
        let distance = ((last.x - stance.x).powi(2) + (last.y - stance.y).powi(2)).sqrt();
        assert!((distance - 0.2).abs() < 1e-9);
        assert!(generator.has_ended());
    }

    #[test]
    fn regeneration_deadline_shrinks_as_the_interval_runs_out() {
        let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
        let (com, left, right) = standing_start();
        generator
            .init_online(&com, left, right, &straight_steps(2), 0.0)
            .unwrap();

        let mut queues = TrajectoryQueues::new();
        generator.online(0.1, &mut queues).unwrap();
        let early = generator.optimal_time_to_regenerate_step();
        generator.online(0.5, &mut queues).unwrap();
        let late = generator.optimal_time_to_regenerate_step();

        assert!(early > late);
        assert!(early <= (0.7_f64 / 0.005) as usize);
    }
}
