//! Model-predictive pattern generation from a reference velocity.
//!
//! Every tick formulates a quadratic program over a rolling horizon of `N`
//! preview samples: the decision variables are the jerks of the center of
//! mass on both axes plus the landing positions of the previewed steps. The
//! objective trades off jerk, reference velocity tracking and centering the
//! pressure point under the stance foot; the constraints keep the pressure
//! point inside the support polygon and the landings inside the reachable
//! region of the swing foot.

pub mod fsm;
pub mod inequalities;
pub mod qp;

use nalgebra::{DMatrix, DVector, Vector3};
use tracing::debug;

use crate::{
    config::WalkConfig,
    error::Result,
    foot_trajectory::{FootTrajectoryGenerator, LandingTarget},
    types::{
        ComPosition, FootAbsolutePosition, ReferenceVelocity, Side, SupportPhase, SupportState,
        TrajectoryQueues, ZmpPosition, STEP_TYPE_REST,
    },
};

use fsm::SupportFsm;
use inequalities::{FeetInequalities, InequalityKind};
use qp::{ActiveSetSolver, QpProblem, QpSolver, Target};

/// Velocity-reference pattern generator.
pub struct MpcPatternGenerator {
    config: WalkConfig,
    fsm: SupportFsm,
    inequalities: FeetInequalities,
    problem: QpProblem,
    solver: Box<dyn QpSolver>,
    foot_generator: FootTrajectoryGenerator,

    reference: ReferenceVelocity,
    support: SupportState,
    com_x: Vector3<f64>,
    com_y: Vector3<f64>,
    yaw: f64,
    left_foot: FootAbsolutePosition,
    right_foot: FootAbsolutePosition,
    time: f64,
    initialized: bool,

    // rollout matrices, fixed once the horizon and heights are known
    u_velocity: DMatrix<f64>,
    s_velocity: DMatrix<f64>,
    u_cop: DMatrix<f64>,
    s_cop: DMatrix<f64>,
    /// Invariant diagonal block of the Hessian.
    invariant_q: DMatrix<f64>,
}

impl MpcPatternGenerator {
    #[must_use]
    pub fn new(config: WalkConfig) -> Self {
        let fsm = SupportFsm::new(
            config.timing.single_support_duration,
            config.timing.double_support_duration,
            config.preview.stationary_threshold,
        );
        let inequalities = FeetInequalities::new(&config.feet);
        let foot_generator = FootTrajectoryGenerator::new(
            config.feet.step_height,
            config.feet.back,
            config.feet.height,
            config.feet.front,
        );

        let mut generator = Self {
            config,
            fsm,
            inequalities,
            problem: QpProblem::new(),
            solver: Box::new(ActiveSetSolver::default()),
            foot_generator,
            reference: ReferenceVelocity::default(),
            support: SupportState::default(),
            com_x: Vector3::zeros(),
            com_y: Vector3::zeros(),
            yaw: 0.0,
            left_foot: FootAbsolutePosition::default(),
            right_foot: FootAbsolutePosition::default(),
            time: 0.0,
            initialized: false,
            u_velocity: DMatrix::zeros(0, 0),
            s_velocity: DMatrix::zeros(0, 0),
            u_cop: DMatrix::zeros(0, 0),
            s_cop: DMatrix::zeros(0, 0),
            invariant_q: DMatrix::zeros(0, 0),
        };
        generator.build_invariant_part();
        generator
    }

    /// Replace the solver kernel.
    pub fn set_solver(&mut self, solver: Box<dyn QpSolver>) {
        self.solver = solver;
    }

    pub fn set_reference(&mut self, reference: ReferenceVelocity) {
        self.reference = reference;
    }

    #[must_use]
    pub fn reference(&self) -> ReferenceVelocity {
        self.reference
    }

    #[must_use]
    pub fn support(&self) -> &SupportState {
        &self.support
    }

    #[must_use]
    pub fn problem(&self) -> &QpProblem {
        &self.problem
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Rollout matrices mapping the stacked jerks and the initial state to
    /// previewed velocities and pressure points. They only depend on the
    /// horizon, the preview period and the pendulum, so they are built once.
    fn build_invariant_part(&mut self) {
        let n = self.config.preview.horizon;
        let t = self.config.preview.period;
        let height_over_gravity = self.config.pendulum.com_height / self.config.pendulum.gravity;

        self.u_velocity = DMatrix::from_fn(n, n, |i, j| {
            if j <= i {
                (2 * (i - j) + 1) as f64 * t * t * 0.5
            } else {
                0.0
            }
        });
        self.s_velocity = DMatrix::from_fn(n, 3, |i, column| match column {
            0 => 0.0,
            1 => 1.0,
            _ => (i + 1) as f64 * t,
        });

        self.u_cop = DMatrix::from_fn(n, n, |i, j| {
            if j <= i {
                let lag = (i - j) as f64;
                (1.0 + 3.0 * lag + 3.0 * lag * lag) * t * t * t / 6.0 - t * height_over_gravity
            } else {
                0.0
            }
        });
        self.s_cop = DMatrix::from_fn(n, 3, |i, column| {
            let horizon_time = (i + 1) as f64 * t;
            match column {
                0 => 1.0,
                1 => horizon_time,
                _ => horizon_time * horizon_time * 0.5 - height_over_gravity,
            }
        });

        let jerk = DMatrix::identity(n, n) * self.config.preview.jerk_weight;
        let velocity =
            self.u_velocity.transpose() * &self.u_velocity * self.config.preview.velocity_weight;
        let centering =
            self.u_cop.transpose() * &self.u_cop * self.config.preview.centering_weight;
        self.invariant_q = jerk + velocity + centering;
    }

    /// Start a walk from a known stance.
    ///
    /// `stopping_steps` is how many squaring-up steps the robot still takes
    /// after the reference velocity drops to zero, usually two.
    pub fn init_online(
        &mut self,
        com: &ComPosition,
        left_foot: FootAbsolutePosition,
        right_foot: FootAbsolutePosition,
        stopping_steps: usize,
        time: f64,
    ) {
        self.com_x = Vector3::new(com.position.x, com.velocity.x, com.acceleration.x);
        self.com_y = Vector3::new(com.position.y, com.velocity.y, com.acceleration.y);
        self.yaw = com.yaw;
        self.left_foot = left_foot;
        self.right_foot = right_foot;
        self.time = time;

        self.support = self.fsm.initial_state(time, Side::Left, stopping_steps);
        let stance = self.stance_position();
        self.support.x = stance.x;
        self.support.y = stance.y;
        self.support.yaw = stance.theta;
        self.initialized = true;
    }

    fn stance_position(&self) -> FootAbsolutePosition {
        match self.support.foot {
            Side::Left => self.left_foot,
            Side::Right => self.right_foot,
        }
    }

    /// Preview the support states over the horizon.
    fn preview_support_states(&self) -> Vec<SupportState> {
        let n = self.config.preview.horizon;
        let mut states = Vec::with_capacity(n + 1);
        let mut state = self.support;
        state.step_number = 0;
        states.push(state);

        for sample in 1..=n {
            let preview_time = self.time + sample as f64 * self.config.preview.period;
            self.fsm.set_support_state(preview_time, &mut state, &self.reference);
            if state.state_changed && state.phase == SupportPhase::Single {
                // previewed steps rotate with the commanded turn rate
                state.yaw += self.reference.turn * self.config.timing.single_support_duration;
            }
            states.push(state);
        }

        states
    }

    /// Reference velocity rotated into the world frame at every previewed
    /// sample.
    fn global_reference(&self) -> (DVector<f64>, DVector<f64>) {
        let n = self.config.preview.horizon;
        let t = self.config.preview.period;

        let mut x = DVector::zeros(n);
        let mut y = DVector::zeros(n);
        for i in 0..n {
            let yaw = self.yaw + self.reference.turn * i as f64 * t;
            x[i] = self.reference.forward * yaw.cos() - self.reference.lateral * yaw.sin();
            y[i] = self.reference.lateral * yaw.cos() + self.reference.forward * yaw.sin();
        }
        (x, y)
    }

    /// Assemble and solve the per-tick problem; returns the first previewed
    /// landing position, if any step is previewed.
    fn solve_problem(&mut self, states: &[SupportState]) -> Result<Option<(f64, f64)>> {
        let n = self.config.preview.horizon;
        let steps = states.last().map_or(0, |state| state.step_number);
        let variables = 2 * n + 2 * steps;
        let hull_edges = 4;
        let foothold_edges = 5;
        let constraints = hull_edges * n + foothold_edges * steps;

        self.problem.set_dimensions(variables, constraints, 0);

        // selector of the foot under each previewed sample
        let mut current_selector = DVector::zeros(n);
        let mut step_selector = DMatrix::zeros(n, steps.max(1));
        for i in 0..n {
            let step = states[i + 1].step_number;
            if step == 0 {
                current_selector[i] = 1.0;
            } else {
                step_selector[(i, step - 1)] = 1.0;
            }
        }

        let gamma = self.config.preview.centering_weight;
        let beta = self.config.preview.velocity_weight;

        // invariant diagonal blocks
        self.problem
            .add_matrix_term(&self.invariant_q, Target::MatrixQ, 0, 0);
        self.problem
            .add_matrix_term(&self.invariant_q, Target::MatrixQ, n, n);

        let (reference_x, reference_y) = self.global_reference();
        let state_x = self.com_x;
        let state_y = self.com_y;
        let stance = self.stance_position();

        // velocity tracking gradient
        let velocity_residual_x =
            &self.s_velocity * state_x - &reference_x;
        let velocity_residual_y =
            &self.s_velocity * state_y - &reference_y;
        self.problem.add_vector_term(
            &(self.u_velocity.transpose() * velocity_residual_x * beta),
            Target::VectorD,
            0,
        );
        self.problem.add_vector_term(
            &(self.u_velocity.transpose() * velocity_residual_y * beta),
            Target::VectorD,
            n,
        );

        // pressure centering residual against the stance foot
        let centering_residual_x =
            &self.s_cop * state_x - &current_selector * stance.x;
        let centering_residual_y =
            &self.s_cop * state_y - &current_selector * stance.y;
        self.problem.add_vector_term(
            &(self.u_cop.transpose() * &centering_residual_x * gamma),
            Target::VectorD,
            0,
        );
        self.problem.add_vector_term(
            &(self.u_cop.transpose() * &centering_residual_y * gamma),
            Target::VectorD,
            n,
        );

        if steps > 0 {
            let cross = self.u_cop.transpose() * &step_selector * -gamma;
            self.problem.add_matrix_term(&cross, Target::MatrixQ, 0, 2 * n);
            self.problem.add_matrix_term(&cross, Target::MatrixQ, n, 2 * n + steps);
            let cross_t = cross.transpose();
            self.problem.add_matrix_term(&cross_t, Target::MatrixQ, 2 * n, 0);
            self.problem
                .add_matrix_term(&cross_t, Target::MatrixQ, 2 * n + steps, n);

            let feet_block = step_selector.transpose() * &step_selector * gamma;
            self.problem
                .add_matrix_term(&feet_block, Target::MatrixQ, 2 * n, 2 * n);
            self.problem
                .add_matrix_term(&feet_block, Target::MatrixQ, 2 * n + steps, 2 * n + steps);

            self.problem.add_vector_term(
                &(step_selector.transpose() * centering_residual_x * -gamma),
                Target::VectorD,
                2 * n,
            );
            self.problem.add_vector_term(
                &(step_selector.transpose() * centering_residual_y * -gamma),
                Target::VectorD,
                2 * n + steps,
            );
        }

        self.add_cop_constraints(states, &current_selector, &step_selector, steps);
        self.add_foothold_constraints(states, steps);

        self.problem.solve(self.solver.as_mut())?;

        let solution = self.problem.solution();
        Ok((steps > 0).then(|| (solution[2 * n], solution[2 * n + steps])))
    }

    /// One row per hull edge per previewed sample, keeping the pressure
    /// point inside the support polygon around the active stance.
    fn add_cop_constraints(
        &mut self,
        states: &[SupportState],
        current_selector: &DVector<f64>,
        step_selector: &DMatrix<f64>,
        steps: usize,
    ) {
        let n = self.config.preview.horizon;
        let stance = self.stance_position();
        let mut row = 0;

        for i in 0..n {
            let state = &states[i + 1];
            let planes = self.inequalities.half_planes(InequalityKind::Cop, state);

            for plane in planes {
                // a·(zx − fx) + b·(zy − fy) ≤ d over the decision vector
                for j in 0..n {
                    self.problem
                        .add_constraint_coefficient(row, j, plane.a * self.u_cop[(i, j)]);
                    self.problem
                        .add_constraint_coefficient(row, n + j, plane.b * self.u_cop[(i, j)]);
                }
                for m in 0..steps {
                    let selected = step_selector[(i, m)];
                    self.problem
                        .add_constraint_coefficient(row, 2 * n + m, -plane.a * selected);
                    self.problem
                        .add_constraint_coefficient(row, 2 * n + steps + m, -plane.b * selected);
                }

                let rollout_x = (self.s_cop.row(i) * self.com_x)[(0, 0)];
                let rollout_y = (self.s_cop.row(i) * self.com_y)[(0, 0)];
                let known_x = rollout_x - current_selector[i] * stance.x;
                let known_y = rollout_y - current_selector[i] * stance.y;
                self.problem
                    .set_constraint_bound(row, plane.d - plane.a * known_x - plane.b * known_y);
                row += 1;
            }
        }
    }

    /// One row per foothold edge per previewed step, keeping each landing
    /// inside the reachable region of its stance foot.
    fn add_foothold_constraints(&mut self, states: &[SupportState], steps: usize) {
        let n = self.config.preview.horizon;
        let stance = self.stance_position();
        let mut row = 4 * n;

        for step in 1..=steps {
            // the landing region is attached to the foot the robot stands on
            // while placing this step, previewed one step earlier
            let placing = states
                .iter()
                .find(|state| state.step_number == step - 1)
                .copied()
                .unwrap_or(*states.first().expect("preview is never empty"));
            let planes = self.inequalities.half_planes(InequalityKind::Feet, &placing);

            for plane in planes {
                let m = step - 1;
                self.problem.add_constraint_coefficient(row, 2 * n + m, plane.a);
                self.problem
                    .add_constraint_coefficient(row, 2 * n + steps + m, plane.b);

                let bound = if m == 0 {
                    // relative to the current stance foot
                    plane.d + plane.a * stance.x + plane.b * stance.y
                } else {
                    self.problem
                        .add_constraint_coefficient(row, 2 * n + m - 1, -plane.a);
                    self.problem
                        .add_constraint_coefficient(row, 2 * n + steps + m - 1, -plane.b);
                    plane.d
                };
                self.problem.set_constraint_bound(row, bound);
                row += 1;
            }
        }
    }

    /// Where the swing foot must land once the optimizer no longer decides:
    /// beside the stance foot, at the configured final distance.
    fn resting_target(&self) -> (f64, f64) {
        let sign = match self.support.foot {
            Side::Left => 1.0,
            Side::Right => -1.0,
        };
        let distance = self.config.feet.final_stance_distance;
        (
            self.support.x + sign * self.support.yaw.sin() * distance,
            self.support.y - sign * self.support.yaw.cos() * distance,
        )
    }

    /// Run one preview period: preview, solve, interpolate, advance.
    pub fn tick(&mut self, queues: &mut TrajectoryQueues) -> Result<()> {
        if !self.initialized {
            return Err(crate::error::Error::NotInitialized);
        }

        let states = self.preview_support_states();
        let landing = self.solve_problem(&states)?;

        let n = self.config.preview.horizon;
        let jerk_x = self.problem.solution()[0];
        let jerk_y = self.problem.solution()[n];
        debug!(time = self.time, jerk_x, jerk_y, "preview solved");

        let landing = match landing {
            Some(landing) if self.support.steps_left > 0 => landing,
            _ => self.resting_target(),
        };

        self.interpolate(jerk_x, jerk_y, landing, queues);
        self.advance_support();
        Ok(())
    }

    /// Integrate the first previewed jerk over one preview period, emitting
    /// one sample per control tick on all queues.
    fn interpolate(
        &mut self,
        jerk_x: f64,
        jerk_y: f64,
        landing: (f64, f64),
        queues: &mut TrajectoryQueues,
    ) {
        let dt = self.config.timing.sampling_period;
        let samples = (self.config.preview.period / dt).round() as usize;
        let height_over_gravity = self.config.pendulum.com_height / self.config.pendulum.gravity;

        let in_single_support = self.support.phase == SupportPhase::Single;
        let walk_over = self.support.steps_left == 0
            && self
                .reference
                .is_stationary(self.config.preview.stationary_threshold)
            && !in_single_support;

        let swing_start = self.support.time_limit - self.config.timing.single_support_duration;
        if in_single_support {
            let elapsed = self.time - swing_start;
            let swing = match self.support.foot {
                Side::Left => self.right_foot,
                Side::Right => self.left_foot,
            };
            let target = LandingTarget {
                x: landing.0,
                y: landing.1,
                yaw: self.support.yaw,
            };
            if elapsed <= dt {
                self.foot_generator.begin_swing(
                    self.config.timing.single_support_duration,
                    &swing,
                    target,
                );
            } else {
                self.foot_generator.retarget(elapsed, &swing, target);
            }
        }

        for k in 1..=samples {
            let time = self.time + k as f64 * dt;

            // constant jerk integration over one control tick
            for (state, jerk) in [(&mut self.com_x, jerk_x), (&mut self.com_y, jerk_y)] {
                let position = state.x + state.y * dt + state.z * dt * dt / 2.0
                    + jerk * dt * dt * dt / 6.0;
                let velocity = state.y + state.z * dt + jerk * dt * dt / 2.0;
                let acceleration = state.z + jerk * dt;
                *state = Vector3::new(position, velocity, acceleration);
            }
            self.yaw += self.reference.turn * dt;

            queues.com.push_back(ComPosition {
                position: Vector3::new(self.com_x.x, self.com_y.x, self.config.pendulum.com_height),
                velocity: Vector3::new(self.com_x.y, self.com_y.y, 0.0),
                acceleration: Vector3::new(self.com_x.z, self.com_y.z, 0.0),
                yaw: self.yaw,
                yaw_rate: self.reference.turn,
                time,
            });
            queues.zmp.push_back(ZmpPosition {
                x: self.com_x.x - height_over_gravity * self.com_x.z,
                y: self.com_y.x - height_over_gravity * self.com_y.z,
                z: 0.0,
                yaw: self.yaw,
                time,
            });

            let (left, right) = if walk_over {
                (
                    FootTrajectoryGenerator::support_sample(&self.left_foot, time, STEP_TYPE_REST),
                    FootTrajectoryGenerator::support_sample(&self.right_foot, time, STEP_TYPE_REST),
                )
            } else if in_single_support {
                let elapsed = time - swing_start;
                match self.support.foot {
                    Side::Left => (
                        FootTrajectoryGenerator::support_sample(&self.left_foot, time, -1),
                        self.foot_generator
                            .swing_sample(elapsed, &self.right_foot, time, 1),
                    ),
                    Side::Right => (
                        self.foot_generator
                            .swing_sample(elapsed, &self.left_foot, time, 1),
                        FootTrajectoryGenerator::support_sample(&self.right_foot, time, -1),
                    ),
                }
            } else {
                (
                    FootTrajectoryGenerator::support_sample(&self.left_foot, time, -1),
                    FootTrajectoryGenerator::support_sample(&self.right_foot, time, -1),
                )
            };

            self.left_foot = left;
            self.right_foot = right;
            queues.left_foot.push_back(left);
            queues.right_foot.push_back(right);
        }

        self.time += samples as f64 * dt;
    }

    /// Advance the real support state past the tick that was just emitted.
    fn advance_support(&mut self) {
        let mut state = self.support;
        self.fsm
            .set_support_state(self.time, &mut state, &self.reference);

        if state.state_changed && state.phase == SupportPhase::Single {
            // the new stance foot is wherever that foot currently stands
            let stance = match state.foot {
                Side::Left => self.left_foot,
                Side::Right => self.right_foot,
            };
            state.x = stance.x;
            state.y = stance.y;
            state.yaw = stance.theta;
        }

        self.support = state;
    }

    /// Grant the generator more steps before it is allowed to stop.
    pub fn add_steps(&mut self, steps: usize) {
        self.support.steps_left += steps;
    }

    /// Textual command dispatch, e.g. `:setfeetconstraint XY 0.04 0.04`.
    pub fn dispatch_command(&mut self, method: &str, arguments: &str) {
        self.inequalities.dispatch_command(method, arguments);
    }
}
