//! # Sleipnir
//!
//! Online walking pattern generation for biped humanoid robots: given a
//! stream of footsteps or a reference velocity, produce synchronized
//! reference trajectories for the pressure point, the center of mass and
//! both feet, one sample per control tick.
//!
//! Two cores are available behind the same contract:
//!
//! - [`AnalyticalPatternGenerator`] solves the whole footstep sequence in
//!   closed form and supports editing future landings mid-walk.
//! - [`MpcPatternGenerator`] tracks a reference velocity with a rolling
//!   quadratic program that also decides the foot placements.
//!
//! Only one core is active at a time; [`PatternGenerator`] is the tagged
//! variant an application switches between them with.

pub mod analytical;
pub mod config;
pub mod error;
pub mod foot_trajectory;
pub mod math;
pub mod mpc;
pub mod types;

pub use analytical::{AnalyticalPatternGenerator, Frame};
pub use config::WalkConfig;
pub use error::{Error, Result};
pub use foot_trajectory::{FootTrajectoryGenerator, LandingTarget};
pub use mpc::MpcPatternGenerator;
pub use types::{
    ComPosition, FootAbsolutePosition, ReferenceVelocity, RelativeFootPosition, Side,
    SupportPhase, SupportState, TrajectoryQueues, ZmpPosition,
};

/// The active pattern generation core.
///
/// Both cores share the same lifecycle: initialize from a known stance,
/// advance tick by tick, feed new footsteps or landing changes, end the
/// walk. Operations that only one core supports degrade explicitly rather
/// than silently: asking the velocity core to move a specific landing is an
/// error, because its optimizer owns the foot placements.
pub enum PatternGenerator {
    Analytical(Box<AnalyticalPatternGenerator>),
    Mpc(Box<MpcPatternGenerator>),
}

impl PatternGenerator {
    /// Start a walk from the given stance and center of mass state.
    ///
    /// The analytical core consumes the footstep stack; the velocity core
    /// ignores it (its optimizer decides the placements) and keeps the
    /// usual two squaring-up steps for stopping.
    pub fn init(
        &mut self,
        com: &ComPosition,
        left_foot: FootAbsolutePosition,
        right_foot: FootAbsolutePosition,
        steps: &[RelativeFootPosition],
        time: f64,
    ) -> Result<()> {
        match self {
            PatternGenerator::Analytical(generator) => {
                generator.init_online(com, left_foot, right_foot, steps, time)
            }
            PatternGenerator::Mpc(generator) => {
                generator.init_online(com, left_foot, right_foot, 2, time);
                Ok(())
            }
        }
    }

    /// Advance the generator and append freshly generated samples.
    ///
    /// For the analytical core `time` is the controller clock to emit up
    /// to; the velocity core generates one preview period per call.
    pub fn tick(&mut self, time: f64, queues: &mut TrajectoryQueues) -> Result<()> {
        match self {
            PatternGenerator::Analytical(generator) => generator.online(time, queues),
            PatternGenerator::Mpc(generator) => generator.tick(queues),
        }
    }

    /// Feed one more footstep.
    pub fn add_foot(&mut self, step: RelativeFootPosition) -> Result<()> {
        match self {
            PatternGenerator::Analytical(generator) => generator.online_add_foot(step),
            PatternGenerator::Mpc(generator) => {
                generator.add_steps(1);
                Ok(())
            }
        }
    }

    /// Move the landing position of the upcoming step.
    pub fn change_foot(
        &mut self,
        time: f64,
        new_position: LandingTarget,
        frame: Frame,
    ) -> Result<()> {
        match self {
            PatternGenerator::Analytical(generator) => {
                generator.online_foot_change(time, new_position, frame, true)
            }
            // the optimizer owns the landings of the velocity core
            PatternGenerator::Mpc(_) => Err(Error::WrongFootType { interval: 0 }),
        }
    }

    /// End the walk: bring the feet together and let the motion settle.
    pub fn end(&mut self) -> Result<()> {
        match self {
            PatternGenerator::Analytical(generator) => generator.end_phase_of_the_walking(),
            PatternGenerator::Mpc(generator) => {
                generator.set_reference(ReferenceVelocity::default());
                Ok(())
            }
        }
    }
}
