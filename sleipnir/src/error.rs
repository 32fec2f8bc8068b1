use thiserror::Error;

/// Error kinds surfaced by the pattern generators.
///
/// The controller side of the loop traditionally acts on numeric return
/// codes, so every recoverable variant also exposes its legacy code through
/// [`Error::code`].
#[derive(Debug, Error)]
pub enum Error {
    /// An online edit targeted an interval that does not determine a landing
    /// position (only double-support intervals do).
    #[error("interval {interval} is not a double support phase, cannot change the landing there")]
    WrongFootType { interval: usize },

    /// An online edit arrived after the editable window of the current
    /// interval closed.
    #[error("too late to modify the trajectory, only {remaining:.3}s left in the current interval")]
    TooLateForModification { remaining: f64 },

    /// The linear system of the analytical formulation could not be
    /// decomposed.
    #[error("the trajectory system matrix is singular")]
    SingularSystem,

    /// The quadratic program of the predictive formulation did not converge.
    #[error("QP solver failed (ifail = {ifail})")]
    QpFailure { ifail: i32 },

    /// A generator was used before it was initialized.
    #[error("the pattern generator has not been initialized")]
    NotInitialized,

    /// The footstep stack does not hold enough steps to fill the preview
    /// window.
    #[error("not enough footsteps: {available} available, {required} required")]
    NotEnoughSteps { available: usize, required: usize },
}

impl Error {
    /// The numeric return code of the equivalent failure in the legacy
    /// control interface, negative by convention.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Error::WrongFootType { .. } => -1,
            Error::TooLateForModification { .. } => -2,
            Error::SingularSystem | Error::QpFailure { .. } => -3,
            Error::NotInitialized | Error::NotEnoughSteps { .. } => -4,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
