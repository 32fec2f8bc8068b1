//! # Polynomial
//!
//! Scalar polynomials fitted from boundary conditions, used to interpolate
//! trajectory segments between two known states.
//!
//! All fits share the same convention: the segment lives on `t ∈ [0, T]`,
//! the caller provides the state at both ends and this crate produces the
//! unique polynomial of the matching degree. Evaluation does not clamp `t`;
//! clamping to the segment is the caller's responsibility.

/// Durations below this are degenerate and collapse the fit to a constant.
const MIN_DURATION: f64 = 1e-8;

/// A scalar polynomial over a bounded time segment.
///
/// Coefficients are stored lowest degree first, so `coefficients[k]` is the
/// factor of `t^k`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
    duration: f64,
}

impl Polynomial {
    /// A constant polynomial, used for segments where nothing moves.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            coefficients: vec![value],
            duration: 0.0,
        }
    }

    /// Build a polynomial directly from its coefficients, lowest degree first.
    #[must_use]
    pub fn from_coefficients(coefficients: Vec<f64>, duration: f64) -> Self {
        debug_assert!(!coefficients.is_empty());
        Self {
            coefficients,
            duration,
        }
    }

    /// Fit a cubic from positions and velocities at both ends.
    ///
    /// Satisfies `p(0) = start`, `ṗ(0) = start_velocity`, `p(T) = end` and
    /// `ṗ(T) = end_velocity`.
    #[must_use]
    pub fn cubic(
        duration: f64,
        start: f64,
        start_velocity: f64,
        end: f64,
        end_velocity: f64,
    ) -> Self {
        if duration < MIN_DURATION {
            return Self::constant(start);
        }

        let a2 = (3.0 * (end - start) - (2.0 * start_velocity + end_velocity) * duration)
            / (duration * duration);
        let a3 = ((start_velocity + end_velocity) * duration - 2.0 * (end - start))
            / (duration * duration * duration);

        Self {
            coefficients: vec![start, start_velocity, a2, a3],
            duration,
        }
    }

    /// Fit a quintic from position, velocity and acceleration at both ends.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn quintic(
        duration: f64,
        start: f64,
        start_velocity: f64,
        start_acceleration: f64,
        end: f64,
        end_velocity: f64,
        end_acceleration: f64,
    ) -> Self {
        if duration < MIN_DURATION {
            return Self::constant(start);
        }

        let t = duration;
        let t2 = t * t;
        let t3 = t2 * t;
        let t4 = t3 * t;
        let t5 = t4 * t;

        let a0 = start;
        let a1 = start_velocity;
        let a2 = start_acceleration / 2.0;

        let a3 = (20.0 * (end - start)
            - (8.0 * end_velocity + 12.0 * start_velocity) * t
            - (3.0 * start_acceleration - end_acceleration) * t2)
            / (2.0 * t3);
        let a4 = (30.0 * (start - end)
            + (14.0 * end_velocity + 16.0 * start_velocity) * t
            + (3.0 * start_acceleration - 2.0 * end_acceleration) * t2)
            / (2.0 * t4);
        let a5 = (12.0 * (end - start)
            - 6.0 * (end_velocity + start_velocity) * t
            - (start_acceleration - end_acceleration) * t2)
            / (2.0 * t5);

        Self {
            coefficients: vec![a0, a1, a2, a3, a4, a5],
            duration,
        }
    }

    /// Fit a quartic that passes through an apex at mid-segment.
    ///
    /// Satisfies `p(0) = start`, `ṗ(0) = start_velocity`, `p(T/2) = apex`,
    /// `p(T) = end` and `ṗ(T) = 0`. Like [`Self::quintic_apex`] but without
    /// the zero initial curvature, giving a slightly brisker lift.
    #[must_use]
    pub fn quartic_apex(
        duration: f64,
        start: f64,
        start_velocity: f64,
        apex: f64,
        end: f64,
    ) -> Self {
        if duration < MIN_DURATION {
            return Self::constant(start);
        }

        let t = duration;
        let mid_offset = apex - start - start_velocity * t / 2.0;
        let end_offset = end - start - start_velocity * t;
        let end_slope = -start_velocity * t;

        let x = end_slope + 16.0 * mid_offset - 5.0 * end_offset;
        let y = -32.0 * mid_offset + 14.0 * end_offset - 3.0 * end_slope;
        let z = 16.0 * mid_offset - 8.0 * end_offset + 2.0 * end_slope;

        let t2 = t * t;
        let t3 = t2 * t;
        let t4 = t3 * t;

        Self {
            coefficients: vec![start, start_velocity, x / t2, y / t3, z / t4],
            duration,
        }
    }

    /// Fit a quintic that passes through an apex at mid-segment.
    ///
    /// Satisfies `p(0) = start`, `ṗ(0) = start_velocity`, `p̈(0) = 0`,
    /// `p(T/2) = apex`, `p(T) = end` and `ṗ(T) = 0`. This is the shape used
    /// for the vertical axis of a swing foot: lift, clear, touch down.
    #[must_use]
    pub fn quintic_apex(
        duration: f64,
        start: f64,
        start_velocity: f64,
        apex: f64,
        end: f64,
    ) -> Self {
        if duration < MIN_DURATION {
            return Self::constant(start);
        }

        let t = duration;
        let mid_offset = apex - start - start_velocity * t / 2.0;
        let end_offset = end - start - start_velocity * t;
        let end_slope = -start_velocity * t;

        // with x = a3·T³, y = a4·T⁴, z = a5·T⁵ the three remaining conditions
        // reduce to a small triangular system
        let x = end_slope + 32.0 * mid_offset - 6.0 * end_offset;
        let y = -64.0 * mid_offset + 17.0 * end_offset - 3.0 * end_slope;
        let z = 32.0 * mid_offset - 10.0 * end_offset + 2.0 * end_slope;

        let t3 = t * t * t;
        let t4 = t3 * t;
        let t5 = t4 * t;

        Self {
            coefficients: vec![start, start_velocity, 0.0, x / t3, y / t4, z / t5],
            duration,
        }
    }

    /// The degree of the polynomial.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// The duration of the segment this polynomial was fitted on.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The coefficients, lowest degree first.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluate the polynomial at `t`.
    #[must_use]
    pub fn value(&self, t: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * t + c)
    }

    /// Evaluate the first derivative at `t`.
    #[must_use]
    pub fn derivative(&self, t: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (k, &c)| acc * t + k as f64 * c)
    }

    /// Evaluate the second derivative at `t`.
    #[must_use]
    pub fn second_derivative(&self, t: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .skip(2)
            .rev()
            .fold(0.0, |acc, (k, &c)| acc * t + (k * (k - 1)) as f64 * c)
    }
}

#[cfg(test)]
mod tests {
    use super::Polynomial;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn cubic_hits_boundary_conditions() {
        let polynomial = Polynomial::cubic(0.7, 0.1, -0.2, 0.4, 0.0);

        assert!((polynomial.value(0.0) - 0.1).abs() < TOLERANCE);
        assert!((polynomial.derivative(0.0) + 0.2).abs() < TOLERANCE);
        assert!((polynomial.value(0.7) - 0.4).abs() < TOLERANCE);
        assert!(polynomial.derivative(0.7).abs() < TOLERANCE);
    }

    #[test]
    fn quintic_hits_boundary_conditions() {
        let polynomial = Polynomial::quintic(0.63, 0.0, 0.1, 0.5, 0.2, 0.0, 0.0);

        assert!(polynomial.value(0.0).abs() < TOLERANCE);
        assert!((polynomial.derivative(0.0) - 0.1).abs() < TOLERANCE);
        assert!((polynomial.second_derivative(0.0) - 0.5).abs() < TOLERANCE);
        assert!((polynomial.value(0.63) - 0.2).abs() < TOLERANCE);
        assert!(polynomial.derivative(0.63).abs() < TOLERANCE);
        assert!(polynomial.second_derivative(0.63).abs() < TOLERANCE);
    }

    #[test]
    fn quintic_apex_reaches_step_height() {
        let polynomial = Polynomial::quintic_apex(0.7, 0.0, 0.0, 0.05, 0.0);

        assert!(polynomial.value(0.0).abs() < TOLERANCE);
        assert!((polynomial.value(0.35) - 0.05).abs() < TOLERANCE);
        assert!(polynomial.value(0.7).abs() < TOLERANCE);
        assert!(polynomial.derivative(0.7).abs() < TOLERANCE);

        // the apex is the maximum of the whole segment
        for k in 0..=70 {
            let t = f64::from(k) * 0.01;
            assert!(polynomial.value(t) <= 0.05 + TOLERANCE);
        }
    }

    #[test]
    fn quartic_apex_hits_boundary_conditions() {
        let polynomial = Polynomial::quartic_apex(0.7, 0.01, 0.1, 0.05, 0.0);

        assert!((polynomial.value(0.0) - 0.01).abs() < TOLERANCE);
        assert!((polynomial.derivative(0.0) - 0.1).abs() < TOLERANCE);
        assert!((polynomial.value(0.35) - 0.05).abs() < TOLERANCE);
        assert!(polynomial.value(0.7).abs() < TOLERANCE);
        assert!(polynomial.derivative(0.7).abs() < TOLERANCE);
    }

    #[test]
    fn degenerate_duration_collapses_to_constant() {
        let polynomial = Polynomial::cubic(1e-12, 0.3, 1.0, 0.9, 0.0);

        assert_eq!(polynomial.degree(), 0);
        assert!((polynomial.value(0.5) - 0.3).abs() < TOLERANCE);
        assert!(polynomial.derivative(0.5).abs() < TOLERANCE);
    }

    #[test]
    fn derivative_matches_finite_differences() {
        let polynomial = Polynomial::quintic(0.9, 0.1, 0.3, -0.2, 0.6, 0.0, 0.0);

        let h = 1e-6;
        for k in 1..9 {
            let t = f64::from(k) * 0.1;
            let numeric = (polynomial.value(t + h) - polynomial.value(t - h)) / (2.0 * h);
            assert!((polynomial.derivative(t) - numeric).abs() < 1e-6);
        }
    }
}
