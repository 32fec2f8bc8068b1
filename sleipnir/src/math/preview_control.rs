use nalgebra::{Matrix3, RowVector3, Vector3};

/// Discrete LQ preview controller over the cart-table model.
///
/// The state is `(position, velocity, acceleration)` of the center of mass
/// on one axis, the control is the jerk, and the output is the pressure
/// point `z = c − (h/g)·c̈`. Given a window of future reference values the
/// controller steers the output along the reference while keeping the state
/// smooth, which is exactly what is needed to absorb a reference
/// discontinuity over a short horizon.
#[derive(Debug, Clone)]
pub struct PreviewController {
    a: Matrix3<f64>,
    b: Vector3<f64>,
    c: RowVector3<f64>,
    /// State feedback gain.
    gain: RowVector3<f64>,
    /// Feedforward gains over the preview window, nearest sample first.
    preview_gains: Vec<f64>,
    period: f64,
}

impl PreviewController {
    /// Build the controller for a sampling `period`, a pendulum of height
    /// `com_height` under `gravity`, and a preview window of
    /// `window` samples.
    #[must_use]
    pub fn new(period: f64, com_height: f64, gravity: f64, window: usize) -> Self {
        let t = period;
        let a = Matrix3::new(
            1.0,
            t,
            t * t / 2.0,
            0.0,
            1.0,
            t,
            0.0,
            0.0,
            1.0,
        );
        let b = Vector3::new(t * t * t / 6.0, t * t / 2.0, t);
        let c = RowVector3::new(1.0, 0.0, -com_height / gravity);

        let output_weight = 1.0;
        let control_weight = 1e-6;

        let riccati = solve_riccati(&a, &b, &c, output_weight, control_weight);
        let denominator = control_weight + (b.transpose() * riccati * b)[(0, 0)];
        let gain = (b.transpose() * riccati * a) / denominator;

        // feedforward over the window, propagated through the closed loop
        let closed_loop = a - b * gain;
        let mut propagated = c.transpose() * output_weight;
        let mut preview_gains = Vec::with_capacity(window);
        for _ in 0..window {
            preview_gains.push((b.transpose() * propagated)[(0, 0)] / denominator);
            propagated = closed_loop.transpose() * propagated;
        }

        Self {
            a,
            b,
            c,
            gain,
            preview_gains,
            period,
        }
    }

    /// Number of future reference samples the controller looks at.
    #[must_use]
    pub fn window(&self) -> usize {
        self.preview_gains.len()
    }

    #[must_use]
    pub fn period(&self) -> f64 {
        self.period
    }

    /// The output (pressure point) of a state.
    #[must_use]
    pub fn output(&self, state: &Vector3<f64>) -> f64 {
        (self.c * state)[(0, 0)]
    }

    /// Advance the state by one period, tracking the reference window.
    ///
    /// `reference` holds the upcoming reference values; missing samples at
    /// the end of the window are padded with the last available value.
    pub fn step(&self, state: &mut Vector3<f64>, reference: &[f64]) {
        let last = reference.last().copied().unwrap_or_default();
        let feedforward: f64 = self
            .preview_gains
            .iter()
            .enumerate()
            .map(|(j, gain)| gain * reference.get(j).copied().unwrap_or(last))
            .sum();

        let control = -(self.gain * *state)[(0, 0)] + feedforward;
        *state = self.a * *state + self.b * control;
    }
}

/// Fixed-point iteration of the discrete algebraic Riccati equation.
fn solve_riccati(
    a: &Matrix3<f64>,
    b: &Vector3<f64>,
    c: &RowVector3<f64>,
    output_weight: f64,
    control_weight: f64,
) -> Matrix3<f64> {
    let state_cost = c.transpose() * output_weight * c;
    let mut riccati = state_cost;

    for _ in 0..10_000 {
        let denominator = control_weight + (b.transpose() * riccati * b)[(0, 0)];
        let next = a.transpose() * riccati * a
            - (a.transpose() * riccati * b) * (b.transpose() * riccati * a) / denominator
            + state_cost;

        let delta = (next - riccati).norm();
        riccati = next;
        if delta < 1e-12 {
            break;
        }
    }

    riccati
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_a_constant_reference() {
        let controller = PreviewController::new(0.005, 0.814, 9.81, 320);
        let mut state = Vector3::zeros();
        let reference = vec![0.1; 640];

        for k in 0..600 {
            controller.step(&mut state, &reference[k.min(reference.len() - 320)..]);
        }

        assert!((controller.output(&state) - 0.1).abs() < 1e-3);
        // velocity settles once the output reached the reference
        assert!(state.y.abs() < 1e-2);
    }

    #[test]
    fn absorbs_a_step_in_the_reference() {
        let controller = PreviewController::new(0.005, 0.814, 9.81, 320);
        let mut state = Vector3::zeros();

        // reference jumps from 0 to 0.05 halfway through
        let reference: Vec<f64> = (0..1000)
            .map(|k| if k < 300 { 0.0 } else { 0.05 })
            .collect();

        let mut previous = controller.output(&state);
        for k in 0..600 {
            controller.step(&mut state, &reference[k..]);
            let output = controller.output(&state);
            // the realized output never jumps, unlike the reference
            assert!((output - previous).abs() < 5e-3);
            previous = output;
        }

        assert!((controller.output(&state) - 0.05).abs() < 1e-3);
    }
}
