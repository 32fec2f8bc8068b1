use nalgebra::{DMatrix, DVector, Dyn, linalg::LU};
use polynomial::Polynomial;

use crate::error::{Error, Result};

use super::trajectory::{AnalyticalTrajectory, TrajectoryInterval};

/// Boundary conditions of one axis of the analytical trajectory.
///
/// `zmp_profile[j]` is the pressure point value at the *end* of interval
/// `j`; the value at the start of an interval is the end value of the
/// previous one. The very first interval starts at `initial_zmp`, which for
/// a fresh walk equals its end value (the first interval is a single
/// support phase), and after an online re-anchor equals the pressure value
/// the schedule prescribes at the new reference time.
#[derive(Debug, Default, Clone)]
pub struct TrajectoryConditions {
    pub initial_com: f64,
    pub initial_com_velocity: f64,
    pub final_com: f64,
    pub initial_zmp: f64,
    pub zmp_profile: Vec<f64>,
    pub com_heights: Vec<f64>,
    pub zmp_heights: Vec<f64>,
}

impl TrajectoryConditions {
    /// Pressure value at the start of interval `j`.
    #[must_use]
    pub fn zmp_start(&self, j: usize) -> f64 {
        if j == 0 {
            self.initial_zmp
        } else {
            self.zmp_profile[j - 1]
        }
    }

    /// Pressure value at the end of interval `j`.
    #[must_use]
    pub fn zmp_end(&self, j: usize) -> f64 {
        self.zmp_profile[j]
    }
}

/// The block-banded linear system tying the per-interval weights of the
/// analytical trajectory to its boundary conditions.
///
/// For `M` intervals the unknown vector stacks, per interval, the two
/// hyperbolic weights followed by the pressure polynomial coefficients. The
/// rows encode, in order: the initial center of mass position and velocity,
/// then per interval the prescribed pressure value and a zero pressure
/// velocity at both of its ends, per interior boundary the continuity of
/// the center of mass position and velocity, and finally the terminal
/// center of mass position and a zero terminal center of mass velocity.
///
/// Pinning the pressure value *and* slope at every boundary keeps each
/// spline segment local: a single support holds its stance value exactly,
/// a double support rolls from foot to foot without overshoot. Continuity
/// of the center of mass acceleration follows from the pendulum dynamics
/// once position and pressure are continuous.
///
/// The matrix only depends on the interval durations, degrees and heights,
/// so its LU decomposition is computed once and reused for every new right
/// hand side until one of those changes.
#[derive(Debug)]
pub struct LinearSystem {
    gravity: f64,
    durations: Vec<f64>,
    degrees: Vec<usize>,
    omegas: Vec<f64>,
    matrix: DMatrix<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
    needs_reset: bool,
}

impl LinearSystem {
    #[must_use]
    pub fn new(gravity: f64) -> Self {
        Self {
            gravity,
            durations: Vec::new(),
            degrees: Vec::new(),
            omegas: Vec::new(),
            matrix: DMatrix::zeros(0, 0),
            lu: None,
            needs_reset: true,
        }
    }

    /// Polynomial degrees making the system square: a single interval uses a
    /// quintic, otherwise the outer intervals are quartic and the inner
    /// ones cubic.
    #[must_use]
    pub fn degrees_for(interval_count: usize) -> Vec<usize> {
        match interval_count {
            0 => Vec::new(),
            1 => vec![5],
            n => {
                let mut degrees = vec![3; n];
                degrees[0] = 4;
                degrees[n - 1] = 4;
                degrees
            }
        }
    }

    /// Set the interval durations and height profiles, recomputing the
    /// pulsations. Marks the decomposition dirty only when something
    /// actually changed.
    pub fn configure(&mut self, durations: &[f64], com_heights: &[f64], zmp_heights: &[f64]) {
        debug_assert_eq!(durations.len(), com_heights.len());
        debug_assert_eq!(durations.len(), zmp_heights.len());

        let omegas: Vec<f64> = com_heights
            .iter()
            .zip(zmp_heights)
            .map(|(&com_z, &zmp_z)| (self.gravity / (com_z - zmp_z)).sqrt())
            .collect();
        let degrees = Self::degrees_for(durations.len());

        if durations == self.durations && omegas == self.omegas && degrees == self.degrees {
            return;
        }

        self.durations = durations.to_vec();
        self.degrees = degrees;
        self.omegas = omegas;
        self.needs_reset = true;
    }

    #[must_use]
    pub fn interval_count(&self) -> usize {
        self.durations.len()
    }

    #[must_use]
    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    /// Size of the (square) system.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.degrees.iter().map(|degree| degree + 3).sum()
    }

    /// Column offset of the unknowns of interval `j`.
    fn column_offset(&self, j: usize) -> usize {
        self.degrees[..j].iter().map(|degree| degree + 3).sum()
    }

    /// Matrix mapping pressure coefficients to the particular center of
    /// mass coefficients on interval `j`.
    fn particular_map(&self, j: usize) -> DMatrix<f64> {
        let degree = self.degrees[j];
        let omega = self.omegas[j];
        let mut map = DMatrix::identity(degree + 1, degree + 1);

        for k in (0..degree.saturating_sub(1)).rev() {
            let beta = ((k + 1) * (k + 2)) as f64 / (omega * omega);
            for column in 0..=degree {
                let inherited = beta * map[(k + 2, column)];
                map[(k, column)] += inherited;
            }
        }

        map
    }

    fn powers(degree: usize, t: f64) -> Vec<f64> {
        let mut powers = vec![1.0; degree + 1];
        for k in 1..=degree {
            powers[k] = powers[k - 1] * t;
        }
        powers
    }

    fn derivative_powers(degree: usize, t: f64) -> Vec<f64> {
        let powers = Self::powers(degree, t);
        (0..=degree)
            .map(|k| if k == 0 { 0.0 } else { k as f64 * powers[k - 1] })
            .collect()
    }

    /// Add the pressure value row of interval `j` at local time `t`.
    fn fill_zmp_row(&self, matrix: &mut DMatrix<f64>, row: usize, j: usize, t: f64, sign: f64) {
        let offset = self.column_offset(j);
        for (k, power) in Self::powers(self.degrees[j], t).into_iter().enumerate() {
            matrix[(row, offset + 2 + k)] += sign * power;
        }
    }

    /// Add the pressure velocity row of interval `j` at local time `t`.
    fn fill_zmp_velocity_row(
        &self,
        matrix: &mut DMatrix<f64>,
        row: usize,
        j: usize,
        t: f64,
        sign: f64,
    ) {
        let offset = self.column_offset(j);
        for (k, power) in Self::derivative_powers(self.degrees[j], t)
            .into_iter()
            .enumerate()
        {
            matrix[(row, offset + 2 + k)] += sign * power;
        }
    }

    /// Add the center of mass row of interval `j` at local time `t`, for the
    /// requested derivative order (0 = position, 1 = velocity).
    fn fill_com_row(
        &self,
        matrix: &mut DMatrix<f64>,
        row: usize,
        j: usize,
        t: f64,
        order: usize,
        sign: f64,
    ) {
        let offset = self.column_offset(j);
        let omega = self.omegas[j];
        let phase = omega * t;

        let (cosh_coefficient, sinh_coefficient) = match order {
            0 => (phase.cosh(), phase.sinh()),
            1 => (omega * phase.sinh(), omega * phase.cosh()),
            _ => unreachable!("only position and velocity rows are assembled"),
        };
        matrix[(row, offset)] += sign * cosh_coefficient;
        matrix[(row, offset + 1)] += sign * sinh_coefficient;

        let map = self.particular_map(j);
        let powers = match order {
            0 => Self::powers(self.degrees[j], t),
            _ => Self::derivative_powers(self.degrees[j], t),
        };
        for column in 0..=self.degrees[j] {
            let weight: f64 = powers
                .iter()
                .enumerate()
                .map(|(k, &power)| power * map[(k, column)])
                .sum();
            matrix[(row, offset + 2 + column)] += sign * weight;
        }
    }

    /// Assemble the system matrix. Idempotent for a fixed configuration.
    pub fn build_matrix(&mut self) {
        let n = self.dimension();
        let m = self.interval_count();
        let mut matrix = DMatrix::zeros(n, n);
        if m == 0 {
            self.matrix = matrix;
            return;
        }

        // initial center of mass and the fully pinned first interval
        self.fill_com_row(&mut matrix, 0, 0, 0.0, 0, 1.0);
        self.fill_com_row(&mut matrix, 1, 0, 0.0, 1, 1.0);
        self.fill_zmp_row(&mut matrix, 2, 0, 0.0, 1.0);
        self.fill_zmp_velocity_row(&mut matrix, 3, 0, 0.0, 1.0);
        self.fill_zmp_row(&mut matrix, 4, 0, self.durations[0], 1.0);
        self.fill_zmp_velocity_row(&mut matrix, 5, 0, self.durations[0], 1.0);

        // interior boundaries
        let mut row = 6;
        for j in 0..m.saturating_sub(1) {
            let end = self.durations[j];
            self.fill_com_row(&mut matrix, row, j, end, 0, 1.0);
            self.fill_com_row(&mut matrix, row, j + 1, 0.0, 0, -1.0);
            self.fill_com_row(&mut matrix, row + 1, j, end, 1, 1.0);
            self.fill_com_row(&mut matrix, row + 1, j + 1, 0.0, 1, -1.0);
            self.fill_zmp_row(&mut matrix, row + 2, j + 1, 0.0, 1.0);
            self.fill_zmp_velocity_row(&mut matrix, row + 3, j + 1, 0.0, 1.0);
            self.fill_zmp_row(&mut matrix, row + 4, j + 1, self.durations[j + 1], 1.0);
            self.fill_zmp_velocity_row(&mut matrix, row + 5, j + 1, self.durations[j + 1], 1.0);
            row += 6;
        }

        // terminal center of mass position and rest
        let last = m - 1;
        let end = self.durations[last];
        self.fill_com_row(&mut matrix, row, last, end, 0, 1.0);
        self.fill_com_row(&mut matrix, row + 1, last, end, 1, 1.0);

        self.matrix = matrix;
    }

    /// Build the right hand side from the boundary conditions.
    #[must_use]
    pub fn compute_w(&self, conditions: &TrajectoryConditions) -> DVector<f64> {
        let m = self.interval_count();
        let mut w = DVector::zeros(self.dimension());
        if m == 0 {
            return w;
        }

        w[0] = conditions.initial_com;
        w[1] = conditions.initial_com_velocity;
        w[2] = conditions.zmp_start(0);
        // w[3] is the zero pressure velocity at the start
        w[4] = conditions.zmp_end(0);
        // w[5] is the zero pressure velocity at the first boundary

        let mut row = 6;
        for j in 0..m.saturating_sub(1) {
            // the continuity and zero-velocity rows have zero right hand side
            w[row + 2] = conditions.zmp_start(j + 1);
            w[row + 4] = conditions.zmp_end(j + 1);
            row += 6;
        }

        w[row] = conditions.final_com;
        // w[row + 1] is the zero terminal center of mass velocity

        w
    }

    /// Decompose the matrix if the configuration changed since the last
    /// factorization.
    pub fn ensure_factorized(&mut self) -> Result<()> {
        if !self.needs_reset && self.lu.is_some() {
            return Ok(());
        }

        self.build_matrix();
        let lu = self.matrix.clone().lu();
        if !lu.is_invertible() {
            return Err(Error::SingularSystem);
        }

        self.lu = Some(lu);
        self.needs_reset = false;
        Ok(())
    }

    /// Solve for the stacked per-interval weights.
    pub fn compute_polynomial_weights(&mut self, w: &DVector<f64>) -> Result<DVector<f64>> {
        self.ensure_factorized()?;
        self.lu
            .as_ref()
            .and_then(|lu| lu.solve(w))
            .ok_or(Error::SingularSystem)
    }

    /// Residual `Z·x − w`, used to validate a solution.
    #[must_use]
    pub fn residual(&self, weights: &DVector<f64>, w: &DVector<f64>) -> f64 {
        (&self.matrix * weights - w).amax()
    }

    /// Distribute the solved weights into the target trajectory.
    pub fn transfer_coefficients(
        &self,
        weights: &DVector<f64>,
        trajectory: &mut AnalyticalTrajectory,
    ) {
        let mut intervals = Vec::with_capacity(self.interval_count());

        for j in 0..self.interval_count() {
            let offset = self.column_offset(j);
            let degree = self.degrees[j];
            let omega = self.omegas[j];
            let duration = self.durations[j];

            let zmp: Vec<f64> = (0..=degree).map(|k| weights[offset + 2 + k]).collect();
            let com = TrajectoryInterval::particular_coefficients(&zmp, omega);

            intervals.push(TrajectoryInterval {
                duration,
                omega,
                cosh_weight: weights[offset],
                sinh_weight: weights[offset + 1],
                zmp: Polynomial::from_coefficients(zmp, duration),
                com: Polynomial::from_coefficients(com, duration),
            });
        }

        trajectory.set_intervals(intervals);
    }

    /// Solve one axis end-to-end: right hand side, weights, transfer.
    pub fn compute_trajectory(
        &mut self,
        conditions: &TrajectoryConditions,
        trajectory: &mut AnalyticalTrajectory,
    ) -> Result<()> {
        let w = self.compute_w(conditions);
        let weights = self.compute_polynomial_weights(&w)?;
        self.transfer_coefficients(&weights, trajectory);
        Ok(())
    }
}
