use polynomial::Polynomial;

/// One time interval of the piecewise analytical trajectory.
///
/// The pressure point is a polynomial in local time, the center of mass is
/// the natural response of the pendulum on top of it: a hyperbolic pair
/// `A·cosh(ωt) + B·sinh(ωt)` plus the particular polynomial matching the
/// pressure profile.
#[derive(Debug, Clone)]
pub struct TrajectoryInterval {
    pub duration: f64,
    /// Effective pulsation `√(g / (h_com − h_zmp))` on this interval.
    pub omega: f64,
    /// Weight of the `cosh` term of the natural response.
    pub cosh_weight: f64,
    /// Weight of the `sinh` term of the natural response.
    pub sinh_weight: f64,
    /// Pressure point polynomial, in local time.
    pub zmp: Polynomial,
    /// Particular polynomial of the center of mass, in local time.
    pub com: Polynomial,
}

impl TrajectoryInterval {
    /// Map pressure polynomial coefficients to the coefficients of the
    /// particular solution of `z = c − c̈/ω²`.
    ///
    /// Solved downwards from the highest degree:
    /// `p_k = z_k + (k+1)(k+2)·p_{k+2}/ω²`.
    #[must_use]
    pub fn particular_coefficients(zmp: &[f64], omega: f64) -> Vec<f64> {
        let mut particular = zmp.to_vec();
        let degree = zmp.len() - 1;

        for k in (0..degree.saturating_sub(1)).rev() {
            let beta = ((k + 1) * (k + 2)) as f64 / (omega * omega);
            particular[k] += beta * particular[k + 2];
        }

        particular
    }
}

/// Piecewise analytical description of the pressure point and the center of
/// mass on one axis.
///
/// Times passed to the evaluation methods are absolute; the trajectory
/// anchors its first interval at [`Self::absolute_time_reference`].
#[derive(Debug, Default, Clone)]
pub struct AnalyticalTrajectory {
    intervals: Vec<TrajectoryInterval>,
    absolute_time_reference: f64,
}

impl AnalyticalTrajectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_intervals(&mut self, intervals: Vec<TrajectoryInterval>) {
        self.intervals = intervals;
    }

    #[must_use]
    pub fn intervals(&self) -> &[TrajectoryInterval] {
        &self.intervals
    }

    #[must_use]
    pub fn absolute_time_reference(&self) -> f64 {
        self.absolute_time_reference
    }

    pub fn set_absolute_time_reference(&mut self, reference: f64) {
        self.absolute_time_reference = reference;
    }

    /// Sum of all interval durations.
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.intervals.iter().map(|interval| interval.duration).sum()
    }

    /// Locate the interval containing absolute time `t`.
    ///
    /// Returns the interval index and the local time inside it. Times before
    /// the reference clamp to the start, times after the horizon clamp to
    /// the end of the last interval.
    #[must_use]
    pub fn locate(&self, t: f64) -> Option<(usize, f64)> {
        if self.intervals.is_empty() {
            return None;
        }

        let mut local = (t - self.absolute_time_reference).max(0.0);
        for (index, interval) in self.intervals.iter().enumerate() {
            if local <= interval.duration || index == self.intervals.len() - 1 {
                return Some((index, local.min(interval.duration)));
            }
            local -= interval.duration;
        }

        unreachable!("the last interval clamps every remaining time")
    }

    /// Pressure point at absolute time `t`.
    #[must_use]
    pub fn zmp(&self, t: f64) -> f64 {
        self.locate(t)
            .map(|(index, local)| self.intervals[index].zmp.value(local))
            .unwrap_or_default()
    }

    /// Pressure point velocity at absolute time `t`.
    #[must_use]
    pub fn zmp_velocity(&self, t: f64) -> f64 {
        self.locate(t)
            .map(|(index, local)| self.intervals[index].zmp.derivative(local))
            .unwrap_or_default()
    }

    /// Center of mass at absolute time `t`.
    #[must_use]
    pub fn com(&self, t: f64) -> f64 {
        self.locate(t)
            .map(|(index, local)| {
                let interval = &self.intervals[index];
                let phase = interval.omega * local;
                interval.cosh_weight * phase.cosh()
                    + interval.sinh_weight * phase.sinh()
                    + interval.com.value(local)
            })
            .unwrap_or_default()
    }

    /// Center of mass velocity at absolute time `t`.
    #[must_use]
    pub fn com_velocity(&self, t: f64) -> f64 {
        self.locate(t)
            .map(|(index, local)| {
                let interval = &self.intervals[index];
                let phase = interval.omega * local;
                interval.omega
                    * (interval.cosh_weight * phase.sinh() + interval.sinh_weight * phase.cosh())
                    + interval.com.derivative(local)
            })
            .unwrap_or_default()
    }

    /// Center of mass acceleration at absolute time `t`.
    #[must_use]
    pub fn com_acceleration(&self, t: f64) -> f64 {
        self.locate(t)
            .map(|(index, local)| {
                let interval = &self.intervals[index];
                let phase = interval.omega * local;
                interval.omega
                    * interval.omega
                    * (interval.cosh_weight * phase.cosh() + interval.sinh_weight * phase.sinh())
                    + interval.com.second_derivative(local)
            })
            .unwrap_or_default()
    }
}
