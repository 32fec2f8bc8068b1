//! Absorption of reference discontinuities on the axis orthogonal to a
//! temporal shift.
//!
//! When an online landing change shifts the time base, the axis that did
//! not drive the shift inherits a small pressure reference discontinuity.
//! Instead of letting the controller see it, the new pressure trajectory is
//! passed through the preview controller over a short window starting at
//! the edit time; the controller state starts from the pre-edit center of
//! mass, so the filtered samples bridge the discontinuity smoothly. The
//! samples emitted inside the window come from the filter, everything after
//! it from the analytical trajectory again.

use nalgebra::Vector3;

use crate::math::PreviewController;

use super::trajectory::AnalyticalTrajectory;

/// Duration over which the filtered samples replace the analytical ones.
pub const FILTER_WINDOW: f64 = 1.6;

/// One filtered sample of the corrected axis.
#[derive(Debug, Clone, Copy)]
pub struct FilteredSample {
    pub time: f64,
    pub com: f64,
    pub com_velocity: f64,
    pub com_acceleration: f64,
    pub zmp: f64,
}

/// Precomputed filtered window for one axis.
#[derive(Debug, Clone)]
pub struct OrthogonalFilter {
    samples: Vec<FilteredSample>,
    start_time: f64,
    sampling_period: f64,
}

impl OrthogonalFilter {
    /// Run the preview controller over the filter window.
    ///
    /// `state` is the center of mass of the filtered axis just before the
    /// edit, `trajectory` the freshly solved analytical trajectory whose
    /// pressure profile the filter tracks.
    #[must_use]
    pub fn new(
        controller: &PreviewController,
        trajectory: &AnalyticalTrajectory,
        mut state: Vector3<f64>,
        start_time: f64,
        sampling_period: f64,
    ) -> Self {
        let window_samples = (FILTER_WINDOW / sampling_period).round() as usize;
        let lookahead = controller.window();

        // the reference covers the window plus the controller lookahead
        let reference: Vec<f64> = (0..window_samples + lookahead)
            .map(|k| trajectory.zmp(start_time + k as f64 * sampling_period))
            .collect();

        let mut samples = Vec::with_capacity(window_samples);
        for k in 0..window_samples {
            controller.step(&mut state, &reference[k..]);
            samples.push(FilteredSample {
                time: start_time + (k + 1) as f64 * sampling_period,
                com: state.x,
                com_velocity: state.y,
                com_acceleration: state.z,
                zmp: controller.output(&state),
            });
        }

        Self {
            samples,
            start_time,
            sampling_period,
        }
    }

    /// The filtered sample to emit at `time`, if `time` falls inside the
    /// window.
    #[must_use]
    pub fn sample_at(&self, time: f64) -> Option<FilteredSample> {
        if time < self.start_time {
            return None;
        }
        let index = ((time - self.start_time) / self.sampling_period).round() as usize;
        if index == 0 {
            return None;
        }
        self.samples.get(index - 1).copied()
    }

    /// Whether the window is over at `time`.
    #[must_use]
    pub fn is_exhausted(&self, time: f64) -> bool {
        self.samples
            .last()
            .is_none_or(|sample| time > sample.time + self.sampling_period / 2.0)
    }
}
