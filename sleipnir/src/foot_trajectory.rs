//! Swing foot trajectory generation.
//!
//! One swing is interpolated by a set of polynomials fitted when the foot
//! lifts off. The horizontal axes and the yaw only move during the unlocked
//! part of the swing (90% of the single support, leaving 5% at each end as
//! liftoff and landing guards), while the vertical axis follows a quintic
//! over the whole single support, reaching the configured step height at
//! mid-swing. The pitch angles `omega`/`omega2` roll the foot over its toe
//! and heel around liftoff and touchdown.

use polynomial::Polynomial;

use crate::types::FootAbsolutePosition;

/// Fraction of the single support during which the foot may translate.
const MODULATION_COEFFICIENT: f64 = 0.9;

/// Pose a swing foot should land at.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LandingTarget {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

/// Generator producing one swing foot sample per control tick.
#[derive(Debug, Clone)]
pub struct FootTrajectoryGenerator {
    step_height: f64,
    /// Sole length behind the ankle.
    foot_back: f64,
    /// Ankle height above the sole.
    foot_height: f64,
    /// Sole length in front of the ankle.
    foot_front: f64,
    /// Pitch amplitude at liftoff; zero keeps the sole flat.
    max_omega: f64,

    single_support_duration: f64,
    unlocked_duration: f64,
    end_of_liftoff: f64,
    start_of_landing: f64,
    /// Swing time at which the horizontal polynomials were last fitted.
    lateral_origin: f64,

    x: Polynomial,
    y: Polynomial,
    theta: Polynomial,
    z: Polynomial,
    omega: Polynomial,
    omega2: Polynomial,
}

impl FootTrajectoryGenerator {
    #[must_use]
    pub fn new(step_height: f64, foot_back: f64, foot_height: f64, foot_front: f64) -> Self {
        Self {
            step_height,
            foot_back,
            foot_height,
            foot_front,
            max_omega: 0.0,
            single_support_duration: 0.0,
            unlocked_duration: 0.0,
            end_of_liftoff: 0.0,
            start_of_landing: 0.0,
            lateral_origin: 0.0,
            x: Polynomial::constant(0.0),
            y: Polynomial::constant(0.0),
            theta: Polynomial::constant(0.0),
            z: Polynomial::constant(0.0),
            omega: Polynomial::constant(0.0),
            omega2: Polynomial::constant(0.0),
        }
    }

    pub fn set_max_omega(&mut self, max_omega: f64) {
        self.max_omega = max_omega;
    }

    #[must_use]
    pub fn step_height(&self) -> f64 {
        self.step_height
    }

    /// Fit all swing polynomials for a fresh single support phase.
    pub fn begin_swing(
        &mut self,
        single_support_duration: f64,
        start: &FootAbsolutePosition,
        target: LandingTarget,
    ) {
        self.single_support_duration = single_support_duration;
        self.unlocked_duration = single_support_duration * MODULATION_COEFFICIENT;
        self.end_of_liftoff = (single_support_duration - self.unlocked_duration) * 0.5;
        self.start_of_landing = self.end_of_liftoff + self.unlocked_duration;
        self.lateral_origin = self.end_of_liftoff;

        self.x = Polynomial::cubic(self.unlocked_duration, start.x, start.dx, target.x, 0.0);
        self.y = Polynomial::cubic(self.unlocked_duration, start.y, start.dy, target.y, 0.0);
        self.theta = Polynomial::cubic(
            self.unlocked_duration,
            start.theta,
            start.dtheta,
            target.yaw,
            0.0,
        );
        self.z = Polynomial::quintic_apex(
            single_support_duration,
            start.z,
            start.dz,
            self.step_height,
            0.0,
        );
        self.omega = Polynomial::cubic(
            self.end_of_liftoff,
            start.omega,
            start.domega,
            self.max_omega,
            0.0,
        );
        self.omega2 = Polynomial::cubic(self.unlocked_duration, self.max_omega, 0.0, 0.0, 0.0);
    }

    /// Refit the horizontal polynomials mid-swing towards a new landing
    /// target, keeping the vertical trajectory untouched.
    ///
    /// `elapsed` is the time since the swing started; the remaining unlocked
    /// duration shrinks accordingly so the foot still lands on time.
    pub fn retarget(&mut self, elapsed: f64, last: &FootAbsolutePosition, target: LandingTarget) {
        self.lateral_origin = elapsed.max(self.end_of_liftoff);
        let remaining = (self.start_of_landing - self.lateral_origin).max(0.0);

        self.x = Polynomial::cubic(remaining, last.x, last.dx, target.x, 0.0);
        self.y = Polynomial::cubic(remaining, last.y, last.dy, target.y, 0.0);
        self.theta = Polynomial::cubic(remaining, last.theta, last.dtheta, target.yaw, 0.0);
    }

    /// Sample the swing foot at `elapsed` seconds into the single support.
    ///
    /// `previous` is the last emitted sample of this foot; the horizontal
    /// axes hold its values during the liftoff and landing guards.
    #[must_use]
    pub fn swing_sample(
        &self,
        elapsed: f64,
        previous: &FootAbsolutePosition,
        time: f64,
        step_type: i32,
    ) -> FootAbsolutePosition {
        let mut sample = FootAbsolutePosition {
            time,
            step_type,
            ..FootAbsolutePosition::default()
        };

        if elapsed <= self.end_of_liftoff || elapsed >= self.start_of_landing {
            // the foot does not translate during the guards
            sample.x = previous.x;
            sample.y = previous.y;
            sample.theta = previous.theta;
        } else {
            let t = (elapsed - self.lateral_origin).max(0.0);
            sample.x = self.x.value(t);
            sample.dx = self.x.derivative(t);
            sample.ddx = self.x.second_derivative(t);
            sample.y = self.y.value(t);
            sample.dy = self.y.derivative(t);
            sample.ddy = self.y.second_derivative(t);
            sample.theta = self.theta.value(t);
            sample.dtheta = self.theta.derivative(t);
        }

        let clamped = elapsed.clamp(0.0, self.single_support_duration);
        sample.z = self.z.value(clamped);
        sample.dz = self.z.derivative(clamped);
        sample.ddz = self.z.second_derivative(clamped);

        if elapsed < self.end_of_liftoff {
            // rolling over the toe while lifting off
            sample.omega = self.omega.value(elapsed);
            sample.domega = self.omega.derivative(elapsed);
        } else if elapsed < self.start_of_landing {
            let t = elapsed - self.end_of_liftoff;
            sample.omega = self.max_omega - self.omega2.value(t);
            sample.domega = -self.omega2.derivative(t);
        } else {
            // straightening back onto the heel
            let t = elapsed - self.start_of_landing;
            sample.omega = self.omega.value(t) + previous.omega - self.max_omega;
            sample.domega = self.omega.derivative(t);
        }
        sample.omega2 = previous.omega2;

        self.correct_ground_penetration(&mut sample);
        sample
    }

    /// Hold a support foot in place.
    #[must_use]
    pub fn support_sample(
        previous: &FootAbsolutePosition,
        time: f64,
        step_type: i32,
    ) -> FootAbsolutePosition {
        FootAbsolutePosition {
            dx: 0.0,
            dy: 0.0,
            dz: 0.0,
            ddx: 0.0,
            ddy: 0.0,
            ddz: 0.0,
            dtheta: 0.0,
            domega: 0.0,
            domega2: 0.0,
            time,
            step_type,
            ..*previous
        }
    }

    /// Shift the ankle so that the pitched sole touches the ground at z = 0
    /// instead of digging into it.
    fn correct_ground_penetration(&self, sample: &mut FootAbsolutePosition) {
        if sample.omega == 0.0 {
            return;
        }

        let omega = sample.omega;
        let (shift_x, shift_z) = if omega < 0.0 {
            // pitched backwards, the heel edge leads
            let x1 = self.foot_back * (-omega).cos();
            let x2 = self.foot_height * (-omega).sin();
            let z1 = self.foot_height * (-omega).cos();
            let z2 = self.foot_back * (-omega).sin();
            (-(self.foot_back - x1 + x2), z1 + z2 - self.foot_height)
        } else {
            // pitched forwards, the toe edge leads
            let x1 = self.foot_front * omega.cos();
            let x2 = self.foot_height * omega.sin();
            let z1 = self.foot_height * omega.cos();
            let z2 = self.foot_front * omega.sin();
            (self.foot_front - x1 + x2, z1 + z2 - self.foot_height)
        };

        sample.x += sample.theta.cos() * shift_x;
        sample.y += sample.theta.sin() * shift_x;
        sample.z += shift_z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> FootTrajectoryGenerator {
        FootTrajectoryGenerator::new(0.05, 0.1, 0.105, 0.13)
    }

    fn resting_foot(x: f64, y: f64) -> FootAbsolutePosition {
        FootAbsolutePosition {
            x,
            y,
            ..FootAbsolutePosition::default()
        }
    }

    #[test]
    fn swing_reaches_the_landing_target() {
        let mut generator = generator();
        let start = resting_foot(0.0, 0.1);
        generator.begin_swing(
            0.7,
            &start,
            LandingTarget {
                x: 0.2,
                y: 0.1,
                yaw: 0.0,
            },
        );

        // simulate the whole swing at 5 ms
        let mut previous = start;
        for k in 1..=140 {
            let t = f64::from(k) * 0.005;
            previous = generator.swing_sample(t, &previous, t, 1);
        }

        assert!((previous.x - 0.2).abs() < 1e-6);
        assert!((previous.y - 0.1).abs() < 1e-6);
        assert!(previous.z.abs() < 1e-4);
    }

    #[test]
    fn foot_holds_during_liftoff_guard() {
        let mut generator = generator();
        let start = resting_foot(0.0, 0.1);
        generator.begin_swing(
            0.7,
            &start,
            LandingTarget {
                x: 0.2,
                y: 0.1,
                yaw: 0.0,
            },
        );

        let sample = generator.swing_sample(0.01, &start, 0.01, 1);
        assert!((sample.x - start.x).abs() < 1e-12);
        assert!((sample.y - start.y).abs() < 1e-12);
        // but the foot already lifts
        assert!(sample.z > 0.0);
    }

    #[test]
    fn vertical_apex_is_the_step_height() {
        let mut generator = generator();
        let start = resting_foot(0.0, -0.1);
        generator.begin_swing(
            0.7,
            &start,
            LandingTarget {
                x: 0.2,
                y: -0.1,
                yaw: 0.0,
            },
        );

        let sample = generator.swing_sample(0.35, &start, 0.35, 1);
        assert!((sample.z - 0.05).abs() < 1e-9);
    }

    #[test]
    fn vertical_velocity_is_the_derivative_of_the_height() {
        let mut generator = generator();
        let start = resting_foot(0.0, 0.1);
        generator.begin_swing(
            0.7,
            &start,
            LandingTarget {
                x: 0.2,
                y: 0.1,
                yaw: 0.0,
            },
        );

        let h = 1e-6;
        let mut previous = start;
        for k in 1..14 {
            let t = f64::from(k) * 0.05;
            let sample = generator.swing_sample(t, &previous, t, 1);
            let before = generator.swing_sample(t - h, &previous, t - h, 1);
            let after = generator.swing_sample(t + h, &previous, t + h, 1);
            let numeric = (after.z - before.z) / (2.0 * h);
            assert!((sample.dz - numeric).abs() < 1e-5);
            previous = sample;
        }
    }

    #[test]
    fn retarget_mid_swing_still_lands_on_time() {
        let mut generator = generator();
        let start = resting_foot(0.0, 0.1);
        generator.begin_swing(
            0.7,
            &start,
            LandingTarget {
                x: 0.2,
                y: 0.1,
                yaw: 0.0,
            },
        );

        // walk until 30% of the swing, then push the landing 5 cm forward
        let mut previous = start;
        let mut k = 1;
        while f64::from(k) * 0.005 <= 0.21 {
            let t = f64::from(k) * 0.005;
            previous = generator.swing_sample(t, &previous, t, 1);
            k += 1;
        }
        generator.retarget(
            0.21,
            &previous,
            LandingTarget {
                x: 0.25,
                y: 0.1,
                yaw: 0.0,
            },
        );

        while f64::from(k) * 0.005 <= 0.7 {
            let t = f64::from(k) * 0.005;
            previous = generator.swing_sample(t, &previous, t, 1);
            k += 1;
        }

        assert!((previous.x - 0.25).abs() < 1e-6);
        assert!(previous.z.abs() < 1e-4);
    }
}
