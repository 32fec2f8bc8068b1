use std::collections::VecDeque;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Marker for a foot that is being held still at the end of the walk.
pub const STEP_TYPE_REST: i32 = 10;

#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    #[default]
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Contact phase of the gait.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportPhase {
    /// Both feet on the ground.
    #[default]
    Double,
    /// One stance foot, the other swinging.
    Single,
}

/// One reference sample of the Zero-Moment Point in the world frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ZmpPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub time: f64,
}

/// One reference sample of the Center of Mass.
///
/// Position, velocity and acceleration are full 3-vectors; the trunk
/// orientation is reduced to yaw and yaw rate.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ComPosition {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    pub yaw: f64,
    pub yaw_rate: f64,
    pub time: f64,
}

/// One reference sample of a foot in the world frame.
///
/// `step_type` encodes the support role of the foot at this sample: positive
/// while swinging, negative while standing as support, and
/// [`STEP_TYPE_REST`] once the walk has ended.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FootAbsolutePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub ddx: f64,
    pub ddy: f64,
    pub ddz: f64,
    /// Yaw around the vertical axis.
    pub theta: f64,
    pub dtheta: f64,
    /// Pitch used while lifting off.
    pub omega: f64,
    pub domega: f64,
    /// Pitch used while touching down.
    pub omega2: f64,
    pub domega2: f64,
    pub time: f64,
    pub step_type: i32,
}

/// A footstep expressed relative to the previous support foot.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct RelativeFootPosition {
    pub dx: f64,
    pub dy: f64,
    pub dyaw: f64,
    /// How long the swing towards this step takes.
    pub single_support_duration: f64,
    /// How long the weight transfer after landing takes.
    pub double_support_duration: f64,
    pub step_type: i32,
}

/// Reference velocity of the trunk, expressed in the body frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ReferenceVelocity {
    pub forward: f64,
    pub lateral: f64,
    pub turn: f64,
}

impl ReferenceVelocity {
    /// Whether the reference asks the robot to stay in place.
    #[must_use]
    pub fn is_stationary(&self, threshold: f64) -> bool {
        self.forward.abs() < threshold
            && self.lateral.abs() < threshold
            && self.turn.abs() < threshold
    }
}

/// Support situation at one previewed instant.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SupportState {
    /// The stance foot; the opposite foot is the swing foot.
    pub foot: Side,
    pub phase: SupportPhase,
    /// Steps remaining before the walk is allowed to stop.
    pub steps_left: usize,
    /// Number of the previewed step this state belongs to, 0 for the
    /// current support.
    pub step_number: usize,
    /// Absolute time at which this phase ends.
    pub time_limit: f64,
    /// Pose of the stance foot on the ground.
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    /// Whether the state switched phase or foot at this preview sample.
    pub state_changed: bool,
}

/// The three synchronized output streams of a pattern generator.
///
/// The generator pushes one entry per control sample on each queue; the
/// controller pops realized samples from the front. The queues always grow
/// by the same amount and carry identical timestamps at equal indices.
#[derive(Debug, Default, Clone)]
pub struct TrajectoryQueues {
    pub zmp: VecDeque<ZmpPosition>,
    pub com: VecDeque<ComPosition>,
    pub left_foot: VecDeque<FootAbsolutePosition>,
    pub right_foot: VecDeque<FootAbsolutePosition>,
}

impl TrajectoryQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zmp.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zmp.is_empty()
    }

    /// Pop one realized sample from the front of every queue.
    pub fn pop_front(
        &mut self,
    ) -> Option<(
        ZmpPosition,
        ComPosition,
        FootAbsolutePosition,
        FootAbsolutePosition,
    )> {
        match (
            self.zmp.pop_front(),
            self.com.pop_front(),
            self.left_foot.pop_front(),
            self.right_foot.pop_front(),
        ) {
            (Some(zmp), Some(com), Some(left), Some(right)) => Some((zmp, com, left, right)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_side() {
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(Side::Right.opposite(), Side::Left);
    }

    #[test]
    fn stationary_reference() {
        let reference = ReferenceVelocity {
            forward: 1e-4,
            lateral: 0.0,
            turn: -1e-4,
        };
        assert!(reference.is_stationary(1e-3));
        assert!(!reference.is_stationary(1e-5));
    }

    #[test]
    fn queues_pop_in_lockstep() {
        let mut queues = TrajectoryQueues::new();
        queues.zmp.push_back(ZmpPosition::default());
        queues.com.push_back(ComPosition::default());
        queues.left_foot.push_back(FootAbsolutePosition::default());
        queues.right_foot.push_back(FootAbsolutePosition::default());

        assert_eq!(queues.len(), 1);
        assert!(queues.pop_front().is_some());
        assert!(queues.pop_front().is_none());
        assert!(queues.is_empty());
    }
}
