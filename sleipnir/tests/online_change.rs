//! Online landing edits against the analytical core: refusals, accepted
//! edits, and the smoothing of the orthogonal axis.

use nalgebra::Vector3;
use sleipnir::{
    analytical::{AnalyticalPatternGenerator, Frame},
    ComPosition, FootAbsolutePosition, LandingTarget, RelativeFootPosition, TrajectoryQueues,
    WalkConfig,
};

fn straight_steps(count: usize) -> Vec<RelativeFootPosition> {
    (0..count)
        .map(|index| RelativeFootPosition {
            dx: 0.2,
            dy: if index % 2 == 0 { -0.2 } else { 0.2 },
            dyaw: 0.0,
            single_support_duration: 0.7,
            double_support_duration: 0.1,
            step_type: 0,
        })
        .collect()
}

fn started_generator() -> (AnalyticalPatternGenerator, TrajectoryQueues) {
    let mut generator = AnalyticalPatternGenerator::new(WalkConfig::default());
    let com = ComPosition {
        position: Vector3::new(0.0, 0.0, 0.814),
        ..ComPosition::default()
    };
    let left = FootAbsolutePosition {
        y: 0.1,
        ..FootAbsolutePosition::default()
    };
    let right = FootAbsolutePosition {
        y: -0.1,
        ..FootAbsolutePosition::default()
    };
    generator
        .init_online(&com, left, right, &straight_steps(4), 0.0)
        .unwrap();
    (generator, TrajectoryQueues::new())
}

fn run_until(
    generator: &mut AnalyticalPatternGenerator,
    queues: &mut TrajectoryQueues,
    from: f64,
    to: f64,
) {
    let mut k = (from / 0.005).round() as usize + 1;
    while k as f64 * 0.005 <= to + 1e-9 {
        generator.online(k as f64 * 0.005, queues).unwrap();
        k += 1;
    }
}

#[test]
fn too_late_edits_leave_the_trajectories_untouched() {
    let (mut generator, mut queues) = started_generator();
    run_until(&mut generator, &mut queues, 0.0, 0.68);

    let samples_before = queues.len();
    let result = generator.online_foot_change(
        0.68,
        LandingTarget {
            x: 0.1,
            y: -0.1,
            yaw: 0.0,
        },
        Frame::Absolute,
        true,
    );
    assert_eq!(result.unwrap_err().code(), -2);

    // the refused edit emitted nothing and future samples are unchanged
    assert_eq!(queues.len(), samples_before);
    run_until(&mut generator, &mut queues, 0.68, 0.75);
    let landing = queues.right_foot.back().unwrap();
    assert!((landing.x - 0.2).abs() < 1e-6);
}

#[test]
fn accepted_edit_lands_the_swing_foot_on_the_new_target() {
    let (mut generator, mut queues) = started_generator();
    run_until(&mut generator, &mut queues, 0.0, 0.21);

    generator
        .online_foot_change(
            0.21,
            LandingTarget {
                x: 0.05,
                y: -0.1,
                yaw: 0.0,
            },
            Frame::Absolute,
            true,
        )
        .unwrap();

    run_until(&mut generator, &mut queues, 0.21, 1.2);

    let landing = queues
        .right_foot
        .iter()
        .find(|sample| (sample.time - 0.7).abs() < 1e-9)
        .unwrap();
    assert!((landing.x - 0.05).abs() < 1e-4);
    assert!(landing.z.abs() < 1e-4);
}

#[test]
fn relative_edit_composes_on_the_stance_foot() {
    let (mut generator, mut queues) = started_generator();
    run_until(&mut generator, &mut queues, 0.0, 0.21);

    // one step forward-right of the left stance at (0, 0.1)
    generator
        .online_foot_change(
            0.21,
            LandingTarget {
                x: 0.1,
                y: -0.2,
                yaw: 0.0,
            },
            Frame::Relative,
            false,
        )
        .unwrap();

    run_until(&mut generator, &mut queues, 0.21, 1.2);
    let landing = queues
        .right_foot
        .iter()
        .find(|sample| (sample.time - 0.7).abs() < 1e-9)
        .unwrap();
    assert!((landing.x - 0.1).abs() < 1e-4);
    assert!((landing.y + 0.1).abs() < 1e-4);
}

#[test]
fn streams_remain_continuous_across_an_edit() {
    let (mut generator, mut queues) = started_generator();
    run_until(&mut generator, &mut queues, 0.0, 0.21);

    generator
        .online_foot_change(
            0.21,
            LandingTarget {
                x: 0.06,
                y: -0.12,
                yaw: 0.0,
            },
            Frame::Absolute,
            true,
        )
        .unwrap();

    run_until(&mut generator, &mut queues, 0.21, 2.0);

    for index in 1..queues.len() {
        let com_step = (queues.com[index].position - queues.com[index - 1].position).norm();
        assert!(com_step < 5e-3, "center of mass jump at sample {index}");
        let zmp_step = (queues.zmp[index].x - queues.zmp[index - 1].x).abs()
            + (queues.zmp[index].y - queues.zmp[index - 1].y).abs();
        assert!(zmp_step < 2e-2, "pressure jump at sample {index}");
    }
}

#[test]
fn several_landings_can_move_in_one_call() {
    let (mut generator, mut queues) = started_generator();
    run_until(&mut generator, &mut queues, 0.0, 0.21);

    generator
        .online_foot_changes(
            0.21,
            &[
                (
                    0,
                    LandingTarget {
                        x: 0.05,
                        y: -0.1,
                        yaw: 0.0,
                    },
                ),
                (
                    1,
                    LandingTarget {
                        x: 0.3,
                        y: 0.1,
                        yaw: 0.0,
                    },
                ),
            ],
            Frame::Absolute,
            false,
        )
        .unwrap();

    run_until(&mut generator, &mut queues, 0.21, 2.0);

    let first = queues
        .right_foot
        .iter()
        .find(|sample| (sample.time - 0.7).abs() < 1e-9)
        .unwrap();
    assert!((first.x - 0.05).abs() < 1e-4);

    let second = queues
        .left_foot
        .iter()
        .find(|sample| (sample.time - 1.5).abs() < 1e-9)
        .unwrap();
    assert!((second.x - 0.3).abs() < 1e-4);
}
