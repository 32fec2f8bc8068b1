//! The velocity-reference core tracking a constant forward reference.

use nalgebra::Vector3;
use sleipnir::{
    mpc::MpcPatternGenerator, ComPosition, FootAbsolutePosition, ReferenceVelocity,
    TrajectoryQueues, WalkConfig,
};

fn initialized_generator() -> MpcPatternGenerator {
    let mut generator = MpcPatternGenerator::new(WalkConfig::default());
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
    generator.init_online(&com, left, right, 2, 0.0);
    generator
}

#[test]
fn constant_reference_is_tracked_on_average() {
    let mut generator = initialized_generator();
    generator.set_reference(ReferenceVelocity {
        forward: 0.2,
        lateral: 0.0,
        turn: 0.0,
    });

    let mut queues = TrajectoryQueues::new();
    // 5 seconds of preview ticks at 0.1 s
    for _ in 0..50 {
        generator.tick(&mut queues).unwrap();
    }

    // average forward velocity over the last second
    let samples = queues.com.len();
    let last_second: Vec<f64> = queues
        .com
        .iter()
        .skip(samples - 200)
        .map(|com| com.velocity.x)
        .collect();
    let average: f64 = last_second.iter().sum::<f64>() / last_second.len() as f64;
    assert!(
        (average - 0.2).abs() < 0.02,
        "average forward velocity {average} is not tracking the reference"
    );
}

#[test]
fn queues_stay_synchronized_over_a_long_run() {
    let mut generator = initialized_generator();
    generator.set_reference(ReferenceVelocity {
        forward: 0.15,
        lateral: 0.0,
        turn: 0.0,
    });

    let mut queues = TrajectoryQueues::new();
    for _ in 0..100 {
        generator.tick(&mut queues).unwrap();
    }

    assert_eq!(queues.zmp.len(), queues.com.len());
    assert_eq!(queues.zmp.len(), queues.left_foot.len());
    assert_eq!(queues.zmp.len(), queues.right_foot.len());
    for index in 0..queues.len() {
        assert_eq!(queues.zmp[index].time, queues.com[index].time);
        assert_eq!(queues.zmp[index].time, queues.left_foot[index].time);
        assert_eq!(queues.zmp[index].time, queues.right_foot[index].time);
    }
}

#[test]
fn problem_capacity_is_warm_after_three_ticks() {
    let mut generator = initialized_generator();
    generator.set_reference(ReferenceVelocity {
        forward: 0.2,
        lateral: 0.0,
        turn: 0.0,
    });

    let mut queues = TrajectoryQueues::new();
    for _ in 0..3 {
        generator.tick(&mut queues).unwrap();
    }
    let capacity = generator.problem().capacity();

    // ten simulated seconds later the allocation has not moved
    for _ in 0..100 {
        generator.tick(&mut queues).unwrap();
    }
    assert_eq!(generator.problem().capacity(), capacity);
}

#[test]
fn zeroing_the_reference_stops_the_walk() {
    let mut generator = initialized_generator();
    generator.set_reference(ReferenceVelocity {
        forward: 0.2,
        lateral: 0.0,
        turn: 0.0,
    });

    let mut queues = TrajectoryQueues::new();
    for _ in 0..20 {
        generator.tick(&mut queues).unwrap();
    }

    generator.set_reference(ReferenceVelocity::default());
    for _ in 0..50 {
        generator.tick(&mut queues).unwrap();
    }

    // the center of mass settles
    let last = queues.com.back().unwrap();
    assert!(last.velocity.x.abs() < 0.02);
    // and both feet are on the ground
    assert!(queues.left_foot.back().unwrap().z.abs() < 1e-6);
    assert!(queues.right_foot.back().unwrap().z.abs() < 1e-6);
}
