//! Properties of the steering law

use piradigm_challenge::{steer, SteeringDecision, SteeringParams, SteeringState};
use piradigm_eye::Detection;
use proptest::prelude::*;

fn any_state() -> impl Strategy<Value = SteeringState> {
    prop_oneof![
        Just(SteeringState::Searching),
        Just(SteeringState::Tracking),
        Just(SteeringState::BackingAway),
    ]
}

fn any_detection() -> impl Strategy<Value = Option<Detection>> {
    prop::option::of((0f32..160.0, 0f32..128.0, 0f32..100.0).prop_map(|(x, y, size)| Detection::new(x, y, size)))
}

proptest! {
    #[test]
    fn test_steering_is_deterministic(state in any_state(), detection in any_detection()) {
        let params = SteeringParams::default();
        let a = steer(state, detection.as_ref(), 80.0, &params);
        let b = steer(state, detection.as_ref(), 80.0, &params);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn test_commands_stay_in_unit_range(
        state in any_state(),
        detection in any_detection(),
        gain in 0f32..20.0,
    ) {
        let params = SteeringParams { turn_p: gain, ..SteeringParams::default() };
        if let SteeringDecision::Drive(cmd) = steer(state, detection.as_ref(), 80.0, &params).decision {
            prop_assert!((-1.0..=1.0).contains(&cmd.turn));
            prop_assert!((-1.0..=1.0).contains(&cmd.speed));
        }
    }

    #[test]
    fn test_losing_a_tracked_target_reverses(size in 0f32..3.0, x in 0f32..160.0) {
        let params = SteeringParams::default();
        let small = Detection::new(x, 10.0, size);
        for detection in [None, Some(small)] {
            let out = steer(SteeringState::Tracking, detection.as_ref(), 80.0, &params);
            prop_assert_eq!(out.state, SteeringState::BackingAway);
            match out.decision {
                SteeringDecision::Drive(cmd) => {
                    prop_assert_eq!(cmd.turn, 0.0);
                    prop_assert!(cmd.speed < 0.0);
                }
                SteeringDecision::Seek(_) => prop_assert!(false, "expected reverse"),
            }
        }
    }

    #[test]
    fn test_big_targets_always_back_away(state in any_state(), size in 60f32..500.0, x in 0f32..160.0) {
        let out = steer(state, Some(&Detection::new(x, 10.0, size)), 80.0, &SteeringParams::default());
        prop_assert_eq!(out.state, SteeringState::BackingAway);
    }
}
