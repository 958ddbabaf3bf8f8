use std::sync::Arc;

use diffbot_core::mocks::RecordingMotor;
use diffbot_core::{Encoder, PidCfg, WheelCfg, WheelState, build_wheel};
use diffbot_traits::ManualClock;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Target(f64),
    Power(i32),
    Pulse,
    Advance(u64),
    Step,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-500.0f64..500.0).prop_map(Op::Target),
        (-0.002f64..0.002).prop_map(Op::Target),
        (-400i32..400).prop_map(Op::Power),
        Just(Op::Pulse),
        (0u64..300).prop_map(Op::Advance),
        Just(Op::Step),
        Just(Op::Step),
    ]
}

proptest! {
    #[test]
    fn wheel_invariants_hold_for_any_command_sequence(
        ops in proptest::collection::vec(op_strategy(), 1..300),
        kp in 0.0f64..5.0,
        ki in 0.0f64..2.0,
        limit in 200i32..=255,
    ) {
        let clock = ManualClock::new();
        let enc = Arc::new(Encoder::new(Arc::new(clock.clone())));
        enc.attach(5);
        let pid = PidCfg { kp, ki, sample_ms: 20, ..PidCfg::default() };
        let cfg = WheelCfg {
            kick_power: 190,
            settle_power: 120,
            settle_ms: 50,
            kick_ramp_per_sec: 40.0,
            power_limit: limit,
            ..WheelCfg::default()
        };
        let mut wheel = build_wheel("prop", RecordingMotor::new(), Arc::clone(&enc), pid, cfg, None)
            .expect("valid wheel");

        let mut last_count = 0;
        for op in ops {
            let before = wheel.state();
            match op {
                Op::Target(v) => {
                    let applied = wheel.set_target_speed(v);
                    if v.abs() < 0.001 {
                        prop_assert_eq!(applied, 0.0);
                        prop_assert_eq!(wheel.state(), WheelState::Idle);
                        prop_assert_eq!(wheel.power(), 0);
                    } else {
                        prop_assert_eq!(applied, v);
                    }
                }
                Op::Power(p) => {
                    wheel.set_power(p);
                    prop_assert_eq!(wheel.state(), WheelState::Idle);
                    prop_assert_eq!(wheel.power(), p.clamp(-255, 255));
                }
                Op::Pulse => enc.record_pulse(),
                Op::Advance(ms) => clock.advance_ms(ms),
                Op::Step => {
                    let wrote = wheel.step();
                    let after = wheel.state();
                    // One transition per step, never skipping.
                    let allowed = match before {
                        WheelState::Idle => after == WheelState::Idle && !wrote,
                        WheelState::Starting => after == WheelState::KickPower,
                        WheelState::KickPower => {
                            matches!(after, WheelState::KickPower | WheelState::SettlePower)
                        }
                        WheelState::SettlePower => {
                            matches!(after, WheelState::SettlePower | WheelState::ClosedLoop)
                        }
                        WheelState::ClosedLoop => after == WheelState::ClosedLoop,
                    };
                    prop_assert!(allowed, "{:?} -> {:?}", before, after);
                    if before != WheelState::Idle {
                        prop_assert!(wheel.power().abs() <= limit);
                    }
                }
            }
            if wheel.state() != WheelState::Idle {
                prop_assert!(wheel.target_speed().abs() >= 0.001);
            } else {
                prop_assert_eq!(wheel.target_speed(), 0.0);
            }
            let c = wheel.pulse_count();
            prop_assert!(c >= last_count);
            last_count = c;
        }
    }
}
