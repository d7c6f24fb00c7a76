//! Property tests: arbitrary start/stop sequences keep the session state
//! in lockstep with the live overlay resource.

use std::sync::Arc;

use floatbub_core::{BubbleController, BubbleOptions, NotificationOptions, OverlayPlatform, SimulatedPlatform};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Start,
    Stop,
    Reject(bool),
    FailRelease(bool),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Start),
        4 => Just(Op::Stop),
        1 => any::<bool>().prop_map(Op::Reject),
        1 => any::<bool>().prop_map(Op::FailRelease),
    ]
}

proptest! {
    #[test]
    fn running_iff_overlay_alive(ops in proptest::collection::vec(op(), 0..64)) {
        let sim = Arc::new(SimulatedPlatform::new().with_overlay_granted(true));
        let ctl = BubbleController::new(Arc::clone(&sim) as Arc<dyn OverlayPlatform>);

        for op in ops {
            let was_running = ctl.is_running();
            match op {
                Op::Start => {
                    let started = ctl.start(BubbleOptions::default(), NotificationOptions::default());
                    prop_assert_eq!(started, ctl.is_running());
                    if was_running {
                        prop_assert!(started);
                    }
                }
                Op::Stop => {
                    let stopped = ctl.stop();
                    prop_assert_eq!(stopped, !ctl.is_running());
                    if !was_running {
                        prop_assert!(stopped);
                    }
                }
                Op::Reject(reject) => sim.set_reject_overlay(reject),
                Op::FailRelease(fail) => sim.set_fail_release(fail),
            }
            prop_assert!(sim.live_overlay_count() <= 1);
            prop_assert_eq!(sim.live_overlay_count() == 1, ctl.is_running());
        }
    }
}
