//! Property tests for the translation loop.

use gadget_runtime::mock::{RecordingSink, ScriptedSource};
use gadget_runtime::{
    ActionMap, InputSnapshot, JoystickDevice, MouseDevice, Poll, TranslationLoop,
};
use hid_gadget_protocol::{JoystickShape, MouseShape};
use proptest::prelude::*;

fn snapshot() -> impl Strategy<Value = InputSnapshot> {
    (
        -1.5f32..1.5,
        -1.5f32..1.5,
        0.0f32..1.0,
        -300.0f32..300.0,
        any::<bool>(),
    )
        .prop_map(|(x, y, trigger, motion, pressed)| {
            InputSnapshot::new()
                .with_analog("JoyLeft", x, y)
                .with_analog("TrigLeft", trigger, 0.0)
                .with_analog("Mouse", motion, -motion)
                .with_digital("A", pressed)
                .with_digital("MouseClickLeft", pressed)
        })
}

fn script() -> impl Strategy<Value = Vec<Poll>> {
    prop::collection::vec(
        prop_oneof![
            4 => snapshot().prop_map(Poll::Frame),
            1 => Just(Poll::Disconnected),
        ],
        0..40,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_one_report_per_frame_plus_idle(script in script()) {
        let frames = script.iter().filter(|p| matches!(p, Poll::Frame(_))).count();
        let js = RecordingSink::new();
        let mouse = RecordingSink::new();
        let mut lp = TranslationLoop::new(ScriptedSource::new(script), ActionMap::default())
            .with_joystick(JoystickDevice::new(JoystickShape::default(), js.clone()))
            .with_mouse(MouseDevice::new(MouseShape::default(), mouse.clone()));

        let handled = lp.run().map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(handled, frames as u64);

        let js_reports = js.reports();
        prop_assert_eq!(js_reports.len(), frames + 1);
        prop_assert!(js_reports.iter().all(|r| r.len() == 9));
        prop_assert_eq!(js_reports.last(), Some(&vec![0u8; 9]));

        let mouse_reports = mouse.reports();
        prop_assert_eq!(mouse_reports.len(), frames + 1);
        prop_assert_eq!(mouse_reports.last(), Some(&vec![0u8; 7]));
    }

    #[test]
    fn prop_stick_bytes_stay_in_range(frame in snapshot()) {
        let js = RecordingSink::new();
        let mut lp = TranslationLoop::new(ScriptedSource::frames([frame]), ActionMap::default())
            .with_joystick(JoystickDevice::new(JoystickShape::default(), js.clone()));
        lp.step().map_err(|e| TestCaseError::fail(e.to_string()))?;

        let report = js.last().unwrap_or_default();
        for &byte in report.iter().take(6) {
            prop_assert_ne!(byte, 0x80);
        }
    }
}
