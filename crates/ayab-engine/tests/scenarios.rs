//! End-to-end scenarios driving `KnitFsm` purely through its public API
//! against `MockSerialLink`, the same way a dispatcher gets exercised end
//! to end rather than one arm at a time.

use std::sync::{Arc, Mutex};

use ayab_engine::{EngineError, FsmOutcome, KnitFsm, MockSerialLink, ProgressEvent, ProgressSink};
use ayab_image::{PatternBuffer, RgbaImage};
use ayab_machine::{Alignment, Config, KnittingMode, Machine};
use rgb::RGB8;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    fn take(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn update_progress(&self, row: u32, total_rows: u32, repeat_count: u32) {
        self.events.lock().unwrap().push(ProgressEvent::Progress {
            row,
            total_rows,
            repeat_count,
        });
    }
    fn update_color(&self, color: u8) {
        self.events.lock().unwrap().push(ProgressEvent::Color { color });
    }
    fn update_status(&self, status: String) {
        self.events.lock().unwrap().push(ProgressEvent::Status(status));
    }
    fn notify(&self, message: String) {
        self.events.lock().unwrap().push(ProgressEvent::Notify(message));
    }
    fn play_sound(&self, name: &str) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::PlaySound(name.to_string()));
    }
    fn finished(&self, ok: bool) {
        self.events.lock().unwrap().push(ProgressEvent::Finished { ok });
    }
}

impl ProgressSink for Arc<RecordingSink> {
    fn update_progress(&self, row: u32, total_rows: u32, repeat_count: u32) {
        (**self).update_progress(row, total_rows, repeat_count);
    }
    fn update_color(&self, color: u8) {
        (**self).update_color(color);
    }
    fn update_status(&self, status: String) {
        (**self).update_status(status);
    }
    fn notify(&self, message: String) {
        (**self).notify(message);
    }
    fn play_sound(&self, name: &str) {
        (**self).play_sound(name);
    }
    fn finished(&self, ok: bool) {
        (**self).finished(ok);
    }
}

fn singlebed_job() -> (Config, PatternBuffer) {
    let machine = Machine::default();
    let config = Config::validate(
        machine,
        2,
        0,
        KnittingMode::Singlebed,
        false,
        false,
        Alignment::Center,
        0,
        199,
        "Simulation".to_string(),
    )
    .unwrap();
    let a = RGB8::new(10, 10, 10);
    let b = RGB8::new(200, 200, 200);
    let image = RgbaImage::new(4, 2, vec![a, b, a, b, b, a, b, a]);
    let pattern = PatternBuffer::build(&image, 2, machine).unwrap();
    (config, pattern)
}

/// FSM receives `reqLine(255)` then `reqLine(0)`; the second request
/// belongs to the next 256-line block, so the planner must see absolute
/// line 256, not a repeat of 0.
#[test]
fn s5_block_wrap_produces_monotonic_absolute_line_numbers() {
    let (config, pattern) = singlebed_job();
    let mut link = MockSerialLink::new();
    link.push_inbound(vec![0xC3, 5, 1, 0]); // cnfInfo api=5
    link.push_inbound(vec![0x84, 1, 0, 0, 0, 0, 1, 0]); // indState ready=1
    link.push_inbound(vec![0xC1, 1]); // cnfStart ok=1
    link.push_inbound(vec![0x82, 255]); // reqLine(255)
    link.push_inbound(vec![0x82, 0]); // reqLine(0) -> block wrap

    let sink = Arc::new(RecordingSink::default());
    let mut fsm = KnitFsm::new(config, pattern, Box::new(link), Box::new(sink));
    fsm.step().unwrap(); // Setup -> Init
    fsm.step().unwrap(); // Init -> WaitForInit
    fsm.step().unwrap(); // WaitForInit -> Start
    fsm.step().unwrap(); // Start -> Operate
    fsm.step().unwrap(); // Operate: reqLine(255) -> absolute 255
    assert_eq!(fsm.last_absolute_line(), Some(255));
    fsm.step().unwrap(); // Operate: reqLine(0) -> block wrap, absolute 256
    assert_eq!(fsm.last_absolute_line(), Some(256));
}

/// Device reports an API version the engine doesn't speak; the FSM must
/// terminate with exactly one `finished(false)` and never attempt to send
/// `reqStart`.
#[test]
fn s6_wrong_api_terminates_with_exactly_one_finished_false() {
    let (config, pattern) = singlebed_job();
    let mut link = MockSerialLink::new();
    link.push_inbound(vec![0xC3, 4, 0, 9]); // cnfInfo api=4
    let sent = link.sent_handle();
    let sink = Arc::new(RecordingSink::default());
    let mut fsm = KnitFsm::new(config, pattern, Box::new(link), Box::new(Arc::clone(&sink)));

    assert_eq!(fsm.step().unwrap(), FsmOutcome::Running); // Setup -> Init
    let err = fsm.step().unwrap_err();
    assert_eq!(
        err,
        EngineError::WrongApi {
            expected: 5,
            got: 4
        }
    );

    let events = sink.take();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Finished { .. }))
            .count(),
        1
    );
    assert_eq!(events.last(), Some(&ProgressEvent::Finished { ok: false }));
    assert!(!sent.borrow().iter().any(|m| m.first() == Some(&0x01)));
}
