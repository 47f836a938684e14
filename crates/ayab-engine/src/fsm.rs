//! `KnitFsm`: the state machine driving one serial link through
//! `Setup → Init → WaitForInit → Start → Operate → Finished`. One
//! `step_at` call handles at most one inbound message so a driving loop
//! stays a thin `while let Running = fsm.step()? {}`.

use std::time::{Duration, Instant};

use ayab_image::PatternBuffer;
use ayab_machine::{Config, Geometry};
use ayab_protocol::{DeviceMessage, HostMessage};

use crate::progress::ProgressSink;
use crate::serial::SerialLink;
use crate::EngineError;

const EXPECTED_API: u8 = 5;
const REQ_INFO_RETRY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KnitState {
    Setup,
    Init { since: Instant },
    WaitForInit,
    Start,
    Operate {
        line_block: u32,
        former_request: Option<u8>,
    },
    Finished { ok: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmOutcome {
    Running,
    Finished { ok: bool },
    Cancelled,
}

pub struct KnitFsm {
    config: Config,
    pattern: PatternBuffer,
    geometry: Geometry,
    link: Box<dyn SerialLink>,
    sink: Box<dyn ProgressSink>,
    state: KnitState,
    cancel_requested: bool,
    inf_repeat_count: u32,
    last_absolute_line: Option<u64>,
    done: bool,
}

impl KnitFsm {
    /// Construct a ready-to-run FSM. `config` and `pattern` must already
    /// have passed validation; that happens one layer up so the FSM itself
    /// never has to report `InvalidSettings`.
    pub fn new(
        config: Config,
        pattern: PatternBuffer,
        link: Box<dyn SerialLink>,
        sink: Box<dyn ProgressSink>,
    ) -> Self {
        let geometry = config.geometry(pattern.width as u16);
        Self {
            config,
            pattern,
            geometry,
            link,
            sink,
            state: KnitState::Setup,
            cancel_requested: false,
            inf_repeat_count: 0,
            last_absolute_line: None,
            done: false,
        }
    }

    /// Request cancellation; takes effect on the next `step`/`step_at` call,
    /// checked at the top of each call before any message is read.
    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    pub fn inf_repeat_count(&self) -> u32 {
        self.inf_repeat_count
    }

    /// The most recent `line_block·256 + n` planned against, useful for
    /// asserting line order is monotone — not observable from the wire
    /// alone, since `cnfLine` only ever echoes the 8-bit `n`.
    pub fn last_absolute_line(&self) -> Option<u64> {
        self.last_absolute_line
    }

    pub fn step(&mut self) -> Result<FsmOutcome, EngineError> {
        self.step_at(Instant::now())
    }

    /// Same as [`KnitFsm::step`] but with an injected clock, so re-send
    /// timeout behavior is testable without sleeping.
    pub fn step_at(&mut self, now: Instant) -> Result<FsmOutcome, EngineError> {
        if self.done {
            return Ok(match self.state {
                KnitState::Finished { ok } => FsmOutcome::Finished { ok },
                _ => FsmOutcome::Finished { ok: false },
            });
        }

        if self.cancel_requested {
            self.sink.notify("cancelled".to_string());
            let _ = self.link.close();
            self.sink.finished(false);
            self.state = KnitState::Finished { ok: false };
            self.done = true;
            return Ok(FsmOutcome::Cancelled);
        }

        // Setup has nothing to read yet — the device stays silent until it
        // sees reqInfo, so popping a message here would desync every
        // subsequent state by one.
        if let KnitState::Setup = self.state {
            self.link.write_message(&HostMessage::ReqInfo.encode())?;
            self.state = KnitState::Init { since: now };
            return Ok(FsmOutcome::Running);
        }

        let device_msg = match self.link.read_message(Duration::from_millis(0))? {
            Some(bytes) => Some(DeviceMessage::parse(&bytes)?),
            None => None,
        };

        // indState is observed in every state without affecting it, so the
        // progress sink stays current regardless of where the FSM is.
        if let Some(DeviceMessage::IndState {
            hall_l,
            hall_r,
            carriage_type,
            carriage_pos,
            ..
        }) = &device_msg
        {
            self.sink.update_status(format!(
                "hall_l={hall_l} hall_r={hall_r} carriage_type={carriage_type:?} carriage_pos={carriage_pos}"
            ));
        }

        let current = self.state;
        match current {
            KnitState::Setup => unreachable!("Setup is handled above before any message is read"),

            KnitState::Init { since } => {
                match device_msg {
                    Some(DeviceMessage::CnfInfo { api, .. }) => {
                        if api == EXPECTED_API {
                            self.state = KnitState::WaitForInit;
                        } else {
                            return self.fail(EngineError::WrongApi {
                                expected: EXPECTED_API,
                                got: api,
                            });
                        }
                    }
                    Some(_) => {}
                    None => {
                        if now.duration_since(since) >= REQ_INFO_RETRY {
                            self.link.write_message(&HostMessage::ReqInfo.encode())?;
                            self.state = KnitState::Init { since: now };
                        }
                    }
                }
                Ok(FsmOutcome::Running)
            }

            KnitState::WaitForInit => {
                if let Some(DeviceMessage::IndState { ready, .. }) = device_msg {
                    if ready {
                        self.link.write_message(
                            &HostMessage::ReqStart {
                                knit_start_needle: self.config.knit_start_needle as u8,
                                knit_stop_needle: self.config.knit_stop_needle as u8,
                                continuous_reporting: self.config.continuous_reporting,
                            }
                            .encode(),
                        )?;
                        self.state = KnitState::Start;
                    }
                }
                Ok(FsmOutcome::Running)
            }

            KnitState::Start => {
                match device_msg {
                    Some(DeviceMessage::CnfStart { ok: true }) => {
                        self.state = KnitState::Operate {
                            line_block: 0,
                            former_request: None,
                        };
                    }
                    Some(DeviceMessage::CnfStart { ok: false }) => {
                        return self.fail(EngineError::DeviceNotReady);
                    }
                    _ => {}
                }
                Ok(FsmOutcome::Running)
            }

            KnitState::Operate {
                mut line_block,
                former_request,
            } => {
                if let Some(DeviceMessage::ReqLine { line_number: n }) = device_msg {
                    if former_request == Some(255) && n == 0 {
                        line_block += 1;
                    }
                    let absolute = 256u64
                        .checked_mul(line_block as u64)
                        .and_then(|base| base.checked_add(n as u64))
                        .ok_or(EngineError::LineOutOfRange(n))?;
                    self.last_absolute_line = Some(absolute);

                    let plan = ayab_planner::plan(
                        absolute,
                        self.config.mode,
                        self.config.num_colors,
                        self.config.start_row,
                        self.pattern.height,
                        self.pattern.expanded_len(),
                        self.config.inf_repeat,
                    );
                    let frame = ayab_planner::LineEncoder::encode(
                        &plan,
                        self.config.mode,
                        self.config.num_colors,
                        self.config.machine,
                        self.geometry,
                        &self.pattern,
                    );

                    let last_line = plan.last && !self.config.inf_repeat;
                    self.link.write_message(
                        &HostMessage::CnfLine {
                            line_number: n,
                            frame: *frame.as_bytes(),
                            last_line,
                            blank: plan.blank,
                            color: plan.color,
                        }
                        .encode(),
                    )?;

                    self.sink.update_color(plan.color);
                    self.sink.update_progress(
                        plan.img_row,
                        self.pattern.height,
                        self.inf_repeat_count,
                    );

                    self.state = KnitState::Operate {
                        line_block,
                        former_request: Some(n),
                    };

                    if plan.last {
                        if self.config.inf_repeat {
                            self.inf_repeat_count += 1;
                        } else {
                            let _ = self.link.close();
                            self.sink.finished(true);
                            self.state = KnitState::Finished { ok: true };
                            self.done = true;
                            return Ok(FsmOutcome::Finished { ok: true });
                        }
                    }
                }
                Ok(FsmOutcome::Running)
            }

            KnitState::Finished { ok } => {
                self.done = true;
                Ok(FsmOutcome::Finished { ok })
            }
        }
    }

    fn fail(&mut self, err: EngineError) -> Result<FsmOutcome, EngineError> {
        self.sink.notify(err.to_string());
        let _ = self.link.close();
        self.sink.finished(false);
        self.state = KnitState::Finished { ok: false };
        self.done = true;
        Err(err)
    }
}
