//! Progress reporting seam: a bounded channel for high-frequency updates
//! that may drop the oldest entry under backpressure, and an unbounded side
//! channel for the low-frequency events that must never be lost.

use crossbeam_channel::{Receiver, Sender, TrySendError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress { row: u32, total_rows: u32, repeat_count: u32 },
    Color { color: u8 },
    Status(String),
    Notify(String),
    PlaySound(String),
    Finished { ok: bool },
}

/// Observer the FSM reports to. Kept as a trait, not a concrete channel
/// type, so tests can substitute a simple `Vec`-backed recorder without
/// standing up real channels.
pub trait ProgressSink {
    fn update_progress(&self, row: u32, total_rows: u32, repeat_count: u32);
    fn update_color(&self, color: u8);
    fn update_status(&self, status: String);
    fn notify(&self, message: String);
    fn play_sound(&self, name: &str);
    fn finished(&self, ok: bool);
}

/// The two receiving ends a [`ChannelProgressSink`] feeds.
pub struct ProgressEvents {
    pub progress: Receiver<ProgressEvent>,
    pub side: Receiver<ProgressEvent>,
}

/// Channel-backed `ProgressSink`. `progress`/`color`/`status` share one
/// bounded channel and drop the oldest queued event on overflow rather than
/// blocking the knitting loop; `notify`/`play_sound`/`finished` go out on an
/// unbounded side channel so a slow consumer never misses a completion.
pub struct ChannelProgressSink {
    progress_tx: Sender<ProgressEvent>,
    /// Kept only to pop the oldest entry on overflow; this sink is the sole
    /// reader on this end, the consumer gets its own `Receiver` clone from
    /// [`ChannelProgressSink::new`].
    progress_rx: Receiver<ProgressEvent>,
    side_tx: Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(capacity: usize) -> (Self, ProgressEvents) {
        let (progress_tx, progress_rx) = crossbeam_channel::bounded(capacity);
        let (side_tx, side_rx) = crossbeam_channel::unbounded();
        let sink = Self {
            progress_tx,
            progress_rx: progress_rx.clone(),
            side_tx,
        };
        let events = ProgressEvents {
            progress: progress_rx,
            side: side_rx,
        };
        (sink, events)
    }

    fn send_progress(&self, event: ProgressEvent) {
        match self.progress_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let _ = self.progress_rx.try_recv();
                let _ = self.progress_tx.try_send(event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn update_progress(&self, row: u32, total_rows: u32, repeat_count: u32) {
        self.send_progress(ProgressEvent::Progress {
            row,
            total_rows,
            repeat_count,
        });
    }

    fn update_color(&self, color: u8) {
        self.send_progress(ProgressEvent::Color { color });
    }

    fn update_status(&self, status: String) {
        self.send_progress(ProgressEvent::Status(status));
    }

    fn notify(&self, message: String) {
        let _ = self.side_tx.send(ProgressEvent::Notify(message));
    }

    fn play_sound(&self, name: &str) {
        let _ = self.side_tx.send(ProgressEvent::PlaySound(name.to_string()));
    }

    fn finished(&self, ok: bool) {
        tracing::info!(target: "engine.fsm", ok, "job finished");
        let _ = self.side_tx.send(ProgressEvent::Finished { ok });
    }
}
