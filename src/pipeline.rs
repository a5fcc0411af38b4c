// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Consumer side of the pipeline: takes frames from the handoff and presents
//! them through a [`Compositor`].

use crate::{
    capture::FrameReceiver,
    compositor::{Compositor, CompositorConfig},
    error::{ErrorKind, Result},
    window::WindowCloser,
};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Rolling average of the presentation rate.
pub struct FpsCounter {
    prev: Instant,
    history: Vec<i64>,
    index: usize,
}

impl FpsCounter {
    pub fn new(window: usize) -> Self {
        Self {
            prev: Instant::now(),
            history: vec![0; window.max(1)],
            index: 0,
        }
    }

    /// Records one frame and returns the averaged rate.
    pub fn tick(&mut self) -> i64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.prev);
        self.prev = now;

        self.history[self.index] = 1e9 as i64 / (elapsed.as_nanos() as i64).max(1);
        self.index = (self.index + 1) % self.history.len();

        (self.history.iter().sum::<i64>() as f64 / self.history.len() as f64).round() as i64
    }
}

/// Counters reported when the presenter ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PresentStats {
    pub presented: u64,
    pub failed: u64,
    /// Frames replaced in the handoff before they could be presented
    pub skipped: u64,
}

enum Control {
    Layout(CompositorConfig),
    SyncDisplayMode,
}

/// Requests layout changes from another thread.
///
/// Requests are applied before the next frame is presented. Both methods
/// return false once the presenter has stopped.
#[derive(Clone)]
pub struct Reconfigure {
    tx: kanal::Sender<Control>,
}

impl Reconfigure {
    pub fn layout(&self, config: CompositorConfig) -> bool {
        self.tx.send(Control::Layout(config)).is_ok()
    }

    /// Follow a display mode change.
    pub fn sync_display_mode(&self) -> bool {
        self.tx.send(Control::SyncDisplayMode).is_ok()
    }
}

/// Presents every frame arriving on a [`FrameReceiver`].
pub struct Presenter {
    compositor: Compositor,
    frames: FrameReceiver,
    control: kanal::Receiver<Control>,
}

impl Presenter {
    pub fn new(compositor: Compositor, frames: FrameReceiver) -> (Self, Reconfigure) {
        let (tx, control) = kanal::unbounded();
        (
            Self {
                compositor,
                frames,
                control,
            },
            Reconfigure { tx },
        )
    }

    /// Closes the presenter's window from another thread, which ends
    /// [`Presenter::run`] after the frame in flight.
    pub fn closer(&self) -> WindowCloser {
        self.compositor.closer()
    }

    fn apply(&mut self, request: Control) {
        match request {
            Control::Layout(config) => {
                if let Err(e) = self.compositor.reconfigure(config) {
                    warn!("layout rejected: {e}");
                }
            }
            Control::SyncDisplayMode => match self.compositor.sync_display_mode() {
                Ok(true) => {
                    let (w, h) = self.compositor.size();
                    info!("following display mode change to {w}x{h}");
                }
                Ok(false) => debug!("display mode unchanged"),
                Err(e) => warn!("display mode sync failed: {e}"),
            },
        }
    }

    /// Runs until the producer finishes or the window is closed.
    ///
    /// Frames that cannot be placed are logged and skipped. A firmware
    /// failure ends the loop with that error.
    pub fn run(mut self) -> Result<PresentStats> {
        let mut stats = PresentStats::default();
        let mut fps = FpsCounter::new(30);
        let mut last_sequence = 0;

        while let Some(frame) = self.frames.recv() {
            while let Ok(Some(request)) = self.control.try_recv() {
                self.apply(request);
            }

            if last_sequence > 0 && frame.sequence() > last_sequence + 1 {
                stats.skipped += frame.sequence() - last_sequence - 1;
            }
            last_sequence = frame.sequence();

            match self.compositor.update(&frame) {
                Ok(placement) => {
                    stats.presented += 1;
                    let rate = fps.tick();
                    debug!(
                        "frame {} {}x{} {} -> {} fps: {rate} latency: {:?}",
                        frame.sequence(),
                        frame.width(),
                        frame.height(),
                        placement.src,
                        placement.dst,
                        frame.captured().elapsed()
                    );
                }
                Err(e) => match e.kind() {
                    ErrorKind::State => {
                        info!("presenter window closed");
                        break;
                    }
                    ErrorKind::Device => {
                        error!("presenting frame {} failed: {e}", frame.sequence());
                        return Err(e);
                    }
                    _ => {
                        stats.failed += 1;
                        if stats.failed == 1 || stats.failed % 100 == 0 {
                            warn!(
                                "frame {} not presented ({} so far): {e}",
                                frame.sequence(),
                                stats.failed
                            );
                        }
                    }
                },
            }
        }

        info!(
            "presenter finished: {} presented, {} skipped, {} failed",
            stats.presented, stats.skipped, stats.failed
        );
        Ok(stats)
    }
}
