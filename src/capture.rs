// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera capture task and frame handoff.
//!
//! The capture task pulls frames from a [`CameraSource`] as fast as the
//! camera delivers them and passes each one through a single slot handoff.
//! A frame that is still waiting when the next one arrives is dropped, so
//! the presenter always gets the newest image and never queues latency.

use crate::{
    error::{CameraError, Error, Result},
    frame::Frame,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A blocking producer of frames.
pub trait CameraSource {
    /// Waits for the next frame.
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

impl<S: CameraSource + ?Sized> CameraSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        (**self).next_frame()
    }
}

/// How transient camera failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up
    pub max_retries: u32,
    /// Pause before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Cooperative cancellation flag shared between a task and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleeps for `duration` unless stopped first. Returns whether the signal
    /// was raised.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }
}

/// Creates a single slot frame handoff.
pub fn handoff() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = kanal::bounded(1);
    (
        FrameSender {
            tx,
            evict: rx.clone(),
        },
        FrameReceiver { rx },
    )
}

/// Producing side of [`handoff`].
pub struct FrameSender {
    tx: kanal::Sender<Frame>,
    evict: kanal::Receiver<Frame>,
}

impl FrameSender {
    /// Offers `frame` without blocking, replacing any frame the consumer has
    /// not taken yet. Returns whether a frame was dropped to make room, or
    /// `None` when the consumer is gone.
    pub fn offer(&self, frame: Frame) -> Option<bool> {
        let mut dropped = false;
        while let Ok(Some(stale)) = self.evict.try_recv() {
            debug!("dropping unpresented frame {}", stale.sequence());
            dropped = true;
        }
        match self.tx.try_send(frame) {
            Ok(true) => Some(dropped),
            // The consumer raced us for the slot; this frame is the loser.
            Ok(false) => Some(true),
            Err(_) => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming side of [`handoff`]. Dropping it stops the producer.
pub struct FrameReceiver {
    rx: kanal::Receiver<Frame>,
}

impl FrameReceiver {
    /// Waits for the next frame; `None` once the producer has finished.
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    /// Takes the waiting frame, if any.
    pub fn try_recv(&self) -> Option<Frame> {
        self.rx.try_recv().ok().flatten()
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        let _ = self.rx.close();
    }
}

/// Counters reported when a capture task ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub dropped: u64,
    pub retries: u64,
}

/// Moves frames from a camera into a handoff until stopped.
pub struct CaptureTask<S> {
    source: S,
    sender: FrameSender,
    policy: RetryPolicy,
    stop: StopSignal,
}

impl<S: CameraSource> CaptureTask<S> {
    pub fn new(source: S, sender: FrameSender, policy: RetryPolicy, stop: StopSignal) -> Self {
        Self {
            source,
            sender,
            policy,
            stop,
        }
    }

    /// Runs in the calling thread.
    ///
    /// Ends with `Ok` when stopped or when the consumer went away. A fatal
    /// camera error, or more than `max_retries` consecutive transient ones,
    /// ends the task with that error; it is logged once here and returned.
    pub fn run(mut self) -> Result<CaptureStats> {
        let mut stats = CaptureStats::default();
        let mut sequence = 0;
        let mut failures = 0;

        while !self.stop.is_stopped() {
            match self.source.next_frame() {
                Ok(frame) => {
                    failures = 0;
                    sequence += 1;
                    stats.captured += 1;
                    match self.sender.offer(frame.with_sequence(sequence)) {
                        Some(true) => stats.dropped += 1,
                        Some(false) => {}
                        None => {
                            info!("frame consumer gone, capture stopping");
                            break;
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("camera failed: {e}");
                    return Err(Error::Camera(e));
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.policy.max_retries {
                        error!("camera failed {failures} times in a row: {e}");
                        return Err(Error::RetriesExhausted {
                            attempts: failures,
                            last: e,
                        });
                    }
                    stats.retries += 1;
                    warn!(
                        "camera read failed ({failures}/{}): {e}",
                        self.policy.max_retries
                    );
                    if self.stop.sleep(self.policy.backoff) {
                        break;
                    }
                }
            }
        }

        info!(
            "capture finished: {} captured, {} dropped, {} retries",
            stats.captured, stats.dropped, stats.retries
        );
        Ok(stats)
    }
}

impl<S: CameraSource + 'static> CaptureTask<S> {
    /// Opens the camera and runs the task on tokio's blocking pool.
    ///
    /// The source is created inside the blocking thread, so it does not have
    /// to be `Send`.
    pub fn spawn<F>(open: F, sender: FrameSender, policy: RetryPolicy, stop: StopSignal) -> CaptureHandle
    where
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let signal = stop.clone();
        let join = tokio::task::spawn_blocking(move || {
            let source = open()?;
            CaptureTask::new(source, sender, policy, signal).run()
        });
        CaptureHandle {
            stop,
            join: Some(join),
        }
    }
}

/// Owner's handle on a spawned [`CaptureTask`].
pub struct CaptureHandle {
    stop: StopSignal,
    join: Option<JoinHandle<Result<CaptureStats>>>,
}

impl CaptureHandle {
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Waits for the task to end. Cancel safe; returns `None` once the
    /// result has already been collected.
    pub async fn finished(&mut self) -> Option<Result<CaptureStats>> {
        let join = self.join.as_mut()?;
        let result = join.await;
        self.join = None;
        Some(result.unwrap_or_else(|e| Err(Error::Io(std::io::Error::other(e)))))
    }

    /// Stops the task and waits for it.
    pub async fn shutdown(mut self) -> Option<Result<CaptureStats>> {
        self.stop();
        self.finished().await
    }
}
