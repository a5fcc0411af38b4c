// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_display::{
    capture::{handoff, CameraSource, CaptureTask, RetryPolicy, StopSignal},
    error::CameraError,
    firmware::memory::MemoryFirmware,
    pipeline::{FpsCounter, Presenter},
    Compositor, CompositorConfig, Display, DisplayMode, Error, Frame, PixelFormat,
};
use std::{
    collections::VecDeque,
    error::Error as StdError,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

fn frame() -> Frame {
    Frame::new(vec![128; 4 * 4 * 3], 4, 4, PixelFormat::Rgb3).unwrap()
}

/// Replays a fixed list of results, then raises `stop` and times out.
struct Scripted {
    script: VecDeque<Result<Frame, CameraError>>,
    stop: StopSignal,
}

impl Scripted {
    fn new(script: Vec<Result<Frame, CameraError>>, stop: &StopSignal) -> Self {
        Self {
            script: script.into(),
            stop: stop.clone(),
        }
    }
}

impl CameraSource for Scripted {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.script.pop_front().unwrap_or_else(|| {
            self.stop.stop();
            Err(CameraError::Timeout)
        })
    }
}

/// Delivers frames forever at roughly 1 kHz.
struct Endless;

impl CameraSource for Endless {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        thread::sleep(Duration::from_millis(1));
        Ok(frame())
    }
}

fn no_backoff(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff: Duration::ZERO,
    }
}

fn transient() -> Result<Frame, CameraError> {
    Err(CameraError::Transient("EIO".to_string()))
}

fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn newest_frame_wins() {
    let (sender, receiver) = handoff();
    assert_eq!(sender.offer(frame().with_sequence(1)), Some(false));
    assert_eq!(sender.offer(frame().with_sequence(2)), Some(true));
    assert_eq!(sender.offer(frame().with_sequence(3)), Some(true));

    assert_eq!(receiver.try_recv().map(|f| f.sequence()), Some(3));
    assert!(receiver.try_recv().is_none());

    assert_eq!(sender.offer(frame().with_sequence(4)), Some(false));
    assert_eq!(receiver.try_recv().map(|f| f.sequence()), Some(4));
}

#[test]
fn dropped_receiver_closes_handoff() {
    let (sender, receiver) = handoff();
    assert!(!sender.is_closed());
    drop(receiver);
    assert!(sender.is_closed());
    assert_eq!(sender.offer(frame()), None);
}

#[test]
fn fatal_error_ends_capture() -> Result<(), Box<dyn StdError>> {
    let stop = StopSignal::new();
    let (sender, receiver) = handoff();
    let source = Scripted::new(
        vec![Ok(frame()), Err(CameraError::Disconnected("gone".to_string())), Ok(frame())],
        &stop,
    );

    let err = CaptureTask::new(source, sender, no_backoff(5), stop.clone())
        .run()
        .err()
        .ok_or("capture succeeded")?;
    assert!(matches!(err, Error::Camera(CameraError::Disconnected(_))));
    assert!(!stop.is_stopped());
    assert_eq!(receiver.try_recv().map(|f| f.sequence()), Some(1));
    Ok(())
}

#[test]
fn consecutive_failures_exhaust_retries() -> Result<(), Box<dyn StdError>> {
    let stop = StopSignal::new();
    let (sender, _receiver) = handoff();
    let source = Scripted::new(vec![transient(), transient(), transient(), Ok(frame())], &stop);

    let err = CaptureTask::new(source, sender, no_backoff(2), stop)
        .run()
        .err()
        .ok_or("capture succeeded")?;
    match err {
        Error::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last, CameraError::Transient("EIO".to_string()));
        }
        other => return Err(format!("unexpected error {other}").into()),
    }
    Ok(())
}

#[test]
fn successful_frame_resets_retries() -> Result<(), Box<dyn StdError>> {
    let stop = StopSignal::new();
    let (sender, receiver) = handoff();
    let source = Scripted::new(
        vec![
            transient(),
            Err(CameraError::Timeout),
            Ok(frame()),
            transient(),
            transient(),
            Ok(frame()),
        ],
        &stop,
    );

    let stats = CaptureTask::new(source, sender, no_backoff(2), stop.clone()).run()?;
    assert!(stop.is_stopped());
    assert_eq!(stats.captured, 2);
    // Nobody consumed, so the first frame made room for the second.
    assert_eq!(stats.dropped, 1);
    // Four scripted failures plus the timeout that ends the script.
    assert_eq!(stats.retries, 5);
    assert_eq!(receiver.try_recv().map(|f| f.sequence()), Some(2));
    Ok(())
}

#[test]
fn stopped_task_does_not_read() -> Result<(), Box<dyn StdError>> {
    let stop = StopSignal::new();
    stop.stop();
    let (sender, receiver) = handoff();
    let source = Scripted::new(vec![Ok(frame())], &stop);

    let stats = CaptureTask::new(source, sender, RetryPolicy::default(), stop).run()?;
    assert_eq!(stats.captured, 0);
    assert!(receiver.try_recv().is_none());
    Ok(())
}

#[test]
fn stop_interrupts_backoff() -> Result<(), Box<dyn StdError>> {
    let stop = StopSignal::new();
    let (sender, _receiver) = handoff();
    let source = Scripted::new(vec![transient()], &stop);
    let policy = RetryPolicy {
        max_retries: 5,
        backoff: Duration::from_secs(30),
    };

    let stopper = stop.clone();
    let waker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        stopper.stop();
    });
    let started = Instant::now();
    let stats = CaptureTask::new(source, sender, policy, stop).run()?;
    waker.join().map_err(|_| "stopper panicked")?;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(stats.retries, 1);
    Ok(())
}

#[test]
fn consumer_gone_stops_capture() -> Result<(), Box<dyn StdError>> {
    let (sender, receiver) = handoff();
    drop(receiver);
    let stats = CaptureTask::new(Endless, sender, RetryPolicy::default(), StopSignal::new()).run()?;
    assert_eq!(stats.captured, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn spawned_capture_delivers_frames() -> Result<(), Box<dyn StdError>> {
    let (sender, receiver) = handoff();
    let mut capture = CaptureTask::spawn(|| Ok(Endless), sender, RetryPolicy::default(), StopSignal::new());

    let first = tokio::task::spawn_blocking(move || receiver.recv().map(|f| f.sequence())).await?;
    assert!(first.is_some_and(|sequence| sequence >= 1));

    // The receiver is gone with the blocking task, so capture ends by itself.
    let stats = capture.finished().await.ok_or("no result")??;
    assert!(stats.captured >= 1);
    assert!(capture.is_finished());
    assert!(capture.finished().await.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_capture() -> Result<(), Box<dyn StdError>> {
    let (sender, _receiver) = handoff();
    let capture = CaptureTask::spawn(|| Ok(Endless), sender, RetryPolicy::default(), StopSignal::new());
    tokio::time::sleep(Duration::from_millis(20)).await;
    let stats = capture.shutdown().await.ok_or("no result")??;
    assert!(stats.captured >= 1);
    Ok(())
}

#[tokio::test]
async fn failed_open_is_reported() -> Result<(), Box<dyn StdError>> {
    let (sender, _receiver) = handoff();
    let capture = CaptureTask::<Endless>::spawn(
        || Err(CameraError::Disconnected("/dev/video9".to_string()).into()),
        sender,
        RetryPolicy::default(),
        StopSignal::new(),
    );
    let result = capture.shutdown().await.ok_or("no result")?;
    assert!(matches!(result, Err(Error::Camera(CameraError::Disconnected(_)))));
    Ok(())
}

fn presenter_setup() -> Result<(Arc<MemoryFirmware>, Display, Compositor), Box<dyn StdError>> {
    let fw = Arc::new(MemoryFirmware::new().with_display(0, DisplayMode::new(8, 8, 60), vec![1, 2]));
    let display = Display::open(fw.clone(), 0)?;
    let compositor = Compositor::new(&display, CompositorConfig::default())?;
    Ok((fw, display, compositor))
}

#[test]
fn presenter_shows_frames_until_producer_ends() -> Result<(), Box<dyn StdError>> {
    let (fw, _display, compositor) = presenter_setup()?;
    let (sender, receiver) = handoff();
    let (presenter, reconfigure) = Presenter::new(compositor, receiver);
    let presenting = thread::spawn(move || presenter.run());
    let opened = fw.submit_count();

    sender.offer(frame().with_sequence(1));
    assert!(wait_for(|| fw.submit_count() == opened + 1));

    // Sequence 2 and 3 never arrived here.
    assert!(reconfigure.layout(CompositorConfig {
        layer: 2,
        ..Default::default()
    }));
    sender.offer(frame().with_sequence(4));
    assert!(wait_for(|| fw.submit_count() == opened + 3));

    drop(sender);
    let stats = presenting.join().map_err(|_| "presenter panicked")??;
    assert_eq!(stats.presented, 2);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(fw.scanout(0)[0].spec.layer, 2);
    assert!(!reconfigure.sync_display_mode());
    Ok(())
}

#[test]
fn presenter_follows_display_mode() -> Result<(), Box<dyn StdError>> {
    let (fw, _display, compositor) = presenter_setup()?;
    let (sender, receiver) = handoff();
    let (presenter, reconfigure) = Presenter::new(compositor, receiver);
    let presenting = thread::spawn(move || presenter.run());

    fw.set_mode(0, DisplayMode::new(16, 16, 60));
    assert!(reconfigure.sync_display_mode());
    sender.offer(frame().with_sequence(1));
    assert!(wait_for(|| {
        fw.scanout(0)
            .first()
            .is_some_and(|s| s.spec.dst.width == 16)
    }));
    assert!(wait_for(|| fw.submit_count() >= 4));

    drop(sender);
    let stats = presenting.join().map_err(|_| "presenter panicked")??;
    assert_eq!(stats.presented, 1);
    Ok(())
}

#[test]
fn closed_window_ends_presenter() -> Result<(), Box<dyn StdError>> {
    let (fw, _display, compositor) = presenter_setup()?;
    let (sender, receiver) = handoff();
    let (presenter, _reconfigure) = Presenter::new(compositor, receiver);
    let closer = presenter.closer();
    let presenting = thread::spawn(move || presenter.run());

    closer.close();
    sender.offer(frame().with_sequence(1));
    let stats = presenting.join().map_err(|_| "presenter panicked")??;
    assert_eq!(stats.presented, 0);
    assert_eq!(fw.live_elements(), 0);
    // The presenter dropped its receiver on the way out.
    assert_eq!(sender.offer(frame()), None);
    Ok(())
}

#[test]
fn firmware_failure_ends_presenter() -> Result<(), Box<dyn StdError>> {
    let (fw, _display, compositor) = presenter_setup()?;
    let (sender, receiver) = handoff();
    let (presenter, _reconfigure) = Presenter::new(compositor, receiver);
    fw.fail_next("update_submit_sync");
    let presenting = thread::spawn(move || presenter.run());

    sender.offer(frame().with_sequence(1));
    let err = presenting
        .join()
        .map_err(|_| "presenter panicked")?
        .err()
        .ok_or("presenter succeeded")?;
    assert!(matches!(err, Error::Firmware { .. }));
    Ok(())
}

#[test]
fn lost_window_after_mode_change_fails_presenter() -> Result<(), Box<dyn StdError>> {
    let (fw, _display, compositor) = presenter_setup()?;
    let (sender, receiver) = handoff();
    let (presenter, reconfigure) = Presenter::new(compositor, receiver);

    fw.set_mode(0, DisplayMode::new(16, 16, 60));
    fw.fail_next("create_resource");
    fw.fail_next("element_add");
    assert!(reconfigure.sync_display_mode());
    let presenting = thread::spawn(move || presenter.run());

    sender.offer(frame().with_sequence(1));
    let err = presenting
        .join()
        .map_err(|_| "presenter panicked")?
        .err()
        .ok_or("presenter succeeded")?;
    assert!(matches!(err, Error::Firmware { .. }));
    assert_eq!(fw.live_elements(), 0);
    Ok(())
}

#[test]
fn fps_counter_averages() {
    let mut fps = FpsCounter::new(4);
    for _ in 0..4 {
        thread::sleep(Duration::from_millis(10));
        fps.tick();
    }
    let rate = fps.tick();
    assert!(rate > 0 && rate <= 100, "{rate}");
}
