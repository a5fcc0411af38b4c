// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_display::{
    firmware::{
        dispmanx::{DispmanxFirmware, LIBBCM_HOST},
        drm::{DrmFirmware, LIBDRM, VC4_DRIVER},
        memory::MemoryFirmware,
        Backend,
    },
    Display, DisplayMode, Error, ErrorKind, Rect,
};
use serial_test::serial;
use std::{error::Error as StdError, sync::Arc, thread};

fn firmware() -> Arc<MemoryFirmware> {
    Arc::new(MemoryFirmware::new().with_display(0, DisplayMode::new(800, 600, 60), vec![1, 2]))
}

#[test]
fn open_reports_native_mode() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    let display = Display::open(fw.clone(), 0)?;
    assert_eq!(display.size()?, (800, 600));
    assert_eq!(display.info()?.refresh_hz, 60);
    assert_eq!(display.layer_slots(), vec![1, 2]);
    assert_eq!(display.free_layers(), vec![1, 2]);
    assert_eq!(fw.open_displays(), 1);
    Ok(())
}

#[test]
fn display_is_exclusive() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    let _display = Display::open(fw.clone(), 0)?;
    let err = Display::open(fw.clone(), 0).err().ok_or("second open succeeded")?;
    assert!(matches!(err, Error::DisplayUnavailable { display_num: 0, .. }));
    assert_eq!(err.kind(), ErrorKind::Resource);

    let err = Display::open(fw, 7).err().ok_or("unknown display opened")?;
    assert!(matches!(err, Error::DisplayUnavailable { display_num: 7, .. }));
    Ok(())
}

#[test]
fn failed_mode_query_closes_display() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    fw.fail_next("display_mode");
    let err = Display::open(fw.clone(), 0).err().ok_or("open succeeded")?;
    assert_eq!(err.kind(), ErrorKind::Device);
    assert_eq!(fw.open_displays(), 0);

    // Nothing is left claimed, so the display opens normally afterwards.
    let display = Display::open(fw, 0)?;
    assert!(display.is_open());
    Ok(())
}

#[test]
fn close_is_idempotent() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    let mut display = Display::open(fw.clone(), 0)?;
    display.close();
    display.close();
    assert!(!display.is_open());
    assert_eq!(fw.open_displays(), 0);

    assert!(matches!(display.info(), Err(Error::DisplayClosed)));
    assert!(matches!(
        display.open_window(Rect::new(0, 0, 64, 64), 1),
        Err(Error::DisplayClosed)
    ));
    assert_eq!(Error::DisplayClosed.kind(), ErrorKind::State);
    Ok(())
}

#[test]
fn closing_display_closes_windows() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    let mut display = Display::open(fw.clone(), 0)?;
    let mut window = display.open_window(Rect::new(10, 10, 64, 48), 1)?;
    assert_eq!(fw.live_elements(), 1);
    assert_eq!(fw.live_resources(), 2);

    display.close();
    assert!(!window.is_open());
    assert_eq!(fw.live_elements(), 0);
    assert_eq!(fw.live_resources(), 0);
    assert!(matches!(
        window.clear(Default::default()),
        Err(Error::WindowClosed)
    ));
    window.close();
    Ok(())
}

#[test]
fn dropping_display_releases_firmware() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    {
        let display = Display::open(fw.clone(), 0)?;
        let _window = display.open_window(Rect::new(0, 0, 800, 600), 2)?;
    }
    assert_eq!(fw.open_displays(), 0);
    assert_eq!(fw.live_elements(), 0);
    assert_eq!(fw.live_resources(), 0);
    Ok(())
}

#[test]
fn closer_works_across_threads() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    let display = Display::open(fw.clone(), 0)?;
    let closer = display.closer();
    thread::spawn(move || closer.close())
        .join()
        .map_err(|_| "closer thread panicked")?;
    assert!(!display.is_open());
    assert_eq!(fw.open_displays(), 0);
    Ok(())
}

#[test]
fn close_races_with_window_open() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    let display = Display::open(fw.clone(), 0)?;
    let closer = display.closer();
    let closing = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(5));
        closer.close();
    });

    let mut last = None;
    let mut layer = 1;
    loop {
        // the newest window stays open while the next one takes the other layer
        match display.open_window(Rect::new(0, 0, 64, 64), layer) {
            Ok(window) => last = Some(window),
            Err(Error::DisplayClosed) => break,
            Err(e) => return Err(e.into()),
        }
        layer = 3 - layer;
    }
    closing.join().map_err(|_| "closer thread panicked")?;

    assert!(last.as_ref().map_or(true, |w| !w.is_open()));
    assert_eq!(fw.open_displays(), 0);
    assert_eq!(fw.live_elements(), 0);
    assert_eq!(fw.live_resources(), 0);
    Ok(())
}

#[test]
fn refresh_mode_follows_mode_change() -> Result<(), Box<dyn StdError>> {
    let fw = firmware();
    let display = Display::open(fw.clone(), 0)?;
    fw.set_mode(0, DisplayMode::new(1920, 1080, 60));
    assert_eq!(display.size()?, (800, 600));
    assert_eq!(display.refresh_mode()?.size(), (1920, 1080));
    assert_eq!(display.size()?, (1920, 1080));
    Ok(())
}

#[test]
fn edid_read_through_firmware() -> Result<(), Box<dyn StdError>> {
    let mut block = vec![0u8; 128];
    block[..8].copy_from_slice(&[0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00]);
    // 640x480@60 established timing
    block[35] = 0x20;
    let sum = block.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    block[127] = sum.wrapping_neg();

    let fw = Arc::new(
        MemoryFirmware::new()
            .with_display(0, DisplayMode::new(800, 600, 60), vec![1])
            .with_edid(0, block),
    );
    let display = Display::open(fw, 0)?;
    assert_eq!(display.edid()?.preferred_mode().size(), (640, 480));
    Ok(())
}

#[test]
fn backend_follows_firmware_type() -> Result<(), Box<dyn StdError>> {
    assert_eq!(Backend::for_firmware_type(None)?, Backend::Dispmanx);
    assert_eq!(
        Backend::for_firmware_type(Some("raspberrypi-buster"))?,
        Backend::Dispmanx
    );
    assert_eq!(
        Backend::for_firmware_type(Some("raspberrypi-bullseye"))?,
        Backend::Drm
    );
    let err = Backend::for_firmware_type(Some("jetson")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resource);

    assert_eq!(Backend::Drm.resolve(None)?, Backend::Drm);
    assert_eq!(Backend::Auto.resolve(Some("raspberrypi-bullseye"))?, Backend::Drm);
    Ok(())
}

#[test]
#[ignore = "needs a board running the vc4 KMS driver"]
#[serial]
fn drm_display() -> Result<(), Box<dyn StdError>> {
    let fw = Arc::new(DrmFirmware::new(LIBDRM, VC4_DRIVER)?);
    let display = Display::open(fw.clone(), 0)?;
    let (width, height) = display.size()?;
    assert!(width > 0 && height > 0);
    let layer = *display.layer_slots().first().ok_or("no overlay planes")?;

    let mut window = display.open_window(Rect::new(0, 0, 64, 64), layer)?;
    window.clear("#00ff00".parse()?)?;
    window.swap_layer()?;
    window.close();
    assert!(Display::open(fw, 0).is_err());
    Ok(())
}

#[test]
#[ignore = "needs a Raspberry Pi with libbcm_host"]
#[serial]
fn dispmanx_display() -> Result<(), Box<dyn StdError>> {
    let fw = Arc::new(DispmanxFirmware::new(LIBBCM_HOST, vec![1, 2, 3, 4])?);
    let display = Display::open(fw, 0)?;
    let (width, height) = display.size()?;
    assert!(width > 0 && height > 0);

    let mut window = display.open_window(Rect::new(0, 0, 64, 64), 1)?;
    window.clear("#ff0000".parse()?)?;
    window.swap_layer()?;
    Ok(())
}
