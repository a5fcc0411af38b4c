// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_display::{
    blit::ScaleFilter,
    compositor::{layout, Offset},
    firmware::memory::MemoryFirmware,
    format::BufferLayout,
    Color, Compositor, CompositorConfig, Display, DisplayMode, Error, ErrorKind, Frame,
    PixelFormat, Rect, Scale,
};
use std::{error::Error as StdError, sync::Arc};

fn open(width: u32, height: u32) -> Result<(Arc<MemoryFirmware>, Display), Box<dyn StdError>> {
    let fw = Arc::new(MemoryFirmware::new().with_display(
        0,
        DisplayMode::new(width, height, 60),
        vec![1, 2],
    ));
    let display = Display::open(fw.clone(), 0)?;
    Ok((fw, display))
}

fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Result<Frame, Box<dyn StdError>> {
    let data = rgb.repeat((width * height) as usize);
    Ok(Frame::new(data, width, height, PixelFormat::Rgb3)?)
}

fn pixel(fw: &MemoryFirmware, size: (u32, u32), x: usize, y: usize) -> Vec<u8> {
    let layout = BufferLayout::new(PixelFormat::Rgb3, size.0, size.1);
    let element = fw.scanout(0)[0].element;
    let data = fw.element_data(element).unwrap_or_default();
    let start = y * layout.pitch + x * 3;
    data[start..start + 3].to_vec()
}

#[test]
fn frame_is_centred() -> Result<(), Box<dyn StdError>> {
    let p = layout((640, 480), &CompositorConfig::default(), (800, 600))?;
    assert_eq!(p.src, Rect::new(0, 0, 640, 480));
    assert_eq!(p.dst, Rect::new(80, 60, 640, 480));
    Ok(())
}

#[test]
fn preferred_size_sets_render_size() -> Result<(), Box<dyn StdError>> {
    let config = CompositorConfig {
        preferred_size: Some((400, 300)),
        ..Default::default()
    };
    let p = layout((640, 480), &config, (800, 600))?;
    assert_eq!(p.src, Rect::new(0, 0, 640, 480));
    assert_eq!(p.dst, Rect::new(200, 150, 400, 300));
    Ok(())
}

#[test]
fn factor_scales_render_size() -> Result<(), Box<dyn StdError>> {
    let config = CompositorConfig {
        scale: Scale::Factor(0.5),
        ..Default::default()
    };
    let p = layout((640, 480), &config, (800, 600))?;
    assert_eq!(p.dst, Rect::new(240, 180, 320, 240));
    Ok(())
}

#[test]
fn auto_fits_display_keeping_aspect() -> Result<(), Box<dyn StdError>> {
    let config = CompositorConfig {
        scale: Scale::Auto,
        ..Default::default()
    };
    // 4:3 on 16:9 is pillarboxed.
    let p = layout((640, 480), &config, (1920, 1080))?;
    assert_eq!(p.dst, Rect::new(240, 0, 1440, 1080));

    // 16:9 on 4:3 is letterboxed.
    let p = layout((1280, 720), &config, (800, 600))?;
    assert_eq!(p.dst, Rect::new(0, 75, 800, 450));
    Ok(())
}

#[test]
fn auto_fits_preferred_size() -> Result<(), Box<dyn StdError>> {
    let config = CompositorConfig {
        scale: Scale::Auto,
        preferred_size: Some((800, 800)),
        ..Default::default()
    };
    let p = layout((640, 480), &config, (1920, 1080))?;
    assert_eq!(p.dst, Rect::new(560, 240, 800, 600));
    Ok(())
}

#[test]
fn offset_moves_render_rect() -> Result<(), Box<dyn StdError>> {
    let config = CompositorConfig {
        offset: Offset { h: 20, w: -30 },
        ..Default::default()
    };
    let p = layout((640, 480), &config, (800, 600))?;
    assert_eq!(p.dst, Rect::new(50, 80, 640, 480));
    Ok(())
}

#[test]
fn crop_selects_source() -> Result<(), Box<dyn StdError>> {
    let config = CompositorConfig {
        crop: Some(Rect::new(100, 100, 200, 100)),
        ..Default::default()
    };
    let p = layout((640, 480), &config, (800, 600))?;
    assert_eq!(p.src, Rect::new(100, 100, 200, 100));
    assert_eq!(p.dst, Rect::new(300, 250, 200, 100));

    // Only the part inside the frame is used.
    let config = CompositorConfig {
        crop: Some(Rect::new(600, 400, 100, 100)),
        ..Default::default()
    };
    let p = layout((640, 480), &config, (800, 600))?;
    assert_eq!(p.src, Rect::new(600, 400, 40, 80));

    let config = CompositorConfig {
        crop: Some(Rect::new(700, 0, 10, 10)),
        ..Default::default()
    };
    let err = layout((640, 480), &config, (800, 600)).err().ok_or("crop accepted")?;
    assert_eq!(err.kind(), ErrorKind::Geometry);
    Ok(())
}

#[test]
fn oversize_frame_is_cropped_to_display() -> Result<(), Box<dyn StdError>> {
    let p = layout((1920, 1080), &CompositorConfig::default(), (1280, 720))?;
    assert_eq!(p.dst, Rect::new(0, 0, 1280, 720));
    assert_eq!(p.src, Rect::new(320, 180, 1280, 720));
    Ok(())
}

#[test]
fn invalid_configs_are_rejected() -> Result<(), Box<dyn StdError>> {
    for scale in [Scale::Factor(0.0), Scale::Factor(-1.0), Scale::Factor(f64::NAN)] {
        let config = CompositorConfig {
            scale,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidScale(_))), "{scale}");
    }
    let config = CompositorConfig {
        preferred_size: Some((0, 480)),
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(Error::InvalidScale(_))));
    let config = CompositorConfig {
        format: PixelFormat::Yuyv,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(Error::UnsupportedFormat(_))));

    let (_fw, display) = open(64, 64)?;
    let config = CompositorConfig {
        scale: Scale::Factor(0.0),
        ..Default::default()
    };
    assert!(Compositor::new(&display, config).is_err());
    assert_eq!(display.free_layers(), vec![1, 2]);
    Ok(())
}

#[test]
fn update_presents_frame() -> Result<(), Box<dyn StdError>> {
    let (fw, display) = open(8, 8)?;
    let config = CompositorConfig {
        background: Color::rgb(0, 0, 255),
        ..Default::default()
    };
    let mut compositor = Compositor::new(&display, config)?;
    assert_eq!(compositor.size(), (8, 8));
    assert_eq!(compositor.window().rect(), Rect::new(0, 0, 8, 8));

    let frame = solid(4, 4, [200, 100, 50])?;
    let placement = compositor.update(&frame)?;
    assert_eq!(placement.dst, Rect::new(2, 2, 4, 4));
    assert_eq!(pixel(&fw, (8, 8), 2, 2), vec![200, 100, 50]);
    assert_eq!(pixel(&fw, (8, 8), 5, 5), vec![200, 100, 50]);
    assert_eq!(pixel(&fw, (8, 8), 0, 0), vec![0, 0, 255]);
    assert_eq!(pixel(&fw, (8, 8), 7, 7), vec![0, 0, 255]);
    assert_eq!(compositor.window().swaps(), 1);
    Ok(())
}

#[test]
fn moved_frame_leaves_no_trail() -> Result<(), Box<dyn StdError>> {
    let (fw, display) = open(8, 8)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;
    let frame = solid(4, 4, [255, 255, 255])?;
    compositor.update(&frame)?;
    assert_eq!(pixel(&fw, (8, 8), 2, 2), vec![255, 255, 255]);

    compositor.reconfigure(CompositorConfig {
        offset: Offset { h: 2, w: 2 },
        ..Default::default()
    })?;
    let placement = compositor.update(&frame)?;
    assert_eq!(placement.dst, Rect::new(4, 4, 4, 4));
    assert_eq!(pixel(&fw, (8, 8), 2, 2), vec![0, 0, 0]);
    assert_eq!(pixel(&fw, (8, 8), 7, 7), vec![255, 255, 255]);
    Ok(())
}

#[test]
fn unsupported_frame_format_fails_update() -> Result<(), Box<dyn StdError>> {
    let (_fw, display) = open(8, 8)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;
    let frame = Frame::new(vec![0; 24], 4, 4, PixelFormat::Yu12)?;
    let err = compositor.update(&frame).err().ok_or("update succeeded")?;
    assert!(matches!(err, Error::UnsupportedConversion { .. }));
    assert_eq!(compositor.window().swaps(), 0);
    Ok(())
}

#[test]
fn invalid_reconfigure_keeps_old_config() -> Result<(), Box<dyn StdError>> {
    let (_fw, display) = open(64, 64)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;
    let bad = CompositorConfig {
        scale: Scale::Factor(-2.0),
        ..Default::default()
    };
    assert!(compositor.reconfigure(bad).is_err());
    assert_eq!(compositor.config(), &CompositorConfig::default());
    assert!(compositor.window().is_open());
    Ok(())
}

#[test]
fn layer_change_moves_window() -> Result<(), Box<dyn StdError>> {
    let (fw, display) = open(64, 64)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;
    let element = fw.scanout(0)[0].element;

    compositor.reconfigure(CompositorConfig {
        layer: 2,
        filter: ScaleFilter::Nearest,
        ..Default::default()
    })?;
    assert_eq!(compositor.window().layer(), 2);
    assert_eq!(compositor.window().filter(), ScaleFilter::Nearest);
    assert_eq!(fw.scanout(0)[0].element, element);
    assert_eq!(fw.scanout(0)[0].spec.layer, 2);
    assert_eq!(display.free_layers(), vec![1]);
    Ok(())
}

#[test]
fn format_change_reopens_window() -> Result<(), Box<dyn StdError>> {
    let (fw, display) = open(64, 64)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;

    compositor.reconfigure(CompositorConfig {
        format: PixelFormat::Bgra,
        opacity: 200,
        ..Default::default()
    })?;
    assert_eq!(compositor.window().format(), PixelFormat::Bgra);
    assert_eq!(compositor.window().alpha().opacity, 200);
    assert_eq!(fw.live_elements(), 1);
    assert_eq!(fw.live_resources(), 2);
    assert_eq!(fw.scanout(0)[0].spec.alpha.opacity, 200);
    Ok(())
}

#[test]
fn failed_reopen_restores_window() -> Result<(), Box<dyn StdError>> {
    let (fw, display) = open(64, 64)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;

    fw.fail_next("create_resource");
    let err = compositor
        .reconfigure(CompositorConfig {
            format: PixelFormat::Rgba,
            ..Default::default()
        })
        .err()
        .ok_or("reconfigure succeeded")?;
    assert_eq!(err.kind(), ErrorKind::Device);
    assert!(compositor.window().is_open());
    assert_eq!(compositor.window().format(), PixelFormat::Rgb3);
    assert_eq!(compositor.config(), &CompositorConfig::default());
    assert_eq!(fw.live_elements(), 1);
    Ok(())
}

#[test]
fn display_mode_change_rebuilds_window() -> Result<(), Box<dyn StdError>> {
    let (fw, display) = open(8, 8)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;
    assert!(!compositor.sync_display_mode()?);

    fw.set_mode(0, DisplayMode::new(16, 12, 60));
    assert!(compositor.sync_display_mode()?);
    assert_eq!(compositor.size(), (16, 12));
    assert_eq!(compositor.window().size(), (16, 12));
    assert_eq!(fw.live_elements(), 1);

    let placement = compositor.update(&solid(4, 4, [1, 2, 3])?)?;
    assert_eq!(placement.dst, Rect::new(6, 4, 4, 4));
    assert_eq!(pixel(&fw, (16, 12), 6, 4), vec![1, 2, 3]);
    assert!(!compositor.sync_display_mode()?);
    Ok(())
}

#[test]
fn failed_mode_change_restores_window_at_new_size() -> Result<(), Box<dyn StdError>> {
    let (fw, display) = open(800, 600)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;

    fw.set_mode(0, DisplayMode::new(640, 480, 60));
    fw.fail_next("create_resource");
    let err = compositor.sync_display_mode().err().ok_or("sync succeeded")?;
    assert_eq!(err.kind(), ErrorKind::Device);
    assert!(compositor.window().is_open());
    assert_eq!(compositor.size(), (640, 480));
    assert_eq!(compositor.window().size(), (640, 480));
    assert_eq!(fw.live_elements(), 1);

    let placement = compositor.update(&solid(320, 240, [9, 8, 7])?)?;
    assert_eq!(placement.dst, Rect::new(160, 120, 320, 240));
    assert!(!compositor.sync_display_mode()?);
    Ok(())
}

#[test]
fn lost_window_is_a_device_error_until_resynced() -> Result<(), Box<dyn StdError>> {
    let (fw, display) = open(800, 600)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;

    fw.set_mode(0, DisplayMode::new(640, 480, 60));
    fw.fail_next("create_resource");
    fw.fail_next("element_add");
    assert!(compositor.sync_display_mode().is_err());
    assert!(!compositor.window().is_open());
    assert_eq!(fw.live_elements(), 0);
    assert_eq!(fw.live_resources(), 0);

    let err = compositor.update(&solid(4, 4, [0, 0, 0])?).err().ok_or("update succeeded")?;
    assert_eq!(err.kind(), ErrorKind::Device);

    // same mode, but the lost window is retried
    assert!(compositor.sync_display_mode()?);
    assert!(compositor.window().is_open());
    compositor.update(&solid(4, 4, [0, 0, 0])?)?;
    Ok(())
}

#[test]
fn closed_compositor_reports_state() -> Result<(), Box<dyn StdError>> {
    let (_fw, display) = open(8, 8)?;
    let mut compositor = Compositor::new(&display, CompositorConfig::default())?;
    compositor.closer().close();
    let err = compositor.update(&solid(4, 4, [0, 0, 0])?).err().ok_or("update succeeded")?;
    assert_eq!(err.kind(), ErrorKind::State);
    compositor.close();
    assert_eq!(display.free_layers(), vec![1, 2]);
    Ok(())
}

#[test]
fn layout_from_json() -> Result<(), Box<dyn StdError>> {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("layout-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{
            "scale": "auto",
            "offset": { "h": 10, "w": -5 },
            "crop": { "x": 0, "y": 0, "width": 320, "height": 240 },
            "layer": 2,
            "format": "BGRA",
            "filter": "nearest",
            "background": { "r": 16, "g": 32, "b": 48 },
            "opacity": 200
        }"#,
    )?;
    let config = CompositorConfig::from_json_file(&path);
    std::fs::remove_file(&path)?;
    let config = config?;

    assert_eq!(config.scale, Scale::Auto);
    assert_eq!(config.offset, Offset { h: 10, w: -5 });
    assert_eq!(config.crop, Some(Rect::new(0, 0, 320, 240)));
    assert_eq!(config.layer, 2);
    assert_eq!(config.format, PixelFormat::Bgra);
    assert_eq!(config.filter, ScaleFilter::Nearest);
    assert_eq!(config.background, Color::rgb(16, 32, 48));
    assert_eq!(config.opacity, 200);
    assert_eq!(config.preferred_size, None);
    Ok(())
}

#[test]
fn invalid_json_layout_is_rejected() -> Result<(), Box<dyn StdError>> {
    let path = std::env::temp_dir().join(format!("bad-layout-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "scale": { "factor": 0.0 } }"#)?;
    let scale = CompositorConfig::from_json_file(&path);
    std::fs::write(&path, r#"{ "layer": "top" }"#)?;
    let syntax = CompositorConfig::from_json_file(&path);
    std::fs::remove_file(&path)?;

    assert!(matches!(scale, Err(Error::InvalidScale(_))));
    assert!(matches!(syntax, Err(Error::Json(_))));
    assert!(CompositorConfig::from_json_file("/nonexistent/layout.json").is_err());
    Ok(())
}
