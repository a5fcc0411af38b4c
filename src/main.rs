mod args;

use args::Args;
use clap::Parser;
use edgefirst_display::{
    camera::V4l2Camera,
    capture::{handoff, CaptureTask, StopSignal},
    firmware::{
        dispmanx::{DispmanxFirmware, LIBBCM_HOST},
        drm::{DrmFirmware, LIBDRM},
        memory::MemoryFirmware,
        Backend, Firmware,
    },
    pipeline::{Presenter, Reconfigure},
    Compositor, Display, DisplayMode, Edid,
};
use std::{error::Error, sync::Arc};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer as _, Registry};

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(level);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(level)),
        Err(_) => None,
    };

    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(level))
    } else {
        None
    };

    let console = if args.tokio_console {
        Some(console_subscriber::spawn())
    } else {
        None
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy)
        .with(console);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn open_firmware(args: &Args) -> Result<Arc<dyn Firmware>, Box<dyn Error>> {
    match &args.virtual_display {
        Some(size) => {
            let mut firmware = MemoryFirmware::new().with_display(
                args.display,
                DisplayMode::new(size[0], size[1], 60),
                args.layers.clone(),
            );
            if let Some(path) = &args.edid {
                firmware = firmware.with_edid(args.display, std::fs::read(path)?);
            }
            info!("using virtual display {}x{}", size[0], size[1]);
            Ok(Arc::new(firmware))
        }
        None => {
            let backend = args.backend.resolve(args.firmware_type.as_deref())?;
            info!("using the {backend:?} backend");
            match backend {
                Backend::Drm => Ok(Arc::new(DrmFirmware::new(LIBDRM, &args.drm_driver)?)),
                _ => Ok(Arc::new(DispmanxFirmware::new(
                    LIBBCM_HOST,
                    args.layers.clone(),
                )?)),
            }
        }
    }
}

/// Preferred render size from the monitor, if its EDID can be had.
fn preferred_size(args: &Args, display: &Display) -> Option<(u32, u32)> {
    let edid = match &args.edid {
        Some(path) => Edid::from_file(path),
        None => display.edid(),
    };
    match edid {
        Ok(edid) => {
            let mode = edid.preferred_mode();
            info!(
                "monitor {} {:04x} EDID {}.{} preferred mode {mode}",
                edid.manufacturer(),
                edid.product_code(),
                edid.version().0,
                edid.version().1
            );
            Some(mode.size())
        }
        Err(e) => {
            warn!("no usable EDID, falling back to the display mode: {e}");
            None
        }
    }
}

fn reload_layout(args: &Args, preferred: Option<(u32, u32)>, reconfigure: &Reconfigure) {
    if args.layout.is_none() {
        info!("SIGHUP without --layout, nothing to reload");
        return;
    }
    match args.compositor_config(preferred) {
        Ok(config) => {
            info!("reloading layout");
            reconfigure.layout(config);
        }
        Err(e) => warn!("layout not reloaded: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let firmware = open_firmware(&args)?;
    let mut display = Display::open(firmware, args.display)?;
    let preferred = preferred_size(&args, &display);

    let config = args.compositor_config(preferred)?;
    let compositor = Compositor::new(&display, config)?;
    let (sender, frames) = handoff();

    let (device, format, mirror) = (args.camera.clone(), args.camera_format, args.mirror.into());
    let (width, height) = (args.camera_size[0], args.camera_size[1]);
    let mut capture = CaptureTask::spawn(
        move || V4l2Camera::open(&device, width, height, format, mirror),
        sender,
        args.retry_policy(),
        StopSignal::new(),
    );

    let (presenter, reconfigure) = Presenter::new(compositor, frames);
    let window = presenter.closer();
    let mut presenting = tokio::task::spawn_blocking(move || presenter.run());

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut mode_change = signal(SignalKind::user_defined1())?;

    let mut status: Result<(), Box<dyn Error>> = Ok(());
    let mut presented = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            _ = terminate.recv() => {
                info!("terminated, shutting down");
                break;
            }
            _ = hangup.recv() => reload_layout(&args, preferred, &reconfigure),
            _ = mode_change.recv() => {
                reconfigure.sync_display_mode();
            }
            result = capture.finished() => {
                if let Some(Err(e)) = result {
                    error!("capture stopped: {e}");
                    status = Err(e.into());
                }
                break;
            }
            result = &mut presenting => {
                presented = Some(result);
                break;
            }
        }
    }

    // Ending capture drops the frame sender, which ends the presenter.
    if let Some(Err(e)) = capture.shutdown().await {
        error!("capture stopped: {e}");
        status = Err(e.into());
    }
    let presented = match presented {
        Some(result) => result,
        None => presenting.await,
    };
    match presented {
        Ok(Ok(stats)) => info!("{} frames presented", stats.presented),
        Ok(Err(e)) => {
            error!("presenter stopped: {e}");
            status = Err(e.into());
        }
        Err(e) => status = Err(e.into()),
    }

    window.close();
    display.close();
    status
}
