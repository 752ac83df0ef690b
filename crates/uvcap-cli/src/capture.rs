// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::metrics::MetricsCollector;
use crate::utils;
use clap::Args as ClapArgs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uvcap::driver::CaptureDriver;
use uvcap::session::MAX_BUFFER_COUNT;
use uvcap::sim::SimDriver;
use uvcap::{CaptureConfig, Session};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Camera device
    #[arg(short, long, default_value = "/dev/video0")]
    device: String,

    /// Resolution in WxH format
    #[arg(short, long, default_value = "640x480")]
    resolution: String,

    /// Pixel format FOURCC
    #[arg(long, default_value = "MJPG")]
    format: String,

    /// Target frame rate (0 keeps the device's current rate)
    #[arg(short = 'F', long, default_value = "30")]
    fps: u32,

    /// Number of frames to capture (0=until Ctrl+C)
    #[arg(short = 'n', long, default_value = "100")]
    frames: u64,

    /// Number of capture buffers
    #[arg(short, long, default_value = "6")]
    buffers: u32,

    /// Give up when no frame arrives within this many milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Capture from the built-in simulated device instead of --device
    #[arg(long)]
    simulate: bool,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Capture parameters: {:?}", args);

    let (width, height) = utils::parse_resolution(&args.resolution)?;
    let fourcc = utils::parse_fourcc(&args.format)?;
    if args.buffers == 0 || args.buffers > MAX_BUFFER_COUNT {
        return Err(CliError::InvalidArgs(format!(
            "Buffer count must be between 1 and {}",
            MAX_BUFFER_COUNT
        )));
    }

    let config = CaptureConfig::default()
        .with_device(&args.device)
        .with_resolution(width, height)
        .with_format(fourcc)
        .with_framerate(if args.fps == 0 { None } else { Some(args.fps) })
        .with_buffers(args.buffers);

    let term = utils::install_signal_handler()?;

    let metrics = if args.simulate {
        log::info!("Opening simulated device");
        let session = config
            .with_device("sim")
            .open_with_driver(SimDriver::default())?;
        run(session, &args, &term)?
    } else {
        log::info!("Opening camera: {}", config);
        run(config.open()?, &args, &term)?
    };

    if json {
        metrics
            .print_json()
            .map_err(|e| CliError::General(format!("Failed to output JSON metrics: {}", e)))?;
    } else {
        metrics.print_text();
    }

    Ok(())
}

fn run<D: CaptureDriver>(
    mut session: Session<D>,
    args: &Args,
    term: &AtomicBool,
) -> Result<MetricsCollector, CliError> {
    if let Some(interval) = session.framerate() {
        log::info!("Frame interval {} ({:.2} fps)", interval, interval.fps());
    }

    session.stream_on()?;

    let timeout = Duration::from_millis(args.timeout_ms);
    let max_frames = if args.frames == 0 {
        u64::MAX
    } else {
        args.frames
    };

    log::info!(
        "Capturing {} frames (Ctrl+C to stop)...",
        if max_frames == u64::MAX {
            "unlimited".to_string()
        } else {
            max_frames.to_string()
        }
    );

    let mut metrics = MetricsCollector::new();
    let mut frame_count = 0u64;

    while frame_count < max_frames && !term.load(Ordering::Relaxed) {
        let frame = match session.dequeue_frame(Some(timeout)) {
            Ok(frame) => frame,
            // poll returns EINTR on SIGINT
            Err(_) if term.load(Ordering::Relaxed) => break,
            Err(err) => return Err(err.into()),
        };

        let bytes = session.frame_data(&frame)?.len();
        let interval =
            metrics.record_frame(frame.timestamp(), frame.bytes_used(), frame.sequence());
        log::debug!(
            "frame {} slot {} {} bytes interval {:.2} ms{}",
            frame_count,
            frame.index(),
            bytes,
            interval.map_or(0.0, |d| d.as_secs_f64() * 1000.0),
            if frame.is_error() { " (error)" } else { "" }
        );

        session.queue_frame(frame)?;
        frame_count += 1;
    }

    if term.load(Ordering::Relaxed) {
        log::info!("Received Ctrl+C, stopping...");
    }
    log::info!("Captured {} frames total", frame_count);

    session.stream_off()?;
    session.close();
    Ok(metrics)
}
