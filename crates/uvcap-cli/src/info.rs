// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use clap::Args as ClapArgs;
use serde::Serialize;
use uvcap::driver::CaptureDriver;
use uvcap::sim::SimDriver;
use uvcap::v4l2::V4l2Driver;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Camera device path
    #[arg(short, long, default_value = "/dev/video0")]
    device: String,

    /// Describe the built-in simulated device instead of --device
    #[arg(long)]
    simulate: bool,
}

#[derive(Debug, Serialize)]
struct DeviceInfo {
    device: String,
    driver: String,
    card: String,
    bus_info: String,
    version: String,
    device_type: String,
    streaming: bool,
    format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fps: Option<f64>,
    formats: Vec<FormatInfo>,
}

#[derive(Debug, Serialize)]
struct FormatInfo {
    fourcc: String,
    name: String,
    compressed: bool,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing info command: {:?}", args);

    let info = if args.simulate {
        query_device_info("sim", SimDriver::default())?
    } else {
        let driver = V4l2Driver::open(&args.device)
            .map_err(|e| CliError::DeviceUnavailable(format!("{}: {}", args.device, e)))?;
        query_device_info(&args.device, driver)?
    };

    if json {
        let json_str = serde_json::to_string_pretty(&info)
            .map_err(|e| CliError::General(format!("Failed to serialize JSON: {}", e)))?;
        println!("{}", json_str);
    } else {
        print_text_info(&info);
    }

    Ok(())
}

fn query_device_info<D: CaptureDriver>(
    device: &str,
    mut driver: D,
) -> Result<DeviceInfo, CliError> {
    log::debug!("Querying device info for: {}", device);

    let caps = driver.capabilities().map_err(uvcap::Error::Io)?;
    let format = driver.get_format().map_err(uvcap::Error::Io)?;

    // Not every driver implements G_PARM
    let interval = match driver.get_stream_params() {
        Ok(params) if params.time_per_frame.denominator != 0 => Some(params.time_per_frame),
        Ok(_) => None,
        Err(err) => {
            log::debug!("Stream parameters unavailable: {}", err);
            None
        }
    };

    let formats = driver
        .enum_formats()
        .map_err(uvcap::Error::Io)?
        .into_iter()
        .map(|desc| FormatInfo {
            fourcc: desc.fourcc.to_string(),
            name: desc.display_name().to_string(),
            compressed: desc.compressed,
        })
        .collect();

    Ok(DeviceInfo {
        device: device.to_string(),
        driver: caps.driver.clone(),
        card: caps.card.clone(),
        bus_info: caps.bus_info.clone(),
        version: caps.version_string(),
        device_type: caps.device_type().to_string(),
        streaming: caps.supports_streaming(),
        format: format.to_string(),
        frame_interval: interval.map(|i| i.to_string()),
        fps: interval.map(|i| i.fps()),
        formats,
    })
}

fn print_text_info(info: &DeviceInfo) {
    println!("Device:     {}", info.device);
    println!("Driver:     {} {}", info.driver, info.version);
    println!("Card:       {}", info.card);
    println!("Bus:        {}", info.bus_info);
    println!(
        "Type:       {}{}",
        info.device_type,
        if info.streaming { " (streaming)" } else { "" }
    );
    println!("Format:     {}", info.format);
    match (&info.frame_interval, info.fps) {
        (Some(interval), Some(fps)) => println!("Interval:   {} ({:.2} fps)", interval, fps),
        _ => println!("Interval:   unknown"),
    }

    println!("\nSupported formats:");
    for fmt in &info.formats {
        println!(
            "  {}  {}{}",
            fmt.fourcc,
            fmt.name,
            if fmt.compressed { " (compressed)" } else { "" }
        );
    }
}
