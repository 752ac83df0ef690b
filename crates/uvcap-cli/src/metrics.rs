// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use serde::Serialize;
use std::time::{Duration, Instant};

/// Capture statistics reported when the loop ends
#[derive(Debug, Clone, Serialize)]
pub struct CaptureMetrics {
    /// Total number of frames dequeued
    pub frames: u64,
    /// Total bytes filled by the driver
    pub bytes: u64,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Mean frame rate derived from frame timestamps
    pub mean_fps: f64,
    /// Shortest interval between consecutive frames in milliseconds
    pub interval_min_ms: f64,
    /// Average interval between consecutive frames in milliseconds
    pub interval_avg_ms: f64,
    /// Longest interval between consecutive frames in milliseconds
    pub interval_max_ms: f64,
    /// Gaps in the driver sequence counter
    pub dropped_frames: u64,
}

/// Collects per-frame timestamps, sizes and sequence numbers
pub struct MetricsCollector {
    start_time: Instant,
    frames: u64,
    bytes: u64,
    first_timestamp: Option<Duration>,
    last_timestamp: Option<Duration>,
    intervals: Vec<Duration>,
    prev_sequence: Option<u32>,
    dropped_frames: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames: 0,
            bytes: 0,
            first_timestamp: None,
            last_timestamp: None,
            intervals: Vec::new(),
            prev_sequence: None,
            dropped_frames: 0,
        }
    }

    /// Record one frame; returns the interval since the previous frame
    pub fn record_frame(
        &mut self,
        timestamp: Duration,
        bytes: u32,
        sequence: u32,
    ) -> Option<Duration> {
        self.frames += 1;
        self.bytes += u64::from(bytes);
        self.track_sequence(sequence);

        if self.first_timestamp.is_none() {
            self.first_timestamp = Some(timestamp);
        }
        let interval = self
            .last_timestamp
            .map(|last| timestamp.saturating_sub(last));
        if let Some(interval) = interval {
            self.intervals.push(interval);
        }
        self.last_timestamp = Some(timestamp);
        interval
    }

    fn track_sequence(&mut self, sequence: u32) {
        if let Some(prev) = self.prev_sequence {
            let expected = prev.wrapping_add(1);
            if sequence > expected {
                self.dropped_frames += u64::from(sequence - expected);
            } else if sequence < expected {
                log::warn!("Frame sequence decreased: {} -> {}", prev, sequence);
            }
        }
        self.prev_sequence = Some(sequence);
    }

    pub fn finalize(&self) -> CaptureMetrics {
        let to_ms = |d: &Duration| d.as_secs_f64() * 1000.0;

        let (min, avg, max) = if self.intervals.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let min = self.intervals.iter().min().map(to_ms).unwrap_or(0.0);
            let max = self.intervals.iter().max().map(to_ms).unwrap_or(0.0);
            let sum: Duration = self.intervals.iter().sum();
            (min, to_ms(&sum) / self.intervals.len() as f64, max)
        };

        let span = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => last.saturating_sub(first).as_secs_f64(),
            _ => 0.0,
        };
        let mean_fps = if span > 0.0 {
            self.intervals.len() as f64 / span
        } else {
            0.0
        };

        CaptureMetrics {
            frames: self.frames,
            bytes: self.bytes,
            duration_ms: self.start_time.elapsed().as_millis() as u64,
            mean_fps,
            interval_min_ms: min,
            interval_avg_ms: avg,
            interval_max_ms: max,
            dropped_frames: self.dropped_frames,
        }
    }

    /// Print metrics in human-readable format
    pub fn print_text(&self) {
        let metrics = self.finalize();
        println!("\n=== Capture Summary ===");
        println!("Frames captured:   {}", metrics.frames);
        println!(
            "Bytes captured:    {} ({:.2} MB)",
            metrics.bytes,
            metrics.bytes as f64 / 1_048_576.0
        );
        println!(
            "Duration:          {:.2} s",
            metrics.duration_ms as f64 / 1000.0
        );
        println!("Mean frame rate:   {:.2} fps", metrics.mean_fps);

        if metrics.frames > 1 {
            println!("\nFrame Interval (ms):");
            println!("  Min:    {:.2}", metrics.interval_min_ms);
            println!("  Avg:    {:.2}", metrics.interval_avg_ms);
            println!("  Max:    {:.2}", metrics.interval_max_ms);
        }

        if metrics.dropped_frames > 0 {
            println!("\nDropped frames:    {}", metrics.dropped_frames);
        }
    }

    /// Print metrics in JSON format
    pub fn print_json(&self) -> Result<(), serde_json::Error> {
        let json = serde_json::to_string_pretty(&self.finalize())?;
        println!("{}", json);
        Ok(())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
