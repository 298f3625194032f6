//! Screen capture service

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GrayImage};
use screenshots::Screen;

use crate::detector::FrameSource;

/// Flaky grabs are retried this many times before the caller hears
/// about it
const CAPTURE_ATTEMPTS: u32 = 3;
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Sub-rectangle of the display to watch
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Grabs grayscale frames from the primary display.
///
/// No OS capture handle survives between grabs; the display list is
/// re-enumerated on every call, which keeps the service usable from
/// whichever thread ends up owning it.
pub struct ScreenService {
    region: Option<Region>,
}

impl ScreenService {
    /// Watch the whole primary display
    pub fn new() -> Self {
        Self { region: None }
    }

    /// Watch only the given region
    pub fn with_region(region: Region) -> Self {
        Self {
            region: Some(region),
        }
    }

    fn grab_once(&self) -> Result<GrayImage> {
        let screen = Screen::all()
            .context("display enumeration failed")?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no display attached"))?;

        let shot = match self.region {
            Some(r) => screen.capture_area(r.x, r.y, r.width, r.height),
            None => screen.capture(),
        }
        .map_err(|e| anyhow!("grab from display {} failed: {}", screen.display_info.id, e))?;

        Ok(DynamicImage::ImageRgba8(shot).to_luma8())
    }
}

impl FrameSource for ScreenService {
    fn grab(&self) -> Result<GrayImage> {
        let mut last_error = None;

        for attempt in 1..=CAPTURE_ATTEMPTS {
            match self.grab_once() {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    tracing::warn!(
                        "[CAPTURE] Attempt {}/{}: {}",
                        attempt,
                        CAPTURE_ATTEMPTS,
                        e
                    );
                    last_error = Some(e);
                    thread::sleep(CAPTURE_RETRY_DELAY);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("screen capture never succeeded")))
    }
}

impl Default for ScreenService {
    fn default() -> Self {
        Self::new()
    }
}
