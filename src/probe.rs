use crate::error::{Error, Result};
use std::path::Path;

/// Pixel size of a still image, read from its header.
pub fn frame_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).map_err(|error| Error::ProbeFailed {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

/// Accepts `30`, `29.97` or `30000/1001`.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let rate = match raw.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.trim().parse().ok()?;
            let denominator: f64 = denominator.trim().parse().ok()?;
            if denominator <= 0.0 {
                return None;
            }
            numerator / denominator
        }
        None => raw.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
