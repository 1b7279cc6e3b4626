//! Output frame geometry: an optional downscale followed by an optional crop.
//!
//! All sizes and offsets produced here are even, because the yuv420p and
//! yuv422p10le pixel formats used for encoding reject odd dimensions.

use crate::error::{Error, Result};
use crate::options::{CropAnchor, CropMode, RenderOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub source_width: u32,
    pub source_height: u32,
    /// Size after the scale stage. Equal to the source size when no scale is applied.
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    /// Crop offsets, in scaled coordinates.
    pub crop_x: u32,
    pub crop_y: u32,
}

impl Geometry {
    pub fn resolve(source_width: u32, source_height: u32, options: &RenderOptions) -> Result<Self> {
        if source_width < 2 || source_height < 2 {
            return Err(Error::configuration(format!(
                "source frames are too small to encode ({source_width}x{source_height})"
            )));
        }
        if !options.crop.is_none() && options.has_max_bounds() {
            return Err(Error::configuration(
                "max width/height can only be used when no crop mode is selected",
            ));
        }

        let geometry = match options.crop {
            CropMode::None if options.has_max_bounds() => {
                fit_within(source_width, source_height, options.max_width, options.max_height)
            }
            CropMode::None => passthrough(source_width, source_height),
            CropMode::Square => square(source_width, source_height),
            CropMode::Hd(anchor) => widescreen(source_width, source_height, 1920, 1080, anchor),
            CropMode::Uhd(anchor) => widescreen(source_width, source_height, 3840, 2160, anchor),
        };
        Ok(geometry)
    }

    pub fn needs_scale(&self) -> bool {
        self.scaled_width != self.source_width || self.scaled_height != self.source_height
    }

    pub fn needs_crop(&self) -> bool {
        self.output_width != self.scaled_width
            || self.output_height != self.scaled_height
            || self.crop_x != 0
            || self.crop_y != 0
    }

    /// Output size after halving, used for GIF output.
    pub fn halved(&self) -> (u32, u32) {
        (
            even_floor(self.output_width / 2).max(2),
            even_floor(self.output_height / 2).max(2),
        )
    }
}

fn even_floor(value: u32) -> u32 {
    value & !1
}

fn scale_dimension(value: u32, numerator: u32, denominator: u32) -> u32 {
    (u64::from(value) * u64::from(numerator) / u64::from(denominator)) as u32
}

fn passthrough(width: u32, height: u32) -> Geometry {
    Geometry {
        source_width: width,
        source_height: height,
        scaled_width: width,
        scaled_height: height,
        output_width: even_floor(width),
        output_height: even_floor(height),
        crop_x: 0,
        crop_y: 0,
    }
}

fn fit_within(
    width: u32,
    height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> Geometry {
    let bound_width = max_width.unwrap_or(u32::MAX).min(width);
    let bound_height = max_height.unwrap_or(u32::MAX).min(height);
    if bound_width == width && bound_height == height {
        return passthrough(width, height);
    }

    let width_limited =
        u64::from(bound_width) * u64::from(height) <= u64::from(bound_height) * u64::from(width);
    let (scaled_width, scaled_height) = if width_limited {
        (bound_width, scale_dimension(height, bound_width, width))
    } else {
        (scale_dimension(width, bound_height, height), bound_height)
    };
    let scaled_width = even_floor(scaled_width).max(2);
    let scaled_height = even_floor(scaled_height).max(2);

    Geometry {
        source_width: width,
        source_height: height,
        scaled_width,
        scaled_height,
        output_width: scaled_width,
        output_height: scaled_height,
        crop_x: 0,
        crop_y: 0,
    }
}

fn square(width: u32, height: u32) -> Geometry {
    let size = even_floor(width.min(height));
    Geometry {
        source_width: width,
        source_height: height,
        scaled_width: width,
        scaled_height: height,
        output_width: size,
        output_height: size,
        crop_x: even_floor((width - size) / 2),
        crop_y: even_floor((height - size) / 2),
    }
}

fn widescreen(
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
    anchor: CropAnchor,
) -> Geometry {
    let wider_than_target =
        u64::from(width) * u64::from(target_height) > u64::from(height) * u64::from(target_width);

    if wider_than_target {
        // Fit the height, trim the sides.
        let fitted_height = height.min(target_height);
        let (scaled_width, scaled_height) = if fitted_height < height {
            (
                even_floor(scale_dimension(width, fitted_height, height)),
                even_floor(fitted_height),
            )
        } else {
            (width, height)
        };
        let output_height = even_floor(scaled_height).max(2);
        let output_width = even_floor(scale_dimension(output_height, target_width, target_height))
            .min(even_floor(scaled_width))
            .max(2);
        Geometry {
            source_width: width,
            source_height: height,
            scaled_width,
            scaled_height,
            output_width,
            output_height,
            crop_x: even_floor((scaled_width - output_width) / 2),
            crop_y: 0,
        }
    } else {
        // Fit the width, trim top and/or bottom.
        let fitted_width = width.min(target_width);
        let (scaled_width, scaled_height) = if fitted_width < width {
            (
                even_floor(fitted_width),
                even_floor(scale_dimension(height, fitted_width, width)),
            )
        } else {
            (width, height)
        };
        let output_width = even_floor(scaled_width).max(2);
        let output_height = even_floor(scale_dimension(output_width, target_height, target_width))
            .min(even_floor(scaled_height))
            .max(2);
        let slack = scaled_height - output_height;
        let crop_y = match anchor {
            CropAnchor::Top => 0,
            CropAnchor::Bottom => even_floor(slack),
            CropAnchor::Center => even_floor(slack / 2),
        };
        Geometry {
            source_width: width,
            source_height: height,
            scaled_width,
            scaled_height,
            output_width,
            output_height,
            crop_x: 0,
            crop_y,
        }
    }
}
