use clap::{ArgAction, Parser};
use sisr::error::{Error, Result};
use sisr::options::{CropAnchor, CropMode, OverlayMode, Quality, RenderOptions, parse_resolution};
use sisr::probe::parse_frame_rate;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sisr",
    version,
    about = "Render folders of numbered images to video with ffmpeg"
)]
pub struct Cli {
    #[arg(
        short,
        long,
        help = "Directory searched for image sequences (defaults to the last one used)"
    )]
    pub input: Option<PathBuf>,

    #[arg(
        short,
        long,
        help = "Directory for rendered videos (defaults to the last one used)"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        default_value = "30",
        value_parser = fps_value,
        help = "Frames per second, e.g. 24, 29.97 or 30000/1001"
    )]
    pub fps: f64,

    #[arg(
        long,
        value_name = "WxH",
        help = "Bounding box for the output size, e.g. 1920x1080"
    )]
    pub resolution: Option<String>,

    #[arg(
        long,
        conflicts_with_all = ["hd_crop", "uhd_crop"],
        help = "Crop to a centered square"
    )]
    pub instagram_crop: bool,

    #[arg(
        long,
        value_name = "ANCHOR",
        num_args = 0..=1,
        default_missing_value = "center",
        conflicts_with = "uhd_crop",
        help = "Fill 1920x1080, keeping center, keep_top or keep_bottom"
    )]
    pub hd_crop: Option<CropAnchor>,

    #[arg(
        long,
        value_name = "ANCHOR",
        num_args = 0..=1,
        default_missing_value = "center",
        help = "Fill 3840x2160, keeping center, keep_top or keep_bottom"
    )]
    pub uhd_crop: Option<CropAnchor>,

    #[arg(
        long,
        conflicts_with = "overlay_frame",
        help = "Burn each image's capture date into its frame"
    )]
    pub overlay_date: bool,

    #[arg(long, help = "Burn the frame number into each frame")]
    pub overlay_frame: bool,

    #[arg(long, value_enum, default_value_t = Quality::Default)]
    pub quality: Quality,

    #[arg(long, help = "Largest output width in pixels (no crop modes)")]
    pub max_width: Option<u32>,

    #[arg(long, help = "Largest output height in pixels (no crop modes)")]
    pub max_height: Option<u32>,

    #[arg(long, help = "Path to the ffmpeg binary")]
    pub ffmpeg: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count, help = "Log more (-v info, -vv debug)")]
    pub verbose: u8,
}

fn fps_value(raw: &str) -> std::result::Result<f64, String> {
    parse_frame_rate(raw).ok_or_else(|| format!("'{raw}' is not a positive frame rate"))
}

impl Cli {
    pub fn render_options(&self) -> Result<RenderOptions> {
        let crop = if self.instagram_crop {
            CropMode::Square
        } else if let Some(anchor) = self.hd_crop {
            CropMode::Hd(anchor)
        } else if let Some(anchor) = self.uhd_crop {
            CropMode::Uhd(anchor)
        } else {
            CropMode::None
        };

        let overlay = if self.overlay_date {
            OverlayMode::Date
        } else if self.overlay_frame {
            OverlayMode::Frame
        } else {
            OverlayMode::None
        };

        let (mut max_width, mut max_height) = (None, None);
        if let Some(raw) = &self.resolution {
            (max_width, max_height) = parse_resolution(raw);
            if max_width.is_none() {
                return Err(Error::configuration(format!(
                    "resolution '{raw}' is not of the form WIDTHxHEIGHT"
                )));
            }
        }

        let options = RenderOptions {
            fps: self.fps,
            crop,
            overlay,
            quality: self.quality,
            max_width: self.max_width.or(max_width),
            max_height: self.max_height.or(max_height),
        };
        options.validate()?;
        Ok(options)
    }
}
