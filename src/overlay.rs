//! Per-frame burned-in text.
//!
//! Every frame gets its own small text file and its own draw stage gated to
//! that frame's index. Reading the text from a file sidesteps the encoder's
//! escaping rules for colons, quotes and commas in dates.

use crate::ImageFrame;
use crate::error::{Error, Result};
use crate::font::Font;
use crate::options::OverlayMode;
use std::path::{Path, PathBuf};

pub const MISSING_DATE_TEXT: &str = "No date available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    BottomRight { margin_x: u32, margin_y: u32 },
    TopCenter { margin_y: u32 },
}

/// One draw operation, enabled only on output frame `frame_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawText {
    pub frame_index: usize,
    pub text_file: PathBuf,
    pub font: Font,
    pub font_size: u32,
    pub box_padding: u32,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResource {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayPlan {
    pub mode: OverlayMode,
    pub draws: Vec<DrawText>,
    pub resources: Vec<TextResource>,
}

impl OverlayPlan {
    /// Plans the overlay for frames drawn at `width`x`height`.
    ///
    /// Nothing is written to disk; see [`OverlayPlan::materialize`].
    pub fn build(
        frames: &[ImageFrame],
        mode: OverlayMode,
        (width, height): (u32, u32),
        font: &Font,
        resource_dir: &Path,
    ) -> Self {
        let prefix = match mode {
            OverlayMode::None => return Self::default(),
            OverlayMode::Date => "date",
            OverlayMode::Frame => "frame",
        };

        let font_size = (width.min(height) / 20).max(1);
        let box_padding = font_size / 4;
        let placement = match mode {
            OverlayMode::Frame => Placement::TopCenter {
                margin_y: height / 20,
            },
            _ => Placement::BottomRight {
                margin_x: width / 20,
                margin_y: height / 20,
            },
        };
        let digits = frames.len().saturating_sub(1).to_string().len();

        let mut draws = Vec::with_capacity(frames.len());
        let mut resources = Vec::with_capacity(frames.len());
        for (frame_index, frame) in frames.iter().enumerate() {
            let path = resource_dir.join(format!("{prefix}_{frame_index:0digits$}.txt"));
            let content = match mode {
                OverlayMode::Frame => format!("FRAME: {frame_index}"),
                _ => frame
                    .display_text
                    .clone()
                    .unwrap_or_else(|| MISSING_DATE_TEXT.to_string()),
            };
            resources.push(TextResource {
                path: path.clone(),
                content,
            });
            draws.push(DrawText {
                frame_index,
                text_file: path,
                font: font.clone(),
                font_size,
                box_padding,
                placement,
            });
        }

        Self {
            mode,
            draws,
            resources,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.mode.is_none()
    }

    /// Writes every text resource. On error, files already written are left for
    /// the owner of `resource_dir` to remove.
    pub fn materialize(&self) -> Result<()> {
        for resource in &self.resources {
            std::fs::write(&resource.path, &resource.content)
                .map_err(|source| Error::resource(&resource.path, source))?;
        }
        tracing::debug!(count = self.resources.len(), "wrote overlay text resources");
        Ok(())
    }
}
