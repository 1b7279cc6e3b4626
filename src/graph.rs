//! Filter graph as data.
//!
//! Stages are plain descriptors with named input and output streams. Turning
//! them into encoder syntax happens in [`crate::command`].

use crate::geometry::Geometry;
use crate::options::Quality;
use crate::overlay::{DrawText, OverlayPlan};

/// The decoded input stream.
pub const INPUT_LABEL: &str = "0:v";
/// The stream mapped to the output file.
pub const OUTPUT_LABEL: &str = "v_out";

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Scale { width: u32, height: u32 },
    Crop { width: u32, height: u32, x: u32, y: u32 },
    DrawText(DrawText),
    /// Identity, wires one label to another.
    Null,
    Split,
    PaletteGen,
    PaletteUse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub inputs: Vec<String>,
    pub filter: Filter,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterGraphPlan {
    stages: Vec<Stage>,
}

/// Linear chain builder that tracks the current stream.
struct Chain {
    stages: Vec<Stage>,
    cursor: String,
}

impl Chain {
    fn new() -> Self {
        Self {
            stages: Vec::new(),
            cursor: INPUT_LABEL.to_string(),
        }
    }

    fn push(&mut self, filter: Filter, label: String) {
        let input = std::mem::replace(&mut self.cursor, label.clone());
        self.stages.push(Stage {
            inputs: vec![input],
            filter,
            outputs: vec![label],
        });
    }

    /// Renames the last stage's output to `terminal`.
    fn finish(mut self, terminal: &str) -> Vec<Stage> {
        if let Some(last) = self.stages.last_mut() {
            last.outputs = vec![terminal.to_string()];
        }
        self.stages
    }
}

impl FilterGraphPlan {
    /// Stage order is scale, crop, GIF halving, per-frame text, then the GIF
    /// palette fork-join.
    pub fn build(geometry: &Geometry, overlay: &OverlayPlan, quality: Quality) -> Self {
        let mut chain = Chain::new();

        if geometry.needs_scale() {
            chain.push(
                Filter::Scale {
                    width: geometry.scaled_width,
                    height: geometry.scaled_height,
                },
                "v_scaled".into(),
            );
        }

        if geometry.needs_crop() {
            chain.push(
                Filter::Crop {
                    width: geometry.output_width,
                    height: geometry.output_height,
                    x: geometry.crop_x,
                    y: geometry.crop_y,
                },
                "v_cropped".into(),
            );
        }

        if quality == Quality::Gif {
            let (width, height) = geometry.halved();
            chain.push(Filter::Scale { width, height }, "v_half".into());
        }

        if overlay.is_active() {
            if overlay.draws.is_empty() {
                chain.push(Filter::Null, "v_overlay".into());
            }
            for draw in &overlay.draws {
                chain.push(
                    Filter::DrawText(draw.clone()),
                    format!("v{}", draw.frame_index),
                );
            }
        }

        if quality != Quality::Gif {
            return Self {
                stages: chain.finish(OUTPUT_LABEL),
            };
        }

        let mut stages = chain.finish("v_pre");
        stages.push(Stage {
            inputs: vec!["v_pre".into()],
            filter: Filter::Split,
            outputs: vec!["s0".into(), "s1".into()],
        });
        stages.push(Stage {
            inputs: vec!["s0".into()],
            filter: Filter::PaletteGen,
            outputs: vec!["palette".into()],
        });
        stages.push(Stage {
            inputs: vec!["s1".into(), "palette".into()],
            filter: Filter::PaletteUse,
            outputs: vec![OUTPUT_LABEL.into()],
        });
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stream to map into the output file.
    pub fn output_label(&self) -> &str {
        if self.is_empty() { INPUT_LABEL } else { OUTPUT_LABEL }
    }

    pub fn draw_stages(&self) -> impl Iterator<Item = (&Stage, &DrawText)> {
        self.stages.iter().filter_map(|stage| match &stage.filter {
            Filter::DrawText(draw) => Some((stage, draw)),
            _ => None,
        })
    }
}
