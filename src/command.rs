//! Turns a filter graph plan and options into one ffmpeg invocation.

use crate::ImageFrame;
use crate::error::{Error, Result};
use crate::font::Font;
use crate::graph::{Filter, FilterGraphPlan, Stage};
use crate::options::{OverlayMode, Quality, RenderOptions};
use crate::overlay::{DrawText, Placement};
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static NUMBERED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>[^%]+)_(?P<digits>\d+)\.(?P<extension>[A-Za-z0-9]+)$")
        .expect("valid regex")
});

pub const CONCAT_LIST_NAME: &str = "frames.ffconcat";
/// Per-frame draw stages make the graph too long for a single argument, so
/// it is handed to ffmpeg as a file.
pub const FILTER_SCRIPT_NAME: &str = "filter_graph.txt";

#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// `<prefix>_%0Nd.<ext>` read by the image2 demuxer.
    Pattern { pattern: PathBuf, start_number: u64 },
    /// A concat demuxer manifest, written to `path` before encoding.
    ConcatList { path: PathBuf, content: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    pub input: InputSource,
    pub filter_graph: Option<String>,
    pub filter_script: PathBuf,
    pub map: String,
    pub codec_args: Vec<&'static str>,
    pub fps: f64,
    pub output: PathBuf,
    pub frame_count: usize,
}

impl CommandPlan {
    pub fn assemble(
        frames: &[ImageFrame],
        graph: &FilterGraphPlan,
        options: &RenderOptions,
        output_base: &Path,
        workspace: &Path,
    ) -> Result<Self> {
        if frames.is_empty() {
            return Err(Error::EmptyInput);
        }
        options.validate()?;

        let input = match numbered_pattern(frames) {
            Some((pattern, start_number)) => InputSource::Pattern {
                pattern,
                start_number,
            },
            None => InputSource::ConcatList {
                path: workspace.join(CONCAT_LIST_NAME),
                content: concat_list(frames, options)?,
            },
        };

        let filter_graph = filter_complex(graph);
        let map = if filter_graph.is_some() {
            format!("[{}]", graph.output_label())
        } else {
            graph.output_label().to_string()
        };

        Ok(Self {
            input,
            filter_graph,
            filter_script: workspace.join(FILTER_SCRIPT_NAME),
            map,
            codec_args: codec_args(options.quality),
            fps: options.fps,
            output: output_path(output_base, options)?,
            frame_count: frames.len(),
        })
    }

    /// Writes the concat list and filter script this plan reads.
    pub fn write_inputs(&self) -> Result<()> {
        for (path, content) in self.temporary_files() {
            std::fs::write(path, content).map_err(|source| Error::resource(path, source))?;
        }
        Ok(())
    }

    /// Workspace files this plan reads, other than overlay text, with their content.
    pub fn temporary_files(&self) -> Vec<(&Path, &str)> {
        let mut files = Vec::new();
        if let InputSource::ConcatList { path, content } = &self.input {
            files.push((path.as_path(), content.as_str()));
        }
        if let Some(graph) = &self.filter_graph {
            files.push((self.filter_script.as_path(), graph.as_str()));
        }
        files
    }

    /// Arguments after the program name.
    pub fn args(&self) -> Vec<OsString> {
        let fps = self.fps.to_string();
        let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into()];

        match &self.input {
            InputSource::Pattern {
                pattern,
                start_number,
            } => {
                args.extend(["-framerate".into(), fps.clone().into()]);
                args.extend(["-start_number".into(), start_number.to_string().into()]);
                args.push("-i".into());
                args.push(pattern.into());
            }
            InputSource::ConcatList { path, .. } => {
                args.extend(["-f", "concat", "-safe", "0", "-i"].map(OsString::from));
                args.push(path.into());
            }
        }

        if self.filter_graph.is_some() {
            args.push("-filter_complex_script".into());
            args.push((&self.filter_script).into());
        }
        args.push("-map".into());
        args.push((&self.map).into());
        args.extend(self.codec_args.iter().map(OsString::from));
        args.extend(["-r".into(), fps.into()]);
        args.push(self.output.as_os_str().to_owned());
        args
    }

    /// Shell-like rendering for logs and error reports.
    pub fn command_line(&self, program: &Path) -> String {
        std::iter::once(program.as_os_str().to_owned())
            .chain(self.args())
            .map(|arg| {
                let text = arg.to_string_lossy().into_owned();
                if text.is_empty() || text.contains(char::is_whitespace) {
                    format!("'{text}'")
                } else {
                    text
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `<base>_<crop>_<overlay>_<quality>.<ext>`, skipping absent parts.
pub fn output_path(base: &Path, options: &RenderOptions) -> Result<PathBuf> {
    let stem = base
        .file_name()
        .ok_or_else(|| {
            Error::configuration(format!("output path '{}' has no file name", base.display()))
        })?
        .to_string_lossy();

    let mut name = stem.into_owned();
    let tokens = [
        options.crop.token(),
        options.overlay.token().map(str::to_string),
        options.quality.token().map(str::to_string),
    ];
    for token in tokens.into_iter().flatten() {
        name.push('_');
        name.push_str(&token);
    }
    name.push('.');
    name.push_str(options.quality.extension());
    Ok(base.with_file_name(name))
}

pub fn codec_args(quality: Quality) -> Vec<&'static str> {
    match quality {
        Quality::Default => vec![
            "-c:v", "libx264", "-profile:v", "high", "-crf", "18", "-pix_fmt", "yuv420p",
        ],
        Quality::Prores => vec![
            "-c:v", "prores_ks", "-profile:v", "2", "-vendor", "apl0", "-pix_fmt",
            "yuv422p10le", "-qscale:v", "9", "-movflags", "+faststart",
        ],
        Quality::Proreshq => vec![
            "-c:v", "prores_ks", "-profile:v", "3", "-vendor", "apl0", "-pix_fmt",
            "yuv422p10le", "-qscale:v", "5", "-movflags", "+faststart",
        ],
        Quality::Gif => vec!["-loop", "1", "-f", "gif"],
    }
}

/// Detects `<prefix>_<digits>.<ext>` names that count up by one in frame order.
fn numbered_pattern(frames: &[ImageFrame]) -> Option<(PathBuf, u64)> {
    let first = &frames.first()?.path;
    let parent = first.parent()?;
    // `%` anywhere in the pattern is read as a format directive.
    if parent.to_string_lossy().contains('%') {
        return None;
    }
    let first_name = first.file_name()?.to_str()?;
    let captures = NUMBERED_NAME.captures(first_name)?;
    let prefix = &captures["prefix"];
    let width = captures["digits"].len();
    let extension = &captures["extension"];
    let start: u64 = captures["digits"].parse().ok()?;

    for (offset, frame) in frames.iter().enumerate() {
        if frame.path.parent()? != parent {
            return None;
        }
        let name = frame.path.file_name()?.to_str()?;
        let captures = NUMBERED_NAME.captures(name)?;
        let number: u64 = captures["digits"].parse().ok()?;
        if &captures["prefix"] != prefix
            || captures["digits"].len() != width
            || &captures["extension"] != extension
            || Some(number) != start.checked_add(offset as u64)
        {
            return None;
        }
    }

    Some((parent.join(format!("{prefix}_%0{width}d.{extension}")), start))
}

fn concat_list(frames: &[ImageFrame], options: &RenderOptions) -> Result<String> {
    let duration = (1.0 / options.fps).to_string();
    let mut content = String::from("ffconcat version 1.0\n");
    for frame in frames {
        let path = std::path::absolute(&frame.path)?;
        let path = path.to_string_lossy().replace('\'', r"'\''");
        content.push_str(&format!("file '{path}'\nduration {duration}\n"));
        if options.overlay == OverlayMode::Date
            && let Some(text) = &frame.display_text
        {
            let escaped = text
                .replace('\\', r"\\")
                .replace('\'', r"\'")
                .replace(':', r"\:")
                .replace(' ', r"\ ");
            content.push_str(&format!("file_packet_metadata date={escaped}\n"));
        }
    }
    Ok(content)
}

/// The ffmpeg `-filter_complex` text for a plan, `None` when it has no stages.
pub fn filter_complex(graph: &FilterGraphPlan) -> Option<String> {
    if graph.is_empty() {
        return None;
    }
    let stages: Vec<String> = graph.stages().iter().map(stage_text).collect();
    Some(stages.join(";"))
}

fn stage_text(stage: &Stage) -> String {
    let mut text = String::new();
    for input in &stage.inputs {
        text.push_str(&format!("[{input}]"));
    }
    text.push_str(&filter_text(&stage.filter));
    for output in &stage.outputs {
        text.push_str(&format!("[{output}]"));
    }
    text
}

fn filter_text(filter: &Filter) -> String {
    match filter {
        Filter::Scale { width, height } => format!("scale={width}:{height}"),
        Filter::Crop {
            width,
            height,
            x,
            y,
        } => format!("crop={width}:{height}:{x}:{y}"),
        Filter::DrawText(draw) => drawtext_text(draw),
        Filter::Null => "null".to_string(),
        Filter::Split => "split".to_string(),
        Filter::PaletteGen => "palettegen=max_colors=256:stats_mode=full".to_string(),
        Filter::PaletteUse => "paletteuse=dither=sierra2_4a:diff_mode=rectangle".to_string(),
    }
}

fn drawtext_text(draw: &DrawText) -> String {
    let font = match &draw.font {
        Font::File(path) => format!("fontfile={}", escape_value(&path_text(path))),
        Font::Family(name) => format!("font={}", escape_value(name)),
    };
    let position = match draw.placement {
        Placement::BottomRight { margin_x, margin_y } => {
            format!("x=(w-text_w-{margin_x}):y=(h-text_h-{margin_y})")
        }
        Placement::TopCenter { margin_y } => format!("x=(w-text_w)/2:y={margin_y}:fix_bounds=true"),
    };
    format!(
        "drawtext=textfile={textfile}:{font}:fontsize={size}:fontcolor=white\
         :box=1:boxcolor=black@0.5:boxborderw={padding}:{position}:enable={enable}",
        textfile = escape_value(&path_text(&draw.text_file)),
        size = draw.font_size,
        padding = draw.box_padding,
        enable = escape_value(&format!("eq(n,{})", draw.frame_index)),
    )
}

fn path_text(path: &Path) -> String {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}

/// Escapes an option value for both levels of filtergraph parsing: first the
/// option parser (`\ ' :`), then the graph parser (`\ ' [ ] , ;`).
fn escape_value(raw: &str) -> String {
    let escape = |text: &str, special: &[char]| {
        let mut escaped = String::with_capacity(text.len());
        for character in text.chars() {
            if special.contains(&character) {
                escaped.push('\\');
            }
            escaped.push(character);
        }
        escaped
    };
    let option_level = escape(raw, &['\\', '\'', ':']);
    escape(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}
