pub mod command;
pub mod discovery;
pub mod encode;
pub mod error;
pub mod font;
pub mod geometry;
pub mod graph;
pub mod metadata;
pub mod options;
pub mod overlay;
pub mod prefs;
pub mod probe;

use command::CommandPlan;
use encode::{CancelToken, Encoder};
use error::{Error, Result};
use font::Font;
use geometry::Geometry;
use graph::FilterGraphPlan;
use options::{Quality, RenderOptions};
use overlay::OverlayPlan;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// One input image, in output order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub path: PathBuf,
    /// Text for the date overlay, already formatted.
    pub display_text: Option<String>,
}

impl ImageFrame {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            display_text: None,
        }
    }
}

/// Everything needed to run one render, computed without side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub geometry: Geometry,
    pub overlay: OverlayPlan,
    pub graph: FilterGraphPlan,
    pub command: CommandPlan,
}

impl RenderPlan {
    /// Same inputs always give the same plan, including every file path
    /// under `workspace`.
    pub fn build(
        frames: &[ImageFrame],
        (source_width, source_height): (u32, u32),
        options: &RenderOptions,
        font: &Font,
        workspace: &Path,
        output_base: &Path,
    ) -> Result<Self> {
        if frames.is_empty() {
            return Err(Error::EmptyInput);
        }
        options.validate()?;

        let geometry = Geometry::resolve(source_width, source_height, options)?;
        // Text is drawn after GIF halving, so size it for the halved frame.
        let canvas = match options.quality {
            Quality::Gif => geometry.halved(),
            _ => (geometry.output_width, geometry.output_height),
        };
        let overlay = OverlayPlan::build(frames, options.overlay, canvas, font, workspace);
        let graph = FilterGraphPlan::build(&geometry, &overlay, options.quality);
        let command = CommandPlan::assemble(frames, &graph, options, output_base, workspace)?;

        Ok(Self {
            geometry,
            overlay,
            graph,
            command,
        })
    }

    /// Writes the overlay text files, concat list and filter script into the
    /// workspace.
    pub fn materialize(&self) -> Result<()> {
        self.overlay.materialize()?;
        self.command.write_inputs()
    }
}

/// Renders `frames` to `<output_base>_<tokens>.<ext>` and returns that path.
///
/// Temporary files live in a private directory that is removed on every exit
/// path, including encoder failure and cancellation.
#[tracing::instrument(skip_all, fields(frames = frames.len(), output = %output_base.display()))]
pub fn render_sequence(
    frames: &[ImageFrame],
    output_base: &Path,
    options: &RenderOptions,
    encoder: &dyn Encoder,
    on_progress: &mut dyn FnMut(usize, usize),
    cancel: &CancelToken,
) -> Result<PathBuf> {
    let first = frames.first().ok_or(Error::EmptyInput)?;
    options.validate()?;

    let dimensions = probe::frame_dimensions(&first.path)?;
    tracing::debug!(width = dimensions.0, height = dimensions.1, "probed first frame");

    let output = command::output_path(output_base, options)?;
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| Error::resource(parent, source))?;
    }

    let font = if options.overlay.is_none() {
        Font::fallback()
    } else {
        Font::system()
    };

    let workspace = tempfile::Builder::new().prefix("sisr-").tempdir()?;
    let plan = RenderPlan::build(
        frames,
        dimensions,
        options,
        &font,
        workspace.path(),
        output_base,
    )?;
    if let Some(graph) = &plan.command.filter_graph {
        tracing::debug!(draws = plan.graph.draw_stages().count(), %graph, "filter graph");
    }

    plan.materialize()?;
    encoder.run(&plan.command, on_progress, cancel)?;

    workspace.close()?;
    tracing::info!(output = %plan.command.output.display(), "render complete");
    Ok(plan.command.output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Allows at most one render at a time and tracks its outcome.
#[derive(Debug, Default)]
pub struct RenderSession {
    state: Mutex<RunState>,
    cancel: Mutex<CancelToken>,
}

impl RenderSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels the render in progress, if any.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Fails with [`Error::Busy`] while another render is running.
    pub fn render(
        &self,
        frames: &[ImageFrame],
        output_base: &Path,
        options: &RenderOptions,
        encoder: &dyn Encoder,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> Result<PathBuf> {
        let cancel = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == RunState::Running {
                return Err(Error::Busy);
            }
            *state = RunState::Running;

            let token = CancelToken::new();
            *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
            token
        };

        let result = render_sequence(frames, output_base, options, encoder, on_progress, &cancel);

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = match result {
            Ok(_) => RunState::Succeeded,
            Err(_) => RunState::Failed,
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::InputSource;
    use crate::options::{CropMode, OverlayMode};
    use std::sync::mpsc;

    /// Records what the workspace looked like while the encoder ran.
    #[derive(Default)]
    struct FakeEncoder {
        fail: bool,
        seen_files: Mutex<Vec<PathBuf>>,
    }

    impl Encoder for FakeEncoder {
        fn run(
            &self,
            plan: &CommandPlan,
            on_progress: &mut dyn FnMut(usize, usize),
            cancel: &CancelToken,
        ) -> Result<()> {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut seen = self.seen_files.lock().unwrap();
            if let InputSource::ConcatList { path, .. } = &plan.input {
                assert!(path.is_file(), "concat list missing during encode");
                seen.push(path.clone());
            }
            on_progress(plan.frame_count, plan.frame_count);
            if self.fail {
                return Err(Error::Encoding {
                    status: Some(1),
                    command: plan.command_line(Path::new("ffmpeg")),
                    stderr: "boom".into(),
                });
            }
            std::fs::write(&plan.output, b"video").unwrap();
            Ok(())
        }
    }

    fn write_frames(dir: &Path, names: &[&str]) -> Vec<ImageFrame> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                image::RgbImage::new(64, 48).save(&path).unwrap();
                ImageFrame {
                    path,
                    display_text: Some("Monday, January 01, 2024 12:00PM".into()),
                }
            })
            .collect()
    }

    #[test]
    fn planning_is_deterministic() {
        let frames = vec![ImageFrame::new("/shots/a.jpg"), ImageFrame::new("/shots/b.jpg")];
        let options = RenderOptions {
            crop: CropMode::Square,
            overlay: OverlayMode::Frame,
            ..RenderOptions::default()
        };
        let font = Font::fallback();
        let build = || {
            RenderPlan::build(
                &frames,
                (1920, 1080),
                &options,
                &font,
                Path::new("/tmp/work"),
                Path::new("/out/shots"),
            )
            .unwrap()
        };
        let first = build();
        let second = build();
        assert_eq!(first, second);
        assert_eq!(first.command.args(), second.command.args());
    }

    #[test]
    fn gif_overlay_is_sized_for_halved_frame() {
        let frames = vec![ImageFrame::new("/shots/a.jpg")];
        let options = RenderOptions {
            overlay: OverlayMode::Frame,
            quality: Quality::Gif,
            ..RenderOptions::default()
        };
        let plan = RenderPlan::build(
            &frames,
            (1920, 1080),
            &options,
            &Font::fallback(),
            Path::new("/tmp/work"),
            Path::new("/out/shots"),
        )
        .unwrap();
        assert_eq!(plan.overlay.draws[0].font_size, 27);
    }

    #[test]
    fn empty_input_fails_before_probing() {
        let encoder = FakeEncoder::default();
        let result = render_sequence(
            &[],
            Path::new("/nonexistent/out"),
            &RenderOptions::default(),
            &encoder,
            &mut |_, _| {},
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(Error::EmptyInput)));
    }

    #[test]
    fn successful_render_returns_named_output() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(dir.path(), &["sunrise.png", "noon.png"]);
        let output_base = dir.path().join("out/day1");
        let options = RenderOptions {
            overlay: OverlayMode::Date,
            ..RenderOptions::default()
        };
        let encoder = FakeEncoder::default();
        let mut reports = Vec::new();

        let output = render_sequence(
            &frames,
            &output_base,
            &options,
            &encoder,
            &mut |done, total| reports.push((done, total)),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(output, dir.path().join("out/day1_date.mp4"));
        assert!(output.is_file());
        assert_eq!(reports, vec![(2, 2)]);
        for path in encoder.seen_files.lock().unwrap().iter() {
            assert!(!path.exists());
            assert!(!path.parent().unwrap().exists());
        }
    }

    #[test]
    fn failed_encode_removes_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(dir.path(), &["b.png", "a.png"]);
        let options = RenderOptions {
            overlay: OverlayMode::Frame,
            ..RenderOptions::default()
        };
        let encoder = FakeEncoder {
            fail: true,
            ..FakeEncoder::default()
        };

        let result = render_sequence(
            &frames,
            &dir.path().join("clip"),
            &options,
            &encoder,
            &mut |_, _| {},
            &CancelToken::new(),
        );

        assert!(matches!(result, Err(Error::Encoding { status: Some(1), .. })));
        let seen = encoder.seen_files.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].parent().unwrap().exists());
    }

    #[test]
    fn unreadable_first_frame_is_probe_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"nope").unwrap();
        let result = render_sequence(
            &[ImageFrame::new(path)],
            &dir.path().join("out"),
            &RenderOptions::default(),
            &FakeEncoder::default(),
            &mut |_, _| {},
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(Error::ProbeFailed { .. })));
    }

    #[test]
    fn session_tracks_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(dir.path(), &["img_001.png", "img_002.png"]);
        let session = RenderSession::new();
        assert_eq!(session.state(), RunState::Idle);

        let failing = FakeEncoder {
            fail: true,
            ..FakeEncoder::default()
        };
        let result = session.render(
            &frames,
            &dir.path().join("out"),
            &RenderOptions::default(),
            &failing,
            &mut |_, _| {},
        );
        assert!(result.is_err());
        assert_eq!(session.state(), RunState::Failed);

        session
            .render(
                &frames,
                &dir.path().join("out"),
                &RenderOptions::default(),
                &FakeEncoder::default(),
                &mut |_, _| {},
            )
            .unwrap();
        assert_eq!(session.state(), RunState::Succeeded);
    }

    struct BlockingEncoder {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Encoder for BlockingEncoder {
        fn run(
            &self,
            _plan: &CommandPlan,
            _on_progress: &mut dyn FnMut(usize, usize),
            cancel: &CancelToken,
        ) -> Result<()> {
            self.started.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            Ok(())
        }
    }

    #[test]
    fn second_render_while_running_is_busy_and_cancel_reaches_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(dir.path(), &["img_001.png"]);
        let output_base = dir.path().join("out");
        let options = RenderOptions::default();
        let session = RenderSession::new();

        let (started_sender, started) = mpsc::channel();
        let (release, release_receiver) = mpsc::channel();
        let encoder = BlockingEncoder {
            started: Mutex::new(started_sender),
            release: Mutex::new(release_receiver),
        };

        std::thread::scope(|scope| {
            let (session, frames, output_base, options) =
                (&session, &frames, &output_base, &options);
            let running = scope.spawn(move || {
                session.render(frames, output_base, options, &encoder, &mut |_, _| {})
            });

            started.recv().unwrap();
            assert_eq!(session.state(), RunState::Running);
            let second = session.render(
                frames,
                output_base,
                options,
                &FakeEncoder::default(),
                &mut |_, _| {},
            );
            assert!(matches!(second, Err(Error::Busy)));

            session.cancel();
            release.send(()).unwrap();
            let result = running.join().unwrap();
            assert!(matches!(result, Err(Error::Cancelled)));
        });
        assert_eq!(session.state(), RunState::Failed);
    }
}
