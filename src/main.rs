mod cli;

use clap::Parser;
use cli::Cli;
use indicatif::{ProgressBar, ProgressStyle};
use sisr::encode::FfmpegEncoder;
use sisr::error::{Error, Result};
use sisr::options::OverlayMode;
use sisr::prefs::Preferences;
use sisr::{ImageFrame, RenderSession, discovery, metadata};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    // Invalid arguments exit 1 like every other failure; help and version exit 0.
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(error) if !error.use_stderr() => error.exit(),
        Err(error) => {
            let _ = error.print();
            std::process::exit(1);
        }
    };
    init_tracing(args.verbose);

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Renders every numbered sequence under the input directory. Returns whether
/// everything found was rendered.
fn run(args: Cli) -> Result<bool> {
    let options = args.render_options()?;
    let mut prefs = Preferences::load();

    let input = args
        .input
        .clone()
        .or_else(|| prefs.last_input_dir.clone())
        .ok_or_else(|| Error::configuration("no input directory given, pass --input"))?;
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| prefs.last_output_dir.clone())
        .ok_or_else(|| Error::configuration("no output directory given, pass --output-dir"))?;

    let directories = discovery::find_image_directories(&input)?;
    if directories.is_empty() {
        eprintln!("no image directories found under {}", input.display());
        return Ok(false);
    }

    let encoder = FfmpegEncoder::locate(args.ffmpeg.as_deref())?;
    tracing::info!(ffmpeg = %encoder.binary().display(), "using encoder");
    let session = RenderSession::new();
    let (mut rendered, mut failed) = (0usize, 0usize);

    for directory in &directories {
        let images = discovery::list_images(directory)?;
        if !discovery::is_numbered_sequence(&images) {
            tracing::warn!(
                directory = %directory.display(),
                "skipping, images are not a numbered sequence"
            );
            continue;
        }

        let frames: Vec<ImageFrame> = match options.overlay {
            OverlayMode::Date => metadata::dated_frames(&images),
            _ => images.into_iter().map(ImageFrame::new).collect(),
        };
        let name = sequence_name(directory)?;
        let bar = progress_bar(frames.len(), &name);

        let result = session.render(
            &frames,
            &output_dir.join(&name),
            &options,
            &encoder,
            &mut |completed, total| {
                bar.set_length(total as u64);
                bar.set_position(completed as u64);
            },
        );
        match result {
            Ok(path) => {
                bar.finish_and_clear();
                println!("{}", path.display());
                rendered += 1;
            }
            Err(error) => {
                bar.abandon();
                eprintln!("error: {}: {error}", directory.display());
                failed += 1;
            }
        }
    }

    prefs.last_input_dir = Some(input);
    prefs.last_output_dir = Some(output_dir);
    if let Err(error) = prefs.save() {
        tracing::warn!(%error, "could not save preferences");
    }

    if rendered == 0 && failed == 0 {
        eprintln!("no numbered image sequences found");
        return Ok(false);
    }
    Ok(failed == 0)
}

fn sequence_name(directory: &Path) -> Result<String> {
    let absolute = std::path::absolute(directory)?;
    Ok(absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sequence".to_string()))
}

fn progress_bar(total: usize, name: &str) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>6}/{len:6} ({eta})",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_prefix(name.to_string());
    bar
}
