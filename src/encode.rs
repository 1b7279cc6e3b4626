//! Runs the assembled command and reports progress from ffmpeg's stderr.

use crate::command::CommandPlan;
use crate::error::{Error, Result};
use regex::Regex;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub const FFMPEG_ENV: &str = "SISR_FFMPEG";

static FRAME_PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"frame=\s*(\d+)").expect("valid regex"));

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Trailing stderr kept for error reports.
const DIAGNOSTIC_LINES: usize = 40;

/// Shared flag a caller can set to stop a running encode.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes a [`CommandPlan`]. `on_progress` receives `(completed, total)`.
pub trait Encoder {
    fn run(
        &self,
        plan: &CommandPlan,
        on_progress: &mut dyn FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Explicit path, then `SISR_FFMPEG`, then a binary next to this
    /// executable, then whatever `ffmpeg` resolves to on `PATH`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::existing(path);
        }
        if let Some(path) = std::env::var_os(FFMPEG_ENV) {
            return Self::existing(Path::new(&path));
        }

        let name = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
        let bundled = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
            .filter(|path| path.is_file());
        if let Some(path) = bundled {
            tracing::debug!(path = %path.display(), "using bundled ffmpeg");
            return Ok(Self::new(path));
        }

        Ok(Self::new(name))
    }

    fn existing(path: &Path) -> Result<Self> {
        if path.is_file() {
            Ok(Self::new(path))
        } else {
            tracing::warn!(path = %path.display(), "configured ffmpeg does not exist");
            Err(Error::FfmpegNotFound)
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Encoder for FfmpegEncoder {
    #[tracing::instrument(skip_all, fields(output = %plan.output.display()))]
    fn run(
        &self,
        plan: &CommandPlan,
        on_progress: &mut dyn FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> Result<()> {
        let command_line = plan.command_line(&self.binary);
        tracing::debug!(command = %command_line, "starting ffmpeg");

        let mut child = Command::new(&self.binary)
            .args(plan.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| match error.kind() {
                std::io::ErrorKind::NotFound => Error::FfmpegNotFound,
                _ => Error::Io(error),
            })?;

        let (sender, receiver) = mpsc::channel();
        let reader = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || {
                for line in StderrLines::new(stderr) {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
            })
        });

        let total = plan.frame_count;
        let mut progress = ProgressTracker::new(total);
        let mut diagnostics = Diagnostics::default();

        let status = loop {
            if cancel.is_cancelled() {
                tracing::info!("cancelling ffmpeg");
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Cancelled);
            }

            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    if let Some(completed) = progress.observe(&line) {
                        on_progress(completed, total);
                    }
                    diagnostics.push(line);
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(POLL_INTERVAL),
            }

            if let Some(status) = child.try_wait()? {
                break status;
            }
        };

        if let Some(reader) = reader {
            let _ = reader.join();
        }
        for line in receiver.try_iter() {
            if let Some(completed) = progress.observe(&line) {
                on_progress(completed, total);
            }
            diagnostics.push(line);
        }

        if !status.success() {
            return Err(Error::Encoding {
                status: status.code(),
                command: command_line,
                stderr: diagnostics.into_text(),
            });
        }

        if progress.completed < total {
            on_progress(total, total);
        }
        tracing::info!(output = %plan.output.display(), "ffmpeg finished");
        Ok(())
    }
}

/// Parses `frame=` counters into monotonic progress clamped to the total.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    completed: usize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
        }
    }

    /// New completed count if `line` advances progress.
    pub fn observe(&mut self, line: &str) -> Option<usize> {
        let frame = parse_frame(line)?.min(self.total);
        if frame <= self.completed {
            return None;
        }
        self.completed = frame;
        Some(frame)
    }
}

pub fn parse_frame(line: &str) -> Option<usize> {
    FRAME_PROGRESS
        .captures_iter(line)
        .last()
        .and_then(|captures| captures[1].parse().ok())
}

#[derive(Debug, Default)]
struct Diagnostics {
    lines: std::collections::VecDeque<String>,
}

impl Diagnostics {
    fn push(&mut self, line: String) {
        if parse_frame(&line).is_some() {
            return;
        }
        if self.lines.len() == DIAGNOSTIC_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_text(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}

/// Splits a byte stream on both `\r` and `\n`, since ffmpeg rewrites its
/// status line in place with carriage returns.
struct StderrLines<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    done: bool,
}

impl<R: Read> StderrLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
            done: false,
        }
    }
}

impl<R: Read> Iterator for StderrLines<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut byte = [0u8; 1];
        while !self.done {
            match self.reader.read(&mut byte) {
                Ok(0) | Err(_) => self.done = true,
                Ok(_) if byte[0] == b'\r' || byte[0] == b'\n' => {
                    if !self.pending.is_empty() {
                        let line = String::from_utf8_lossy(&self.pending).into_owned();
                        self.pending.clear();
                        return Some(line);
                    }
                }
                Ok(_) => self.pending.push(byte[0]),
            }
        }
        if self.pending.is_empty() {
            None
        } else {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            Some(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_line() {
        let line = "frame=  120 fps= 30 q=28.0 size=    512kB time=00:00:04.00 \
                    bitrate=1048.6kbits/s speed=1.0x";
        assert_eq!(parse_frame(line), Some(120));
        assert_eq!(parse_frame("frame=7"), Some(7));
        assert_eq!(parse_frame("Input #0, image2, from 'img_%04d.jpg':"), None);
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let mut tracker = ProgressTracker::new(100);
        assert_eq!(tracker.observe("frame=   10 fps=0.0"), Some(10));
        assert_eq!(tracker.observe("frame=    5 fps=0.0"), None);
        assert_eq!(tracker.observe("frame=   10 fps=0.0"), None);
        assert_eq!(tracker.observe("frame=  250 fps=0.0"), Some(100));
        assert_eq!(tracker.observe("frame=  300 fps=0.0"), None);
        assert_eq!(tracker.observe("Stream mapping:"), None);
    }

    #[test]
    fn splits_carriage_returns_and_newlines() {
        let raw: &[u8] = b"Input #0\nframe=    1 fps=0\rframe=    2 fps=0\r\nencoded 2 frames";
        let lines: Vec<String> = StderrLines::new(raw).collect();
        assert_eq!(
            lines,
            vec!["Input #0", "frame=    1 fps=0", "frame=    2 fps=0", "encoded 2 frames"]
        );
    }

    #[test]
    fn diagnostics_drop_progress_and_keep_tail() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push("frame=    1 fps=0".into());
        for index in 0..(DIAGNOSTIC_LINES + 5) {
            diagnostics.push(format!("line {index}"));
        }
        let text = diagnostics.into_text();
        assert!(!text.contains("frame="));
        assert!(!text.contains("line 4\n"));
        assert!(text.starts_with("line 5\n"));
        assert!(text.ends_with(&format!("line {}", DIAGNOSTIC_LINES + 4)));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn explicit_missing_binary_is_not_found() {
        let result = FfmpegEncoder::locate(Some(Path::new("/definitely/not/ffmpeg")));
        assert!(matches!(result, Err(Error::FfmpegNotFound)));
    }

    #[test]
    fn explicit_existing_binary_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffmpeg");
        std::fs::write(&path, b"").unwrap();
        let encoder = FfmpegEncoder::locate(Some(&path)).unwrap();
        assert_eq!(encoder.binary(), path.as_path());
    }
}
