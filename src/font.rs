use std::path::{Path, PathBuf};

#[cfg(target_os = "macos")]
const CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/Courier.ttc",
    "/System/Library/Fonts/Courier New.ttf",
    "/Library/Fonts/Courier New.ttf",
    "/System/Library/Fonts/Monaco.ttf",
];

#[cfg(target_os = "windows")]
const CANDIDATES: &[&str] = &["C:/Windows/Fonts/cour.ttf", "C:/Windows/Fonts/consola.ttf"];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/TTF/Courier.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
];

const FALLBACK_FAMILY: &str = "Courier";

/// A font the encoder's text renderer can load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Font {
    File(PathBuf),
    /// Resolved by the encoder through fontconfig.
    Family(String),
}

impl Font {
    pub fn system() -> Self {
        Self::first_existing(CANDIDATES.iter().map(Path::new))
    }

    pub fn fallback() -> Self {
        Self::Family(FALLBACK_FAMILY.to_string())
    }

    fn first_existing<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Self {
        match candidates.into_iter().find(|path| path.is_file()) {
            Some(path) => Self::File(path.to_path_buf()),
            None => {
                tracing::warn!("no monospace font file found, falling back to '{FALLBACK_FAMILY}'");
                Self::fallback()
            }
        }
    }
}
