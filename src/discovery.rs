use crate::error::Result;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

pub fn is_image_file(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    if is_hidden(name) {
        return false;
    }
    path.extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|extension| IMAGE_EXTENSIONS.contains(&extension.as_str()))
}

/// Image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Every directory under `root` (including `root`) that directly contains images.
/// Hidden directories are not descended into.
pub fn find_image_directories(root: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    let mut directories = Vec::new();
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if !list_images(entry.path())?.is_empty() {
            directories.push(entry.into_path());
        }
    }
    Ok(directories)
}

/// Whether the first run of digits in each file name forms a gap-free sequence.
pub fn is_numbered_sequence(paths: &[PathBuf]) -> bool {
    let mut numbers = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        let Some(number) = FIRST_NUMBER
            .find(&name)
            .and_then(|found| found.as_str().parse::<u64>().ok())
        else {
            return false;
        };
        numbers.push(number);
    }
    numbers.sort_unstable();
    match numbers.first() {
        Some(&first) => numbers
            .iter()
            .enumerate()
            .all(|(offset, &number)| number == first + offset as u64),
        None => false,
    }
}
