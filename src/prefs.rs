//! Last-used directories, remembered between runs.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PREFS_FILE_NAME: &str = ".sisr_prefs.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub last_input_dir: Option<PathBuf>,
    pub last_output_dir: Option<PathBuf>,
}

impl Preferences {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(PREFS_FILE_NAME))
    }

    /// Missing file yields defaults; a corrupt one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error.into()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Loads from the home directory, falling back to defaults on any failure.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        Self::load_from(&path).unwrap_or_else(|error| {
            tracing::warn!(path = %path.display(), %error, "ignoring unreadable preferences");
            Self::default()
        })
    }

    pub fn save(&self) -> Result<()> {
        match Self::default_path() {
            Some(path) => self.save_to(&path),
            None => {
                tracing::debug!("no home directory, preferences not saved");
                Ok(())
            }
        }
    }
}
