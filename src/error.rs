use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error)]
pub enum Error {
    #[error("ffmpeg not found, install it from https://ffmpeg.org or pass --ffmpeg")]
    FfmpegNotFound,

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("no frames to render")]
    EmptyInput,

    #[error("could not read image dimensions from {path}: {message}")]
    ProbeFailed { path: PathBuf, message: String },

    #[error("failed to write {path}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with {}:\n  command: {command}\n{stderr}", describe_status(.status))]
    Encoding {
        status: Option<i32>,
        command: String,
        stderr: String,
    },

    #[error("render cancelled")]
    Cancelled,

    #[error("a render is already running")]
    Busy,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_message_is_prefixed() {
        let error = Error::configuration("fps must be positive");
        assert_eq!(
            error.to_string(),
            "invalid configuration: fps must be positive"
        );
    }

    #[test]
    fn encoding_error_carries_command_and_diagnostics() {
        let error = Error::Encoding {
            status: Some(1),
            command: "ffmpeg -y -i in out.mp4".into(),
            stderr: "Unknown encoder 'libx264'".into(),
        };
        let text = error.to_string();
        assert!(text.contains("exit code 1"));
        assert!(text.contains("ffmpeg -y -i in out.mp4"));
        assert!(text.contains("Unknown encoder"));
    }

    #[test]
    fn signal_termination_is_described() {
        let error = Error::Encoding {
            status: None,
            command: String::new(),
            stderr: String::new(),
        };
        assert!(error.to_string().contains("terminated by signal"));
    }

    #[test]
    fn debug_matches_display() {
        let error = Error::EmptyInput;
        assert_eq!(format!("{error:?}"), error.to_string());
    }

    #[test]
    fn resource_error_names_path() {
        let error = Error::resource(
            "/tmp/overlay/date_0.txt",
            std::io::Error::other("disk full"),
        );
        let text = error.to_string();
        assert!(text.contains("/tmp/overlay/date_0.txt"));
        assert!(text.contains("disk full"));
    }
}
