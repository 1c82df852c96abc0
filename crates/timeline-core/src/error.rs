use std::time::Duration;
use thiserror::Error;

/// All errors produced by the listening timeline.
#[derive(Error, Debug)]
pub enum TimelineError {
    /// A file could not be read.
    #[error("Failed to read file {file}: {source}")]
    FileRead {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading a file took longer than the configured limit.
    #[error("Timed out after {timeout:?} reading file {file}")]
    ReadTimeout { file: String, timeout: Duration },

    /// A file's content is not valid JSON.
    #[error("Failed to parse JSON in {file}: {source}")]
    JsonParse {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// A file parsed as JSON but its top-level value is not an array.
    #[error("Expected a JSON array of records in {file}, found {found}")]
    NotASequence { file: String, found: &'static str },

    /// An element of a file's record array is not a JSON object.
    #[error("Record {index} in {file} is not a JSON object")]
    InvalidRecord { file: String, index: usize },

    /// A background read task panicked or was cancelled.
    #[error("Ingestion task failed: {0}")]
    Task(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a file name.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TimelineError {
    /// `true` for the failures that mean a file's content is not a usable
    /// export: bad JSON, a non-array document, or a non-object record.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::JsonParse { .. } | Self::NotASequence { .. } | Self::InvalidRecord { .. }
        )
    }

    /// Name of the offending file, when the error is tied to one.
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::FileRead { file, .. }
            | Self::ReadTimeout { file, .. }
            | Self::JsonParse { file, .. }
            | Self::NotASequence { file, .. }
            | Self::InvalidRecord { file, .. } => Some(file),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the timeline crates.
pub type Result<T> = std::result::Result<T, TimelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = TimelineError::FileRead {
            file: "StreamingHistory0.json".to_string(),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("StreamingHistory0.json"));
        assert!(msg.contains("no such file"));
        assert!(!err.is_parse_error());
    }

    #[test]
    fn test_error_display_json_parse() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err = TimelineError::JsonParse {
            file: "endsong_0.json".to_string(),
            source: json_err,
        };
        assert!(err.to_string().starts_with("Failed to parse JSON in endsong_0.json"));
        assert!(err.is_parse_error());
        assert_eq!(err.file(), Some("endsong_0.json"));
    }

    #[test]
    fn test_error_display_not_a_sequence() {
        let err = TimelineError::NotASequence {
            file: "a.json".to_string(),
            found: "object",
        };
        assert_eq!(
            err.to_string(),
            "Expected a JSON array of records in a.json, found object"
        );
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_error_display_invalid_record() {
        let err = TimelineError::InvalidRecord {
            file: "a.json".to_string(),
            index: 3,
        };
        assert_eq!(err.to_string(), "Record 3 in a.json is not a JSON object");
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_error_display_read_timeout() {
        let err = TimelineError::ReadTimeout {
            file: "slow.json".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Timed out after 250ms reading file slow.json");
        assert_eq!(err.file(), Some("slow.json"));
    }

    #[test]
    fn test_error_display_config() {
        let err = TimelineError::Config("unknown timezone".to_string());
        assert_eq!(err.to_string(), "Configuration error: unknown timezone");
        assert_eq!(err.file(), None);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TimelineError = io_err.into();
        assert!(err.to_string().contains("denied"));
        assert!(!err.is_parse_error());
    }
}
