// ⚠️ Error Taxonomy
// Every failure the pipeline can surface to a caller

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, FmrError>;

#[derive(Error, Debug)]
pub enum FmrError {
    /// A source file's columns don't match the layout expected for its year.
    /// Corpus loads log this and skip the file.
    #[error("Format mismatch in {file}: {message}")]
    FormatMismatch { file: String, message: String },

    /// Bad field name, duplicate observation, or other caller mistake
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown join policy or unusable configuration file
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Numeric parameter outside its permitted range
    #[error("{name} must be between {min} and {max}, got {value}")]
    Range {
        name: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },

    /// CPI year/month labels that can't form a calendar date
    #[error("Malformed period: {0}")]
    MalformedPeriod(String),
}

impl FmrError {
    pub fn format_mismatch(file: impl Into<String>, message: impl Into<String>) -> Self {
        FmrError::FormatMismatch {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Checks `value` against an inclusive range, producing `FmrError::Range` on violation
    pub fn check_range(name: &'static str, value: i64, min: i64, max: i64) -> Result<()> {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(FmrError::Range {
                name,
                min,
                max,
                value,
            })
        }
    }

    pub fn is_format_mismatch(&self) -> bool {
        matches!(self, FmrError::FormatMismatch { .. })
    }
}
