use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Error type covering the different failure cases that can occur while the
/// shop data is loaded, filtered, or rendered into a report document.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Wrapper for IO failures such as reading images or writing documents.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the xlsx writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the xlsx reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors bubbled up from the legacy xls reader implementation.
    #[error("legacy Excel read error: {0}")]
    LegacyExcelRead(#[from] calamine::XlsError),

    /// Errors raised while packaging a word-processor document.
    #[error("document packaging error: {0}")]
    Package(#[from] zip::result::ZipError),

    /// Raised when input data cannot be rendered or resolved.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Raised when an entity fails form validation.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when a format/flag combination has no writer.
    #[error("unsupported document format: {0}")]
    Unsupported(String),

    /// Raised when report assembly was cancelled before completion.
    #[error("report generation cancelled")]
    Cancelled,

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

/// Coarse failure classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    IoFailure,
    InvalidData,
    Cancelled,
    Unsupported,
}

impl ReportError {
    /// Collapses the error into the class a user-facing notice cares about.
    pub fn reason(&self) -> FailureReason {
        match self {
            ReportError::Io(_)
            | ReportError::ExcelWrite(_)
            | ReportError::ExcelRead(_)
            | ReportError::LegacyExcelRead(_)
            | ReportError::Package(_)
            | ReportError::MissingInput(_)
            | ReportError::Logging(_) => FailureReason::IoFailure,
            ReportError::Json(_) | ReportError::InvalidData(_) | ReportError::Validation(_) => {
                FailureReason::InvalidData
            }
            ReportError::Unsupported(_) => FailureReason::Unsupported,
            ReportError::Cancelled => FailureReason::Cancelled,
        }
    }
}

/// Every problem found while validating a single entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub issues: Vec<String>,
}

impl ValidationErrors {
    pub fn push(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Converts the collected issues into a result, failing when any exist.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ReportError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.issues.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_group_error_variants() {
        let io = ReportError::Io(std::io::Error::other("locked"));
        assert_eq!(io.reason(), FailureReason::IoFailure);
        assert_eq!(
            ReportError::InvalidData("bad".into()).reason(),
            FailureReason::InvalidData
        );
        assert_eq!(ReportError::Cancelled.reason(), FailureReason::Cancelled);
        assert_eq!(
            ReportError::Unsupported("doc".into()).reason(),
            FailureReason::Unsupported
        );
    }

    #[test]
    fn empty_validation_passes() {
        assert!(ValidationErrors::default().into_result().is_ok());

        let mut errors = ValidationErrors::default();
        errors.push("Имя клиента не введено.");
        let error = errors.into_result().unwrap_err();
        assert_eq!(error.reason(), FailureReason::InvalidData);
        assert!(error.to_string().contains("Имя клиента"));
    }
}
