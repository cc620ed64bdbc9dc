//! Report assembly: one sheet or page per service request, rendered in memory
//! and then written over the target path in a single step.

pub mod template;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use crate::autoshop::error::{ReportError, Result};
use crate::autoshop::io::docx_write::WordProcessorAssembler;
use crate::autoshop::io::excel_write::SpreadsheetAssembler;
use crate::autoshop::io::xls_write::LegacySpreadsheetAssembler;
use crate::autoshop::model::ServiceRequest;
use crate::autoshop::resources::ResourceResolver;

pub const SUCCESS_NOTICE: &str = "Отчёт успешно создан.";
pub const FAILURE_NOTICE: &str = "Произошла ошибка во время создания отчёта.";
pub const DEFAULT_FONT_FAMILY: &str = "Times New Roman";
const REPORT_STEM: &str = "Отчёт";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Spreadsheet,
    WordProcessor,
}

impl ReportFormat {
    /// File extension for the format generation, or `Unsupported` when no
    /// writer exists for it.
    pub fn extension(self, legacy: bool) -> Result<&'static str> {
        match (self, legacy) {
            (ReportFormat::Spreadsheet, true) => Ok("xls"),
            (ReportFormat::Spreadsheet, false) => Ok("xlsx"),
            (ReportFormat::WordProcessor, false) => Ok("docx"),
            (ReportFormat::WordProcessor, true) => {
                Err(ReportError::Unsupported("legacy word-processor document (.doc)".into()))
            }
        }
    }

    pub fn default_file_name(self, legacy: bool) -> Result<String> {
        Ok(format!("{REPORT_STEM}.{}", self.extension(legacy)?))
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Spreadsheet => write!(f, "spreadsheet"),
            ReportFormat::WordProcessor => write!(f, "word-processor"),
        }
    }
}

/// Options for a single report run.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub font_family: String,
    pub legacy: bool,
    pub resources: ResourceResolver,
    /// Raised by another thread to abandon the run before the next request.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ReportConfig {
    pub fn new(format: ReportFormat, resources: ResourceResolver) -> Self {
        Self {
            format,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            legacy: false,
            resources,
            cancel: None,
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(ReportError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// A finished document held in memory.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    /// Sheet names, or the page titles of a word-processor document.
    pub pages: Vec<String>,
}

/// Renders requests into one document format.
pub trait DocumentAssembler {
    fn assemble(&self, requests: &[ServiceRequest], config: &ReportConfig) -> Result<RenderedDocument>;
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub path: PathBuf,
    pub format: ReportFormat,
    pub legacy: bool,
    pub pages: Vec<String>,
}

fn assembler_for(config: &ReportConfig) -> Result<Box<dyn DocumentAssembler>> {
    config.format.extension(config.legacy)?;
    Ok(match (config.format, config.legacy) {
        (ReportFormat::Spreadsheet, true) => Box::new(LegacySpreadsheetAssembler),
        (ReportFormat::Spreadsheet, false) => Box::new(SpreadsheetAssembler),
        (ReportFormat::WordProcessor, _) => Box::new(WordProcessorAssembler),
    })
}

/// Renders `requests` and replaces `target` with the result. Nothing is
/// written unless rendering succeeds.
#[instrument(
    level = "info",
    skip_all,
    fields(
        target = %target.display(),
        format = %config.format,
        legacy = config.legacy,
        requests = requests.len()
    )
)]
pub fn assemble(target: &Path, requests: &[ServiceRequest], config: &ReportConfig) -> Result<AssemblyReport> {
    let assembler = assembler_for(config)?;
    let document = assembler.assemble(requests, config)?;
    write_atomically(target, &document.bytes)?;
    info!(pages = document.pages.len(), bytes = document.bytes.len(), "report written");

    Ok(AssemblyReport {
        path: target.to_path_buf(),
        format: config.format,
        legacy: config.legacy,
        pages: document.pages,
    })
}

/// Boolean form of [`assemble`] for callers that only show a generic notice.
pub fn assemble_report(target: &Path, requests: &[ServiceRequest], config: &ReportConfig) -> bool {
    match assemble(target, requests, config) {
        Ok(_) => true,
        Err(error) => {
            warn!(%error, reason = ?error.reason(), "report generation failed");
            false
        }
    }
}

/// Notice shown to the user after a run.
pub fn outcome_notice(success: bool) -> &'static str {
    if success { SUCCESS_NOTICE } else { FAILURE_NOTICE }
}

/// Writes through a temporary sibling file that is renamed over `target`.
pub fn write_atomically(target: &Path, bytes: &[u8]) -> Result<()> {
    let directory = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.persist(target).map_err(|error| ReportError::Io(error.error))?;
    Ok(())
}
