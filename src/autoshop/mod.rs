pub mod error;
pub mod io;
pub mod model;
pub mod report;
pub mod resources;
pub mod select;
pub mod settings;

pub use error::{FailureReason, ReportError, Result};
pub use report::{AssemblyReport, ReportConfig, ReportFormat, assemble, assemble_report};
pub use resources::ResourceResolver;
pub use settings::Settings;
