//! Document writers for each report format and the spreadsheet reader used to
//! inspect them.

pub mod biff;
pub mod docx_write;
pub mod excel_read;
pub mod excel_write;
pub mod xls_write;
