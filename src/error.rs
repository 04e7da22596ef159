//! Error types for leafpress operations.

use thiserror::Error;

/// Errors that can occur while converting a source bundle.
///
/// Every variant is fatal to the run. A page image that is missing from the
/// archive is not an error: lookups report it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A required part of the source bundle does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The external image pipeline could not be run or failed.
    #[error("Image pipeline error in {tool}: {message}")]
    Pipeline { tool: String, message: String },

    /// An OCR element the text extractor does not understand.
    #[error("Unexpected OCR element <{element}> on leaf {leaf}")]
    UnexpectedStructure { leaf: usize, element: String },

    /// The OCR page sequence and the scan data disagree on the page count.
    #[error("OCR and scan data are misaligned: {ocr_pages} OCR pages, {leaves} scan data leaves")]
    MisalignedSources { ocr_pages: usize, leaves: usize },

    #[error("Invalid scan data: {0}")]
    InvalidScanData(String),

    /// The assembled document would contain a duplicate or dangling reference.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
