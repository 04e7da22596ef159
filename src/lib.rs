//! # leafpress
//!
//! Turns a digitized book (page scans, ABBYY OCR output, scan data, and
//! catalog metadata) into an EPUB 2 e-book.
//!
//! ## Features
//!
//! - Streams the OCR document page by page, so large books stay cheap
//! - Renders covers, title, copyright, contents, and front matter pages as images
//! - Reflows the body of the book into a single text document
//! - Writes OPF metadata, NCX navigation, and guide landmarks
//!
//! ## Quick Start
//!
//! ```no_run
//! use leafpress::Converter;
//!
//! let converter = Converter::new();
//! let book = converter.convert("adventuresofsher00doyl", "/data/books/holmes")?;
//! leafpress::write_epub(&book, "holmes.epub")?;
//! # Ok::<(), leafpress::Error>(())
//! ```
//!
//! ## Page images
//!
//! Page scans are JPEG 2000. Rendering them goes through an
//! [`ImagePipeline`]; the default [`KakaduPipeline`] runs `kdu_expand`,
//! `pnmscale`, and `pnmtojpeg`. Any other implementation can be plugged in
//! with [`Converter::with_pipeline`].

pub mod book;
pub mod bundle;
pub mod classify;
pub mod config;
pub mod convert;
pub mod epub;
pub mod error;
pub mod image;
pub mod language;
pub mod metadata;
pub mod ocr;
pub(crate) mod util;

pub use book::{Book, DocumentAssembler};
pub use bundle::{LeafRecord, PageType, SourceBundle};
pub use config::ConvertConfig;
pub use convert::Converter;
pub use epub::{EpubConfig, write_epub, write_epub_to_writer};
pub use error::{Error, Result};
pub use image::{ImagePipeline, ImageSettings, KakaduPipeline, PipelineTools};
