//! Page image requests.
//!
//! Page images are JPEG 2000 scans stored in a ZIP archive. Turning one into
//! something an e-reader can show (crop, reduce, scale, encode) is the job of
//! an [`ImagePipeline`]; this module only finds the scan in the archive and
//! describes what should be produced.

mod kakadu;

pub use kakadu::{KakaduPipeline, PipelineTools};

use std::fmt;
use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::error::Result;

/// A rectangle in page-relative coordinates (0.0 to 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub top: f64,
    pub left: f64,
    pub height: f64,
    pub width: f64,
}

impl Region {
    pub const FULL: Region = Region {
        top: 0.0,
        left: 0.0,
        height: 1.0,
        width: 1.0,
    };
}

impl Default for Region {
    fn default() -> Self {
        Region::FULL
    }
}

/// Formats as `{top,left},{height,width}` in plain decimal notation.
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{},{}}},{{{},{}}}",
            coordinate(self.top),
            coordinate(self.left),
            coordinate(self.height),
            coordinate(self.width)
        )
    }
}

/// Six fixed decimals with trailing zeros trimmed, keeping at least one.
fn coordinate(value: f64) -> String {
    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}

/// Output encoding for a page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// Portable pixmap, unencoded
    Ppm,
    #[default]
    Jpeg,
}

impl ImageFormat {
    pub fn media_type(self) -> &'static str {
        match self {
            ImageFormat::Ppm => "image/x-portable-pixmap",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Ppm => "ppm",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// What to produce from one page scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRequest {
    pub region: Region,
    /// Resolution levels to discard while decoding (each halves the size).
    pub reduce: u8,
    pub width: u32,
    pub height: u32,
    /// Encoder quality, 0 to 100.
    pub quality: u8,
    pub format: ImageFormat,
}

/// Image settings applied to every page image in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub reduce: u8,
    pub format: ImageFormat,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            width: 600,
            height: 780,
            quality: 90,
            reduce: 2,
            format: ImageFormat::Jpeg,
        }
    }
}

impl ImageSettings {
    /// A full-page request with these settings.
    pub fn request(&self) -> ImageRequest {
        ImageRequest {
            region: Region::FULL,
            reduce: self.reduce,
            width: self.width,
            height: self.height,
            quality: self.quality,
            format: self.format,
        }
    }
}

/// Converts a page scan into the requested image.
///
/// Implementations block until the image is ready. Failures are
/// [`Error::Pipeline`](crate::Error::Pipeline) and end the run.
pub trait ImagePipeline {
    fn transcode(&self, source: &[u8], request: &ImageRequest) -> Result<Vec<u8>>;
}

impl<P: ImagePipeline + ?Sized> ImagePipeline for &P {
    fn transcode(&self, source: &[u8], request: &ImageRequest) -> Result<Vec<u8>> {
        (**self).transcode(source, request)
    }
}

impl<P: ImagePipeline + ?Sized> ImagePipeline for Box<P> {
    fn transcode(&self, source: &[u8], request: &ImageRequest) -> Result<Vec<u8>> {
        (**self).transcode(source, request)
    }
}

/// The page image archive of a bundle.
pub struct PageImages<R> {
    book_id: String,
    archive: Option<ZipArchive<R>>,
}

impl<R: Read + Seek> PageImages<R> {
    pub fn new(book_id: &str, archive: ZipArchive<R>) -> Self {
        Self {
            book_id: book_id.to_string(),
            archive: Some(archive),
        }
    }

    /// An archive with no images in it.
    pub fn empty(book_id: &str) -> Self {
        Self {
            book_id: book_id.to_string(),
            archive: None,
        }
    }

    /// Archive entry name of a leaf's scan.
    pub fn entry_name(&self, leaf: usize) -> String {
        format!("{id}_jp2/{id}_{leaf:04}.jp2", id = self.book_id)
    }

    /// Raw scan bytes for a leaf, or `None` if the archive has no such entry.
    pub fn scan_bytes(&mut self, leaf: usize) -> Result<Option<Vec<u8>>> {
        let name = self.entry_name(leaf);
        let Some(archive) = self.archive.as_mut() else {
            return Ok(None);
        };
        match archive.by_name(&name) {
            Ok(mut entry) => {
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                Ok(Some(data))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Produce the page image for a leaf.
    ///
    /// Returns `Ok(None)` when the archive has no scan for the leaf; callers
    /// carry on without an image. Pipeline failures are errors.
    pub fn request_leaf_image(
        &mut self,
        pipeline: &dyn ImagePipeline,
        leaf: usize,
        settings: &ImageSettings,
    ) -> Result<Option<Vec<u8>>> {
        let Some(scan) = self.scan_bytes(leaf)? else {
            return Ok(None);
        };
        let request = settings.request();
        log::debug!("Transcoding leaf {leaf} ({} bytes) as {:?}", scan.len(), request);
        pipeline.transcode(&scan, &request).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::cell::RefCell;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    /// Records requests and echoes the scan back.
    #[derive(Default)]
    struct EchoPipeline {
        requests: RefCell<Vec<ImageRequest>>,
    }

    impl ImagePipeline for EchoPipeline {
        fn transcode(&self, source: &[u8], request: &ImageRequest) -> Result<Vec<u8>> {
            self.requests.borrow_mut().push(*request);
            Ok(source.to_vec())
        }
    }

    struct FailingPipeline;

    impl ImagePipeline for FailingPipeline {
        fn transcode(&self, _: &[u8], _: &ImageRequest) -> Result<Vec<u8>> {
            Err(Error::Pipeline {
                tool: "kdu_expand".into(),
                message: "not installed".into(),
            })
        }
    }

    fn archive(entries: &[(&str, &[u8])]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        ZipArchive::new(zip.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_region_display() {
        assert_eq!(Region::FULL.to_string(), "{0.0,0.0},{1.0,1.0}");
        let half = Region {
            top: 0.5,
            ..Region::FULL
        };
        assert_eq!(half.to_string(), "{0.5,0.0},{1.0,1.0}");
    }

    #[test]
    fn test_region_display_never_uses_exponents() {
        let region = Region {
            top: 1e-7,
            left: 0.000125,
            height: 0.25,
            width: 1.0,
        };
        assert_eq!(region.to_string(), "{0.0,0.000125},{0.25,1.0}");
    }

    #[test]
    fn test_entry_name_zero_padded() {
        let images: PageImages<Cursor<Vec<u8>>> = PageImages::empty("book01");
        assert_eq!(images.entry_name(7), "book01_jp2/book01_0007.jp2");
        assert_eq!(images.entry_name(12345), "book01_jp2/book01_12345.jp2");
    }

    #[test]
    fn test_request_present_leaf() {
        let mut images = PageImages::new("b", archive(&[("b_jp2/b_0001.jp2", b"scan")]));
        let pipeline = EchoPipeline::default();
        let settings = ImageSettings::default();

        let image = images.request_leaf_image(&pipeline, 1, &settings).unwrap();
        assert_eq!(image.as_deref(), Some(&b"scan"[..]));

        let requests = pipeline.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].region, Region::FULL);
        assert_eq!(requests[0].reduce, 2);
        assert_eq!((requests[0].width, requests[0].height), (600, 780));
        assert_eq!(requests[0].format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_missing_leaf_is_none_without_pipeline_call() {
        let mut images = PageImages::new("b", archive(&[("b_jp2/b_0001.jp2", b"scan")]));
        let pipeline = EchoPipeline::default();
        let image = images
            .request_leaf_image(&pipeline, 2, &ImageSettings::default())
            .unwrap();
        assert!(image.is_none());
        assert!(pipeline.requests.borrow().is_empty());
    }

    #[test]
    fn test_pipeline_failure_propagates() {
        let mut images = PageImages::new("b", archive(&[("b_jp2/b_0000.jp2", b"scan")]));
        let err = images
            .request_leaf_image(&FailingPipeline, 0, &ImageSettings::default())
            .unwrap_err();
        assert!(matches!(err, Error::Pipeline { .. }));
    }
}
