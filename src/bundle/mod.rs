//! Source bundle access.
//!
//! A bundle is a directory holding one scanned book:
//!
//! - `{id}_scandata.xml`, `scandata.xml`, or `scandata.zip`: per-leaf scan data
//! - `{id}_meta.xml`: bibliographic metadata
//! - `{id}_abbyy.gz`: gzipped OCR output
//! - `{id}_jp2.zip`: page images

mod scandata;

pub use scandata::{LeafRecord, PageType, parse_scandata};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::image::PageImages;
use crate::ocr::OcrPages;
use crate::util::decode_xml;

/// Gzip-decompressed OCR stream read straight from disk.
pub type OcrStream = BufReader<GzDecoder<File>>;

/// An opened source bundle for one book.
///
/// Scan data is parsed eagerly; the OCR document is only ever streamed.
#[derive(Debug)]
pub struct SourceBundle {
    book_id: String,
    book_path: PathBuf,
    scandata_path: PathBuf,
    leaves: Vec<LeafRecord>,
    /// leafNum -> position in `leaves`
    by_index: HashMap<usize, usize>,
}

impl SourceBundle {
    /// Open the bundle for `book_id` stored under `book_path`.
    ///
    /// Fails with [`Error::NotFound`] if the directory, the scan data, or the
    /// bibliographic metadata is missing.
    pub fn open(book_id: impl Into<String>, book_path: impl AsRef<Path>) -> Result<Self> {
        let book_id = book_id.into();
        let book_path = book_path.as_ref().to_path_buf();
        if !book_path.is_dir() {
            return Err(Error::NotFound(format!(
                "book path \"{}\"",
                book_path.display()
            )));
        }

        let scandata_path = find_scandata(&book_id, &book_path)?;
        let leaves = parse_scandata(&read_scandata(&scandata_path)?)?;
        let by_index = leaves
            .iter()
            .enumerate()
            .map(|(pos, leaf)| (leaf.index, pos))
            .collect();

        let bundle = Self {
            book_id,
            book_path,
            scandata_path,
            leaves,
            by_index,
        };

        let metadata_path = bundle.metadata_path();
        if !metadata_path.is_file() {
            return Err(Error::NotFound(format!(
                "metadata \"{}\"",
                metadata_path.display()
            )));
        }

        log::info!(
            "Opened {} ({} leaves, scan data from {})",
            bundle.book_id,
            bundle.leaves.len(),
            bundle.scandata_path.display()
        );
        Ok(bundle)
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn book_path(&self) -> &Path {
        &self.book_path
    }

    /// The scan data file that was selected.
    pub fn scandata_path(&self) -> &Path {
        &self.scandata_path
    }

    /// All scan data records in document order.
    pub fn leaves(&self) -> &[LeafRecord] {
        &self.leaves
    }

    /// Scan data for a leaf number, if the scan data has one.
    pub fn scan_data_for(&self, leaf: usize) -> Option<&LeafRecord> {
        self.by_index.get(&leaf).map(|&pos| &self.leaves[pos])
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.book_path.join(format!("{}_meta.xml", self.book_id))
    }

    pub fn ocr_path(&self) -> PathBuf {
        self.book_path.join(format!("{}_abbyy.gz", self.book_id))
    }

    pub fn images_path(&self) -> PathBuf {
        self.book_path.join(format!("{}_jp2.zip", self.book_id))
    }

    /// Read and decode the bibliographic metadata document.
    pub fn read_metadata(&self) -> Result<String> {
        let bytes = std::fs::read(self.metadata_path())?;
        Ok(decode_xml(&bytes))
    }

    /// Open the OCR document as a forward-only sequence of pages.
    pub fn ocr_pages(&self) -> Result<OcrPages<OcrStream>> {
        let path = self.ocr_path();
        let file = File::open(&path)
            .map_err(|_| Error::NotFound(format!("OCR document \"{}\"", path.display())))?;
        Ok(OcrPages::new(BufReader::new(GzDecoder::new(file))))
    }

    /// Open the page image archive.
    ///
    /// A missing archive is tolerated: every lookup then reports no image.
    pub fn page_images(&self) -> Result<PageImages<File>> {
        let path = self.images_path();
        if !path.is_file() {
            log::warn!(
                "No page image archive at {}; pages will be skipped for images",
                path.display()
            );
            return Ok(PageImages::empty(&self.book_id));
        }
        let archive = ZipArchive::new(File::open(&path)?)?;
        Ok(PageImages::new(&self.book_id, archive))
    }
}

/// Candidate scan data locations in priority order.
fn scandata_candidates(book_id: &str, book_path: &Path) -> [PathBuf; 3] {
    [
        book_path.join(format!("{book_id}_scandata.xml")),
        book_path.join("scandata.xml"),
        book_path.join("scandata.zip"),
    ]
}

fn find_scandata(book_id: &str, book_path: &Path) -> Result<PathBuf> {
    scandata_candidates(book_id, book_path)
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| Error::NotFound(format!("scan data in \"{}\"", book_path.display())))
}

fn read_scandata(path: &Path) -> Result<String> {
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));

    let bytes = if is_zip {
        let mut archive = ZipArchive::new(File::open(path)?)?;
        let mut entry = archive.by_name("scandata.xml")?;
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        contents
    } else {
        std::fs::read(path)?
    };
    Ok(decode_xml(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const SCANDATA: &str = r#"<book><pageData>
        <page leafNum="0"><pageType>Cover</pageType><addToAccessFormats>true</addToAccessFormats></page>
        <page leafNum="1"><pageType>Normal</pageType><addToAccessFormats>true</addToAccessFormats></page>
    </pageData></book>"#;

    fn bundle_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("demo_meta.xml"), "<metadata/>").unwrap();
        dir
    }

    #[test]
    fn test_missing_book_path() {
        let err = SourceBundle::open("demo", "/nonexistent/leafpress/book").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_missing_scandata() {
        let dir = bundle_dir();
        let err = SourceBundle::open("demo", dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m.starts_with("scan data")));
    }

    #[test]
    fn test_missing_metadata() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("scandata.xml"), SCANDATA).unwrap();
        let err = SourceBundle::open("demo", dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m.starts_with("metadata")));
    }

    #[test]
    fn test_scandata_priority() {
        let dir = bundle_dir();
        std::fs::write(dir.path().join("scandata.xml"), "<book><pageData/></book>").unwrap();
        std::fs::write(dir.path().join("demo_scandata.xml"), SCANDATA).unwrap();

        let bundle = SourceBundle::open("demo", dir.path()).unwrap();
        assert!(bundle.scandata_path().ends_with("demo_scandata.xml"));
        assert_eq!(bundle.leaves().len(), 2);
    }

    #[test]
    fn test_scandata_from_zip() {
        let dir = bundle_dir();
        let file = File::create(dir.path().join("scandata.zip")).unwrap();
        let mut zip = ZipWriter::new(file);
        zip.start_file("scandata.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(SCANDATA.as_bytes()).unwrap();
        zip.finish().unwrap();

        let bundle = SourceBundle::open("demo", dir.path()).unwrap();
        assert_eq!(bundle.scan_data_for(1).map(|l| &l.page_type), Some(&PageType::Normal));
        assert!(bundle.scan_data_for(7).is_none());
    }

    #[test]
    fn test_missing_ocr_is_not_found() {
        let dir = bundle_dir();
        std::fs::write(dir.path().join("scandata.xml"), SCANDATA).unwrap();
        let bundle = SourceBundle::open("demo", dir.path()).unwrap();
        assert!(matches!(bundle.ocr_pages(), Err(Error::NotFound(_))));
    }
}
