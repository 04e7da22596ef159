//! The conversion driver.
//!
//! Scan data and OCR pages are walked in lockstep: the n-th OCR page belongs
//! to the n-th scan data record. Each leaf is classified, then either
//! rendered as a page image or reflowed into the book text.

use std::io::{Read, Seek};
use std::path::Path;

use crate::book::{Book, DocumentAssembler, Landmark, MetadataRecord};
use crate::bundle::{LeafRecord, SourceBundle};
use crate::classify::{ImageRole, PageAction, PageClassifier, extract_paragraphs};
use crate::config::ConvertConfig;
use crate::epub::{EpubConfig, write_epub_with_config};
use crate::error::{Error, Result};
use crate::image::{ImagePipeline, KakaduPipeline, PageImages};
use crate::metadata::map_metadata;
use crate::ocr::OcrPage;

/// Converts source bundles into books.
///
/// # Example
///
/// ```no_run
/// use leafpress::Converter;
///
/// let converter = Converter::new();
/// converter.convert_to_file("adventuresofsher00doyl", "/data/books", "holmes.epub")?;
/// # Ok::<(), leafpress::Error>(())
/// ```
pub struct Converter {
    config: ConvertConfig,
    pipeline: Box<dyn ImagePipeline>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter {
    /// A converter using the external Kakadu/netpbm tools.
    pub fn new() -> Self {
        Self {
            config: ConvertConfig::default(),
            pipeline: Box::new(KakaduPipeline::new()),
        }
    }

    pub fn with_config(mut self, config: ConvertConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the image pipeline.
    pub fn with_pipeline(mut self, pipeline: impl ImagePipeline + 'static) -> Self {
        self.pipeline = Box::new(pipeline);
        self
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Convert the bundle for `book_id` under `book_path` into a [`Book`].
    pub fn convert(&self, book_id: &str, book_path: impl AsRef<Path>) -> Result<Book> {
        let bundle = SourceBundle::open(book_id, book_path)?;
        let metadata = map_metadata(&bundle.read_metadata()?, bundle.book_id())?;
        let pages = bundle.ocr_pages()?;
        let mut images = bundle.page_images()?;
        self.assemble(bundle.leaves(), pages, &mut images, metadata)
    }

    /// Convert a bundle and write the EPUB to `output`.
    ///
    /// Nothing is written unless the whole conversion succeeds.
    pub fn convert_to_file(
        &self,
        book_id: &str,
        book_path: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<Book> {
        let book = self.convert(book_id, book_path)?;
        write_epub_with_config(&book, output, &EpubConfig::default())?;
        Ok(book)
    }

    /// Build a book from scan data, an OCR page sequence, and page images.
    ///
    /// Fails with [`Error::MisalignedSources`] if the OCR document and the
    /// scan data do not have the same number of pages.
    pub fn assemble<I, R>(
        &self,
        leaves: &[LeafRecord],
        pages: I,
        images: &mut PageImages<R>,
        metadata: MetadataRecord,
    ) -> Result<Book>
    where
        I: IntoIterator<Item = Result<OcrPage>>,
        R: Read + Seek,
    {
        let mut classifier = PageClassifier::new(leaves, self.config.untitled_pages_as_images);
        let mut assembler = DocumentAssembler::new();
        log::debug!("Starting in state {:?}", classifier.state());

        let mut position = 0;
        for page in pages {
            let page = page?;
            let Some(leaf) = leaves.get(position) else {
                return Err(Error::MisalignedSources {
                    ocr_pages: position + 1,
                    leaves: leaves.len(),
                });
            };
            if leaf.index != position {
                log::warn!(
                    "Scan data record {position} has leafNum {}; using position",
                    leaf.index
                );
            }

            match classifier.classify(leaf) {
                PageAction::Skip => {
                    log::debug!("Skipping leaf {position} ({})", leaf.page_type.as_str());
                }
                PageAction::Text => {
                    for paragraph in extract_paragraphs(&page, position)? {
                        assembler.push_paragraph(paragraph);
                    }
                }
                PageAction::Image(role) => {
                    self.emit_image(position, role, images, &mut classifier, &mut assembler)?;
                }
            }
            position += 1;
        }

        if position != leaves.len() {
            return Err(Error::MisalignedSources {
                ocr_pages: position,
                leaves: leaves.len(),
            });
        }

        log::info!(
            "Assembled {} pages, {} paragraphs of text",
            position,
            assembler.paragraphs().len()
        );
        assembler.finish(metadata, &self.config.attribution)
    }

    fn emit_image<R: Read + Seek>(
        &self,
        leaf: usize,
        role: ImageRole,
        images: &mut PageImages<R>,
        classifier: &mut PageClassifier,
        assembler: &mut DocumentAssembler,
    ) -> Result<()> {
        let image = images.request_leaf_image(&*self.pipeline, leaf, &self.config.images)?;
        let Some(image) = image else {
            log::warn!("No page image for leaf {leaf}; skipping");
            return Ok(());
        };
        let page = assembler.add_leaf_page(leaf, image, self.config.images.format)?;

        match role {
            ImageRole::Cover => {
                let side = classifier.record_cover();
                assembler.add_navpoint(side.label(), &page.href)?;
                if assembler.cover_id().is_none() {
                    assembler.add_guide_item(&page.href, Landmark::Cover, side.label())?;
                    assembler.set_cover(&page.image_id)?;
                }
            }
            ImageRole::FrontMatter => {}
            role => {
                if let Some((label, landmark)) = role.landmark() {
                    assembler.add_navpoint(label, &page.href)?;
                    assembler.add_guide_item(&page.href, landmark, label)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::PLAY_ORDER_ORIGIN;
    use crate::bundle::PageType;
    use crate::image::ImageRequest;
    use proptest::prelude::*;
    use crate::ocr::{BlockElement, BlockType, OcrBlock, Paragraph};
    use std::io::{Cursor, Write};
    use zip::{ZipArchive, ZipWriter};
    use zip::write::SimpleFileOptions;

    struct StubPipeline;

    impl ImagePipeline for StubPipeline {
        fn transcode(&self, source: &[u8], _: &ImageRequest) -> Result<Vec<u8>> {
            Ok(source.to_vec())
        }
    }

    fn images(leaves: &[usize]) -> PageImages<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for leaf in leaves {
            zip.start_file(format!("b_jp2/b_{leaf:04}.jp2"), SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"jp2").unwrap();
        }
        PageImages::new("b", ZipArchive::new(zip.finish().unwrap()).unwrap())
    }

    fn text_page(text: &str) -> OcrPage {
        OcrPage {
            blocks: vec![OcrBlock {
                block_type: BlockType::Text,
                elements: vec![BlockElement::Text(vec![Paragraph::new(vec![text.into()])])],
            }],
        }
    }

    fn converter() -> Converter {
        Converter::new().with_pipeline(StubPipeline)
    }

    #[test]
    fn test_front_and_back_cover() {
        let leaves = vec![
            LeafRecord::new(0, PageType::Cover, true),
            LeafRecord::new(1, PageType::Title, true),
            LeafRecord::new(2, PageType::Normal, true),
            LeafRecord::new(3, PageType::Cover, true),
        ];
        let pages = (0..4).map(|n| Ok(text_page(&format!("page {n}"))));
        let book = converter()
            .assemble(&leaves, pages, &mut images(&[0, 1, 3]), MetadataRecord::new())
            .unwrap();

        let labels: Vec<_> = book.nav.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Front Cover", "Title Page", "Back Cover", "Archive", "Book"]
        );
        assert_eq!(book.cover_id.as_deref(), Some("leaf-image0000"));
        let covers = book.guide.iter().filter(|g| g.kind == Landmark::Cover).count();
        assert_eq!(covers, 1);
    }

    #[test]
    fn test_missing_front_cover_image_promotes_next() {
        let leaves = vec![
            LeafRecord::new(0, PageType::Cover, true),
            LeafRecord::new(1, PageType::Cover, true),
        ];
        let pages = (0..2).map(|_| Ok(OcrPage::default()));
        let book = converter()
            .assemble(&leaves, pages, &mut images(&[1]), MetadataRecord::new())
            .unwrap();
        assert_eq!(book.nav[0].label, "Front Cover");
        assert_eq!(book.cover_id.as_deref(), Some("leaf-image0001"));
    }

    #[test]
    fn test_extra_ocr_page_is_misaligned() {
        let leaves = vec![LeafRecord::new(0, PageType::Normal, true)];
        let pages = (0..2).map(|_| Ok(OcrPage::default()));
        let err = converter()
            .assemble(&leaves, pages, &mut images(&[]), MetadataRecord::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MisalignedSources {
                ocr_pages: 2,
                leaves: 1
            }
        ));
    }

    #[test]
    fn test_pipeline_failure_ends_run() {
        struct Broken;
        impl ImagePipeline for Broken {
            fn transcode(&self, _: &[u8], _: &ImageRequest) -> Result<Vec<u8>> {
                Err(Error::Pipeline {
                    tool: "pnmscale".into(),
                    message: "exited with status 1".into(),
                })
            }
        }
        let leaves = vec![LeafRecord::new(0, PageType::Cover, true)];
        let err = Converter::new()
            .with_pipeline(Broken)
            .assemble(
                &leaves,
                std::iter::once(Ok(OcrPage::default())),
                &mut images(&[0]),
                MetadataRecord::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Pipeline { .. }));
    }

    fn page_type(n: u8) -> PageType {
        match n {
            0 => PageType::Cover,
            1 => PageType::Title,
            2 => PageType::Copyright,
            3 => PageType::Contents,
            4 => PageType::Normal,
            _ => PageType::Other("Delete".into()),
        }
    }

    proptest! {
        #[test]
        fn prop_assembled_book_is_consistent(
            records in prop::collection::vec((0u8..6, any::<bool>(), any::<bool>()), 0..24),
            untitled_as_images in any::<bool>(),
        ) {
            let leaves: Vec<_> = records
                .iter()
                .enumerate()
                .map(|(n, (kind, include, _))| LeafRecord::new(n, page_type(*kind), *include))
                .collect();
            let with_images: Vec<_> = records
                .iter()
                .enumerate()
                .filter(|(_, (_, _, has_image))| *has_image)
                .map(|(n, _)| n)
                .collect();
            let pages = leaves.iter().map(|l| Ok(text_page(&format!("leaf {}", l.index))));

            let config = ConvertConfig {
                untitled_pages_as_images: untitled_as_images,
                ..ConvertConfig::default()
            };
            let book = converter()
                .with_config(config)
                .assemble(&leaves, pages, &mut images(&with_images), MetadataRecord::new())
                .unwrap();

            prop_assert!(book.validate().is_ok());
            for (expected, point) in book.nav_points().iter().enumerate() {
                prop_assert_eq!(point.play_order, PLAY_ORDER_ORIGIN + expected);
            }
            let cover_refs = book.guide.iter().filter(|g| g.kind == Landmark::Cover).count();
            prop_assert_eq!(cover_refs, usize::from(book.cover_id.is_some()));

            // Only leaves with an image can become pages
            for entry in &book.spine[..book.spine.len() - 2] {
                prop_assert!(!entry.linear);
                let leaf: usize = entry.idref.trim_start_matches("leaf").parse().unwrap();
                prop_assert!(with_images.contains(&leaf));
                prop_assert!(leaves[leaf].include);
            }
            let tail: Vec<_> = book.spine.iter().rev().take(2).map(|s| s.idref.as_str()).collect();
            prop_assert_eq!(tail, vec!["book", "intro"]);
        }
    }
}
