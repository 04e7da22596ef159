//! Page classification and text extraction.
//!
//! Each leaf is either rendered as a page image or reflowed into the book
//! text. Pages up to the scanned title page are front matter and stay images;
//! after it, Normal pages become text. Cover, title, copyright, and contents
//! pages are always images.

use crate::book::Landmark;
use crate::bundle::{LeafRecord, PageType};
use crate::error::{Error, Result};
use crate::ocr::{BlockElement, BlockType, OcrPage};

/// Where the classifier is relative to the title page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleState {
    BeforeTitle,
    AfterTitle,
}

/// Image page kinds, each with its own navigation treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Cover,
    Title,
    Copyright,
    Contents,
    /// A Normal page before the title page.
    FrontMatter,
}

impl ImageRole {
    /// Navpoint label and guide entry, for roles that get them.
    ///
    /// Covers are labelled by [`PageClassifier::record_cover`] instead.
    pub fn landmark(self) -> Option<(&'static str, Landmark)> {
        match self {
            ImageRole::Title => Some(("Title Page", Landmark::TitlePage)),
            ImageRole::Copyright => Some(("Copyright", Landmark::Copyright)),
            ImageRole::Contents => Some(("Contents", Landmark::Toc)),
            ImageRole::Cover | ImageRole::FrontMatter => None,
        }
    }
}

/// What to do with one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    Skip,
    Image(ImageRole),
    Text,
}

/// Which cover an emitted cover page is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverSide {
    Front,
    Back,
}

impl CoverSide {
    pub fn label(self) -> &'static str {
        match self {
            CoverSide::Front => "Front Cover",
            CoverSide::Back => "Back Cover",
        }
    }
}

/// Per-run classification state.
#[derive(Debug, Clone)]
pub struct PageClassifier {
    state: TitleState,
    covers: usize,
}

impl PageClassifier {
    /// Start a run over `leaves`.
    ///
    /// The run starts before the title if the scan data has a Title page.
    /// Without one it starts after the title, unless `untitled_as_images`
    /// asks for an untitled book to be kept entirely as images.
    pub fn new(leaves: &[LeafRecord], untitled_as_images: bool) -> Self {
        let has_title = leaves.iter().any(|leaf| leaf.page_type == PageType::Title);
        let state = if has_title || untitled_as_images {
            TitleState::BeforeTitle
        } else {
            TitleState::AfterTitle
        };
        Self { state, covers: 0 }
    }

    pub fn state(&self) -> TitleState {
        self.state
    }

    /// Decide what to do with a leaf, advancing past the title if it is one.
    pub fn classify(&mut self, leaf: &LeafRecord) -> PageAction {
        if !leaf.include {
            return PageAction::Skip;
        }
        match &leaf.page_type {
            PageType::Cover => PageAction::Image(ImageRole::Cover),
            PageType::Title => {
                self.state = TitleState::AfterTitle;
                PageAction::Image(ImageRole::Title)
            }
            PageType::Copyright => PageAction::Image(ImageRole::Copyright),
            PageType::Contents => PageAction::Image(ImageRole::Contents),
            PageType::Normal => match self.state {
                TitleState::BeforeTitle => PageAction::Image(ImageRole::FrontMatter),
                TitleState::AfterTitle => PageAction::Text,
            },
            PageType::Other(_) => PageAction::Skip,
        }
    }

    /// Count an emitted cover page. The first is the front cover.
    pub fn record_cover(&mut self) -> CoverSide {
        self.covers += 1;
        if self.covers == 1 {
            CoverSide::Front
        } else {
            CoverSide::Back
        }
    }
}

/// Paragraph texts of a page, in document order.
///
/// Only Text blocks contribute. Any element other than `region`, `text`, or
/// `row` inside a block is an error, whatever the block type.
pub fn extract_paragraphs(page: &OcrPage, leaf: usize) -> Result<Vec<String>> {
    let mut paragraphs = Vec::new();
    for block in &page.blocks {
        for element in &block.elements {
            match element {
                BlockElement::Region | BlockElement::Row => {}
                BlockElement::Text(pars) => {
                    if block.block_type == BlockType::Text {
                        paragraphs.extend(pars.iter().map(|par| par.text()));
                    }
                }
                BlockElement::Unknown(name) => {
                    return Err(Error::UnexpectedStructure {
                        leaf,
                        element: name.clone(),
                    });
                }
            }
        }
    }
    Ok(paragraphs)
}
