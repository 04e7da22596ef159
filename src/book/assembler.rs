use std::collections::HashSet;

use super::xhtml::{self, STYLESHEET, STYLESHEET_HREF};
use super::{Book, ContentItem, GuideEntry, Landmark, MetadataRecord, NavPoint, SpineEntry};
use crate::error::{Error, Result};
use crate::image::ImageFormat;

/// Play order of the first navpoint.
pub const PLAY_ORDER_ORIGIN: usize = 0;

const XHTML: &str = "application/xhtml+xml";

/// Manifest entries created for one rendered leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPage {
    /// Id of the page document
    pub id: String,
    /// Href of the page document; landmarks and navpoints point here
    pub href: String,
    pub image_id: String,
    pub image_href: String,
}

/// Collects pages as they are classified and builds the final [`Book`].
///
/// One assembler serves one conversion run. Every reference is checked when
/// it is added, so a reference can only point at an item added before it.
#[derive(Debug)]
pub struct DocumentAssembler {
    manifest: Vec<ContentItem>,
    ids: HashSet<String>,
    hrefs: HashSet<String>,
    spine: Vec<SpineEntry>,
    guide: Vec<GuideEntry>,
    nav: Vec<NavPoint>,
    next_play_order: usize,
    paragraphs: Vec<String>,
    cover_id: Option<String>,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAssembler {
    pub fn new() -> Self {
        Self {
            manifest: Vec::new(),
            ids: HashSet::new(),
            hrefs: HashSet::new(),
            spine: Vec::new(),
            guide: Vec::new(),
            nav: Vec::new(),
            next_play_order: PLAY_ORDER_ORIGIN,
            paragraphs: Vec::new(),
            cover_id: None,
        }
    }

    /// Add a resource to the manifest.
    pub fn add_content(
        &mut self,
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<()> {
        let id = id.into();
        let href = href.into();
        if self.ids.contains(&id) {
            return Err(Error::InvalidDocument(format!("duplicate manifest id \"{id}\"")));
        }
        if self.hrefs.contains(&href) {
            return Err(Error::InvalidDocument(format!(
                "duplicate manifest href \"{href}\""
            )));
        }
        self.ids.insert(id.clone());
        self.hrefs.insert(href.clone());
        self.manifest.push(ContentItem {
            id,
            href,
            media_type: media_type.into(),
            data,
        });
        Ok(())
    }

    /// Append a manifest item to the reading order.
    pub fn add_spine_item(&mut self, idref: &str, linear: bool) -> Result<()> {
        if !self.ids.contains(idref) {
            return Err(Error::InvalidDocument(format!(
                "spine idref \"{idref}\" not in manifest"
            )));
        }
        self.spine.push(SpineEntry {
            idref: idref.to_string(),
            linear,
        });
        Ok(())
    }

    pub fn add_guide_item(&mut self, href: &str, kind: Landmark, title: &str) -> Result<()> {
        self.require_href(href, "guide")?;
        self.guide.push(GuideEntry {
            href: href.to_string(),
            kind,
            title: title.to_string(),
        });
        Ok(())
    }

    /// Append a top-level navpoint and return its play order.
    pub fn add_navpoint(&mut self, label: &str, src: &str) -> Result<usize> {
        self.require_href(src, "navpoint")?;
        let play_order = self.next_play_order;
        self.next_play_order += 1;
        self.nav.push(NavPoint::new(play_order, label, src));
        Ok(play_order)
    }

    /// Add a rendered page: the image, a document showing it, and a
    /// non-linear spine entry.
    ///
    /// Ids and hrefs derive from the leaf number, so leaves never collide.
    pub fn add_leaf_page(
        &mut self,
        leaf: usize,
        image: Vec<u8>,
        format: ImageFormat,
    ) -> Result<LeafPage> {
        let stem = format!("leaf{leaf:04}");
        let page = LeafPage {
            id: stem.clone(),
            href: format!("{stem}.html"),
            image_id: format!("leaf-image{leaf:04}"),
            image_href: format!("images/{stem}.{}", format.extension()),
        };

        self.add_content(&page.image_id, &page.image_href, format.media_type(), image)?;
        let doc = xhtml::image_document(
            &format!("leaf {leaf:04}"),
            &page.image_href,
            &format!("leaf {leaf}"),
        );
        self.add_content(&page.id, &page.href, XHTML, doc.into_bytes())?;
        self.add_spine_item(&page.id, false)?;
        Ok(page)
    }

    /// Designate a manifest image as the book cover.
    pub fn set_cover(&mut self, image_id: &str) -> Result<()> {
        if !self.ids.contains(image_id) {
            return Err(Error::InvalidDocument(format!(
                "cover \"{image_id}\" not in manifest"
            )));
        }
        self.cover_id = Some(image_id.to_string());
        Ok(())
    }

    pub fn cover_id(&self) -> Option<&str> {
        self.cover_id.as_deref()
    }

    /// Append a paragraph to the running book text.
    pub fn push_paragraph(&mut self, text: String) {
        self.paragraphs.push(text);
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    /// Add the attribution page and the book text, then build the book.
    ///
    /// The attribution page comes first in the spine, the book text second;
    /// both get navpoints and the book text is the `text` landmark.
    pub fn finish(mut self, mut metadata: MetadataRecord, attribution: &str) -> Result<Book> {
        self.add_content("stylesheet", STYLESHEET_HREF, "text/css", STYLESHEET.as_bytes().to_vec())?;

        let intro = xhtml::paragraphs_document("Archive", &[attribution]);
        self.add_content("intro", "intro.html", XHTML, intro.into_bytes())?;
        self.add_spine_item("intro", true)?;
        self.add_navpoint("Archive", "intro.html")?;

        let title = metadata.title().unwrap_or("Book").to_string();
        let text = xhtml::paragraphs_document(&title, &self.paragraphs);
        self.add_content("book", "book.html", XHTML, text.into_bytes())?;
        self.add_spine_item("book", true)?;
        self.add_navpoint("Book", "book.html")?;
        self.add_guide_item("book.html", Landmark::Text, "Book")?;

        metadata.resolve_cover(self.cover_id.as_deref());

        let book = Book {
            metadata,
            manifest: self.manifest,
            spine: self.spine,
            guide: self.guide,
            nav: self.nav,
            cover_id: self.cover_id,
        };
        book.validate()?;
        Ok(book)
    }

    fn require_href(&self, href: &str, what: &str) -> Result<()> {
        if self.hrefs.contains(href) {
            Ok(())
        } else {
            Err(Error::InvalidDocument(format!(
                "{what} href \"{href}\" not in manifest"
            )))
        }
    }
}
