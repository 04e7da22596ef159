mod assembler;
pub mod xhtml;

pub use assembler::{DocumentAssembler, LeafPage, PLAY_ORDER_ORIGIN};

use std::collections::HashSet;

use crate::error::{Error, Result};

/// An assembled e-book, ready to be packaged.
///
/// Items are kept in insertion order so the package lists them the way they
/// were emitted.
#[derive(Debug, Clone, Default)]
pub struct Book {
    pub metadata: MetadataRecord,
    pub manifest: Vec<ContentItem>,
    pub spine: Vec<SpineEntry>,
    pub guide: Vec<GuideEntry>,
    pub nav: Vec<NavPoint>,
    /// Manifest id of the designated cover image
    pub cover_id: Option<String>,
}

/// A packaged resource (content document, image, stylesheet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// An item in the reading order (spine)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    pub idref: String,
    pub linear: bool,
}

/// Guide reference types used by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landmark {
    Cover,
    TitlePage,
    Copyright,
    Toc,
    Text,
}

impl Landmark {
    /// The OPF guide `type` value.
    pub fn as_str(self) -> &'static str {
        match self {
            Landmark::Cover => "cover",
            Landmark::TitlePage => "title-page",
            Landmark::Copyright => "copyright-page",
            Landmark::Toc => "toc",
            Landmark::Text => "text",
        }
    }
}

/// A guide reference to a structurally significant page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideEntry {
    pub href: String,
    pub kind: Landmark,
    pub title: String,
}

/// A navigation entry (hierarchical)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub id: String,
    pub play_order: usize,
    pub label: String,
    pub src: String,
    pub children: Vec<NavPoint>,
}

impl NavPoint {
    pub fn new(play_order: usize, label: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            id: format!("navpoint-{play_order}"),
            play_order,
            label: label.into(),
            src: src.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: NavPoint) -> Self {
        self.children.push(child);
        self
    }

    /// Number of levels in this subtree.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(NavPoint::depth).max().unwrap_or(0)
    }
}

/// One metadata field: an element name (`dc:title`, `meta`), text, attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaItem {
    pub name: String,
    pub text: Option<String>,
    pub attributes: Vec<(String, String)>,
}

impl MetaItem {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            attributes: Vec::new(),
        }
    }

    /// An element that carries only attributes.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn is_cover_hint(&self) -> bool {
        self.name == "meta" && self.attribute("name") == Some("cover")
    }
}

/// Package metadata, in output order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    pub items: Vec<MetaItem>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: MetaItem) {
        self.items.push(item);
    }

    /// Text of every item with this element name.
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.items
            .iter()
            .filter(move |item| item.name == name)
            .filter_map(|item| item.text.as_deref())
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .filter(|item| item.name == name)
            .find_map(|item| item.text.as_deref())
    }

    pub fn title(&self) -> Option<&str> {
        self.first("dc:title")
    }

    /// The identifier carrying `id="bookid"`.
    pub fn unique_identifier(&self) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.name == "dc:identifier" && item.attribute("id") == Some("bookid"))
            .and_then(|item| item.text.as_deref())
    }

    /// Point the cover hint at `id`, or drop it when there is no cover.
    pub fn resolve_cover(&mut self, id: Option<&str>) {
        match id {
            Some(id) => {
                for item in self.items.iter_mut().filter(|item| item.is_cover_hint()) {
                    for (key, value) in &mut item.attributes {
                        if key == "content" {
                            *value = id.to_string();
                        }
                    }
                }
            }
            None => self.items.retain(|item| !item.is_cover_hint()),
        }
    }

    pub fn cover_hint(&self) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.is_cover_hint())
            .and_then(|item| item.attribute("content"))
    }
}

impl Book {
    /// Get a manifest item by id
    pub fn item(&self, id: &str) -> Option<&ContentItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Get a manifest item by href
    pub fn item_by_href(&self, href: &str) -> Option<&ContentItem> {
        self.manifest.iter().find(|item| item.href == href)
    }

    /// Every navpoint, depth first.
    pub fn nav_points(&self) -> Vec<&NavPoint> {
        fn walk<'a>(points: &'a [NavPoint], out: &mut Vec<&'a NavPoint>) {
            for point in points {
                out.push(point);
                walk(&point.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.nav, &mut out);
        out
    }

    /// Depth of the navigation tree.
    pub fn nav_depth(&self) -> usize {
        self.nav.iter().map(NavPoint::depth).max().unwrap_or(0)
    }

    /// Check that every reference in the book resolves.
    ///
    /// Manifest ids and hrefs are unique, spine idrefs, guide hrefs and
    /// navpoint targets exist, play orders count up by one from
    /// [`PLAY_ORDER_ORIGIN`], and the cover hint names a manifest item.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut hrefs = HashSet::new();
        for item in &self.manifest {
            if !ids.insert(item.id.as_str()) {
                return Err(invalid(format!("duplicate manifest id \"{}\"", item.id)));
            }
            if !hrefs.insert(item.href.as_str()) {
                return Err(invalid(format!("duplicate manifest href \"{}\"", item.href)));
            }
        }

        for entry in &self.spine {
            if !ids.contains(entry.idref.as_str()) {
                return Err(invalid(format!("spine idref \"{}\" not in manifest", entry.idref)));
            }
        }

        for entry in &self.guide {
            if !hrefs.contains(entry.href.as_str()) {
                return Err(invalid(format!("guide href \"{}\" not in manifest", entry.href)));
            }
        }

        for (expected, point) in (PLAY_ORDER_ORIGIN..).zip(self.nav_points()) {
            if point.play_order != expected {
                return Err(invalid(format!(
                    "navpoint \"{}\" has play order {}, expected {}",
                    point.label, point.play_order, expected
                )));
            }
            if !hrefs.contains(point.src.as_str()) {
                return Err(invalid(format!("navpoint src \"{}\" not in manifest", point.src)));
            }
        }

        if let Some(cover) = self.metadata.cover_hint()
            && !ids.contains(cover)
        {
            return Err(invalid(format!("cover \"{cover}\" not in manifest")));
        }

        Ok(())
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidDocument(message)
}
