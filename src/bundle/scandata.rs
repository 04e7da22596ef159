use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::util::{local_name, resolve_entity};

/// Scan-data classification of a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageType {
    Cover,
    Title,
    Copyright,
    Contents,
    Normal,
    /// Any other tag (`Delete`, `Index`, `Color Card`, ...), kept verbatim.
    Other(String),
}

impl PageType {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "Cover" => PageType::Cover,
            "Title" => PageType::Title,
            "Copyright" => PageType::Copyright,
            "Contents" => PageType::Contents,
            "Normal" => PageType::Normal,
            other => PageType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PageType::Cover => "Cover",
            PageType::Title => "Title",
            PageType::Copyright => "Copyright",
            PageType::Contents => "Contents",
            PageType::Normal => "Normal",
            PageType::Other(tag) => tag,
        }
    }
}

/// One `page` record from the scan data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRecord {
    /// Leaf number (`leafNum`). When absent, one past the previous record's
    /// leaf number, or 0 for the first record.
    pub index: usize,
    pub page_type: PageType,
    /// Whether the leaf goes into access formats (`addToAccessFormats`).
    pub include: bool,
}

impl LeafRecord {
    pub fn new(index: usize, page_type: PageType, include: bool) -> Self {
        Self {
            index,
            page_type,
            include,
        }
    }
}

/// Parse the `book/pageData/page` records of a scan data document, in order.
pub fn parse_scandata(content: &str) -> Result<Vec<LeafRecord>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut leaves: Vec<LeafRecord> = Vec::new();
    let mut seen: HashSet<usize> = HashSet::new();

    // Element path from the root, as local names
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<PageState> = None;
    let mut buf_text = String::new();

    struct PageState {
        leaf_num: Option<usize>,
        page_type: Option<String>,
        include: bool,
    }

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref()).to_vec();

                if local == b"page" && in_page_data(&path) {
                    let mut leaf_num = None;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"leafNum" {
                            let value = String::from_utf8(attr.value.to_vec())?;
                            let parsed = value.trim().parse::<usize>().map_err(|_| {
                                Error::InvalidScanData(format!("bad leafNum \"{value}\""))
                            })?;
                            leaf_num = Some(parsed);
                        }
                    }
                    current = Some(PageState {
                        leaf_num,
                        page_type: None,
                        include: false,
                    });
                }
                buf_text.clear();
                path.push(local);
            }
            Ok(Event::Empty(e)) => {
                // <page leafNum="3"/> carries no type and is never included
                let name = e.name();
                if local_name(name.as_ref()) == b"page" && in_page_data(&path) {
                    return Err(Error::InvalidScanData(format!(
                        "page record {} has no content",
                        leaves.len()
                    )));
                }
            }
            Ok(Event::Text(e)) => {
                buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    buf_text.push(c);
                }
            }
            Ok(Event::End(_)) => {
                let Some(local) = path.pop() else {
                    continue;
                };

                match local.as_slice() {
                    b"pageType" if path.last().is_some_and(|p| p == b"page") => {
                        if let Some(state) = current.as_mut() {
                            state.page_type = Some(buf_text.clone());
                        }
                    }
                    b"addToAccessFormats" if path.last().is_some_and(|p| p == b"page") => {
                        if let Some(state) = current.as_mut() {
                            state.include = buf_text.trim() == "true";
                        }
                    }
                    b"page" if in_page_data(&path) => {
                        if let Some(state) = current.take() {
                            let index = state.leaf_num.unwrap_or_else(|| {
                                leaves.last().map_or(0, |prev| prev.index + 1)
                            });
                            if !seen.insert(index) {
                                return Err(Error::InvalidScanData(format!(
                                    "duplicate leafNum {index}"
                                )));
                            }
                            let page_type = state.page_type.ok_or_else(|| {
                                Error::InvalidScanData(format!("leaf {index} has no pageType"))
                            })?;
                            leaves.push(LeafRecord::new(
                                index,
                                PageType::parse(&page_type),
                                state.include,
                            ));
                        }
                    }
                    _ => {}
                }
                buf_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(leaves)
}

fn in_page_data(path: &[Vec<u8>]) -> bool {
    matches!(path, [book, page_data] if book == b"book" && page_data == b"pageData")
}
